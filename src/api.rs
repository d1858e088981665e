//! The HTTP boundary: thin handlers mapping one-to-one onto repository
//! operations. Everything interesting happens a layer down.

use crate::models::{CreateTaskRequest, SetCompletedRequest, Task, UpdateTaskRequest};
use crate::remote::RemoteTaskSource;
use crate::repository::{TaskError, TaskRepository};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub struct AppState {
    pub repo: TaskRepository<RemoteTaskSource>,
}

pub type SharedState = Arc<AppState>;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/search", get(search_tasks))
        .route(
            "/api/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/completed", put(set_completed))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

fn error_response(err: TaskError) -> (StatusCode, String) {
    let status = match &err {
        TaskError::InvalidData => StatusCode::UNPROCESSABLE_ENTITY,
        TaskError::NotFound => StatusCode::NOT_FOUND,
        TaskError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

// GET /api/tasks
async fn list_tasks(
    State(state): State<SharedState>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    state.repo.fetch_all().map(Json).map_err(error_response)
}

#[derive(Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
}

// GET /api/tasks/search?q=...
async fn search_tasks(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Task>>, (StatusCode, String)> {
    state.repo.search(&params.q).map(Json).map_err(error_response)
}

// POST /api/tasks
async fn create_task(
    State(state): State<SharedState>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<Task>), (StatusCode, String)> {
    let task = state
        .repo
        .create(&payload.title, payload.description, payload.is_completed)
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(task)))
}

// GET /api/tasks/:id
async fn get_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .repo
        .fetch(&id)
        .map_err(error_response)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Task not found".to_string()))
}

// PUT /api/tasks/:id
async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .repo
        .update(&id, &payload.title, payload.description, payload.is_completed)
        .map(Json)
        .map_err(error_response)
}

// PUT /api/tasks/:id/completed, the list-row checkbox. A client that
// flipped its row optimistically reverts on any error response.
async fn set_completed(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<SetCompletedRequest>,
) -> Result<Json<Task>, (StatusCode, String)> {
    state
        .repo
        .set_completed(&id, payload.is_completed)
        .map(Json)
        .map_err(error_response)
}

// DELETE /api/tasks/:id
async fn delete_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state.repo.delete(&id).map_err(error_response)?;

    if !deleted {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
