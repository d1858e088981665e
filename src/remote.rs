//! Best-effort mirror of task state against a remote JSON endpoint.
//!
//! The remote is never the store of record: fetches feed first-run seeding,
//! and mutations are fire-and-forget. Callers treat every error here as a
//! warning.

use crate::models::{RemoteTask, TodosResponse, DEFAULT_USER_ID};
use async_trait::async_trait;
use serde::Serialize;

/// Default endpoint, a public mock API. Writes are accepted but not
/// durably persisted, so mirror calls are demonstration-only.
pub const DEFAULT_BASE_URL: &str = "https://dummyjson.com/todos";

/// Cap on how many remote records a single fetch hands back, to keep
/// first-run seeding fast.
pub const SEED_LIMIT: usize = 20;

/// The remote side of the system, behind a trait so the repository can be
/// exercised against an in-memory fake.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>, NetworkError>;
    async fn create_todo(&self, title: &str, completed: bool) -> Result<RemoteTask, NetworkError>;
    async fn update_todo_status(&self, id: i64, completed: bool) -> Result<(), NetworkError>;
    async fn delete_todo(&self, id: i64) -> Result<(), NetworkError>;
}

/// HTTP implementation over a shared reqwest client. No explicit timeout,
/// no retry, no backoff: a failed call is logged by the caller and dropped.
pub struct RemoteTaskSource {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteTaskSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        RemoteTaskSource {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

impl Default for RemoteTaskSource {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[derive(Serialize)]
struct CreateTodoBody<'a> {
    todo: &'a str,
    completed: bool,
    #[serde(rename = "userId")]
    user_id: i64,
}

#[derive(Serialize)]
struct UpdateTodoBody {
    completed: bool,
}

#[async_trait]
impl RemoteSource for RemoteTaskSource {
    async fn fetch_todos(&self) -> Result<Vec<RemoteTask>, NetworkError> {
        tracing::debug!(url = %self.base_url, "fetching remote todos");

        let response = self
            .client
            .get(&self.base_url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let envelope: TodosResponse = decode_body(response).await?;
        let mut todos = envelope.todos;
        todos.truncate(SEED_LIMIT);

        tracing::debug!(count = todos.len(), total = envelope.total, "remote todos received");
        Ok(todos)
    }

    async fn create_todo(&self, title: &str, completed: bool) -> Result<RemoteTask, NetworkError> {
        let body = CreateTodoBody {
            todo: title,
            completed,
            user_id: DEFAULT_USER_ID,
        };

        let response = self
            .client
            .post(format!("{}/add", self.base_url))
            .json(&body)
            .send()
            .await?;

        decode_body(response).await
    }

    async fn update_todo_status(&self, id: i64, completed: bool) -> Result<(), NetworkError> {
        let response = self
            .client
            .put(format!("{}/{id}", self.base_url))
            .json(&UpdateTodoBody { completed })
            .send()
            .await?;

        check_status(&response)?;
        Ok(())
    }

    async fn delete_todo(&self, id: i64) -> Result<(), NetworkError> {
        let response = self
            .client
            .delete(format!("{}/{id}", self.base_url))
            .send()
            .await?;

        check_status(&response)?;
        Ok(())
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), NetworkError> {
    let status = response.status();
    if !status.is_success() {
        return Err(NetworkError::Server(status.as_u16()));
    }
    Ok(())
}

/// Status check, empty-body check, then JSON decode.
async fn decode_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, NetworkError> {
    check_status(&response)?;

    let body = response.bytes().await?;
    if body.is_empty() {
        return Err(NetworkError::NoData);
    }

    serde_json::from_slice(&body).map_err(|e| NetworkError::Decode(e.to_string()))
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum NetworkError {
    InvalidUrl(String),
    Transport(String),
    NoData,
    Decode(String),
    Server(u16),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            NetworkError::InvalidUrl(e.to_string())
        } else if e.is_decode() {
            NetworkError::Decode(e.to_string())
        } else {
            NetworkError::Transport(e.to_string())
        }
    }
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::InvalidUrl(e) => write!(f, "invalid url: {e}"),
            NetworkError::Transport(e) => write!(f, "transport: {e}"),
            NetworkError::NoData => write!(f, "empty response body"),
            NetworkError::Decode(e) => write!(f, "decode: {e}"),
            NetworkError::Server(code) => write!(f, "server returned {code}"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
