use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder owner id. There is no multi-user support; the remote API
/// wants a userId on writes, so every local task carries this one.
pub const DEFAULT_USER_ID: i64 = 1;

/// Description stamped on records imported during first-run seeding.
/// The remote records carry no description of their own.
pub const SEEDED_DESCRIPTION: &str = "Imported from remote";

/// A to-do item, the one record type in the store.
///
/// `id` is the primary key: a random UUID for tasks created locally, the
/// stringified remote numeric id for tasks imported by seeding. Immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub user_id: i64,
}

impl Task {
    /// Build a locally created task. Every field is filled here, before the
    /// record is handed to anyone; a task never exists half-initialized.
    pub fn new(title: String, description: Option<String>, is_completed: bool) -> Self {
        Task {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            is_completed,
            created_at: Utc::now(),
            user_id: DEFAULT_USER_ID,
        }
    }

    /// Build a task from a remote record during seeding. The remote numeric
    /// id becomes the local primary key, which is what makes re-seeding
    /// idempotent.
    pub fn from_remote(remote: RemoteTask) -> Self {
        Task {
            id: remote.id.to_string(),
            title: remote.todo,
            description: Some(SEEDED_DESCRIPTION.to_string()),
            is_completed: remote.completed,
            created_at: Utc::now(),
            user_id: remote.user_id,
        }
    }

    /// The remote id this task mirrors, if it was seeded from the remote
    /// source. Locally created tasks (UUID ids) have none.
    pub fn remote_id(&self) -> Option<i64> {
        self.id.parse().ok()
    }
}

// ── Remote wire types ──────────────────────────────────────────

/// One record as the remote endpoint serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTask {
    pub id: i64,
    pub todo: String,
    pub completed: bool,
    #[serde(rename = "userId")]
    pub user_id: i64,
}

/// Envelope of the remote list endpoint. Only `todos` is consumed.
#[derive(Debug, Deserialize)]
pub struct TodosResponse {
    pub todos: Vec<RemoteTask>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

// ── API request types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub is_completed: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetCompletedRequest {
    pub is_completed: bool,
}
