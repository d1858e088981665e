//! Task ↔ redb persistence.
//!
//! redb is the store of record. Reads run directly against a read
//! transaction; writes are buffered in a [`StoreSession`] and land in one
//! write transaction per `save()`. Nothing a session holds is durable
//! before that.

use crate::models::Task;
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::sync::Arc;

const TASKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct TaskStore {
    db: Arc<Database>,
}

impl TaskStore {
    /// Open (or create) the store at the given path.
    /// Creates the tasks table if it doesn't exist.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(TASKS_TABLE)?;
        }
        txn.commit()?;

        Ok(TaskStore { db: Arc::new(db) })
    }

    /// A fresh working session. Every call returns an isolated session;
    /// buffered state is never shared between them.
    pub fn session(&self) -> StoreSession {
        StoreSession {
            db: Arc::clone(&self.db),
            pending: Vec::new(),
        }
    }

    /// Every record, newest first.
    pub fn fetch_all(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.load_all()?;
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    /// Lookup by primary key. At most one record.
    pub fn fetch_by_id(&self, id: &str) -> Result<Option<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TASKS_TABLE)?;

        match table.get(id)? {
            Some(data) => {
                let task = postcard::from_bytes(data.value())
                    .map_err(|e| StoreError::Decode(e.to_string()))?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Case-insensitive substring match over title OR description, newest
    /// first. An empty pattern matches every record; rejecting empty
    /// queries is the caller's job.
    pub fn search(&self, query: &str) -> Result<Vec<Task>, StoreError> {
        let needle = query.to_lowercase();
        let mut tasks = self.load_all()?;
        tasks.retain(|t| {
            t.title.to_lowercase().contains(&needle)
                || t.description
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        });
        sort_newest_first(&mut tasks);
        Ok(tasks)
    }

    pub fn count(&self) -> Result<u64, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TASKS_TABLE)?;
        Ok(table.len()?)
    }

    fn load_all(&self) -> Result<Vec<Task>, StoreError> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(TASKS_TABLE)?;

        let mut tasks = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            let task: Task = postcard::from_bytes(value.value())
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}

/// Sort by created_at descending; ties (a seeding batch is stamped within
/// the same instant) break on id so the order is stable.
fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ── Working session ────────────────────────────────────────────

enum Pending {
    Put(Task),
    Delete(String),
}

/// A buffered batch of mutations against the store. Durable only once
/// `save()` commits: either the whole batch lands or none of it.
pub struct StoreSession {
    db: Arc<Database>,
    pending: Vec<Pending>,
}

impl StoreSession {
    pub fn insert(&mut self, task: Task) {
        self.pending.push(Pending::Put(task));
    }

    pub fn update(&mut self, task: Task) {
        self.pending.push(Pending::Put(task));
    }

    pub fn delete(&mut self, id: impl Into<String>) {
        self.pending.push(Pending::Delete(id.into()));
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Commit every buffered mutation in one transaction. No-op when
    /// nothing is pending. On failure the store is untouched and the
    /// buffer is kept.
    pub fn save(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(TASKS_TABLE)?;
            for op in &self.pending {
                match op {
                    Pending::Put(task) => {
                        let bytes = postcard::to_allocvec(task)
                            .map_err(|e| StoreError::Encode(e.to_string()))?;
                        table.insert(task.id.as_str(), bytes.as_slice())?;
                    }
                    Pending::Delete(id) => {
                        table.remove(id.as_str())?;
                    }
                }
            }
        }
        txn.commit()?;

        self.pending.clear();
        Ok(())
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum StoreError {
    Redb(String),
    Encode(String),
    Decode(String),
}

// redb 2.x has many error types. Blanket them all into StoreError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self { StoreError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Redb(e) => write!(f, "redb: {e}"),
            StoreError::Encode(e) => write!(f, "encode: {e}"),
            StoreError::Decode(e) => write!(f, "decode: {e}"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────
