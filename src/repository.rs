//! Orchestration: first-run seeding, CRUD against the store, best-effort
//! propagation of local mutations to the remote source.
//!
//! The store is authoritative. A storage failure fails the operation; a
//! remote failure never does, it is logged inside the spawned mirror task
//! and dropped.

use crate::models::Task;
use crate::remote::RemoteSource;
use crate::store::{StoreError, StoreSession, TaskStore};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct TaskRepository<R: RemoteSource + 'static> {
    store: TaskStore,
    /// Serializes interactive mutations; every operation saves as it goes.
    primary: Mutex<StoreSession>,
    remote: Arc<R>,
}

impl<R: RemoteSource + 'static> TaskRepository<R> {
    pub fn new(store: TaskStore, remote: R) -> Self {
        let primary = Mutex::new(store.session());
        TaskRepository {
            store,
            primary,
            remote: Arc::new(remote),
        }
    }

    /// One-time import: when the store is empty, pull the remote list and
    /// insert every record not already present, committed as a single
    /// batch. A no-op as soon as any local task exists (first-run
    /// semantics, not ongoing sync). Returns how many tasks were inserted.
    pub async fn seed_if_empty(&self) -> Result<usize, TaskError> {
        if self.store.count()? > 0 {
            return Ok(0);
        }

        let todos = match self.remote.fetch_todos().await {
            Ok(todos) => todos,
            Err(e) => {
                tracing::warn!(error = %e, "seed fetch failed, starting with an empty store");
                return Ok(0);
            }
        };

        let mut seen: HashSet<String> =
            self.store.fetch_all()?.into_iter().map(|t| t.id).collect();

        // Background session: the whole batch lands in one commit, so a
        // failed seeding pass leaves nothing half-written.
        let mut session = self.store.session();
        let mut inserted = 0usize;
        for todo in todos {
            if !seen.insert(todo.id.to_string()) {
                continue;
            }
            session.insert(Task::from_remote(todo));
            inserted += 1;
        }
        session.save()?;

        if inserted > 0 {
            tracing::info!(count = inserted, "seeded tasks from remote");
        }
        Ok(inserted)
    }

    /// All local tasks, newest first. Never touches the network.
    pub fn fetch_all(&self) -> Result<Vec<Task>, TaskError> {
        Ok(self.store.fetch_all()?)
    }

    pub fn fetch(&self, id: &str) -> Result<Option<Task>, TaskError> {
        Ok(self.store.fetch_by_id(id)?)
    }

    pub fn search(&self, query: &str) -> Result<Vec<Task>, TaskError> {
        if query.trim().is_empty() {
            return Err(TaskError::InvalidData);
        }
        Ok(self.store.search(query)?)
    }

    pub fn create(
        &self,
        title: &str,
        description: Option<String>,
        is_completed: bool,
    ) -> Result<Task, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::InvalidData);
        }

        let task = Task::new(title.to_string(), description, is_completed);
        {
            let mut session = self.primary.lock().unwrap();
            session.insert(task.clone());
            session.save()?;
        }

        self.mirror_create(task.title.clone(), task.is_completed);
        Ok(task)
    }

    pub fn update(
        &self,
        id: &str,
        title: &str,
        description: Option<String>,
        is_completed: bool,
    ) -> Result<Task, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(TaskError::InvalidData);
        }

        let mut task = self.store.fetch_by_id(id)?.ok_or(TaskError::NotFound)?;
        task.title = title.to_string();
        task.description = description;
        task.is_completed = is_completed;

        {
            let mut session = self.primary.lock().unwrap();
            session.update(task.clone());
            session.save()?;
        }

        self.mirror_status(&task);
        Ok(task)
    }

    /// Checkbox toggle: an update restricted to the completion flag. On a
    /// storage failure the caller reverts its optimistic state; there is
    /// no retry here.
    pub fn set_completed(&self, id: &str, is_completed: bool) -> Result<Task, TaskError> {
        let mut task = self.store.fetch_by_id(id)?.ok_or(TaskError::NotFound)?;
        task.is_completed = is_completed;

        {
            let mut session = self.primary.lock().unwrap();
            session.update(task.clone());
            session.save()?;
        }

        self.mirror_status(&task);
        Ok(task)
    }

    /// Returns whether a record was actually removed.
    pub fn delete(&self, id: &str) -> Result<bool, TaskError> {
        if id.trim().is_empty() {
            return Err(TaskError::InvalidData);
        }

        let Some(task) = self.store.fetch_by_id(id)? else {
            return Ok(false);
        };

        {
            let mut session = self.primary.lock().unwrap();
            session.delete(task.id.clone());
            session.save()?;
        }

        if let Some(remote_id) = task.remote_id() {
            let remote = Arc::clone(&self.remote);
            tokio::spawn(async move {
                if let Err(e) = remote.delete_todo(remote_id).await {
                    tracing::warn!(remote_id, error = %e, "remote delete failed");
                }
            });
        }
        Ok(true)
    }

    /// Commit anything still buffered in the primary session. Called on
    /// shutdown; every operation saves as it goes, so this usually has
    /// nothing to do.
    pub fn flush(&self) -> Result<(), TaskError> {
        let mut session = self.primary.lock().unwrap();
        Ok(session.save()?)
    }

    fn mirror_create(&self, title: String, completed: bool) {
        let remote = Arc::clone(&self.remote);
        tokio::spawn(async move {
            match remote.create_todo(&title, completed).await {
                Ok(created) => {
                    tracing::debug!(remote_id = created.id, "mirrored create to remote")
                }
                Err(e) => tracing::warn!(error = %e, "remote create failed"),
            }
        });
    }

    /// Push the completion flag to the remote, if this task came from
    /// there. Locally created tasks have no remote counterpart to sync.
    fn mirror_status(&self, task: &Task) {
        let Some(remote_id) = task.remote_id() else {
            tracing::debug!(id = %task.id, "local-only task, skipping remote status sync");
            return;
        };

        let remote = Arc::clone(&self.remote);
        let completed = task.is_completed;
        tokio::spawn(async move {
            if let Err(e) = remote.update_todo_status(remote_id, completed).await {
                tracing::warn!(remote_id, error = %e, "remote status sync failed");
            }
        });
    }
}

// ── Errors ─────────────────────────────────────────────────────

#[derive(Debug)]
pub enum TaskError {
    /// Caller-supplied input failed a precondition.
    InvalidData,
    /// No stored task with the requested id.
    NotFound,
    /// The local store failed; the operation did not complete.
    Storage(StoreError),
}

impl From<StoreError> for TaskError {
    fn from(e: StoreError) -> Self {
        TaskError::Storage(e)
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::InvalidData => write!(f, "invalid data"),
            TaskError::NotFound => write!(f, "task not found"),
            TaskError::Storage(e) => write!(f, "storage: {e}"),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RemoteTask, SEEDED_DESCRIPTION};
    use crate::remote::NetworkError;
    use async_trait::async_trait;
    use std::fs;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum MirrorCall {
        Create { title: String, completed: bool },
        UpdateStatus { id: i64, completed: bool },
        Delete { id: i64 },
    }

    /// In-memory remote. Clones share the same recorded-call log.
    #[derive(Clone)]
    struct MockRemote {
        todos: Vec<RemoteTask>,
        fail: bool,
        calls: Arc<Mutex<Vec<MirrorCall>>>,
    }

    impl MockRemote {
        fn with_todos(todos: Vec<RemoteTask>) -> Self {
            MockRemote {
                todos,
                fail: false,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing() -> Self {
            MockRemote {
                todos: Vec::new(),
                fail: true,
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> Vec<MirrorCall> {
            self.calls.lock().unwrap().clone()
        }

        async fn wait_for_calls(&self, n: usize) {
            for _ in 0..100 {
                if self.calls.lock().unwrap().len() >= n {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("expected {n} mirror call(s), got {:?}", self.calls());
        }
    }

    #[async_trait]
    impl RemoteSource for MockRemote {
        async fn fetch_todos(&self) -> Result<Vec<RemoteTask>, NetworkError> {
            if self.fail {
                return Err(NetworkError::Server(500));
            }
            Ok(self.todos.clone())
        }

        async fn create_todo(
            &self,
            title: &str,
            completed: bool,
        ) -> Result<RemoteTask, NetworkError> {
            self.calls.lock().unwrap().push(MirrorCall::Create {
                title: title.to_string(),
                completed,
            });
            if self.fail {
                return Err(NetworkError::Server(500));
            }
            Ok(RemoteTask {
                id: 255,
                todo: title.to_string(),
                completed,
                user_id: 1,
            })
        }

        async fn update_todo_status(&self, id: i64, completed: bool) -> Result<(), NetworkError> {
            self.calls
                .lock()
                .unwrap()
                .push(MirrorCall::UpdateStatus { id, completed });
            if self.fail {
                return Err(NetworkError::Server(500));
            }
            Ok(())
        }

        async fn delete_todo(&self, id: i64) -> Result<(), NetworkError> {
            self.calls.lock().unwrap().push(MirrorCall::Delete { id });
            if self.fail {
                return Err(NetworkError::Server(500));
            }
            Ok(())
        }
    }

    fn remote_task(id: i64, todo: &str) -> RemoteTask {
        RemoteTask {
            id,
            todo: todo.to_string(),
            completed: false,
            user_id: 1,
        }
    }

    fn temp_repo(name: &str, remote: MockRemote) -> (TaskRepository<MockRemote>, String) {
        let path = format!("/tmp/todo_repo_test_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path);
        let store = TaskStore::open(&path).unwrap();
        (TaskRepository::new(store, remote), path)
    }

    fn cleanup(path: &str) {
        let _ = fs::remove_file(path);
    }

    #[tokio::test]
    async fn seeds_an_empty_store_once() {
        let remote = MockRemote::with_todos(vec![
            remote_task(1, "A"),
            remote_task(2, "B"),
            remote_task(3, "C"),
        ]);
        let (repo, path) = temp_repo("seed", remote);

        assert_eq!(repo.seed_if_empty().await.unwrap(), 3);

        let tasks = repo.fetch_all().unwrap();
        assert_eq!(tasks.len(), 3);
        let mut ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["1", "2", "3"]);
        for task in &tasks {
            assert!(!task.is_completed);
            assert_eq!(task.description.as_deref(), Some(SEEDED_DESCRIPTION));
        }

        // Second call: store is no longer empty, nothing happens.
        assert_eq!(repo.seed_if_empty().await.unwrap(), 0);
        assert_eq!(repo.fetch_all().unwrap().len(), 3);

        cleanup(&path);
    }

    #[tokio::test]
    async fn seeding_skips_a_store_with_any_local_task() {
        let remote = MockRemote::with_todos(vec![remote_task(1, "A")]);
        let (repo, path) = temp_repo("seed_local", remote);

        repo.create("Purely local", None, false).unwrap();

        assert_eq!(repo.seed_if_empty().await.unwrap(), 0);
        assert_eq!(repo.fetch_all().unwrap().len(), 1);

        cleanup(&path);
    }

    #[tokio::test]
    async fn seeding_survives_a_dead_remote() {
        let (repo, path) = temp_repo("seed_fail", MockRemote::failing());

        assert_eq!(repo.seed_if_empty().await.unwrap(), 0);
        assert!(repo.fetch_all().unwrap().is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn seeding_dedupes_repeated_remote_ids() {
        let remote = MockRemote::with_todos(vec![
            remote_task(7, "first copy"),
            remote_task(7, "second copy"),
        ]);
        let (repo, path) = temp_repo("seed_dupes", remote);

        assert_eq!(repo.seed_if_empty().await.unwrap(), 1);
        assert_eq!(repo.fetch_all().unwrap().len(), 1);

        cleanup(&path);
    }

    #[tokio::test]
    async fn create_persists_and_mirrors() {
        let remote = MockRemote::with_todos(vec![]);
        let handle = remote.clone();
        let (repo, path) = temp_repo("create", remote);

        let task = repo.create("X", None, false).unwrap();
        assert_eq!(task.title, "X");
        assert!(!task.is_completed);
        assert!(!task.id.is_empty());

        let tasks = repo.fetch_all().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, task.id);

        handle.wait_for_calls(1).await;
        assert_eq!(
            handle.calls(),
            vec![MirrorCall::Create {
                title: "X".into(),
                completed: false
            }]
        );

        cleanup(&path);
    }

    #[tokio::test]
    async fn create_rejects_empty_title_without_touching_the_store() {
        let (repo, path) = temp_repo("create_empty", MockRemote::with_todos(vec![]));

        assert!(matches!(repo.create("", None, false), Err(TaskError::InvalidData)));
        assert!(matches!(repo.create("   ", None, true), Err(TaskError::InvalidData)));
        assert!(repo.fetch_all().unwrap().is_empty());

        cleanup(&path);
    }

    #[tokio::test]
    async fn create_succeeds_even_when_the_remote_is_down() {
        let remote = MockRemote::failing();
        let handle = remote.clone();
        let (repo, path) = temp_repo("create_remote_down", remote);

        let task = repo.create("Local wins", None, false).unwrap();
        handle.wait_for_calls(1).await;

        assert_eq!(repo.fetch(&task.id).unwrap().unwrap().title, "Local wins");

        cleanup(&path);
    }

    #[tokio::test]
    async fn newest_created_task_lists_first() {
        let (repo, path) = temp_repo("newest_first", MockRemote::with_todos(vec![]));

        repo.create("first", None, false).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let latest = repo.create("second", None, false).unwrap();

        let tasks = repo.fetch_all().unwrap();
        assert_eq!(tasks[0].id, latest.id);

        cleanup(&path);
    }

    #[tokio::test]
    async fn update_rewrites_fields_and_syncs_remote_origin_tasks() {
        let remote = MockRemote::with_todos(vec![remote_task(5, "seeded")]);
        let handle = remote.clone();
        let (repo, path) = temp_repo("update", remote);
        repo.seed_if_empty().await.unwrap();

        let updated = repo
            .update("5", "renamed", Some("notes".into()), true)
            .unwrap();
        assert_eq!(updated.title, "renamed");
        assert_eq!(updated.description.as_deref(), Some("notes"));
        assert!(updated.is_completed);

        let reloaded = repo.fetch("5").unwrap().unwrap();
        assert_eq!(reloaded.title, "renamed");

        handle.wait_for_calls(1).await;
        assert_eq!(
            handle.calls(),
            vec![MirrorCall::UpdateStatus {
                id: 5,
                completed: true
            }]
        );

        cleanup(&path);
    }

    #[tokio::test]
    async fn update_validates_title_and_existence() {
        let (repo, path) = temp_repo("update_invalid", MockRemote::with_todos(vec![]));
        let task = repo.create("kept", None, false).unwrap();

        assert!(matches!(
            repo.update(&task.id, "", None, false),
            Err(TaskError::InvalidData)
        ));
        assert!(matches!(
            repo.update("no-such-id", "t", None, false),
            Err(TaskError::NotFound)
        ));
        assert_eq!(repo.fetch(&task.id).unwrap().unwrap().title, "kept");

        cleanup(&path);
    }

    #[tokio::test]
    async fn toggle_flips_only_the_completion_flag() {
        let remote = MockRemote::with_todos(vec![]);
        let handle = remote.clone();
        let (repo, path) = temp_repo("toggle", remote);

        let task = repo.create("unchanged", Some("desc".into()), false).unwrap();
        handle.wait_for_calls(1).await; // the create mirror

        let toggled = repo.set_completed(&task.id, true).unwrap();
        assert!(toggled.is_completed);
        assert_eq!(toggled.title, "unchanged");
        assert_eq!(toggled.description.as_deref(), Some("desc"));

        // Local-only task: no status sync goes out.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handle.calls().len(), 1);

        cleanup(&path);
    }

    #[tokio::test]
    async fn toggle_on_seeded_task_syncs_status() {
        let remote = MockRemote::with_todos(vec![remote_task(9, "seeded")]);
        let handle = remote.clone();
        let (repo, path) = temp_repo("toggle_seeded", remote);
        repo.seed_if_empty().await.unwrap();

        repo.set_completed("9", true).unwrap();
        handle.wait_for_calls(1).await;
        assert_eq!(
            handle.calls(),
            vec![MirrorCall::UpdateStatus {
                id: 9,
                completed: true
            }]
        );

        cleanup(&path);
    }

    #[tokio::test]
    async fn delete_requires_an_id_and_reports_what_happened() {
        let remote = MockRemote::with_todos(vec![remote_task(3, "doomed")]);
        let handle = remote.clone();
        let (repo, path) = temp_repo("delete", remote);
        repo.seed_if_empty().await.unwrap();

        assert!(matches!(repo.delete(""), Err(TaskError::InvalidData)));
        assert!(matches!(repo.delete("  "), Err(TaskError::InvalidData)));
        assert_eq!(repo.fetch_all().unwrap().len(), 1);

        assert!(!repo.delete("unknown").unwrap());

        assert!(repo.delete("3").unwrap());
        assert!(repo.fetch_all().unwrap().is_empty());
        handle.wait_for_calls(1).await;
        assert_eq!(handle.calls(), vec![MirrorCall::Delete { id: 3 }]);

        // Already gone.
        assert!(!repo.delete("3").unwrap());

        cleanup(&path);
    }

    #[tokio::test]
    async fn search_rejects_empty_queries() {
        let (repo, path) = temp_repo("search", MockRemote::with_todos(vec![]));

        repo.create("Buy groceries", Some("milk".into()), false).unwrap();
        repo.create("Do laundry", None, false).unwrap();

        assert!(matches!(repo.search(""), Err(TaskError::InvalidData)));
        assert!(matches!(repo.search("   "), Err(TaskError::InvalidData)));

        let hits = repo.search("MILK").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Buy groceries");

        cleanup(&path);
    }

    #[tokio::test]
    async fn flush_commits_pending_primary_work() {
        let (repo, path) = temp_repo("flush", MockRemote::with_todos(vec![]));

        // Normal operations leave nothing pending, so flush is a no-op.
        repo.create("saved as it goes", None, false).unwrap();
        repo.flush().unwrap();
        assert_eq!(repo.fetch_all().unwrap().len(), 1);

        cleanup(&path);
    }
}
