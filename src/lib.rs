pub mod api;
pub mod models;
pub mod remote;
pub mod repository;
pub mod store;

pub use models::Task;
pub use remote::{RemoteSource, RemoteTaskSource};
pub use repository::{TaskError, TaskRepository};
pub use store::{StoreError, TaskStore};
