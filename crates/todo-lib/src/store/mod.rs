//! Document store abstraction over the `users` and `todos` collections.
//!
//! Two backends ship with the crate:
//!
//! - [`SqliteStore`]: durable storage, one shared connection per process
//! - [`MemoryStore`]: process-local maps, used by tests and ephemeral deployments
//!
//! Every todo query is scoped by owner; a todo that exists but belongs to
//! someone else is indistinguishable from one that does not exist.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Todo, TodoPatch, User};

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteConnector, SqliteStore};

/// Shared handle to a connected store. Cloned into every request.
pub type StoreHandle = Arc<dyn DocumentStore>;

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Cheap round-trip proving the store is usable.
    async fn ping(&self) -> Result<()>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>>;

    /// Insert a new account. Fails with `Error::DuplicateEmail` if taken.
    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<User>;

    /// All todos owned by `owner`, newest first.
    async fn list_todos(&self, owner: &str) -> Result<Vec<Todo>>;

    async fn find_todo(&self, owner: &str, id: &str) -> Result<Option<Todo>>;

    async fn insert_todo(&self, owner: &str, title: &str) -> Result<Todo>;

    /// Returns `None` if no todo with `id` is owned by `owner`.
    async fn update_todo(&self, owner: &str, id: &str, patch: &TodoPatch) -> Result<Option<Todo>>;

    /// Returns `false` if no todo with `id` is owned by `owner`.
    async fn delete_todo(&self, owner: &str, id: &str) -> Result<bool>;
}
