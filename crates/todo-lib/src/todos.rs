//! Per-owner todo operations. Every lookup is scoped by the caller's id, so a
//! todo owned by someone else surfaces as `NotFound`.

use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Todo, TodoPatch};
use crate::store::DocumentStore;
use crate::validation::{finish, normalize_title};

const RESOURCE: &str = "Todo";

fn not_found() -> Error {
    Error::NotFound { resource: RESOURCE }
}

pub async fn list(store: &dyn DocumentStore, owner: &str) -> Result<Vec<Todo>> {
    store.list_todos(owner).await
}

pub async fn get(store: &dyn DocumentStore, owner: &str, id: &str) -> Result<Todo> {
    store.find_todo(owner, id).await?.ok_or_else(not_found)
}

/// Create a todo. The title is trimmed and must not be empty.
pub async fn create(store: &dyn DocumentStore, owner: &str, title: &str) -> Result<Todo> {
    let title = normalize_title(title).map_err(|e| Error::validation(vec![e]))?;
    let todo = store.insert_todo(owner, &title).await?;
    debug!(todo_id = %todo.id, owner, "todo created");
    Ok(todo)
}

/// Apply a partial update. A supplied title goes through the same
/// normalization as on create.
pub async fn update(
    store: &dyn DocumentStore,
    owner: &str,
    id: &str,
    mut patch: TodoPatch,
) -> Result<Todo> {
    let mut errors = Vec::new();
    if let Some(raw) = patch.title.take() {
        match normalize_title(&raw) {
            Ok(title) => patch.title = Some(title),
            Err(e) => errors.push(e),
        }
    }
    finish(errors)?;

    let todo = store
        .update_todo(owner, id, &patch)
        .await?
        .ok_or_else(not_found)?;
    debug!(todo_id = %todo.id, owner, "todo updated");
    Ok(todo)
}

pub async fn delete(store: &dyn DocumentStore, owner: &str, id: &str) -> Result<()> {
    if store.delete_todo(owner, id).await? {
        debug!(todo_id = id, owner, "todo deleted");
        Ok(())
    } else {
        Err(not_found())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn create_trims_title() {
        let store = MemoryStore::new();
        let todo = create(&store, "alice", "  x  ").await.unwrap();
        assert_eq!(todo.title, "x");
        assert!(!todo.completed);
        assert_eq!(todo.owner, "alice");
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let store = MemoryStore::new();
        let err = create(&store, "alice", "   ").await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
        assert_eq!(store.todo_count(), 0);

        let todo = create(&store, "alice", "keep").await.unwrap();
        let patch = TodoPatch {
            title: Some(" ".to_string()),
            completed: None,
        };
        assert!(matches!(
            update(&store, "alice", &todo.id, patch).await,
            Err(Error::Validation { .. })
        ));
        assert_eq!(get(&store, "alice", &todo.id).await.unwrap().title, "keep");
    }

    #[tokio::test]
    async fn other_owner_sees_not_found() {
        let store = MemoryStore::new();
        let todo = create(&store, "alice", "mine").await.unwrap();

        let patch = TodoPatch {
            title: None,
            completed: Some(true),
        };
        assert!(matches!(
            update(&store, "bob", &todo.id, patch).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            get(&store, "bob", &todo.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            delete(&store, "bob", &todo.id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(!get(&store, "alice", &todo.id).await.unwrap().completed);
    }

    #[tokio::test]
    async fn update_trims_and_sets_fields() {
        let store = MemoryStore::new();
        let todo = create(&store, "alice", "draft").await.unwrap();
        let patch = TodoPatch {
            title: Some("  final ".to_string()),
            completed: Some(true),
        };
        let updated = update(&store, "alice", &todo.id, patch).await.unwrap();
        assert_eq!(updated.title, "final");
        assert!(updated.completed);
        assert!(updated.updated_at >= todo.updated_at);
    }

    #[tokio::test]
    async fn delete_removes_owned_todo() {
        let store = MemoryStore::new();
        let todo = create(&store, "alice", "gone soon").await.unwrap();
        delete(&store, "alice", &todo.id).await.unwrap();
        assert!(list(&store, "alice").await.unwrap().is_empty());
    }
}
