use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{Error, Result};
use crate::models::{new_id, sort_newest_first, Todo, TodoPatch, User};

use super::DocumentStore;

#[derive(Debug, Default)]
struct Collections {
    users: HashMap<String, User>,
    todos: HashMap<String, Todo>,
}

/// In-process document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    pub fn todo_count(&self) -> usize {
        self.lock().todos.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.lock().users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        Ok(self.lock().users.get(id).cloned())
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let mut collections = self.lock();
        if collections.users.values().any(|u| u.email == email) {
            return Err(Error::DuplicateEmail);
        }
        let now = Utc::now();
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: now,
            updated_at: now,
        };
        collections.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn list_todos(&self, owner: &str) -> Result<Vec<Todo>> {
        let mut todos: Vec<Todo> = self
            .lock()
            .todos
            .values()
            .filter(|t| t.owner == owner)
            .cloned()
            .collect();
        sort_newest_first(&mut todos);
        Ok(todos)
    }

    async fn find_todo(&self, owner: &str, id: &str) -> Result<Option<Todo>> {
        Ok(self
            .lock()
            .todos
            .get(id)
            .filter(|t| t.owner == owner)
            .cloned())
    }

    async fn insert_todo(&self, owner: &str, title: &str) -> Result<Todo> {
        let now = Utc::now();
        let todo = Todo {
            id: new_id(),
            title: title.to_string(),
            completed: false,
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.lock().todos.insert(todo.id.clone(), todo.clone());
        Ok(todo)
    }

    async fn update_todo(&self, owner: &str, id: &str, patch: &TodoPatch) -> Result<Option<Todo>> {
        let mut collections = self.lock();
        let Some(todo) = collections.todos.get_mut(id).filter(|t| t.owner == owner) else {
            return Ok(None);
        };
        patch.apply(todo, Utc::now());
        Ok(Some(todo.clone()))
    }

    async fn delete_todo(&self, owner: &str, id: &str) -> Result<bool> {
        let mut collections = self.lock();
        let owned = collections
            .todos
            .get(id)
            .is_some_and(|t| t.owner == owner);
        if owned {
            collections.todos.remove(id);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        store.insert_user("a@b.com", "hash").await.unwrap();
        let err = store.insert_user("a@b.com", "hash").await.unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn todos_are_scoped_by_owner() {
        let store = MemoryStore::new();
        let todo = store.insert_todo("alice", "buy milk").await.unwrap();

        assert!(store.find_todo("bob", &todo.id).await.unwrap().is_none());
        let patch = TodoPatch {
            title: None,
            completed: Some(true),
        };
        assert!(store.update_todo("bob", &todo.id, &patch).await.unwrap().is_none());
        assert!(!store.delete_todo("bob", &todo.id).await.unwrap());
        assert_eq!(store.todo_count(), 1);

        let updated = store
            .update_todo("alice", &todo.id, &patch)
            .await
            .unwrap()
            .unwrap();
        assert!(updated.completed);
        assert!(store.delete_todo("alice", &todo.id).await.unwrap());
        assert_eq!(store.todo_count(), 0);
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryStore::new();
        let first = store.insert_todo("alice", "first").await.unwrap();
        let second = store.insert_todo("alice", "second").await.unwrap();
        store.insert_todo("bob", "other").await.unwrap();

        let todos = store.list_todos("alice").await.unwrap();
        let ids: Vec<_> = todos.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }
}
