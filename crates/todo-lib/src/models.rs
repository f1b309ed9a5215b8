//! Persisted documents and their public views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier for users and todos (UUID v7 text).
pub type DocumentId = String;

/// Stored account document. Never serialized: use [`UserView`] for responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: DocumentId,
    /// Trimmed, lowercased, unique.
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn view(&self) -> UserView {
        UserView {
            id: self.id.clone(),
            email: self.email.clone(),
        }
    }
}

/// Public projection of a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: DocumentId,
    pub email: String,
}

/// Todo item owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: DocumentId,
    pub title: String,
    pub completed: bool,
    pub owner: DocumentId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by `PUT /api/todos/:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
}

impl TodoPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completed.is_none()
    }

    /// Apply the patch in place, bumping `updated_at`.
    pub fn apply(&self, todo: &mut Todo, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            todo.title = title.clone();
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        todo.updated_at = now;
    }
}

/// Newest first, ties broken by id so ordering is stable.
pub fn sort_newest_first(todos: &mut [Todo]) {
    todos.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

pub(crate) fn new_id() -> DocumentId {
    uuid::Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn todo(id: &str, created_at: DateTime<Utc>) -> Todo {
        Todo {
            id: id.to_string(),
            title: "t".to_string(),
            completed: false,
            owner: "u1".to_string(),
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn sort_puts_newest_first() {
        let now = Utc::now();
        let mut todos = vec![
            todo("a", now - Duration::seconds(10)),
            todo("b", now),
            todo("c", now - Duration::seconds(5)),
        ];
        sort_newest_first(&mut todos);
        let ids: Vec<_> = todos.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn patch_only_touches_present_fields() {
        let now = Utc::now();
        let mut item = todo("a", now - Duration::seconds(1));
        let patch = TodoPatch {
            title: None,
            completed: Some(true),
        };
        patch.apply(&mut item, now);
        assert_eq!(item.title, "t");
        assert!(item.completed);
        assert_eq!(item.updated_at, now);
    }

    #[test]
    fn todo_serializes_camel_case() {
        let item = todo("a", Utc::now());
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("createdAt").is_some());
        assert!(json.get("updatedAt").is_some());
        assert_eq!(json["owner"], "u1");
    }
}
