use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use futures::future::{BoxFuture, FutureExt};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::info;

use crate::connection::{redact_uri, ConnectionError, Connector};
use crate::error::{Error, Result};
use crate::models::{new_id, Todo, TodoPatch, User};

use super::{DocumentStore, StoreHandle};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;
    CREATE TABLE IF NOT EXISTS users (
        id            TEXT PRIMARY KEY,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS todos (
        id         TEXT PRIMARY KEY,
        owner      TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title      TEXT NOT NULL,
        completed  INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS todos_owner_created ON todos (owner, created_at DESC);
";

const USER_COLUMNS: &str = "id, email, password_hash, created_at, updated_at";
const TODO_COLUMNS: &str = "id, title, completed, owner, created_at, updated_at";

/// SQLite-backed document store.
///
/// A single connection is shared behind a mutex; every statement runs on the
/// blocking pool.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    location: String,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `url` and apply the schema.
    ///
    /// Accepts `sqlite://path`, `sqlite:path`, a bare path, or `:memory:`.
    /// This call blocks; use [`SqliteConnector`] from async code.
    pub fn open(url: &str) -> Result<Self> {
        let conn = match database_path(url) {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(SCHEMA)?;
        let location = database_path(url).unwrap_or(":memory:").to_string();
        info!(location = %location, "sqlite document store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&guard)
        })
        .await?
    }
}

fn database_path(url: &str) -> Option<&str> {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    if path.is_empty() || path == ":memory:" {
        None
    } else {
        Some(path)
    }
}

fn now() -> DateTime<Utc> {
    // Stored with microsecond precision; keep returned values identical.
    Utc::now().trunc_subsecs(6)
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        created_at: timestamp(row, 3)?,
        updated_at: timestamp(row, 4)?,
    })
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get(0)?,
        title: row.get(1)?,
        completed: row.get(2)?,
        owner: row.get(3)?,
        created_at: timestamp(row, 4)?,
        updated_at: timestamp(row, 5)?,
    })
}

fn select_todo(conn: &Connection, owner: &str, id: &str) -> Result<Option<Todo>> {
    let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1 AND owner = ?2");
    Ok(conn
        .query_row(&sql, params![id, owner], todo_from_row)
        .optional()?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            Ok(conn
                .query_row(&sql, params![email], user_from_row)
                .optional()?)
        })
        .await
    }

    async fn find_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            Ok(conn.query_row(&sql, params![id], user_from_row).optional()?)
        })
        .await
    }

    async fn insert_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let ts = now();
        let user = User {
            id: new_id(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: ts,
            updated_at: ts,
        };
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    user.id,
                    user.email,
                    user.password_hash,
                    format_timestamp(&user.created_at),
                    format_timestamp(&user.updated_at),
                ],
            );
            match inserted {
                Ok(_) => Ok(user),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(Error::DuplicateEmail)
                }
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn list_todos(&self, owner: &str) -> Result<Vec<Todo>> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {TODO_COLUMNS} FROM todos WHERE owner = ?1
                 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let todos = stmt
                .query_map(params![owner], todo_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(todos)
        })
        .await
    }

    async fn find_todo(&self, owner: &str, id: &str) -> Result<Option<Todo>> {
        let owner = owner.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| select_todo(conn, &owner, &id))
            .await
    }

    async fn insert_todo(&self, owner: &str, title: &str) -> Result<Todo> {
        let ts = now();
        let todo = Todo {
            id: new_id(),
            title: title.to_string(),
            completed: false,
            owner: owner.to_string(),
            created_at: ts,
            updated_at: ts,
        };
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO todos (id, title, completed, owner, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    todo.id,
                    todo.title,
                    todo.completed,
                    todo.owner,
                    format_timestamp(&todo.created_at),
                    format_timestamp(&todo.updated_at),
                ],
            )?;
            Ok(todo)
        })
        .await
    }

    async fn update_todo(&self, owner: &str, id: &str, patch: &TodoPatch) -> Result<Option<Todo>> {
        let owner = owner.to_string();
        let id = id.to_string();
        let patch = patch.clone();
        self.with_conn(move |conn| {
            let Some(mut todo) = select_todo(conn, &owner, &id)? else {
                return Ok(None);
            };
            patch.apply(&mut todo, now());
            conn.execute(
                "UPDATE todos SET title = ?1, completed = ?2, updated_at = ?3
                 WHERE id = ?4 AND owner = ?5",
                params![
                    todo.title,
                    todo.completed,
                    format_timestamp(&todo.updated_at),
                    todo.id,
                    todo.owner,
                ],
            )?;
            Ok(Some(todo))
        })
        .await
    }

    async fn delete_todo(&self, owner: &str, id: &str) -> Result<bool> {
        let owner = owner.to_string();
        let id = id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM todos WHERE id = ?1 AND owner = ?2",
                params![id, owner],
            )?;
            Ok(removed > 0)
        })
        .await
    }
}

/// Opens a [`SqliteStore`] on the blocking pool.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    url: String,
}

impl SqliteConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> BoxFuture<'static, std::result::Result<StoreHandle, ConnectionError>> {
        let url = self.url.clone();
        async move {
            let store = tokio::task::spawn_blocking(move || SqliteStore::open(&url))
                .await
                .map_err(|e| ConnectionError::new(format!("connect task failed: {e}")))?
                .map_err(|e| ConnectionError::new(e.to_string()))?;
            Ok(Arc::new(store) as StoreHandle)
        }
        .boxed()
    }

    fn target(&self) -> String {
        redact_uri(&self.url)
    }
}
