//! Todo service core library.
//!
//! Holds everything the HTTP layers share: the account and todo operations,
//! password hashing and token issuing, the [`DocumentStore`] abstraction with
//! its SQLite and in-memory backends, and the process-wide
//! [`ConnectionGuard`] that owns the store connection lifecycle.
//!
//! The [`test_utils`] module provides scripted connectors and connected
//! in-memory guards. Enable the `test-utils` feature to use it from dependent
//! crates.

#![deny(warnings)]

pub mod accounts;
pub mod auth;
pub mod connection;
pub mod error;
pub mod models;
pub mod store;
pub mod todos;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use accounts::{Accounts, AuthSession};
pub use auth::{bearer_token, parse_ttl, Claims, PasswordHasher, TokenService};
pub use connection::{redact_uri, ConnectionError, ConnectionGuard, ConnectionState, Connector};
pub use error::{Error, FieldError, Result};
pub use models::{DocumentId, Todo, TodoPatch, User, UserView};
pub use store::{DocumentStore, MemoryStore, SqliteConnector, SqliteStore, StoreHandle};
