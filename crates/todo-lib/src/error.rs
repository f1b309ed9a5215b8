use serde::Serialize;
use thiserror::Error;

use crate::connection::ConnectionError;

/// Convenient result alias for the todo library.
pub type Result<T> = std::result::Result<T, Error>;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Top-level library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed client input (bad email, short password, empty title).
    #[error("{message}")]
    Validation {
        message: String,
        fields: Vec<FieldError>,
    },

    /// Raised when registering an email that already has an account.
    #[error("Email already registered")]
    DuplicateEmail,

    /// Unknown email or wrong password at login.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Missing token, or a token whose user no longer exists.
    #[error("{reason}")]
    Unauthorized { reason: String },

    /// Raised when a resource is absent or not owned by the caller.
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    /// Token could not be issued or verified.
    #[error("invalid token: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Password hashing backend failure.
    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// The document store could not be reached.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Wrapper for SQLite errors.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Stored document could not be decoded.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// Required runtime configuration is absent.
    #[error("{0}")]
    Configuration(String),

    /// A blocking worker task panicked or was cancelled.
    #[error("internal task failure: {0}")]
    Task(String),
}

impl Error {
    /// Build a validation error from one or more rejected fields.
    pub fn validation(fields: Vec<FieldError>) -> Self {
        let message = fields
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation { message, fields }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_joins_fields() {
        let err = Error::validation(vec![
            FieldError::new("email", "Invalid email address"),
            FieldError::new("password", "Password must be at least 8 characters"),
        ]);
        assert_eq!(
            err.to_string(),
            "Invalid email address; Password must be at least 8 characters"
        );
    }

    #[test]
    fn not_found_names_resource() {
        let err = Error::NotFound { resource: "Todo" };
        assert_eq!(err.to_string(), "Todo not found");
    }
}
