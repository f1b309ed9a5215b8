//! JSON error envelope shared by the application and the serverless shim.
//!
//! Every error response has the shape:
//!
//! ```json
//! {"error":"Todo not found","message":"Todo not found","path":"/api/todos/x","method":"PUT","requestId":"..."}
//! ```
//!
//! Handlers return [`ApiError`] without knowing the request path; the request
//! context middleware fills in `path`, `method`, and `requestId` afterwards.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use todo_lib::{Error as LibError, FieldError};

/// Serialized error body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Short error label.
    pub error: String,

    /// Human-readable explanation.
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    /// Per-field validation failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldErrorBody {
    pub field: String,
    pub message: String,
}

impl From<&FieldError> for FieldErrorBody {
    fn from(err: &FieldError) -> Self {
        Self {
            field: err.field.clone(),
            message: err.message.clone(),
        }
    }
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            path: None,
            method: None,
            request_id: None,
            errors: Vec::new(),
        }
    }

    pub fn with_request(
        mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        self.method = Some(method.into());
        self.path = Some(path.into());
        self.request_id = Some(request_id.into());
        self
    }

    /// Serialized body. Falls back to a fixed document if encoding fails.
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"error":"Internal server error","message":"Internal server error"}"#.to_vec()
        })
    }
}

/// An error response: status plus envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub envelope: ErrorEnvelope,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            envelope: ErrorEnvelope::new(error, message),
        }
    }

    /// 400 with per-field detail.
    pub fn validation(fields: &[FieldError]) -> Self {
        let message = fields
            .iter()
            .map(|f| f.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let mut err = Self::new(StatusCode::BAD_REQUEST, "Validation failed", message);
        err.envelope.errors = fields.iter().map(FieldErrorBody::from).collect();
        err
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::BAD_REQUEST, message.clone(), message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::UNAUTHORIZED, message.clone(), message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(StatusCode::NOT_FOUND, message.clone(), message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "Service unavailable",
            message,
        )
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "Request timeout", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            message,
        )
    }

    pub fn with_request(
        mut self,
        method: impl Into<String>,
        path: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        self.envelope = self.envelope.with_request(method, path, request_id);
        self
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.envelope.error, self.envelope.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(&self.envelope)).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        // Picked up by the request context middleware to add path/method/requestId.
        response.extensions_mut().insert(self);
        response
    }
}

impl From<LibError> for ApiError {
    fn from(error: LibError) -> Self {
        from_lib_error(&error)
    }
}

/// Map a library error to its HTTP status and envelope.
pub fn from_lib_error(error: &LibError) -> ApiError {
    match error {
        LibError::Validation { fields, .. } => ApiError::validation(fields),
        LibError::DuplicateEmail => ApiError::bad_request(error.to_string()),
        LibError::InvalidCredentials => ApiError::unauthorized(error.to_string()),
        LibError::Unauthorized { reason } => ApiError::unauthorized(reason.clone()),
        LibError::Token(_) => ApiError::unauthorized("Invalid token"),
        LibError::NotFound { .. } => ApiError::not_found(error.to_string()),
        LibError::Connection(err) => ApiError::service_unavailable(err.to_string()),
        _ => {
            tracing::error!(error = %error, "unhandled library error");
            ApiError::internal(error.to_string())
        }
    }
}
