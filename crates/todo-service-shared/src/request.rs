//! Request bodies and validation for the API endpoints.
//!
//! Bodies are decoded by [`ValidJson`], which turns malformed JSON into the
//! standard 400 envelope and then runs [`Validate`]. Field normalization
//! (trimming, lowercasing) belongs to the library operations; validation here
//! only rejects shapes no operation could accept.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use todo_lib::{FieldError, TodoPatch};

use crate::problem::ApiError;

/// Validation trait for request types.
pub trait Validate {
    /// Every rejected field, or `Ok` if the request is acceptable.
    fn validate(&self) -> Result<(), Vec<FieldError>>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        }
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        into_result(errors)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.email.trim().is_empty() {
            errors.push(FieldError::new("email", "Email is required"));
        }
        if self.password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        into_result(errors)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTodoRequest {
    #[serde(default)]
    pub title: String,
}

impl Validate for CreateTodoRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        if self.title.trim().is_empty() {
            return Err(vec![FieldError::new("title", "Title is required")]);
        }
        Ok(())
    }
}

/// `PUT /api/todos/{id}` body. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
}

impl Validate for UpdateTodoRequest {
    fn validate(&self) -> Result<(), Vec<FieldError>> {
        match &self.title {
            Some(title) if title.trim().is_empty() => {
                Err(vec![FieldError::new("title", "Title is required")])
            }
            _ => Ok(()),
        }
    }
}

impl From<UpdateTodoRequest> for TodoPatch {
    fn from(req: UpdateTodoRequest) -> Self {
        TodoPatch {
            title: req.title,
            completed: req.completed,
        }
    }
}

fn into_result(errors: Vec<FieldError>) -> Result<(), Vec<FieldError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// JSON body extractor that validates and reports failures as [`ApiError`].
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                ApiError::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
            })?;
        value
            .validate()
            .map_err(|fields| ApiError::validation(&fields))?;
        Ok(Self(value))
    }
}
