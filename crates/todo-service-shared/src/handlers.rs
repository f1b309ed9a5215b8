//! Thin handlers for the `/api` routes.
//!
//! Each handler decodes its body, calls one `todo_lib` operation, records a
//! business metric, and formats the result. All behaviour lives in the library.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use todo_lib::{todos, Todo};

use crate::auth::AuthUser;
use crate::metrics::{outcome_label, record_auth_event, record_todo_operation};
use crate::problem::ApiError;
use crate::request::{
    CreateTodoRequest, LoginRequest, RegisterRequest, UpdateTodoRequest, ValidJson,
};
use crate::response::{AuthResponse, MessageResponse, ProfileResponse};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

/// Tag a library result with a business metric and convert its error.
fn tracked<T>(
    result: todo_lib::Result<T>,
    record: impl FnOnce(&'static str),
) -> ApiResult<T> {
    match result {
        Ok(value) => {
            record("success");
            Ok(value)
        }
        Err(err) => {
            record(outcome_label(&err));
            Err(err.into())
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let store = state.store().await?;
    let session = tracked(
        state
            .accounts()
            .register(store.as_ref(), &body.email, &body.password)
            .await,
        |outcome| record_auth_event("register", outcome),
    )?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("User registered successfully", session)),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ValidJson(body): ValidJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let store = state.store().await?;
    let session = tracked(
        state
            .accounts()
            .login(store.as_ref(), &body.email, &body.password)
            .await,
        |outcome| record_auth_event("login", outcome),
    )?;
    Ok(Json(AuthResponse::new("Login successful", session)))
}

pub async fn profile(auth: AuthUser) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user: auth.user.view(),
    })
}

pub async fn list_todos(auth: AuthUser) -> ApiResult<Json<Vec<Todo>>> {
    let items = tracked(
        todos::list(auth.store.as_ref(), &auth.user.id).await,
        |outcome| record_todo_operation("list", outcome),
    )?;
    Ok(Json(items))
}

pub async fn create_todo(
    auth: AuthUser,
    ValidJson(body): ValidJson<CreateTodoRequest>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let todo = tracked(
        todos::create(auth.store.as_ref(), &auth.user.id, &body.title).await,
        |outcome| record_todo_operation("create", outcome),
    )?;
    Ok((StatusCode::CREATED, Json(todo)))
}

pub async fn get_todo(auth: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Todo>> {
    let todo = tracked(
        todos::get(auth.store.as_ref(), &auth.user.id, &id).await,
        |outcome| record_todo_operation("get", outcome),
    )?;
    Ok(Json(todo))
}

pub async fn update_todo(
    auth: AuthUser,
    Path(id): Path<String>,
    ValidJson(body): ValidJson<UpdateTodoRequest>,
) -> ApiResult<Json<Todo>> {
    let todo = tracked(
        todos::update(auth.store.as_ref(), &auth.user.id, &id, body.into()).await,
        |outcome| record_todo_operation("update", outcome),
    )?;
    Ok(Json(todo))
}

pub async fn delete_todo(
    auth: AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    tracked(
        todos::delete(auth.store.as_ref(), &auth.user.id, &id).await,
        |outcome| record_todo_operation("delete", outcome),
    )?;
    Ok(Json(MessageResponse::new("Todo deleted successfully")))
}
