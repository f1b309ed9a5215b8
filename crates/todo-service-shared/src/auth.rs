//! Bearer-token extractor for protected routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use todo_lib::{bearer_token, StoreHandle, User};

use crate::metrics::{outcome_label, record_auth_event};
use crate::problem::{from_lib_error, ApiError};
use crate::state::AppState;

/// The authenticated caller, plus the store handle used to resolve them.
///
/// Rejects with 401 when the header is missing or the token does not
/// resolve to an existing account.
#[derive(Clone)]
pub struct AuthUser {
    pub user: User,
    pub store: StoreHandle,
}

impl std::fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthUser")
            .field("user_id", &self.user.id)
            .finish()
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token)
            .map(str::to_string)
            .ok_or_else(|| {
                record_auth_event("authenticate", "missing_token");
                ApiError::unauthorized("Authentication required")
            })?;

        let store = state.store().await?;
        match state.accounts().authenticate(store.as_ref(), &token).await {
            Ok(user) => Ok(Self { user, store }),
            Err(err) => {
                record_auth_event("authenticate", outcome_label(&err));
                Err(from_lib_error(&err))
            }
        }
    }
}
