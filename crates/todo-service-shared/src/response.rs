//! Success response bodies.

use serde::{Deserialize, Serialize};

use todo_lib::{AuthSession, UserView};

/// Body of a successful register or login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub token: String,
    pub user: UserView,
}

impl AuthResponse {
    pub fn new(message: impl Into<String>, session: AuthSession) -> Self {
        Self {
            message: message.into(),
            token: session.token,
            user: session.user,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub user: UserView,
}

/// Plain acknowledgement such as `{"message":"Todo deleted successfully"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
