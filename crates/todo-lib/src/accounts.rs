//! Registration, login, and bearer-token authentication.

use tracing::{debug, info, warn};

use crate::auth::{PasswordHasher, TokenService};
use crate::error::{Error, FieldError, Result};
use crate::models::{User, UserView};
use crate::store::DocumentStore;
use crate::validation::{check_password, finish, normalize_email};

/// Token plus the public view of the account it was issued for.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Clone, Default)]
pub struct Accounts {
    hasher: PasswordHasher,
    tokens: TokenService,
}

impl Accounts {
    pub fn new(hasher: PasswordHasher, tokens: TokenService) -> Self {
        Self { hasher, tokens }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Create an account and sign the caller in.
    pub async fn register(
        &self,
        store: &dyn DocumentStore,
        email: &str,
        password: &str,
    ) -> Result<AuthSession> {
        let mut errors = Vec::new();
        let email = normalize_email(email).map_err(|e| errors.push(e)).ok();
        if let Err(e) = check_password(password) {
            errors.push(e);
        }
        finish(errors)?;
        let Some(email) = email else {
            return Err(Error::validation(vec![FieldError::new(
                "email",
                "Invalid email address",
            )]));
        };

        // Checked before any write.
        if !self.tokens.is_configured() {
            return Err(Error::Configuration("JWT secret not configured".to_string()));
        }

        if store.find_user_by_email(&email).await?.is_some() {
            warn!(event = "register_failed", email = %email, reason = "duplicate_email");
            return Err(Error::DuplicateEmail);
        }

        let hash = self.hasher.hash(password).await?;
        let user = store.insert_user(&email, &hash).await.inspect_err(|err| {
            warn!(event = "register_failed", email = %email, reason = %err);
        })?;
        let token = self.tokens.issue(&user.id)?;
        info!(event = "register_success", user_id = %user.id, email = %user.email);
        Ok(AuthSession {
            token,
            user: user.view(),
        })
    }

    /// Verify credentials and issue a fresh token.
    pub async fn login(
        &self,
        store: &dyn DocumentStore,
        email: &str,
        password: &str,
    ) -> Result<AuthSession> {
        let mut errors = Vec::new();
        let email = normalize_email(email).map_err(|e| errors.push(e)).ok();
        if password.is_empty() {
            errors.push(FieldError::new("password", "Password is required"));
        }
        finish(errors)?;
        let Some(email) = email else {
            return Err(Error::validation(vec![FieldError::new(
                "email",
                "Invalid email address",
            )]));
        };

        let Some(user) = store.find_user_by_email(&email).await? else {
            warn!(event = "login_failed", email = %email, reason = "unknown_email");
            return Err(Error::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash).await? {
            warn!(event = "login_failed", user_id = %user.id, reason = "wrong_password");
            return Err(Error::InvalidCredentials);
        }

        let token = self.tokens.issue(&user.id)?;
        info!(event = "login_success", user_id = %user.id);
        Ok(AuthSession {
            token,
            user: user.view(),
        })
    }

    /// Resolve a bearer token to the account it names.
    pub async fn authenticate(&self, store: &dyn DocumentStore, token: &str) -> Result<User> {
        let claims = match self.tokens.verify(token) {
            Ok(claims) => claims,
            Err(Error::Token(err)) => {
                debug!(error = %err, "bearer token rejected");
                return Err(Error::unauthorized("Invalid token"));
            }
            Err(err) => return Err(err),
        };
        store
            .find_user_by_id(&claims.user_id)
            .await?
            .ok_or_else(|| Error::unauthorized("User not found"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DEFAULT_TOKEN_TTL;
    use crate::store::MemoryStore;

    fn accounts() -> Accounts {
        Accounts::new(
            PasswordHasher::new(4),
            TokenService::new(Some("secret"), DEFAULT_TOKEN_TTL),
        )
    }

    #[tokio::test]
    async fn register_then_duplicate() {
        let store = MemoryStore::new();
        let accounts = accounts();

        let session = accounts
            .register(&store, "  A@B.com ", "password123")
            .await
            .unwrap();
        assert!(!session.token.is_empty());
        assert_eq!(session.user.email, "a@b.com");

        let err = accounts
            .register(&store, "a@b.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateEmail));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn register_reports_every_bad_field() {
        let store = MemoryStore::new();
        let err = accounts()
            .register(&store, "not-an-email", "short")
            .await
            .unwrap_err();
        match err {
            Error::Validation { fields, .. } => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["email", "password"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_without_secret_creates_nothing() {
        let store = MemoryStore::new();
        let accounts = Accounts::new(PasswordHasher::new(4), TokenService::default());
        let err = accounts
            .register(&store, "a@b.com", "password123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(store.user_count(), 0);
    }

    #[tokio::test]
    async fn login_checks_credentials() {
        let store = MemoryStore::new();
        let accounts = accounts();
        accounts
            .register(&store, "a@b.com", "password123")
            .await
            .unwrap();

        assert!(accounts.login(&store, "A@b.com", "password123").await.is_ok());
        assert!(matches!(
            accounts.login(&store, "a@b.com", "wrong-pass").await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.login(&store, "nobody@b.com", "password123").await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.login(&store, "a@b.com", "").await,
            Err(Error::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn authenticate_resolves_token_owner() {
        let store = MemoryStore::new();
        let accounts = accounts();
        let session = accounts
            .register(&store, "a@b.com", "password123")
            .await
            .unwrap();

        let user = accounts.authenticate(&store, &session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);

        assert!(matches!(
            accounts.authenticate(&store, "garbage").await,
            Err(Error::Unauthorized { .. })
        ));

        let orphan = accounts.tokens().issue("missing-user").unwrap();
        assert!(matches!(
            accounts.authenticate(&store, &orphan).await,
            Err(Error::Unauthorized { .. })
        ));
    }
}
