//! Password hashing and bearer-token issuing.
//!
//! Hashing uses bcrypt on the blocking pool so request tasks never stall the
//! async workers. Tokens are HS256 JWTs carrying the user id.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// bcrypt cost used when none is configured.
pub const DEFAULT_BCRYPT_COST: u32 = 10;

/// Lowest cost bcrypt accepts.
pub const MIN_BCRYPT_COST: u32 = 4;

/// Token lifetime used when none is configured (7 days).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl PasswordHasher {
    /// Costs below bcrypt's minimum are raised to it.
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.max(MIN_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub async fn hash(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.cost;
        let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
        Ok(hashed)
    }

    pub async fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        let matches =
            tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
        Ok(matches)
    }
}

/// JWT payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies bearer tokens.
///
/// A service built without a secret still starts (so health endpoints keep
/// answering) but every token operation fails with [`Error::Configuration`].
#[derive(Clone)]
pub struct TokenService {
    keys: Option<(EncodingKey, DecodingKey)>,
    ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("configured", &self.keys.is_some())
            .field("ttl_secs", &self.ttl.as_secs())
            .finish()
    }
}

impl Default for TokenService {
    /// Unconfigured service with the default lifetime.
    fn default() -> Self {
        Self::new(None, DEFAULT_TOKEN_TTL)
    }
}

impl TokenService {
    pub fn new(secret: Option<&str>, ttl: Duration) -> Self {
        let keys = secret.filter(|s| !s.is_empty()).map(|s| {
            (
                EncodingKey::from_secret(s.as_bytes()),
                DecodingKey::from_secret(s.as_bytes()),
            )
        });
        Self { keys, ttl }
    }

    pub fn is_configured(&self) -> bool {
        self.keys.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str) -> Result<String> {
        let (encoding, _) = self.keys()?;
        let iat = Utc::now().timestamp();
        let claims = Claims {
            user_id: user_id.to_string(),
            iat,
            exp: iat.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, encoding)?)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let (_, decoding) = self.keys()?;
        let data = decode::<Claims>(token, decoding, &Validation::new(Algorithm::HS256))?;
        Ok(data.claims)
    }

    fn keys(&self) -> Result<&(EncodingKey, DecodingKey)> {
        self.keys
            .as_ref()
            .ok_or_else(|| Error::Configuration("JWT secret not configured".to_string()))
    }
}

/// Parse a token lifetime such as `7d`, `12h`, `30m`, `45s`, or bare seconds.
pub fn parse_ttl(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let (digits, unit_secs) = match raw.char_indices().last() {
        Some((idx, 'd')) => (&raw[..idx], 24 * 60 * 60),
        Some((idx, 'h')) => (&raw[..idx], 60 * 60),
        Some((idx, 'm')) => (&raw[..idx], 60),
        Some((idx, 's')) => (&raw[..idx], 1),
        _ => (raw, 1),
    };
    let value: u64 = digits.trim().parse().ok()?;
    value.checked_mul(unit_secs).map(Duration::from_secs)
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let (scheme, rest) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = rest.trim();
    (!token.is_empty()).then_some(token)
}
