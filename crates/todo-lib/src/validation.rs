//! Input normalization shared by the account and todo operations.

use crate::error::{Error, FieldError, Result};

/// Minimum accepted password length, in characters.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Trim and lowercase an email, rejecting anything that is not `local@domain.tld`.
pub fn normalize_email(raw: &str) -> std::result::Result<String, FieldError> {
    let email = raw.trim().to_lowercase();
    if is_plausible_email(&email) {
        Ok(email)
    } else {
        Err(FieldError::new("email", "Invalid email address"))
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

pub fn check_password(password: &str) -> std::result::Result<(), FieldError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(FieldError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

/// Trimmed, non-empty todo title.
pub fn normalize_title(raw: &str) -> std::result::Result<String, FieldError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(FieldError::new("title", "Title is required"));
    }
    Ok(title.to_string())
}

/// Collect field errors into a single validation error, or `Ok` if none.
pub fn finish(errors: Vec<FieldError>) -> Result<()> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(errors))
    }
}
