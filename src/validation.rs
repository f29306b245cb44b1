use chrono::{Datelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::{error::ApiError, models::roles};

/// Field validation helpers shared by the signup, token and resource
/// handlers. Each helper rejects with a field-level `ApiError::Validation`
/// so the response body names the offending field.

static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\w.@+-]+$").expect("username regex"));

// Structural check only: one '@', non-empty local part and a dotted domain.
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email regex"));

static SLUG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-a-zA-Z0-9_]+$").expect("slug regex"));

pub const MAX_USERNAME_LEN: usize = 150;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_SLUG_LEN: usize = 50;

/// 'me' is reserved for the self-service profile path (/users/me) and must
/// never collide with a real username.
pub const RESERVED_USERNAME: &str = "me";

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username == RESERVED_USERNAME {
        return Err(ApiError::validation(
            "username",
            "This username is reserved.",
        ));
    }
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::validation(
            "username",
            format!("Username must be 1 to {MAX_USERNAME_LEN} characters."),
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::validation(
            "username",
            "Username may only contain letters, digits and @/./+/-/_.",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::validation(
            "email",
            format!("Email must be 1 to {MAX_EMAIL_LEN} characters."),
        ));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), ApiError> {
    if slug.is_empty() || slug.len() > MAX_SLUG_LEN {
        return Err(ApiError::validation(
            "slug",
            format!("Slug must be 1 to {MAX_SLUG_LEN} characters."),
        ));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(ApiError::validation(
            "slug",
            "Slug may only contain letters, digits, hyphens and underscores.",
        ));
    }
    Ok(())
}

pub fn validate_role(role: &str) -> Result<(), ApiError> {
    if roles::is_valid(role) {
        Ok(())
    } else {
        Err(ApiError::validation("role", "Unknown role."))
    }
}

pub fn validate_score(score: i32) -> Result<(), ApiError> {
    if (1..=10).contains(&score) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "score",
            "Score must be between 1 and 10.",
        ))
    }
}

/// Year is bounded by the current calendar year: nothing from the future.
pub fn validate_year(year: i32) -> Result<(), ApiError> {
    let current = Utc::now().year();
    if (0..=current).contains(&year) {
        Ok(())
    } else {
        Err(ApiError::validation(
            "year",
            format!("Year must be between 0 and {current}."),
        ))
    }
}
