use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

// --- Core Application Schemas (Mapped to Database) ---

/// Role constants
///
/// The role column is stored as plain text. `user` is the default assigned at
/// signup; `moderator` and `admin` can only be granted by an administrator.
pub mod roles {
    pub const USER: &str = "user";
    pub const MODERATOR: &str = "moderator";
    pub const ADMIN: &str = "admin";

    /// Returns true for the three recognised role values.
    pub fn is_valid(role: &str) -> bool {
        matches!(role, USER | MODERATOR | ADMIN)
    }
}

/// User
///
/// Canonical identity record from the `users` table. The numeric `id` and the
/// `is_staff` flag are internal: the public representation of a user is the
/// six profile fields, matching the API contract.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    // The RBAC field: 'user', 'moderator' or 'admin'.
    pub role: String,
    // Administrative-staff flag, independent of `role`.
    #[serde(skip_serializing)]
    pub is_staff: bool,
}

impl User {
    /// Admin capability: held by the 'admin' role or by the staff flag.
    pub fn is_admin(&self) -> bool {
        self.role == roles::ADMIN || self.is_staff
    }

    /// Moderator capability: held by the 'moderator' role only.
    pub fn is_moderator(&self) -> bool {
        self.role == roles::MODERATOR
    }
}

/// Category
///
/// A title belongs to at most one category (e.g. "Books", "Films").
/// Looked up by slug, never by numeric id.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Category {
    #[serde(skip_serializing)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Genre
///
/// Titles carry zero or more genres through the `genre_title` join table.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Genre {
    #[serde(skip_serializing)]
    pub id: i64,
    pub name: String,
    pub slug: String,
}

/// Title
///
/// A reviewable work, assembled from the `titles` row plus its joined
/// category, its genre set and the on-read `rating` aggregate.
/// `rating` is the average review score, absent when no reviews exist.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct Title {
    pub id: i64,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<Genre>,
    pub category: Option<Category>,
}

/// Review
///
/// One review per (author, title) pair, enforced by a unique index and a
/// pre-check at creation time. `author` is the author's username; the raw
/// `author_id` stays internal for ownership checks.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Review {
    pub id: i64,
    #[serde(skip_serializing)]
    pub author_id: i64,
    pub text: String,
    pub author: String,
    pub score: i32,
    pub pub_date: DateTime<Utc>,
}

/// Comment
///
/// A comment on a review. Cascade-deleted with its parent review.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, FromRow, Default)]
pub struct Comment {
    pub id: i64,
    #[serde(skip_serializing)]
    pub author_id: i64,
    pub text: String,
    pub author: String,
    pub pub_date: DateTime<Utc>,
}

// --- Request Payloads (Input Schemas) ---

/// SignUpRequest
///
/// Body of POST /auth/signup. The same shape is echoed back on success, which
/// is why it derives Serialize as well.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
}

/// TokenRequest
///
/// Body of POST /auth/token: exchanges a confirmation code for a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct TokenRequest {
    pub username: String,
    pub confirmation_code: String,
}

/// TokenResponse
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct TokenResponse {
    pub token: String,
}

/// CreateUserRequest
///
/// Admin payload for POST /users. Optional fields default to empty strings
/// (profile) and 'user' (role).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

/// UpdateUserRequest
///
/// Partial update payload shared by PATCH /users/{username} and
/// PATCH /users/me. On the self-service path the `role` field is ignored and
/// forced back to the caller's stored role.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateUserRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// CreateSlugRequest
///
/// Shared payload for creating categories and genres: a display name plus a
/// unique, identifier-safe slug.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateSlugRequest {
    pub name: String,
    pub slug: String,
}

/// CreateTitleRequest
///
/// Admin payload for POST /titles. Genres and the category are referenced by
/// slug, mirroring the lookup convention of their own endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateTitleRequest {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    #[serde(default)]
    pub genre: Vec<String>,
    pub category: Option<String>,
}

/// UpdateTitleRequest
///
/// Partial update payload for PATCH /titles/{id}.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateTitleRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub genre: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// CreateReviewRequest
///
/// Payload for posting a review. `score` must be within [1, 10].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateReviewRequest {
    pub text: String,
    pub score: i32,
}

/// UpdateReviewRequest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateReviewRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,
}

/// CreateCommentRequest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct CreateCommentRequest {
    pub text: String,
}

/// UpdateCommentRequest
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Default)]
pub struct UpdateCommentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
