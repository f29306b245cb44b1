use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// ApiError
///
/// The error taxonomy surfaced by every handler. Each variant maps to one
/// HTTP status and one response body shape:
///
/// - `Validation` -> 400 with a field-level payload `{"<field>": ["<msg>"]}`.
///   Covers malformed fields, the reserved username, duplicate reviews,
///   signup conflicts and bad confirmation codes.
/// - `NotFound` -> 404 for a missing title/review/comment/user in the path.
/// - `Forbidden` -> 403 when a role/ownership check denies the actor.
/// - `Unauthorized` -> 401 when a protected endpoint is hit anonymously or
///   with an invalid bearer token.
/// - `Internal` -> 500, with details kept out of the response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("internal server error")]
    Internal,
}

impl ApiError {
    /// Shorthand for a field-level validation rejection.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation { field, message } => {
                // Field-level payload: {"score": ["Score must be between 1 and 10."]}
                let mut body = serde_json::Map::new();
                body.insert(field.to_string(), json!([message]));
                (StatusCode::BAD_REQUEST, Json(serde_json::Value::Object(body))).into_response()
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({ "detail": "Not found." })),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "You do not have permission to perform this action." })),
            )
                .into_response(),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "detail": "Authentication credentials were not provided." })),
            )
                .into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "Internal server error." })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn validation_error_renders_field_level_payload() {
        let resp = ApiError::validation("username", "Invalid username.").into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        assert_eq!(
            ApiError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
