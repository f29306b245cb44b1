use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Authenticated Router Module
///
/// Endpoints that require a resolved identity. Each handler here takes the
/// `AuthUser` extractor, which rejects the request with 401 before the
/// handler body runs; object-level ownership rules (author, moderator or
/// admin) are applied inside the handlers on top of that.
pub fn authenticated_routes() -> Router<AppState> {
    Router::new()
        // GET  /users/me
        // PATCH /users/me
        // Self-service profile. The role field is force-set back to the
        // caller's current role on update.
        .route("/users/me", get(handlers::get_me).patch(handlers::update_me))
        // POST /titles/{title_id}/reviews
        // One review per (author, title); the duplicate is a field-level 400.
        .route("/titles/{title_id}/reviews", post(handlers::create_review))
        // PATCH/PUT/DELETE /titles/{title_id}/reviews/{id}
        // PUT is an alias for the partial update.
        .route(
            "/titles/{title_id}/reviews/{id}",
            delete(handlers::delete_review)
                .patch(handlers::update_review)
                .put(handlers::update_review),
        )
        // POST /titles/{title_id}/reviews/{review_id}/comments
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            post(handlers::create_comment),
        )
        // PATCH/PUT/DELETE /titles/{title_id}/reviews/{review_id}/comments/{id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{id}",
            delete(handlers::delete_comment)
                .patch(handlers::update_comment)
                .put(handlers::update_comment),
        )
}
