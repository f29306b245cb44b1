use crate::{AppState, handlers};
use axum::{Router, routing::{get, post}};

/// Public Router Module
///
/// Defines endpoints that are **unauthenticated** and accessible to any
/// client. All reads are public by contract: the catalog, reviews and
/// comments are world-readable, and anonymity only ever restricts writes.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // A simple, unauthenticated endpoint used for monitoring and load
        // balancer checks.
        .route("/health", get(|| async { "ok" }))
        // POST /auth/signup
        // Registration entry point: creates (or re-confirms) an identity and
        // emails a confirmation code. Idempotent for a repeated exact pair.
        .route("/auth/signup", post(handlers::signup))
        // POST /auth/token
        // Exchanges username + confirmation code for a bearer access token.
        .route("/auth/token", post(handlers::obtain_token))
        // GET /categories?search=...
        .route("/categories", get(handlers::list_categories))
        // GET /genres?search=...
        .route("/genres", get(handlers::list_genres))
        // GET /titles?name=...&year=...&genre=...&category=...
        // Listing carries the on-read rating aggregate per title.
        .route("/titles", get(handlers::list_titles))
        // GET /titles/{id}
        .route("/titles/{id}", get(handlers::get_title))
        // GET /titles/{title_id}/reviews
        // 404s when the parent title does not exist.
        .route("/titles/{title_id}/reviews", get(handlers::list_reviews))
        // GET /titles/{title_id}/reviews/{id}
        .route("/titles/{title_id}/reviews/{id}", get(handlers::get_review))
        // GET /titles/{title_id}/reviews/{review_id}/comments
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments",
            get(handlers::list_comments),
        )
        // GET /titles/{title_id}/reviews/{review_id}/comments/{id}
        .route(
            "/titles/{title_id}/reviews/{review_id}/comments/{id}",
            get(handlers::get_comment),
        )
}
