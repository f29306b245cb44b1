use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, patch, post},
};

/// Admin Router Module
///
/// Endpoints restricted to admins (role 'admin' or the staff flag). Every
/// handler re-checks the role through `policy::ensure_admin` after the
/// `AuthUser` extractor resolves the identity, so the restriction does not
/// depend on routing alone.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET  /users?search=...
        // POST /users
        // Full user administration, arbitrary role assignment included.
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        // GET/PATCH/DELETE /users/{username}
        // Static '/users/me' is matched by the authenticated router first,
        // so 'me' never reaches this capture.
        .route(
            "/users/{username}",
            get(handlers::get_user_detail)
                .patch(handlers::update_user_detail)
                .delete(handlers::delete_user_detail),
        )
        // POST /categories, DELETE /categories/{slug}
        // No detail or update endpoints: categories are create/delete only.
        .route("/categories", post(handlers::create_category))
        .route("/categories/{slug}", delete(handlers::delete_category))
        // POST /genres, DELETE /genres/{slug}
        .route("/genres", post(handlers::create_genre))
        .route("/genres/{slug}", delete(handlers::delete_genre))
        // POST /titles, PATCH/DELETE /titles/{id}
        .route("/titles", post(handlers::create_title))
        .route(
            "/titles/{id}",
            patch(handlers::update_title).delete(handlers::delete_title),
        )
}
