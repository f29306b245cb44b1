use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod email;
pub mod error;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;
pub mod validation;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

// Makes core state types easily accessible to the main application entry
// point and the integration test harness.
pub use config::{AppConfig, Env};
pub use email::{LogMailer, Mailer, MailerState, SmtpMailer};
pub use error::ApiError;
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Auto-generates the OpenAPI documentation (Swagger JSON) for the
/// application by aggregating every `#[utoipa::path]` handler and
/// `ToSchema` model. The resulting JSON is served at
/// `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::signup, handlers::obtain_token,
        handlers::list_categories, handlers::create_category, handlers::delete_category,
        handlers::list_genres, handlers::create_genre, handlers::delete_genre,
        handlers::list_titles, handlers::create_title, handlers::get_title,
        handlers::update_title, handlers::delete_title,
        handlers::list_reviews, handlers::create_review, handlers::get_review,
        handlers::update_review, handlers::delete_review,
        handlers::list_comments, handlers::create_comment, handlers::get_comment,
        handlers::update_comment, handlers::delete_comment,
        handlers::list_users, handlers::create_user, handlers::get_user_detail,
        handlers::update_user_detail, handlers::delete_user_detail,
        handlers::get_me, handlers::update_me,
    ),
    components(
        schemas(
            models::User, models::Category, models::Genre, models::Title,
            models::Review, models::Comment,
            models::SignUpRequest, models::TokenRequest, models::TokenResponse,
            models::CreateUserRequest, models::UpdateUserRequest,
            models::CreateSlugRequest, models::CreateTitleRequest,
            models::UpdateTitleRequest, models::CreateReviewRequest,
            models::UpdateReviewRequest, models::CreateCommentRequest,
            models::UpdateCommentRequest,
        )
    ),
    tags(
        (name = "review-portal", description = "Title review and rating API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, thread-safe, immutable container holding all application
/// services and configuration, shared across all incoming requests.
#[derive(Clone)]
pub struct AppState {
    /// Repository Layer: abstracts database access via the PgPool connection.
    pub repo: RepositoryState,
    /// Email Layer: confirmation-code delivery for the signup flow.
    pub mailer: MailerState,
    /// Configuration: the loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

// These let extractors and handlers selectively pull components from the
// shared AppState instead of depending on the whole container.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MailerState {
    fn from_ref(app_state: &AppState) -> MailerState {
        app_state.mailer.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles the application's entire routing structure, applies global
/// middleware, and registers the application state. All resource routes
/// live under the `/api/v1` prefix; `/health` and the documentation stay
/// at the root.
///
/// Authentication is enforced by the `AuthUser` extractor inside the
/// individual handlers rather than a router-level layer, so the public and
/// protected method routers of the same path can be merged freely.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for request correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let api = public::public_routes()
        .merge(authenticated::authenticated_routes())
        .merge(admin::admin_routes());

    let base_router = Router::new()
        // Documentation: serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Versioned API surface.
        .nest("/api/v1", api)
        // Unprefixed health probe for load balancers.
        .route("/health", axum::routing::get(|| async { "ok" }))
        .with_state(state);

    // 3. Observability and Correlation Layers (applied outermost)
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID generation: a unique UUID per request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request tracing: wraps the request/response lifecycle
                // in a span carrying the generated request ID.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS layer (outermost).
        .layer(cors)
}

/// trace_span_logger
///
/// Customizes `TraceLayer` span creation: extracts the `x-request-id`
/// header and includes it in the structured logging metadata alongside the
/// HTTP method and URI, so every log line of a request is correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
