use crate::{
    AppState,
    auth::{AuthUser, issue_confirmation_code, mint_access_token, verify_confirmation_code},
    error::ApiError,
    models::{
        self, Category, Comment, CreateCommentRequest, CreateReviewRequest, CreateSlugRequest,
        CreateTitleRequest, CreateUserRequest, Genre, Review, SignUpRequest, Title, TokenRequest,
        TokenResponse, UpdateCommentRequest, UpdateReviewRequest, UpdateTitleRequest,
        UpdateUserRequest, User, roles,
    },
    policy,
    repository::{
        NewTitle, NewUser, Page, RepoError, RepositoryState, TitleChanges, TitleQuery, UserChanges,
    },
    validation,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// User-facing message for the one-review-per-title rule, distinct from a
/// raw constraint-violation error. Emitted by the pre-check and again when
/// the unique index catches a race the pre-check missed.
pub const DUPLICATE_REVIEW_MESSAGE: &str = "Only one review per title is allowed.";

// --- Filter Structs ---

/// SearchFilter
///
/// Query parameters of the category/genre/user listing endpoints: a name
/// substring filter plus page-number pagination.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct SearchFilter {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl SearchFilter {
    fn page(&self) -> Page {
        Page::new(self.page, self.page_size)
    }
}

/// TitleFilter
///
/// Query parameters of GET /titles: name substring, exact year, genre slug
/// and category slug, plus pagination.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct TitleFilter {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub category: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// PageQuery
///
/// Pagination-only parameters for the review/comment listings.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl PageQuery {
    fn page(&self) -> Page {
        Page::new(self.page, self.page_size)
    }
}

// --- Shared helpers ---

fn internal(context: &str, e: impl std::fmt::Debug) -> ApiError {
    tracing::error!("{context}: {e:?}");
    ApiError::Internal
}

/// Resolves genre slugs to row ids; any unknown slug fails the request with
/// a field-level error rather than silently dropping the genre.
async fn resolve_genre_ids(repo: &RepositoryState, slugs: &[String]) -> Result<Vec<i64>, ApiError> {
    for slug in slugs {
        validation::validate_slug(slug)?;
    }
    let found = repo.get_genres_by_slugs(slugs).await;
    for slug in slugs {
        if !found.iter().any(|g| &g.slug == slug) {
            return Err(ApiError::validation(
                "genre",
                format!("Unknown genre slug '{slug}'."),
            ));
        }
    }
    Ok(found.into_iter().map(|g| g.id).collect())
}

async fn resolve_category_id(repo: &RepositoryState, slug: &str) -> Result<i64, ApiError> {
    validation::validate_slug(slug)?;
    repo.get_category_by_slug(slug)
        .await
        .map(|c| c.id)
        .ok_or_else(|| ApiError::validation("category", format!("Unknown category slug '{slug}'.")))
}

/// Looks up the parent review of a nested comment route, scoped to its title
/// so a mismatched (title_id, review_id) pair reads as not-found.
async fn require_review(
    repo: &RepositoryState,
    title_id: i64,
    review_id: i64,
) -> Result<Review, ApiError> {
    repo.get_review(title_id, review_id)
        .await
        .ok_or(ApiError::NotFound)
}

// --- Registration & Token Exchange ---

/// signup
///
/// [Public Route] First half of the registration state machine: validates
/// the identity pair, creates the user on first contact, and emails a
/// confirmation code. Re-submitting the exact same (username, email) pair is
/// an idempotent resend for that user; a pair that collides with a different
/// user is a conflict, echoed back with a 400 and no side effects.
#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignUpRequest,
    responses(
        (status = 200, description = "Code sent", body = SignUpRequest),
        (status = 400, description = "Invalid or conflicting identity")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignUpRequest>,
) -> Result<Response, ApiError> {
    validation::validate_username(&payload.username)?;
    validation::validate_email(&payload.email)?;

    let user = match state
        .repo
        .get_user_by_identity(&payload.username, &payload.email)
        .await
    {
        // Known pair: re-issue a fresh code for the same user.
        Some(user) => user,
        None => {
            if state
                .repo
                .identity_taken(&payload.username, &payload.email)
                .await
            {
                // Username or email belongs to a different pairing. The
                // request is echoed back as invalid; nothing is created.
                return Ok((StatusCode::BAD_REQUEST, Json(payload)).into_response());
            }
            match state
                .repo
                .create_user(NewUser {
                    username: payload.username.clone(),
                    email: payload.email.clone(),
                    role: roles::USER.to_string(),
                    ..NewUser::default()
                })
                .await
            {
                Ok(user) => user,
                // Concurrent signup with the same identity won the race.
                Err(RepoError::Conflict) => {
                    return Ok((StatusCode::BAD_REQUEST, Json(payload)).into_response());
                }
                Err(e) => return Err(internal("signup create_user", e)),
            }
        }
    };

    let code = issue_confirmation_code(&user, &state.config.jwt_secret, state.config.confirmation_ttl)
        .map_err(|e| internal("signup issue code", e))?;

    state
        .mailer
        .send_confirmation_code(&user.email, &user.username, &code)
        .await
        .map_err(|e| internal("signup mail delivery", e))?;

    // The code travels by email only; the response echoes the identity.
    Ok((StatusCode::OK, Json(payload)).into_response())
}

/// obtain_token
///
/// [Public Route] Second half of registration: validates the emailed code
/// against the user's current state and mints the bearer access token.
/// Every failure here, including an unknown username, is a validation-style
/// 400 rather than a 401/404 — a deliberate contract choice.
#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Unknown user or bad code")
    )
)]
pub async fn obtain_token(
    State(state): State<AppState>,
    Json(payload): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validation::validate_username(&payload.username)?;

    let user = state
        .repo
        .get_user_by_username(&payload.username)
        .await
        .ok_or_else(|| ApiError::validation("username", "User not found."))?;

    if !verify_confirmation_code(&user, &payload.confirmation_code, &state.config.jwt_secret) {
        return Err(ApiError::validation(
            "confirmation_code",
            "Invalid or expired confirmation code.",
        ));
    }

    let token = mint_access_token(&user, &state.config.jwt_secret, state.config.access_token_ttl)
        .map_err(|e| internal("obtain_token mint", e))?;

    Ok(Json(TokenResponse { token }))
}

// --- Categories & Genres ---

/// list_categories
///
/// [Public Route] Lists categories, filterable by name substring.
#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(SearchFilter),
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Json<Vec<models::Category>> {
    let page = filter.page();
    Json(state.repo.list_categories(filter.search, page).await)
}

/// create_category
///
/// [Admin Route] Creates a category. The (slug, name) pair is unique.
#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = CreateSlugRequest,
    responses((status = 201, description = "Created", body = Category))
)]
pub async fn create_category(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSlugRequest>,
) -> Result<(StatusCode, Json<models::Category>), ApiError> {
    policy::ensure_admin(&user)?;
    validation::validate_slug(&payload.slug)?;

    match state.repo.create_category(&payload.name, &payload.slug).await {
        Ok(category) => Ok((StatusCode::CREATED, Json(category))),
        Err(RepoError::Conflict) => Err(ApiError::validation(
            "slug",
            "Category with this slug already exists.",
        )),
        Err(e) => Err(internal("create_category", e)),
    }
}

/// delete_category
///
/// [Admin Route] Deletes a category by slug. Titles referencing it keep
/// existing with a nullified category.
#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_category(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    policy::ensure_admin(&user)?;
    if state.repo.delete_category(&slug).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

/// list_genres
///
/// [Public Route] Lists genres, filterable by name substring.
#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(SearchFilter),
    responses((status = 200, description = "Genres", body = [Genre]))
)]
pub async fn list_genres(
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Json<Vec<models::Genre>> {
    let page = filter.page();
    Json(state.repo.list_genres(filter.search, page).await)
}

/// create_genre
///
/// [Admin Route] Creates a genre with a unique slug.
#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = CreateSlugRequest,
    responses((status = 201, description = "Created", body = Genre))
)]
pub async fn create_genre(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateSlugRequest>,
) -> Result<(StatusCode, Json<models::Genre>), ApiError> {
    policy::ensure_admin(&user)?;
    validation::validate_slug(&payload.slug)?;

    match state.repo.create_genre(&payload.name, &payload.slug).await {
        Ok(genre) => Ok((StatusCode::CREATED, Json(genre))),
        Err(RepoError::Conflict) => Err(ApiError::validation(
            "slug",
            "Genre with this slug already exists.",
        )),
        Err(e) => Err(internal("create_genre", e)),
    }
}

/// delete_genre
///
/// [Admin Route] Deletes a genre by slug; join rows cascade.
#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_genre(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<StatusCode, ApiError> {
    policy::ensure_admin(&user)?;
    if state.repo.delete_genre(&slug).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Titles ---

/// list_titles
///
/// [Public Route] Lists titles with their on-read rating aggregate, computed
/// by one grouped query for the whole page.
#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(TitleFilter),
    responses((status = 200, description = "Titles", body = [Title]))
)]
pub async fn list_titles(
    State(state): State<AppState>,
    Query(filter): Query<TitleFilter>,
) -> Json<Vec<models::Title>> {
    let page = Page::new(filter.page, filter.page_size);
    let query = TitleQuery {
        name: filter.name,
        year: filter.year,
        genre: filter.genre,
        category: filter.category,
    };
    Json(state.repo.list_titles(query, page).await)
}

/// create_title
///
/// [Admin Route] Creates a title. Genres and category arrive as slugs and
/// are resolved before insertion; an unknown slug rejects the request.
#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = CreateTitleRequest,
    responses((status = 201, description = "Created", body = Title))
)]
pub async fn create_title(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateTitleRequest>,
) -> Result<(StatusCode, Json<models::Title>), ApiError> {
    policy::ensure_admin(&user)?;
    validation::validate_year(payload.year)?;

    let genre_ids = resolve_genre_ids(&state.repo, &payload.genre).await?;
    let category_id = match &payload.category {
        Some(slug) => Some(resolve_category_id(&state.repo, slug).await?),
        None => None,
    };

    let title = state
        .repo
        .create_title(NewTitle {
            name: payload.name,
            year: payload.year,
            description: payload.description,
            category_id,
            genre_ids,
        })
        .await
        .map_err(|e| internal("create_title", e))?;

    Ok((StatusCode::CREATED, Json(title)))
}

/// get_title
///
/// [Public Route] Single title detail, rating included.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses((status = 200, description = "Found", body = Title))
)]
pub async fn get_title(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<models::Title>, ApiError> {
    state.repo.get_title(id).await.map(Json).ok_or(ApiError::NotFound)
}

/// update_title
///
/// [Admin Route] Partial title update; a supplied genre list replaces the
/// whole genre set.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{id}",
    request_body = UpdateTitleRequest,
    responses((status = 200, description = "Updated", body = Title))
)]
pub async fn update_title(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateTitleRequest>,
) -> Result<Json<models::Title>, ApiError> {
    policy::ensure_admin(&user)?;
    if let Some(year) = payload.year {
        validation::validate_year(year)?;
    }

    let genre_ids = match &payload.genre {
        Some(slugs) => Some(resolve_genre_ids(&state.repo, slugs).await?),
        None => None,
    };
    let category_id = match &payload.category {
        Some(slug) => Some(resolve_category_id(&state.repo, slug).await?),
        None => None,
    };

    match state
        .repo
        .update_title(
            id,
            TitleChanges {
                name: payload.name,
                year: payload.year,
                description: payload.description,
                category_id,
                genre_ids,
            },
        )
        .await
    {
        Ok(Some(title)) => Ok(Json(title)),
        Ok(None) => Err(ApiError::NotFound),
        Err(e) => Err(internal("update_title", e)),
    }
}

/// delete_title
///
/// [Admin Route] Deletes a title. Its reviews survive with a nullified
/// title reference.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{id}",
    params(("id" = i64, Path, description = "Title ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_title(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    policy::ensure_admin(&user)?;
    if state.repo.delete_title(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Reviews ---

/// list_reviews
///
/// [Public Route] Lists reviews of a title; 404 when the title is missing.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(PageQuery),
    responses((status = 200, description = "Reviews", body = [Review]))
)]
pub async fn list_reviews(
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<models::Review>>, ApiError> {
    if !state.repo.title_exists(title_id).await {
        return Err(ApiError::NotFound);
    }
    Ok(Json(state.repo.list_reviews(title_id, query.page()).await))
}

/// create_review
///
/// [Authenticated Route] Posts a review, stamped with the acting user as
/// author. The explicit duplicate pre-check produces the friendly message;
/// the unique index on (author_id, title_id) stays authoritative, and a
/// race that slips past the pre-check is translated to the same message.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    request_body = CreateReviewRequest,
    responses(
        (status = 201, description = "Created", body = Review),
        (status = 400, description = "Duplicate review or bad score")
    )
)]
pub async fn create_review(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(title_id): Path<i64>,
    Json(payload): Json<CreateReviewRequest>,
) -> Result<(StatusCode, Json<models::Review>), ApiError> {
    validation::validate_score(payload.score)?;

    if !state.repo.title_exists(title_id).await {
        return Err(ApiError::NotFound);
    }
    if state.repo.review_exists(title_id, user.id).await {
        return Err(ApiError::validation("review", DUPLICATE_REVIEW_MESSAGE));
    }

    match state
        .repo
        .create_review(title_id, user.id, &payload.text, payload.score)
        .await
    {
        Ok(review) => Ok((StatusCode::CREATED, Json(review))),
        // Lost the race against a concurrent duplicate; same friendly error.
        Err(RepoError::Conflict) => Err(ApiError::validation("review", DUPLICATE_REVIEW_MESSAGE)),
        Err(e) => Err(internal("create_review", e)),
    }
}

/// get_review
///
/// [Public Route] Single review, scoped to its title.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{id}",
    params(("title_id" = i64, Path, description = "Title ID"), ("id" = i64, Path, description = "Object ID")),
    responses((status = 200, description = "Found", body = Review))
)]
pub async fn get_review(
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
) -> Result<Json<models::Review>, ApiError> {
    state
        .repo
        .get_review(title_id, id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// update_review
///
/// [Authenticated Route] Partial review update. Object-level rule: author,
/// moderator or admin. `pub_date` is immutable.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{id}",
    request_body = UpdateReviewRequest,
    responses((status = 200, description = "Updated", body = Review))
)]
pub async fn update_review(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
    Json(payload): Json<UpdateReviewRequest>,
) -> Result<Json<models::Review>, ApiError> {
    let review = state
        .repo
        .get_review(title_id, id)
        .await
        .ok_or(ApiError::NotFound)?;
    policy::ensure_can_modify_content(&user, review.author_id)?;

    if let Some(score) = payload.score {
        validation::validate_score(score)?;
    }

    state
        .repo
        .update_review(id, payload.text, payload.score)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// delete_review
///
/// [Authenticated Route] Deletes a review (author/moderator/admin); its
/// comments cascade.
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{id}",
    params(("title_id" = i64, Path, description = "Title ID"), ("id" = i64, Path, description = "Object ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_review(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path((title_id, id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    let review = state
        .repo
        .get_review(title_id, id)
        .await
        .ok_or(ApiError::NotFound)?;
    policy::ensure_can_modify_content(&user, review.author_id)?;

    if state.repo.delete_review(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Comments ---

/// list_comments
///
/// [Public Route] Lists comments under a review; the (title, review) pair
/// must resolve or the request reads as not-found.
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(PageQuery),
    responses((status = 200, description = "Comments", body = [Comment]))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<models::Comment>>, ApiError> {
    require_review(&state.repo, title_id, review_id).await?;
    Ok(Json(state.repo.list_comments(review_id, query.page()).await))
}

/// create_comment
///
/// [Authenticated Route] Posts a comment on a review, stamped with the
/// acting user as author.
#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    request_body = CreateCommentRequest,
    responses((status = 201, description = "Created", body = Comment))
)]
pub async fn create_comment(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id)): Path<(i64, i64)>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<models::Comment>), ApiError> {
    require_review(&state.repo, title_id, review_id).await?;

    match state
        .repo
        .create_comment(review_id, user.id, &payload.text)
        .await
    {
        Ok(comment) => Ok((StatusCode::CREATED, Json(comment))),
        Err(e) => Err(internal("create_comment", e)),
    }
}

/// get_comment
#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{id}",
    params(("title_id" = i64, Path, description = "Title ID"), ("review_id" = i64, Path, description = "Review ID"), ("id" = i64, Path, description = "Object ID")),
    responses((status = 200, description = "Found", body = Comment))
)]
pub async fn get_comment(
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
) -> Result<Json<models::Comment>, ApiError> {
    require_review(&state.repo, title_id, review_id).await?;
    state
        .repo
        .get_comment(review_id, id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// update_comment
///
/// [Authenticated Route] Same ownership rule as reviews.
#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{id}",
    request_body = UpdateCommentRequest,
    responses((status = 200, description = "Updated", body = Comment))
)]
pub async fn update_comment(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
    Json(payload): Json<UpdateCommentRequest>,
) -> Result<Json<models::Comment>, ApiError> {
    require_review(&state.repo, title_id, review_id).await?;
    let comment = state
        .repo
        .get_comment(review_id, id)
        .await
        .ok_or(ApiError::NotFound)?;
    policy::ensure_can_modify_content(&user, comment.author_id)?;

    state
        .repo
        .update_comment(id, payload.text)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// delete_comment
#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{id}",
    params(("title_id" = i64, Path, description = "Title ID"), ("review_id" = i64, Path, description = "Review ID"), ("id" = i64, Path, description = "Object ID")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_comment(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path((title_id, review_id, id)): Path<(i64, i64, i64)>,
) -> Result<StatusCode, ApiError> {
    require_review(&state.repo, title_id, review_id).await?;
    let comment = state
        .repo
        .get_comment(review_id, id)
        .await
        .ok_or(ApiError::NotFound)?;
    policy::ensure_can_modify_content(&user, comment.author_id)?;

    if state.repo.delete_comment(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- User Management (admin) ---

/// list_users
///
/// [Admin Route] Lists users; even listing requires admin, no read-only
/// fallback here.
#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(SearchFilter),
    responses((status = 200, description = "Users", body = [User]))
)]
pub async fn list_users(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<SearchFilter>,
) -> Result<Json<Vec<models::User>>, ApiError> {
    policy::ensure_admin(&user)?;
    let page = filter.page();
    Ok(Json(state.repo.list_users(filter.search, page).await))
}

/// create_user
///
/// [Admin Route] Creates a user with an arbitrary role.
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses((status = 201, description = "Created", body = User))
)]
pub async fn create_user(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<models::User>), ApiError> {
    policy::ensure_admin(&user)?;
    validation::validate_username(&payload.username)?;
    validation::validate_email(&payload.email)?;
    let role = payload.role.unwrap_or_else(|| roles::USER.to_string());
    validation::validate_role(&role)?;

    match state
        .repo
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            first_name: payload.first_name.unwrap_or_default(),
            last_name: payload.last_name.unwrap_or_default(),
            bio: payload.bio.unwrap_or_default(),
            role,
        })
        .await
    {
        Ok(created) => Ok((StatusCode::CREATED, Json(created))),
        Err(RepoError::Conflict) => Err(ApiError::validation(
            "username",
            "A user with this username or email already exists.",
        )),
        Err(e) => Err(internal("create_user", e)),
    }
}

/// get_user_detail
///
/// [Admin Route] Single user by username.
#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses((status = 200, description = "Found", body = User))
)]
pub async fn get_user_detail(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<models::User>, ApiError> {
    policy::ensure_admin(&user)?;
    state
        .repo
        .get_user_by_username(&username)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound)
}

/// update_user_detail
///
/// [Admin Route] Partial update of any user field, role included.
#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    request_body = UpdateUserRequest,
    responses((status = 200, description = "Updated", body = User))
)]
pub async fn update_user_detail(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<models::User>, ApiError> {
    policy::ensure_admin(&user)?;
    apply_user_changes(&state.repo, &username, payload, None).await
}

/// delete_user_detail
///
/// [Admin Route] Deletes a user; their reviews and comments cascade.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses((status = 204, description = "Deleted"), (status = 404, description = "Not Found"))
)]
pub async fn delete_user_detail(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode, ApiError> {
    policy::ensure_admin(&user)?;
    if state.repo.delete_user(&username).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// --- Self-service profile ---

/// get_me
///
/// [Authenticated Route] The caller's own record.
#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses((status = 200, description = "Profile", body = User))
)]
pub async fn get_me(AuthUser { user }: AuthUser) -> Json<models::User> {
    Json(user)
}

/// update_me
///
/// [Authenticated Route] Partial self-update of profile fields. Whatever
/// `role` the body carries, the stored role is force-set back to the
/// caller's current role, closing the self-promotion hole.
#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateUserRequest,
    responses((status = 200, description = "Updated", body = User))
)]
pub async fn update_me(
    AuthUser { user }: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<models::User>, ApiError> {
    let current_role = user.role.clone();
    let username = user.username.clone();
    apply_user_changes(&state.repo, &username, payload, Some(current_role)).await
}

/// Shared tail of the two user-update paths. `forced_role` overrides
/// whatever the payload supplied (self-service); `None` lets the payload
/// role through after validation (admin path).
async fn apply_user_changes(
    repo: &RepositoryState,
    username: &str,
    payload: UpdateUserRequest,
    forced_role: Option<String>,
) -> Result<Json<models::User>, ApiError> {
    if let Some(new_username) = &payload.username {
        validation::validate_username(new_username)?;
    }
    if let Some(email) = &payload.email {
        validation::validate_email(email)?;
    }
    let role = match forced_role {
        Some(current) => Some(current),
        None => {
            if let Some(role) = &payload.role {
                validation::validate_role(role)?;
            }
            payload.role
        }
    };

    match repo
        .update_user(
            username,
            UserChanges {
                username: payload.username,
                email: payload.email,
                first_name: payload.first_name,
                last_name: payload.last_name,
                bio: payload.bio,
                role,
            },
        )
        .await
    {
        Ok(Some(updated)) => Ok(Json(updated)),
        Ok(None) => Err(ApiError::NotFound),
        Err(RepoError::Conflict) => Err(ApiError::validation(
            "username",
            "A user with this username or email already exists.",
        )),
        Err(e) => Err(internal("update_user", e)),
    }
}
