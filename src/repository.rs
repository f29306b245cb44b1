use crate::models::{Category, Comment, Genre, Review, Title, User};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};
use std::collections::HashMap;
use std::sync::Arc;

/// RepoError
///
/// Storage failures the handlers care to distinguish. `Conflict` is a unique
/// constraint violation: the race-losing second review, a taken username or
/// slug. Everything else stays an opaque database error.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("unique constraint violated")]
    Conflict,

    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            if db.is_unique_violation() {
                return RepoError::Conflict;
            }
        }
        RepoError::Database(e)
    }
}

/// Page
///
/// Page-number pagination resolved to LIMIT/OFFSET.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_SIZE: i64 = 10;
    pub const MAX_SIZE: i64 = 100;

    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1) as i64;
        let limit = (page_size.unwrap_or(Self::DEFAULT_SIZE as u32) as i64)
            .clamp(1, Self::MAX_SIZE);
        Self {
            limit,
            offset: (page - 1) * limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// NewUser
///
/// Full column set for user creation, used by both signup (with defaults)
/// and the admin create endpoint.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: String,
}

/// UserChanges
///
/// COALESCE-style partial update: only `Some` fields touch their columns.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<String>,
}

/// NewTitle
///
/// Title insertion payload with slugs already resolved to row ids.
#[derive(Debug, Clone, Default)]
pub struct NewTitle {
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub genre_ids: Vec<i64>,
}

/// TitleChanges
///
/// Partial title update. A `Some` genre set replaces the whole join set.
#[derive(Debug, Clone, Default)]
pub struct TitleChanges {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub genre_ids: Option<Vec<i64>>,
}

/// TitleQuery
///
/// Listing filters: name substring, exact year, genre slug, category slug.
#[derive(Debug, Clone, Default)]
pub struct TitleQuery {
    pub name: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub category: Option<String>,
}

/// Repository Trait
///
/// Abstract contract for all persistence operations, shared across handlers
/// as `Arc<dyn Repository>` so the concrete backend (Postgres in production,
/// an in-memory mock in tests) stays swappable.
///
/// Reads follow a lenient convention (empty/None on storage failure, with the
/// error logged); creates and updates that must distinguish uniqueness
/// conflicts return `Result<_, RepoError>`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn get_user(&self, id: i64) -> Option<User>;
    async fn get_user_by_username(&self, username: &str) -> Option<User>;
    // Exact (username, email) pair match, for the idempotent signup resend.
    async fn get_user_by_identity(&self, username: &str, email: &str) -> Option<User>;
    // True if the username OR the email is already claimed by any user.
    async fn identity_taken(&self, username: &str, email: &str) -> bool;
    async fn list_users(&self, search: Option<String>, page: Page) -> Vec<User>;
    async fn create_user(&self, new: NewUser) -> Result<User, RepoError>;
    async fn update_user(
        &self,
        username: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError>;
    async fn delete_user(&self, username: &str) -> bool;

    // --- Categories & Genres ---
    async fn list_categories(&self, search: Option<String>, page: Page) -> Vec<Category>;
    async fn get_category_by_slug(&self, slug: &str) -> Option<Category>;
    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError>;
    // Deleting a category nullifies the reference on its titles (SET NULL).
    async fn delete_category(&self, slug: &str) -> bool;
    async fn list_genres(&self, search: Option<String>, page: Page) -> Vec<Genre>;
    async fn get_genres_by_slugs(&self, slugs: &[String]) -> Vec<Genre>;
    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError>;
    async fn delete_genre(&self, slug: &str) -> bool;

    // --- Titles ---
    // Single grouped query computes the rating aggregate for the whole page;
    // genres are attached with one batched lookup, never per row.
    async fn list_titles(&self, query: TitleQuery, page: Page) -> Vec<Title>;
    async fn get_title(&self, id: i64) -> Option<Title>;
    async fn title_exists(&self, id: i64) -> bool;
    async fn create_title(&self, new: NewTitle) -> Result<Title, RepoError>;
    async fn update_title(
        &self,
        id: i64,
        changes: TitleChanges,
    ) -> Result<Option<Title>, RepoError>;
    async fn delete_title(&self, id: i64) -> bool;

    // --- Reviews ---
    async fn list_reviews(&self, title_id: i64, page: Page) -> Vec<Review>;
    async fn get_review(&self, title_id: i64, id: i64) -> Option<Review>;
    // Pre-check for the one-review-per-title rule; the unique index on
    // (author_id, title_id) remains the final authority under races.
    async fn review_exists(&self, title_id: i64, author_id: i64) -> bool;
    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError>;
    async fn update_review(&self, id: i64, text: Option<String>, score: Option<i32>)
        -> Option<Review>;
    async fn delete_review(&self, id: i64) -> bool;

    // --- Comments ---
    async fn list_comments(&self, review_id: i64, page: Page) -> Vec<Comment>;
    async fn get_comment(&self, review_id: i64, id: i64) -> Option<Comment>;
    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, RepoError>;
    async fn update_comment(&self, id: i64, text: Option<String>) -> Option<Comment>;
    async fn delete_comment(&self, id: i64) -> bool;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the app.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// The production implementation, backed by the PostgreSQL pool.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Batched genre lookup for a page of titles. One query for the whole
    /// id set, grouped in memory, to avoid the per-title round trip.
    async fn genres_for_titles(&self, title_ids: &[i64]) -> HashMap<i64, Vec<Genre>> {
        if title_ids.is_empty() {
            return HashMap::new();
        }
        let rows = sqlx::query_as::<_, TitleGenreRow>(
            r#"
            SELECT gt.title_id, g.id, g.name, g.slug
            FROM genre_title gt
            JOIN genres g ON g.id = gt.genre_id
            WHERE gt.title_id = ANY($1)
            ORDER BY g.name
            "#,
        )
        .bind(title_ids)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("genres_for_titles error: {:?}", e);
            vec![]
        });

        let mut map: HashMap<i64, Vec<Genre>> = HashMap::new();
        for row in rows {
            map.entry(row.title_id).or_default().push(Genre {
                id: row.id,
                name: row.name,
                slug: row.slug,
            });
        }
        map
    }

    async fn assemble_titles(&self, rows: Vec<TitleRow>) -> Vec<Title> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut genres = self.genres_for_titles(&ids).await;
        rows.into_iter()
            .map(|row| {
                let genre = genres.remove(&row.id).unwrap_or_default();
                row.into_title(genre)
            })
            .collect()
    }
}

/// Flat row of the grouped title query, before genres are attached.
#[derive(Debug, FromRow)]
struct TitleRow {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    rating: Option<f64>,
    category_id: Option<i64>,
    category_name: Option<String>,
    category_slug: Option<String>,
}

impl TitleRow {
    fn into_title(self, genre: Vec<Genre>) -> Title {
        let category = match (self.category_id, self.category_name, self.category_slug) {
            (Some(id), Some(name), Some(slug)) => Some(Category { id, name, slug }),
            _ => None,
        };
        Title {
            id: self.id,
            name: self.name,
            year: self.year,
            rating: self.rating,
            description: self.description,
            genre,
            category,
        }
    }
}

#[derive(Debug, FromRow)]
struct TitleGenreRow {
    title_id: i64,
    id: i64,
    name: String,
    slug: String,
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, is_staff";

// The grouped base query behind every title read: category joined in,
// rating averaged over the current review set in the same pass.
const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           AVG(r.score)::float8 AS rating,
           c.id AS category_id, c.name AS category_name, c.slug AS category_slug
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
    LEFT JOIN reviews r ON r.title_id = t.id
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.author_id, r.text, u.username AS author, r.score, r.pub_date
    FROM reviews r
    JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.author_id, c.text, u.username AS author, c.pub_date
    FROM comments c
    JOIN users u ON u.id = c.author_id
"#;

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn get_user(&self, id: i64) -> Option<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_user error: {:?}", e);
                None
            })
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_user_by_username error: {:?}", e);
            None
        })
    }

    async fn get_user_by_identity(&self, username: &str, email: &str) -> Option<User> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND email = $2"
        ))
        .bind(username)
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_user_by_identity error: {:?}", e);
            None
        })
    }

    async fn identity_taken(&self, username: &str, email: &str) -> bool {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)",
        )
        .bind(username)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("identity_taken error: {:?}", e);
            false
        })
    }

    async fn list_users(&self, search: Option<String>, page: Page) -> Vec<User> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1"));
        if let Some(s) = search {
            builder.push(" AND username ILIKE ");
            builder.push_bind(format!("%{}%", s));
        }
        builder.push(" ORDER BY username LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        match builder.build_query_as::<User>().fetch_all(&self.pool).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("list_users error: {:?}", e);
                vec![]
            }
        }
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (username, email, first_name, last_name, bio, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&new.username)
        .bind(&new.email)
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.bio)
        .bind(&new.role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn update_user(
        &self,
        username: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                first_name = COALESCE($4, first_name),
                last_name = COALESCE($5, last_name),
                bio = COALESCE($6, bio),
                role = COALESCE($7, role)
            WHERE username = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(username)
        .bind(changes.username)
        .bind(changes.email)
        .bind(changes.first_name)
        .bind(changes.last_name)
        .bind(changes.bio)
        .bind(changes.role)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn delete_user(&self, username: &str) -> bool {
        match sqlx::query("DELETE FROM users WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_user error: {:?}", e);
                false
            }
        }
    }

    // --- Categories & Genres ---

    async fn list_categories(&self, search: Option<String>, page: Page) -> Vec<Category> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM categories WHERE 1=1");
        if let Some(s) = search {
            builder.push(" AND name ILIKE ");
            builder.push_bind(format!("%{}%", s));
        }
        builder.push(" ORDER BY name LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        match builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::error!("list_categories error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_category_by_slug(&self, slug: &str) -> Option<Category> {
        sqlx::query_as::<_, Category>("SELECT id, name, slug FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("get_category_by_slug error: {:?}", e);
                None
            })
    }

    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError> {
        let category = sqlx::query_as::<_, Category>(
            "INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(category)
    }

    async fn delete_category(&self, slug: &str) -> bool {
        match sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_category error: {:?}", e);
                false
            }
        }
    }

    async fn list_genres(&self, search: Option<String>, page: Page) -> Vec<Genre> {
        let mut builder: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT id, name, slug FROM genres WHERE 1=1");
        if let Some(s) = search {
            builder.push(" AND name ILIKE ");
            builder.push_bind(format!("%{}%", s));
        }
        builder.push(" ORDER BY name LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        match builder
            .build_query_as::<Genre>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(g) => g,
            Err(e) => {
                tracing::error!("list_genres error: {:?}", e);
                vec![]
            }
        }
    }

    async fn get_genres_by_slugs(&self, slugs: &[String]) -> Vec<Genre> {
        sqlx::query_as::<_, Genre>(
            "SELECT id, name, slug FROM genres WHERE slug = ANY($1) ORDER BY name",
        )
        .bind(slugs)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_genres_by_slugs error: {:?}", e);
            vec![]
        })
    }

    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError> {
        let genre = sqlx::query_as::<_, Genre>(
            "INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING id, name, slug",
        )
        .bind(name)
        .bind(slug)
        .fetch_one(&self.pool)
        .await?;
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> bool {
        match sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_genre error: {:?}", e);
                false
            }
        }
    }

    // --- Titles ---

    async fn list_titles(&self, query: TitleQuery, page: Page) -> Vec<Title> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(TITLE_SELECT);
        builder.push(" WHERE 1=1");

        if let Some(name) = query.name {
            builder.push(" AND t.name ILIKE ");
            builder.push_bind(format!("%{}%", name));
        }
        if let Some(year) = query.year {
            builder.push(" AND t.year = ");
            builder.push_bind(year);
        }
        if let Some(genre) = query.genre {
            builder.push(
                " AND EXISTS (SELECT 1 FROM genre_title gt JOIN genres g ON g.id = gt.genre_id \
                 WHERE gt.title_id = t.id AND g.slug = ",
            );
            builder.push_bind(genre);
            builder.push(")");
        }
        if let Some(category) = query.category {
            builder.push(" AND c.slug = ");
            builder.push_bind(category);
        }

        builder.push(" GROUP BY t.id, c.id ORDER BY t.year, t.name LIMIT ");
        builder.push_bind(page.limit);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset);

        let rows = match builder
            .build_query_as::<TitleRow>()
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::error!("list_titles error: {:?}", e);
                return vec![];
            }
        };

        self.assemble_titles(rows).await
    }

    async fn get_title(&self, id: i64) -> Option<Title> {
        let row = sqlx::query_as::<_, TitleRow>(&format!(
            "{TITLE_SELECT} WHERE t.id = $1 GROUP BY t.id, c.id"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_title error: {:?}", e);
            None
        })?;

        self.assemble_titles(vec![row]).await.pop()
    }

    async fn title_exists(&self, id: i64) -> bool {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::error!("title_exists error: {:?}", e);
                false
            })
    }

    async fn create_title(&self, new: NewTitle) -> Result<Title, RepoError> {
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;

        let title_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO titles (name, year, description, category_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&new.name)
        .bind(new.year)
        .bind(&new.description)
        .bind(new.category_id)
        .fetch_one(&mut *tx)
        .await?;

        for genre_id in &new.genre_ids {
            sqlx::query("INSERT INTO genre_title (genre_id, title_id) VALUES ($1, $2)")
                .bind(genre_id)
                .bind(title_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await.map_err(RepoError::from)?;

        self.get_title(title_id)
            .await
            .ok_or(RepoError::Database(sqlx::Error::RowNotFound))
    }

    async fn update_title(
        &self,
        id: i64,
        changes: TitleChanges,
    ) -> Result<Option<Title>, RepoError> {
        let mut tx = self.pool.begin().await.map_err(RepoError::from)?;

        let updated = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE titles
            SET name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = COALESCE($5, category_id)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(changes.name)
        .bind(changes.year)
        .bind(changes.description)
        .bind(changes.category_id)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        // A supplied genre list replaces the join set wholesale.
        if let Some(genre_ids) = changes.genre_ids {
            sqlx::query("DELETE FROM genre_title WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            for genre_id in genre_ids {
                sqlx::query("INSERT INTO genre_title (genre_id, title_id) VALUES ($1, $2)")
                    .bind(genre_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await.map_err(RepoError::from)?;

        Ok(self.get_title(id).await)
    }

    async fn delete_title(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_title error: {:?}", e);
                false
            }
        }
    }

    // --- Reviews ---

    async fn list_reviews(&self, title_id: i64, page: Page) -> Vec<Review> {
        sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.pub_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(title_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_reviews error: {:?}", e);
            vec![]
        })
    }

    async fn get_review(&self, title_id: i64, id: i64) -> Option<Review> {
        sqlx::query_as::<_, Review>(&format!(
            "{REVIEW_SELECT} WHERE r.title_id = $1 AND r.id = $2"
        ))
        .bind(title_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_review error: {:?}", e);
            None
        })
    }

    async fn review_exists(&self, title_id: i64, author_id: i64) -> bool {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reviews WHERE title_id = $1 AND author_id = $2)",
        )
        .bind(title_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("review_exists error: {:?}", e);
            false
        })
    }

    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError> {
        // Insert + author join in one round trip, same CTE shape as comments.
        let review = sqlx::query_as::<_, Review>(
            r#"
            WITH inserted AS (
                INSERT INTO reviews (title_id, author_id, text, score)
                VALUES ($1, $2, $3, $4)
                RETURNING id, author_id, text, score, pub_date
            )
            SELECT i.id, i.author_id, i.text, u.username AS author, i.score, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(title_id)
        .bind(author_id)
        .bind(text)
        .bind(score)
        .fetch_one(&self.pool)
        .await?;
        Ok(review)
    }

    async fn update_review(
        &self,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> Option<Review> {
        sqlx::query_as::<_, Review>(
            r#"
            WITH updated AS (
                UPDATE reviews
                SET text = COALESCE($2, text),
                    score = COALESCE($3, score)
                WHERE id = $1
                RETURNING id, author_id, text, score, pub_date
            )
            SELECT w.id, w.author_id, w.text, u.username AS author, w.score, w.pub_date
            FROM updated w
            JOIN users u ON u.id = w.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(score)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_review error: {:?}", e);
            None
        })
    }

    async fn delete_review(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_review error: {:?}", e);
                false
            }
        }
    }

    // --- Comments ---

    async fn list_comments(&self, review_id: i64, page: Page) -> Vec<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.pub_date DESC LIMIT $2 OFFSET $3"
        ))
        .bind(review_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("list_comments error: {:?}", e);
            vec![]
        })
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> Option<Comment> {
        sqlx::query_as::<_, Comment>(&format!(
            "{COMMENT_SELECT} WHERE c.review_id = $1 AND c.id = $2"
        ))
        .bind(review_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("get_comment error: {:?}", e);
            None
        })
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, RepoError> {
        let comment = sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (review_id, author_id, text)
                VALUES ($1, $2, $3)
                RETURNING id, author_id, text, pub_date
            )
            SELECT i.id, i.author_id, i.text, u.username AS author, i.pub_date
            FROM inserted i
            JOIN users u ON u.id = i.author_id
            "#,
        )
        .bind(review_id)
        .bind(author_id)
        .bind(text)
        .fetch_one(&self.pool)
        .await?;
        Ok(comment)
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> Option<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments
                SET text = COALESCE($2, text)
                WHERE id = $1
                RETURNING id, author_id, text, pub_date
            )
            SELECT w.id, w.author_id, w.text, u.username AS author, w.pub_date
            FROM updated w
            JOIN users u ON u.id = w.author_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("update_comment error: {:?}", e);
            None
        })
    }

    async fn delete_comment(&self, id: i64) -> bool {
        match sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
        {
            Ok(res) => res.rows_affected() > 0,
            Err(e) => {
                tracing::error!("delete_comment error: {:?}", e);
                false
            }
        }
    }
}
