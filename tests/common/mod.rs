//! Shared harness for the integration suites: an in-memory repository and
//! mailer behind the real router, so the full HTTP surface is exercised
//! without a database or an SMTP relay.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use review_portal::{
    AppState,
    auth::mint_access_token,
    config::AppConfig,
    create_router,
    email::{MailError, Mailer, MailerState},
    models::{Category, Comment, Genre, Review, Title, User, roles},
    repository::{
        NewTitle, NewUser, Page, RepoError, Repository, RepositoryState, TitleChanges,
        TitleQuery, UserChanges,
    },
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicI64, Ordering},
};
use tokio::net::TcpListener;

// --- In-memory repository ---

#[derive(Debug, Clone)]
struct StoredTitle {
    id: i64,
    name: String,
    year: i32,
    description: Option<String>,
    category_id: Option<i64>,
    genre_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
struct StoredReview {
    id: i64,
    title_id: i64,
    author_id: i64,
    text: String,
    score: i32,
    pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    review_id: i64,
    author_id: i64,
    text: String,
    pub_date: DateTime<Utc>,
}

/// MockRepository
///
/// Vec-backed implementation of the `Repository` trait, reproducing the
/// store's observable behavior: uniqueness conflicts, cascade and nullify
/// semantics on delete, orderings, and the on-read rating average.
#[derive(Default)]
pub struct MockRepository {
    users: Mutex<Vec<User>>,
    categories: Mutex<Vec<Category>>,
    genres: Mutex<Vec<Genre>>,
    titles: Mutex<Vec<StoredTitle>>,
    reviews: Mutex<Vec<StoredReview>>,
    comments: Mutex<Vec<StoredComment>>,
    next_id: AtomicI64,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn alloc_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Flips the staff flag directly; there is no API surface for it.
    pub fn set_staff(&self, username: &str, is_staff: bool) {
        if let Some(user) = self
            .users
            .lock()
            .unwrap()
            .iter_mut()
            .find(|u| u.username == username)
        {
            user.is_staff = is_staff;
        }
    }

    fn username_of(&self, user_id: i64) -> String {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == user_id)
            .map(|u| u.username.clone())
            .unwrap_or_default()
    }

    fn build_title(&self, stored: &StoredTitle) -> Title {
        let category = stored.category_id.and_then(|cid| {
            self.categories
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.id == cid)
                .cloned()
        });
        let mut genre: Vec<Genre> = {
            let genres = self.genres.lock().unwrap();
            stored
                .genre_ids
                .iter()
                .filter_map(|gid| genres.iter().find(|g| g.id == *gid).cloned())
                .collect()
        };
        genre.sort_by(|a, b| a.name.cmp(&b.name));

        let scores: Vec<i32> = self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.title_id == stored.id)
            .map(|r| r.score)
            .collect();
        let rating = if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<i32>() as f64 / scores.len() as f64)
        };

        Title {
            id: stored.id,
            name: stored.name.clone(),
            year: stored.year,
            rating,
            description: stored.description.clone(),
            genre,
            category,
        }
    }

    fn build_review(&self, stored: &StoredReview) -> Review {
        Review {
            id: stored.id,
            author_id: stored.author_id,
            text: stored.text.clone(),
            author: self.username_of(stored.author_id),
            score: stored.score,
            pub_date: stored.pub_date,
        }
    }

    fn build_comment(&self, stored: &StoredComment) -> Comment {
        Comment {
            id: stored.id,
            author_id: stored.author_id,
            text: stored.text.clone(),
            author: self.username_of(stored.author_id),
            pub_date: stored.pub_date,
        }
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset.max(0) as usize)
        .take(page.limit.max(0) as usize)
        .collect()
}

#[async_trait]
impl Repository for MockRepository {
    // --- Users ---

    async fn get_user(&self, id: i64) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username)
            .cloned()
    }

    async fn get_user_by_identity(&self, username: &str, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.username == username && u.email == email)
            .cloned()
    }

    async fn identity_taken(&self, username: &str, email: &str) -> bool {
        self.users
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.username == username || u.email == email)
    }

    async fn list_users(&self, search: Option<String>, page: Page) -> Vec<User> {
        let mut users: Vec<User> = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| match &search {
                Some(s) => u.username.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        paginate(users, page)
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(RepoError::Conflict);
        }
        let user = User {
            id: self.alloc_id(),
            username: new.username,
            email: new.email,
            first_name: new.first_name,
            last_name: new.last_name,
            bio: new.bio,
            role: new.role,
            is_staff: false,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        username: &str,
        changes: UserChanges,
    ) -> Result<Option<User>, RepoError> {
        let mut users = self.users.lock().unwrap();
        let Some(idx) = users.iter().position(|u| u.username == username) else {
            return Ok(None);
        };
        if let Some(new_username) = &changes.username {
            if users
                .iter()
                .any(|u| u.username == *new_username && u.username != username)
            {
                return Err(RepoError::Conflict);
            }
        }
        if let Some(new_email) = &changes.email {
            if users
                .iter()
                .any(|u| u.email == *new_email && u.username != username)
            {
                return Err(RepoError::Conflict);
            }
        }
        let user = &mut users[idx];
        if let Some(v) = changes.username {
            user.username = v;
        }
        if let Some(v) = changes.email {
            user.email = v;
        }
        if let Some(v) = changes.first_name {
            user.first_name = v;
        }
        if let Some(v) = changes.last_name {
            user.last_name = v;
        }
        if let Some(v) = changes.bio {
            user.bio = v;
        }
        if let Some(v) = changes.role {
            user.role = v;
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, username: &str) -> bool {
        let user_id = {
            let mut users = self.users.lock().unwrap();
            let Some(idx) = users.iter().position(|u| u.username == username) else {
                return false;
            };
            users.remove(idx).id
        };
        // Authored content cascades with the account.
        let removed_reviews: Vec<i64> = {
            let mut reviews = self.reviews.lock().unwrap();
            let removed = reviews
                .iter()
                .filter(|r| r.author_id == user_id)
                .map(|r| r.id)
                .collect();
            reviews.retain(|r| r.author_id != user_id);
            removed
        };
        self.comments
            .lock()
            .unwrap()
            .retain(|c| c.author_id != user_id && !removed_reviews.contains(&c.review_id));
        true
    }

    // --- Categories & Genres ---

    async fn list_categories(&self, search: Option<String>, page: Page) -> Vec<Category> {
        let mut categories: Vec<Category> = self
            .categories
            .lock()
            .unwrap()
            .iter()
            .filter(|c| match &search {
                Some(s) => c.name.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(categories, page)
    }

    async fn get_category_by_slug(&self, slug: &str) -> Option<Category> {
        self.categories
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.slug == slug)
            .cloned()
    }

    async fn create_category(&self, name: &str, slug: &str) -> Result<Category, RepoError> {
        let mut categories = self.categories.lock().unwrap();
        if categories.iter().any(|c| c.slug == slug) {
            return Err(RepoError::Conflict);
        }
        let category = Category {
            id: self.alloc_id(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        categories.push(category.clone());
        Ok(category)
    }

    async fn delete_category(&self, slug: &str) -> bool {
        let category_id = {
            let mut categories = self.categories.lock().unwrap();
            let Some(idx) = categories.iter().position(|c| c.slug == slug) else {
                return false;
            };
            categories.remove(idx).id
        };
        // Titles keep existing, uncategorized.
        for title in self.titles.lock().unwrap().iter_mut() {
            if title.category_id == Some(category_id) {
                title.category_id = None;
            }
        }
        true
    }

    async fn list_genres(&self, search: Option<String>, page: Page) -> Vec<Genre> {
        let mut genres: Vec<Genre> = self
            .genres
            .lock()
            .unwrap()
            .iter()
            .filter(|g| match &search {
                Some(s) => g.name.to_lowercase().contains(&s.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        paginate(genres, page)
    }

    async fn get_genres_by_slugs(&self, slugs: &[String]) -> Vec<Genre> {
        let mut found: Vec<Genre> = self
            .genres
            .lock()
            .unwrap()
            .iter()
            .filter(|g| slugs.contains(&g.slug))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    async fn create_genre(&self, name: &str, slug: &str) -> Result<Genre, RepoError> {
        let mut genres = self.genres.lock().unwrap();
        if genres.iter().any(|g| g.slug == slug) {
            return Err(RepoError::Conflict);
        }
        let genre = Genre {
            id: self.alloc_id(),
            name: name.to_string(),
            slug: slug.to_string(),
        };
        genres.push(genre.clone());
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> bool {
        let genre_id = {
            let mut genres = self.genres.lock().unwrap();
            let Some(idx) = genres.iter().position(|g| g.slug == slug) else {
                return false;
            };
            genres.remove(idx).id
        };
        for title in self.titles.lock().unwrap().iter_mut() {
            title.genre_ids.retain(|gid| *gid != genre_id);
        }
        true
    }

    // --- Titles ---

    async fn list_titles(&self, query: TitleQuery, page: Page) -> Vec<Title> {
        let genre_id = query.genre.as_ref().and_then(|slug| {
            self.genres
                .lock()
                .unwrap()
                .iter()
                .find(|g| g.slug == *slug)
                .map(|g| g.id)
        });
        let category_id = query.category.as_ref().and_then(|slug| {
            self.categories
                .lock()
                .unwrap()
                .iter()
                .find(|c| c.slug == *slug)
                .map(|c| c.id)
        });

        let mut stored: Vec<StoredTitle> = self
            .titles
            .lock()
            .unwrap()
            .iter()
            .filter(|t| match &query.name {
                Some(name) => t.name.to_lowercase().contains(&name.to_lowercase()),
                None => true,
            })
            .filter(|t| query.year.map_or(true, |y| t.year == y))
            .filter(|t| match (&query.genre, genre_id) {
                (None, _) => true,
                (Some(_), Some(gid)) => t.genre_ids.contains(&gid),
                (Some(_), None) => false,
            })
            .filter(|t| match (&query.category, category_id) {
                (None, _) => true,
                (Some(_), Some(cid)) => t.category_id == Some(cid),
                (Some(_), None) => false,
            })
            .cloned()
            .collect();
        stored.sort_by(|a, b| a.year.cmp(&b.year).then_with(|| a.name.cmp(&b.name)));

        paginate(stored, page)
            .iter()
            .map(|t| self.build_title(t))
            .collect()
    }

    async fn get_title(&self, id: i64) -> Option<Title> {
        let stored = self
            .titles
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned()?;
        Some(self.build_title(&stored))
    }

    async fn title_exists(&self, id: i64) -> bool {
        self.titles.lock().unwrap().iter().any(|t| t.id == id)
    }

    async fn create_title(&self, new: NewTitle) -> Result<Title, RepoError> {
        let stored = StoredTitle {
            id: self.alloc_id(),
            name: new.name,
            year: new.year,
            description: new.description,
            category_id: new.category_id,
            genre_ids: new.genre_ids,
        };
        self.titles.lock().unwrap().push(stored.clone());
        Ok(self.build_title(&stored))
    }

    async fn update_title(
        &self,
        id: i64,
        changes: TitleChanges,
    ) -> Result<Option<Title>, RepoError> {
        let stored = {
            let mut titles = self.titles.lock().unwrap();
            let Some(title) = titles.iter_mut().find(|t| t.id == id) else {
                return Ok(None);
            };
            if let Some(v) = changes.name {
                title.name = v;
            }
            if let Some(v) = changes.year {
                title.year = v;
            }
            if let Some(v) = changes.description {
                title.description = Some(v);
            }
            if let Some(v) = changes.category_id {
                title.category_id = Some(v);
            }
            if let Some(v) = changes.genre_ids {
                title.genre_ids = v;
            }
            title.clone()
        };
        Ok(Some(self.build_title(&stored)))
    }

    async fn delete_title(&self, id: i64) -> bool {
        let mut titles = self.titles.lock().unwrap();
        let Some(idx) = titles.iter().position(|t| t.id == id) else {
            return false;
        };
        titles.remove(idx);
        true
    }

    // --- Reviews ---

    async fn list_reviews(&self, title_id: i64, page: Page) -> Vec<Review> {
        let mut stored: Vec<StoredReview> = self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.title_id == title_id)
            .cloned()
            .collect();
        stored.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then_with(|| b.id.cmp(&a.id)));
        paginate(stored, page)
            .iter()
            .map(|r| self.build_review(r))
            .collect()
    }

    async fn get_review(&self, title_id: i64, id: i64) -> Option<Review> {
        let stored = self
            .reviews
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.title_id == title_id && r.id == id)
            .cloned()?;
        Some(self.build_review(&stored))
    }

    async fn review_exists(&self, title_id: i64, author_id: i64) -> bool {
        self.reviews
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.title_id == title_id && r.author_id == author_id)
    }

    async fn create_review(
        &self,
        title_id: i64,
        author_id: i64,
        text: &str,
        score: i32,
    ) -> Result<Review, RepoError> {
        let stored = {
            let mut reviews = self.reviews.lock().unwrap();
            if reviews
                .iter()
                .any(|r| r.title_id == title_id && r.author_id == author_id)
            {
                return Err(RepoError::Conflict);
            }
            let stored = StoredReview {
                id: self.alloc_id(),
                title_id,
                author_id,
                text: text.to_string(),
                score,
                pub_date: Utc::now(),
            };
            reviews.push(stored.clone());
            stored
        };
        Ok(self.build_review(&stored))
    }

    async fn update_review(
        &self,
        id: i64,
        text: Option<String>,
        score: Option<i32>,
    ) -> Option<Review> {
        let stored = {
            let mut reviews = self.reviews.lock().unwrap();
            let review = reviews.iter_mut().find(|r| r.id == id)?;
            if let Some(v) = text {
                review.text = v;
            }
            if let Some(v) = score {
                review.score = v;
            }
            review.clone()
        };
        Some(self.build_review(&stored))
    }

    async fn delete_review(&self, id: i64) -> bool {
        let mut reviews = self.reviews.lock().unwrap();
        let Some(idx) = reviews.iter().position(|r| r.id == id) else {
            return false;
        };
        reviews.remove(idx);
        // Comments cascade with their parent review.
        self.comments.lock().unwrap().retain(|c| c.review_id != id);
        true
    }

    // --- Comments ---

    async fn list_comments(&self, review_id: i64, page: Page) -> Vec<Comment> {
        let mut stored: Vec<StoredComment> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.review_id == review_id)
            .cloned()
            .collect();
        stored.sort_by(|a, b| b.pub_date.cmp(&a.pub_date).then_with(|| b.id.cmp(&a.id)));
        paginate(stored, page)
            .iter()
            .map(|c| self.build_comment(c))
            .collect()
    }

    async fn get_comment(&self, review_id: i64, id: i64) -> Option<Comment> {
        let stored = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.review_id == review_id && c.id == id)
            .cloned()?;
        Some(self.build_comment(&stored))
    }

    async fn create_comment(
        &self,
        review_id: i64,
        author_id: i64,
        text: &str,
    ) -> Result<Comment, RepoError> {
        let stored = StoredComment {
            id: self.alloc_id(),
            review_id,
            author_id,
            text: text.to_string(),
            pub_date: Utc::now(),
        };
        self.comments.lock().unwrap().push(stored.clone());
        Ok(self.build_comment(&stored))
    }

    async fn update_comment(&self, id: i64, text: Option<String>) -> Option<Comment> {
        let stored = {
            let mut comments = self.comments.lock().unwrap();
            let comment = comments.iter_mut().find(|c| c.id == id)?;
            if let Some(v) = text {
                comment.text = v;
            }
            comment.clone()
        };
        Some(self.build_comment(&stored))
    }

    async fn delete_comment(&self, id: i64) -> bool {
        let mut comments = self.comments.lock().unwrap();
        let Some(idx) = comments.iter().position(|c| c.id == id) else {
            return false;
        };
        comments.remove(idx);
        true
    }
}

// --- Mock mailer ---

/// MockMailer
///
/// Captures outgoing confirmation codes so the tests can complete the
/// signup-to-token flow end to end.
#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<SentMail>>,
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub username: String,
    pub code: String,
}

impl MockMailer {
    pub fn last_code_for(&self, username: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|m| m.username == username)
            .map(|m| m.code.clone())
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_confirmation_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            username: username.to_string(),
            code: code.to_string(),
        });
        Ok(())
    }
}

// --- Application harness ---

pub struct TestApp {
    pub address: String,
    pub repo: Arc<MockRepository>,
    pub mailer: Arc<MockMailer>,
    pub config: AppConfig,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.address, path)
    }

    /// Seeds a user directly into the store, bypassing the signup flow.
    pub async fn seed_user(&self, username: &str, role: &str) -> User {
        self.repo
            .create_user(NewUser {
                username: username.to_string(),
                email: format!("{username}@example.com"),
                role: role.to_string(),
                ..NewUser::default()
            })
            .await
            .expect("seed user")
    }

    /// Mints a real bearer token for a seeded user.
    pub fn token_for(&self, user: &User) -> String {
        mint_access_token(user, &self.config.jwt_secret, 3600).expect("mint token")
    }

    /// Seeds a title with no category or genres.
    pub async fn seed_title(&self, name: &str, year: i32) -> Title {
        self.repo
            .create_title(NewTitle {
                name: name.to_string(),
                year,
                ..NewTitle::default()
            })
            .await
            .expect("seed title")
    }
}

/// Boots the full router on an ephemeral port, backed by the mocks.
pub async fn spawn_app() -> TestApp {
    let repo = Arc::new(MockRepository::new());
    let mailer = Arc::new(MockMailer::default());
    let config = AppConfig::default();

    let state = AppState {
        repo: repo.clone() as RepositoryState,
        mailer: mailer.clone() as MailerState,
        config: config.clone(),
    };
    let app = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server");
    });

    TestApp {
        address: format!("http://{addr}"),
        repo,
        mailer,
        config,
        client: reqwest::Client::new(),
    }
}

/// Convenience for assertions that only need role constants.
pub use roles::{ADMIN, MODERATOR, USER};
