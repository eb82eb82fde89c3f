use crate::{
    error::AppResult,
    models::{
        ApprovalOutcome, Blog, Blogger, BloggerRequest, BloggerRequestForm, Comment,
        CreateBlogRequest, HomeCounts, NewUser, Page, PageRequest, UpdateBlogRequest, User,
        UserCredentials,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

/// Repository Trait
///
/// The abstract contract for all persistence operations. Handlers and the workflow engine
/// only see this trait, so the Postgres store and the in-process store are interchangeable.
///
/// Visibility rules live here: every reader-facing listing excludes deleted blogs, and
/// `get_visible_comments` excludes deleted comments. `get_comments` is the raw accessor
/// and returns everything.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Accounts ---
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>>;
    async fn find_credentials(&self, username: &str) -> AppResult<Option<UserCredentials>>;
    // A taken username is reported as `ValidationFailed` on the `username` field.
    async fn create_user(&self, user: NewUser) -> AppResult<User>;
    // Members of the Editors group, the recipients of new-request notifications.
    async fn list_editors(&self) -> AppResult<Vec<User>>;
    async fn home_counts(&self) -> AppResult<HomeCounts>;

    // --- Bloggers ---
    async fn list_bloggers(&self, page: PageRequest) -> AppResult<Page<Blogger>>;
    async fn get_blogger(&self, id: i64) -> AppResult<Option<Blogger>>;

    // --- Blogs (reader-facing reads never return deleted rows) ---
    async fn list_blogs(&self, page: PageRequest) -> AppResult<Page<Blog>>;
    async fn list_blogs_by_blogger(
        &self,
        blogger_id: i64,
        page: PageRequest,
    ) -> AppResult<Page<Blog>>;
    async fn get_active_blog(&self, id: i64) -> AppResult<Option<Blog>>;
    // Moderation lookup: returns the blog whatever its status.
    async fn get_blog(&self, id: i64) -> AppResult<Option<Blog>>;
    async fn create_blog(&self, blogger_id: i64, req: CreateBlogRequest) -> AppResult<Blog>;
    // Partial update via COALESCE. `None` if the blog is missing or deleted.
    async fn update_blog(&self, id: i64, req: UpdateBlogRequest) -> AppResult<Option<Blog>>;
    // Marks the blog deleted. `false` if it was missing or already deleted.
    async fn soft_delete_blog(&self, id: i64) -> AppResult<bool>;

    // --- Comments ---
    async fn add_comment(&self, blog_id: i64, user_id: Uuid, text: String) -> AppResult<Comment>;
    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>>;
    /// Raw accessor: every comment of the blog, deleted ones included.
    async fn get_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>>;
    /// Reader view: only active comments, in posting order.
    async fn get_visible_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>>;
    async fn update_comment(&self, id: i64, text: String) -> AppResult<Option<Comment>>;
    async fn soft_delete_comment(&self, id: i64) -> AppResult<bool>;

    // --- Blogger Requests ---
    // Most recent request submitted by the account.
    async fn latest_request_for_user(&self, user_id: Uuid) -> AppResult<Option<BloggerRequest>>;
    // Inserts a Pending request. A concurrent Pending/Accepted request for the same account
    // is reported as `DuplicateRequest(AlreadyPending)`.
    async fn create_request(
        &self,
        user_id: Uuid,
        form: BloggerRequestForm,
    ) -> AppResult<BloggerRequest>;
    async fn get_request(&self, id: i64) -> AppResult<Option<BloggerRequest>>;
    async fn list_pending_requests(&self, page: PageRequest) -> AppResult<Page<BloggerRequest>>;
    /// Atomically flips a Pending request to Accepted and creates the linked Blogger.
    /// Either both happen or neither does.
    async fn approve_request(&self, id: i64) -> AppResult<ApprovalOutcome>;
    /// Flips a Pending request to Rejected.
    async fn reject_request(&self, id: i64) -> AppResult<BloggerRequest>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;
