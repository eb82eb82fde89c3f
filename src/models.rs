use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Number of items returned by every paginated listing.
pub const PAGE_SIZE: i64 = 5;

/// Number of characters kept by `Comment::preview` before truncating.
const COMMENT_PREVIEW_LEN: usize = 75;

// --- Status Enums (Mapped to Postgres enum types) ---

/// ContentStatus
///
/// Soft-delete marker shared by blogs and comments. A `Deleted` row is retained in storage
/// but hidden from every reader-facing query.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "content_status", rename_all = "lowercase")]
pub enum ContentStatus {
    #[default]
    Active,
    Deleted,
}

/// RequestStatus
///
/// Lifecycle of a request to become a blogger. `Accepted` and `Rejected` are terminal;
/// transitions are driven through `RequestStatus::apply` in the workflow module.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema, sqlx::Type,
)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
pub enum RequestStatus {
    Accepted,
    #[default]
    Pending,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RequestStatus::Accepted => "Accepted",
            RequestStatus::Pending => "Pending",
            RequestStatus::Rejected => "Rejected",
        };
        f.write_str(label)
    }
}

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// A reader account from the `users` table. `blogger_id` is resolved with a LEFT JOIN on
/// `bloggers` and is `Some` once the account has been promoted. `is_editor` marks
/// membership in the Editors group, which may review blogger requests.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_editor: bool,
    #[sqlx(default)]
    pub blogger_id: Option<i64>,
    #[ts(type = "string")]
    pub date_joined: DateTime<Utc>,
}

/// UserCredentials
///
/// Internal login row. The password hash never leaves the repository/auth boundary.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// NewUser
///
/// A validated signup, already carrying the Argon2 hash.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_editor: bool,
}

/// Blogger
///
/// An account with publishing rights. Rows are only created by approving a
/// `BloggerRequest`. `user_id` is nulled if the linked account is removed.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Blogger {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    #[ts(type = "string")]
    pub date_joined: NaiveDate,
    pub bio: String,
}

impl Blogger {
    /// "Last, First", the form used in listings.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// Blog
///
/// A post from the `blogs` table. Listings are ordered by `(name, blogger_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Blog {
    pub id: i64,
    pub name: String,
    pub blogger_id: Option<i64>,
    pub description: String,
    #[ts(type = "string")]
    pub time_of_upload: DateTime<Utc>,
    #[ts(type = "string | null")]
    pub date_uploaded: Option<NaiveDate>,
    pub status: ContentStatus,
}

impl Blog {
    pub fn is_active(&self) -> bool {
        self.status == ContentStatus::Active
    }
}

/// Comment
///
/// A reader comment from the `comments` table, joined with the author's username.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub blog_id: i64,
    pub comment: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub status: ContentStatus,
    // Loaded via a JOIN on users.
    #[sqlx(default)]
    pub author_username: Option<String>,
}

impl Comment {
    pub fn is_active(&self) -> bool {
        self.status == ContentStatus::Active
    }

    /// First 75 characters of the text, with an ellipsis when truncated.
    pub fn preview(&self) -> String {
        if self.comment.chars().count() > COMMENT_PREVIEW_LEN {
            let head: String = self.comment.chars().take(COMMENT_PREVIEW_LEN).collect();
            format!("{head}...")
        } else {
            self.comment.clone()
        }
    }
}

/// BloggerRequest
///
/// A reader's request to be promoted to blogger, from the `blogger_requests` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default, PartialEq)]
#[ts(export)]
pub struct BloggerRequest {
    pub id: i64,
    pub user_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: String,
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
    pub bio: String,
    #[ts(type = "string")]
    pub request_date: DateTime<Utc>,
    pub status: RequestStatus,
}

// --- Request Payloads (Input Schemas) ---

/// SignupRequest
///
/// Input payload for account creation (POST /signup/).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

/// LoginRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// LoginResponse
///
/// Bearer token to be sent in the `Authorization` header of authenticated calls.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// CreateBlogRequest
///
/// Payload for POST /create-blog/. The owning blogger is never taken from the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateBlogRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub date_uploaded: Option<NaiveDate>,
}

/// UpdateBlogRequest
///
/// Partial update for POST /edit-blog/. Absent fields keep their stored value.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct UpdateBlogRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// CreateCommentRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    pub comment: String,
}

/// EditCommentRequest
///
/// Payload for POST /blogs/{id}/comment-edit. The comment must belong to the blog in the path.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct EditCommentRequest {
    pub comment_id: i64,
    pub comment: String,
}

/// DeleteCommentRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct DeleteCommentRequest {
    pub comment_id: i64,
}

/// BloggerRequestForm
///
/// Payload for POST /request-to-be-blogger/.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct BloggerRequestForm {
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub date_of_birth: Option<NaiveDate>,
}

// --- Pagination ---

/// PageQuery
///
/// `?page=` query parameter shared by every listing. Pages are 1-based.
#[derive(Debug, Clone, Copy, Deserialize, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// 1-based page number; defaults to 1.
    pub page: Option<i64>,
}

/// IdQuery
///
/// `?id=` query parameter used by the blog CRUD and request review endpoints.
#[derive(Debug, Clone, Copy, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct IdQuery {
    pub id: i64,
}

/// PageRequest
///
/// A normalized page selection. Page numbers below 1 are clamped to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
}

impl PageRequest {
    pub fn new(page: Option<i64>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
        }
    }

    pub fn limit(&self) -> i64 {
        PAGE_SIZE
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(PAGE_SIZE)
    }
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(query.page)
    }
}

/// Page
///
/// One page of a listing. Requesting past the end yields an empty `items` list.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: i64) -> Self {
        let has_next = request.offset() + (items.len() as i64) < total;
        Self {
            items,
            page: request.page,
            per_page: request.limit(),
            total,
            has_next,
        }
    }
}

// --- View Schemas (Output) ---

/// HomeCounts
///
/// Output schema for GET /. `num_visits` is the per-session count before this visit.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[ts(export)]
pub struct HomeCounts {
    pub num_blogs: i64,
    pub num_bloggers: i64,
    pub num_comments: i64,
    pub num_visits: i64,
}

/// CommentView
///
/// A visible comment annotated with what the viewing account may do with it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub editable: bool,
    pub deletable: bool,
}

/// BlogDetail
///
/// Output schema for GET /blogs/{id}: the blog, its author and its non-deleted comments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BlogDetail {
    pub blog: Blog,
    pub blogger: Option<Blogger>,
    pub comments: Vec<CommentView>,
}

/// BloggerBlogs
///
/// Output schema for GET /blogs/{id}/blogger/.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BloggerBlogs {
    pub blogger: Blogger,
    pub blogs: Page<Blog>,
}

/// ApprovalOutcome
///
/// Result of approving a request: the accepted request and the blogger it produced.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ApprovalOutcome {
    pub request: BloggerRequest,
    pub blogger: Blogger,
}
