use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult, DuplicateReason, FieldErrors},
    models::{
        ApprovalOutcome, Blog, Blogger, BloggerRequest, BloggerRequestForm, Comment,
        ContentStatus, CreateBlogRequest, HomeCounts, NewUser, Page, PageRequest, RequestStatus,
        UpdateBlogRequest, User, UserCredentials,
    },
};

#[derive(Default)]
struct Store {
    users: Vec<(User, String)>,
    bloggers: Vec<Blogger>,
    blogs: Vec<Blog>,
    comments: Vec<Comment>,
    requests: Vec<BloggerRequest>,
    next_id: i64,
    fail_promotions: bool,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn user(&self, id: Uuid) -> Option<User> {
        self.users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| self.with_blogger(u.clone()))
    }

    fn with_blogger(&self, mut user: User) -> User {
        user.blogger_id = self
            .bloggers
            .iter()
            .find(|b| b.user_id == Some(user.id))
            .map(|b| b.id);
        user
    }

    fn username(&self, id: Option<Uuid>) -> Option<String> {
        let id = id?;
        self.users
            .iter()
            .find(|(u, _)| u.id == id)
            .map(|(u, _)| u.username.clone())
    }

    fn comment(&self, comment: &Comment) -> Comment {
        let mut c = comment.clone();
        c.author_username = self.username(c.user_id);
        c
    }

    fn transition_error(&self, id: i64) -> AppError {
        match self.requests.iter().find(|r| r.id == id) {
            Some(request) => AppError::InvalidTransition {
                from: request.status,
            },
            None => AppError::NotFound,
        }
    }
}

fn paginate<T: Clone>(mut rows: Vec<T>, page: PageRequest) -> Page<T> {
    let total = rows.len() as i64;
    let start = page.offset().min(total) as usize;
    let end = (page.offset().saturating_add(page.limit())).min(total) as usize;
    let items = rows.drain(start..end).collect();
    Page::new(items, page, total)
}

fn sorted_blogs<'a>(blogs: impl Iterator<Item = &'a Blog>) -> Vec<Blog> {
    let mut rows: Vec<Blog> = blogs.cloned().collect();
    // Postgres sorts NULL blogger ids after every non-null one.
    rows.sort_by(|a, b| {
        (&a.name, a.blogger_id.is_none(), a.blogger_id, a.id).cmp(&(
            &b.name,
            b.blogger_id.is_none(),
            b.blogger_id,
            b.id,
        ))
    });
    rows
}

/// MemoryRepository
///
/// In-process `Repository` used by the test suites; the binary always runs on Postgres.
/// A single mutex serializes every operation, so each trait method is atomic exactly as the
/// Postgres transaction or constraint it mirrors.
#[derive(Default)]
pub struct MemoryRepository {
    store: Mutex<Store>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("memory store lock poisoned")))
    }

    /// Seeds a blogger profile directly, bypassing the request workflow.
    pub fn seed_blogger(
        &self,
        user_id: Option<Uuid>,
        first_name: &str,
        last_name: &str,
    ) -> AppResult<Blogger> {
        let mut store = self.lock()?;
        let blogger = Blogger {
            id: store.next_id(),
            user_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth: None,
            date_joined: Utc::now().date_naive(),
            bio: String::new(),
        };
        store.bloggers.push(blogger.clone());
        Ok(blogger)
    }

    /// Shifts a comment's creation time into the past.
    pub fn backdate_comment(&self, id: i64, by: Duration) -> AppResult<()> {
        let mut store = self.lock()?;
        let comment = store
            .comments
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(AppError::NotFound)?;
        comment.created_at -= by;
        Ok(())
    }

    /// Makes every subsequent blogger insert fail, to exercise approval rollback.
    pub fn fail_promotions(&self, fail: bool) -> AppResult<()> {
        self.lock()?.fail_promotions = fail;
        Ok(())
    }

    /// Removes an account the way `ON DELETE SET NULL` would.
    pub fn delete_user(&self, id: Uuid) -> AppResult<bool> {
        let mut store = self.lock()?;
        let before = store.users.len();
        store.users.retain(|(u, _)| u.id != id);
        for blogger in store.bloggers.iter_mut().filter(|b| b.user_id == Some(id)) {
            blogger.user_id = None;
        }
        for comment in store.comments.iter_mut().filter(|c| c.user_id == Some(id)) {
            comment.user_id = None;
        }
        for request in store.requests.iter_mut().filter(|r| r.user_id == Some(id)) {
            request.user_id = None;
        }
        Ok(store.users.len() < before)
    }

    /// Hard-deletes a blog; its comments cascade.
    pub fn purge_blog(&self, id: i64) -> AppResult<bool> {
        let mut store = self.lock()?;
        let before = store.blogs.len();
        store.blogs.retain(|b| b.id != id);
        store.comments.retain(|c| c.blog_id != id);
        Ok(store.blogs.len() < before)
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.lock()?.user(id))
    }

    async fn find_credentials(&self, username: &str) -> AppResult<Option<UserCredentials>> {
        let store = self.lock()?;
        Ok(store
            .users
            .iter()
            .find(|(u, _)| u.username == username)
            .map(|(u, hash)| UserCredentials {
                user: store.with_blogger(u.clone()),
                password_hash: hash.clone(),
            }))
    }

    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let mut store = self.lock()?;
        if store.users.iter().any(|(u, _)| u.username == user.username) {
            let mut errors = FieldErrors::new();
            errors.add("username", "A user with that username already exists.");
            return Err(AppError::ValidationFailed(errors));
        }
        let created = User {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            is_editor: user.is_editor,
            blogger_id: None,
            date_joined: Utc::now(),
        };
        store.users.push((created.clone(), user.password_hash));
        Ok(created)
    }

    async fn list_editors(&self) -> AppResult<Vec<User>> {
        let store = self.lock()?;
        let mut editors: Vec<User> = store
            .users
            .iter()
            .filter(|(u, _)| u.is_editor)
            .map(|(u, _)| store.with_blogger(u.clone()))
            .collect();
        editors.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(editors)
    }

    async fn home_counts(&self) -> AppResult<HomeCounts> {
        let store = self.lock()?;
        Ok(HomeCounts {
            num_blogs: store.blogs.iter().filter(|b| b.is_active()).count() as i64,
            num_bloggers: store.bloggers.len() as i64,
            num_comments: store.comments.iter().filter(|c| c.is_active()).count() as i64,
            num_visits: 0,
        })
    }

    async fn list_bloggers(&self, page: PageRequest) -> AppResult<Page<Blogger>> {
        let store = self.lock()?;
        let mut rows = store.bloggers.clone();
        rows.sort_by(|a, b| {
            (&a.last_name, &a.first_name, a.id).cmp(&(&b.last_name, &b.first_name, b.id))
        });
        Ok(paginate(rows, page))
    }

    async fn get_blogger(&self, id: i64) -> AppResult<Option<Blogger>> {
        Ok(self.lock()?.bloggers.iter().find(|b| b.id == id).cloned())
    }

    async fn list_blogs(&self, page: PageRequest) -> AppResult<Page<Blog>> {
        let store = self.lock()?;
        let rows = sorted_blogs(store.blogs.iter().filter(|b| b.is_active()));
        Ok(paginate(rows, page))
    }

    async fn list_blogs_by_blogger(
        &self,
        blogger_id: i64,
        page: PageRequest,
    ) -> AppResult<Page<Blog>> {
        let store = self.lock()?;
        let rows = sorted_blogs(
            store
                .blogs
                .iter()
                .filter(|b| b.is_active() && b.blogger_id == Some(blogger_id)),
        );
        Ok(paginate(rows, page))
    }

    async fn get_active_blog(&self, id: i64) -> AppResult<Option<Blog>> {
        Ok(self
            .lock()?
            .blogs
            .iter()
            .find(|b| b.id == id && b.is_active())
            .cloned())
    }

    async fn get_blog(&self, id: i64) -> AppResult<Option<Blog>> {
        Ok(self.lock()?.blogs.iter().find(|b| b.id == id).cloned())
    }

    async fn create_blog(&self, blogger_id: i64, req: CreateBlogRequest) -> AppResult<Blog> {
        let mut store = self.lock()?;
        let blog = Blog {
            id: store.next_id(),
            name: req.name,
            blogger_id: Some(blogger_id),
            description: req.description,
            time_of_upload: Utc::now(),
            date_uploaded: req.date_uploaded,
            status: ContentStatus::Active,
        };
        store.blogs.push(blog.clone());
        Ok(blog)
    }

    async fn update_blog(&self, id: i64, req: UpdateBlogRequest) -> AppResult<Option<Blog>> {
        let mut store = self.lock()?;
        let Some(blog) = store
            .blogs
            .iter_mut()
            .find(|b| b.id == id && b.is_active())
        else {
            return Ok(None);
        };
        if let Some(name) = req.name {
            blog.name = name;
        }
        if let Some(description) = req.description {
            blog.description = description;
        }
        Ok(Some(blog.clone()))
    }

    async fn soft_delete_blog(&self, id: i64) -> AppResult<bool> {
        let mut store = self.lock()?;
        match store
            .blogs
            .iter_mut()
            .find(|b| b.id == id && b.is_active())
        {
            Some(blog) => {
                blog.status = ContentStatus::Deleted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_comment(&self, blog_id: i64, user_id: Uuid, text: String) -> AppResult<Comment> {
        let mut store = self.lock()?;
        if !store.blogs.iter().any(|b| b.id == blog_id && b.is_active()) {
            return Err(AppError::NotFound);
        }
        let comment = Comment {
            id: store.next_id(),
            user_id: Some(user_id),
            blog_id,
            comment: text,
            created_at: Utc::now(),
            status: ContentStatus::Active,
            author_username: None,
        };
        store.comments.push(comment.clone());
        Ok(store.comment(&comment))
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let store = self.lock()?;
        Ok(store
            .comments
            .iter()
            .find(|c| c.id == id)
            .map(|c| store.comment(c)))
    }

    async fn get_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>> {
        let store = self.lock()?;
        let mut rows: Vec<Comment> = store
            .comments
            .iter()
            .filter(|c| c.blog_id == blog_id)
            .map(|c| store.comment(c))
            .collect();
        rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        Ok(rows)
    }

    async fn get_visible_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>> {
        let mut rows = self.get_comments(blog_id).await?;
        rows.retain(Comment::is_active);
        Ok(rows)
    }

    async fn update_comment(&self, id: i64, text: String) -> AppResult<Option<Comment>> {
        let mut store = self.lock()?;
        let Some(comment) = store
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.is_active())
        else {
            return Ok(None);
        };
        comment.comment = text;
        let updated = comment.clone();
        Ok(Some(store.comment(&updated)))
    }

    async fn soft_delete_comment(&self, id: i64) -> AppResult<bool> {
        let mut store = self.lock()?;
        match store
            .comments
            .iter_mut()
            .find(|c| c.id == id && c.is_active())
        {
            Some(comment) => {
                comment.status = ContentStatus::Deleted;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn latest_request_for_user(&self, user_id: Uuid) -> AppResult<Option<BloggerRequest>> {
        let store = self.lock()?;
        Ok(store
            .requests
            .iter()
            .filter(|r| r.user_id == Some(user_id))
            .max_by_key(|r| (r.request_date, r.id))
            .cloned())
    }

    async fn create_request(
        &self,
        user_id: Uuid,
        form: BloggerRequestForm,
    ) -> AppResult<BloggerRequest> {
        let mut store = self.lock()?;
        // Mirrors the partial unique index on open requests.
        let open = store.requests.iter().any(|r| {
            r.user_id == Some(user_id)
                && matches!(r.status, RequestStatus::Pending | RequestStatus::Accepted)
        });
        if open {
            return Err(AppError::DuplicateRequest(DuplicateReason::AlreadyPending));
        }
        let request = BloggerRequest {
            id: store.next_id(),
            user_id: Some(user_id),
            first_name: form.first_name,
            last_name: form.last_name,
            date_of_birth: form.date_of_birth,
            bio: form.bio,
            request_date: Utc::now(),
            status: RequestStatus::Pending,
        };
        store.requests.push(request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: i64) -> AppResult<Option<BloggerRequest>> {
        Ok(self.lock()?.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list_pending_requests(&self, page: PageRequest) -> AppResult<Page<BloggerRequest>> {
        let store = self.lock()?;
        let mut rows: Vec<BloggerRequest> = store
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.request_date, a.id).cmp(&(b.request_date, b.id)));
        Ok(paginate(rows, page))
    }

    async fn approve_request(&self, id: i64) -> AppResult<ApprovalOutcome> {
        let mut store = self.lock()?;
        let Some(index) = store
            .requests
            .iter()
            .position(|r| r.id == id && r.status == RequestStatus::Pending)
        else {
            return Err(store.transition_error(id));
        };

        // Validate the promotion before mutating anything, so a failure leaves the
        // request Pending.
        let Some(user_id) = store.requests[index].user_id else {
            return Err(AppError::PromotionFailed(
                "the requesting account no longer exists",
            ));
        };
        if store.bloggers.iter().any(|b| b.user_id == Some(user_id)) {
            return Err(AppError::PromotionFailed(
                "the requesting account is already a blogger",
            ));
        }
        if store.fail_promotions {
            return Err(AppError::Internal(anyhow::anyhow!(
                "simulated blogger insert failure"
            )));
        }

        let blogger_id = store.next_id();
        let request = &mut store.requests[index];
        request.status = RequestStatus::Accepted;
        let request = request.clone();
        let blogger = Blogger {
            id: blogger_id,
            user_id: Some(user_id),
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            date_of_birth: request.date_of_birth,
            date_joined: Utc::now().date_naive(),
            bio: request.bio.clone(),
        };
        store.bloggers.push(blogger.clone());
        Ok(ApprovalOutcome { request, blogger })
    }

    async fn reject_request(&self, id: i64) -> AppResult<BloggerRequest> {
        let mut store = self.lock()?;
        let Some(index) = store
            .requests
            .iter()
            .position(|r| r.id == id && r.status == RequestStatus::Pending)
        else {
            return Err(store.transition_error(id));
        };
        let request = &mut store.requests[index];
        request.status = RequestStatus::Rejected;
        Ok(request.clone())
    }
}
