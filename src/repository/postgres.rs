use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::Repository;
use crate::{
    error::{AppError, AppResult, DuplicateReason, FieldErrors},
    models::{
        ApprovalOutcome, Blog, Blogger, BloggerRequest, BloggerRequestForm, Comment,
        CreateBlogRequest, HomeCounts, NewUser, Page, PageRequest, UpdateBlogRequest, User,
        UserCredentials,
    },
};

/// PostgresRepository
///
/// The `Repository` implementation backed by PostgreSQL. Queries are built at runtime with
/// `query_as` so the crate compiles without a live database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn count(&self, sql: &str) -> AppResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Current status of a request that a guarded update did not touch.
    async fn transition_error(&self, id: i64) -> AppError {
        match self.get_request(id).await {
            Ok(Some(request)) => AppError::InvalidTransition {
                from: request.status,
            },
            Ok(None) => AppError::NotFound,
            Err(e) => e,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

const USER_SELECT: &str = r#"
    SELECT u.id, u.username, u.email, u.is_editor, u.date_joined, b.id AS blogger_id
    FROM users u
    LEFT JOIN bloggers b ON b.user_id = u.id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.user_id, c.blog_id, c.comment, c.created_at, c.status,
           u.username AS author_username
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id
"#;

#[derive(sqlx::FromRow)]
struct CredentialRow {
    #[sqlx(flatten)]
    user: User,
    password_hash: String,
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// Resolves the account together with its blogger id, used on every authenticated request.
    async fn get_user(&self, id: Uuid) -> AppResult<Option<User>> {
        let sql = format!("{USER_SELECT} WHERE u.id = $1");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_credentials(&self, username: &str) -> AppResult<Option<UserCredentials>> {
        let row = sqlx::query_as::<_, CredentialRow>(
            r#"
            SELECT u.id, u.username, u.email, u.is_editor, u.date_joined,
                   b.id AS blogger_id, u.password_hash
            FROM users u
            LEFT JOIN bloggers b ON b.user_id = u.id
            WHERE u.username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| UserCredentials {
            user: r.user,
            password_hash: r.password_hash,
        }))
    }

    /// create_user
    ///
    /// Inserts the account. The `users.username` unique constraint decides collisions.
    async fn create_user(&self, user: NewUser) -> AppResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password_hash, is_editor, date_joined)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id, username, email, is_editor, date_joined, NULL::BIGINT AS blogger_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.is_editor)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(created) => Ok(created),
            Err(e) if is_unique_violation(&e) => {
                let mut errors = FieldErrors::new();
                errors.add("username", "A user with that username already exists.");
                Err(AppError::ValidationFailed(errors))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_editors(&self) -> AppResult<Vec<User>> {
        let sql = format!("{USER_SELECT} WHERE u.is_editor = true ORDER BY u.username");
        Ok(sqlx::query_as::<_, User>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    /// home_counts
    ///
    /// Counts only what readers can see: active blogs and active comments.
    async fn home_counts(&self) -> AppResult<HomeCounts> {
        let num_blogs = self
            .count("SELECT COUNT(*) FROM blogs WHERE status = 'active'")
            .await?;
        let num_bloggers = self.count("SELECT COUNT(*) FROM bloggers").await?;
        let num_comments = self
            .count("SELECT COUNT(*) FROM comments WHERE status = 'active'")
            .await?;
        Ok(HomeCounts {
            num_blogs,
            num_bloggers,
            num_comments,
            num_visits: 0,
        })
    }

    // --- BLOGGERS ---

    async fn list_bloggers(&self, page: PageRequest) -> AppResult<Page<Blogger>> {
        let total = self.count("SELECT COUNT(*) FROM bloggers").await?;
        let items = sqlx::query_as::<_, Blogger>(
            r#"
            SELECT id, user_id, first_name, last_name, date_of_birth, date_joined, bio
            FROM bloggers
            ORDER BY last_name, first_name, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, page, total))
    }

    async fn get_blogger(&self, id: i64) -> AppResult<Option<Blogger>> {
        Ok(sqlx::query_as::<_, Blogger>(
            r#"
            SELECT id, user_id, first_name, last_name, date_of_birth, date_joined, bio
            FROM bloggers WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    // --- BLOGS ---

    /// list_blogs
    ///
    /// **Visibility**: strictly `WHERE status = 'active'`, ordered by `(name, blogger_id)`.
    async fn list_blogs(&self, page: PageRequest) -> AppResult<Page<Blog>> {
        let total = self
            .count("SELECT COUNT(*) FROM blogs WHERE status = 'active'")
            .await?;
        let items = sqlx::query_as::<_, Blog>(
            r#"
            SELECT id, name, blogger_id, description, time_of_upload, date_uploaded, status
            FROM blogs
            WHERE status = 'active'
            ORDER BY name, blogger_id, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, page, total))
    }

    async fn list_blogs_by_blogger(
        &self,
        blogger_id: i64,
        page: PageRequest,
    ) -> AppResult<Page<Blog>> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM blogs WHERE blogger_id = $1 AND status = 'active'",
        )
        .bind(blogger_id)
        .fetch_one(&self.pool)
        .await?;
        let items = sqlx::query_as::<_, Blog>(
            r#"
            SELECT id, name, blogger_id, description, time_of_upload, date_uploaded, status
            FROM blogs
            WHERE blogger_id = $1 AND status = 'active'
            ORDER BY name, blogger_id, id
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(blogger_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, page, total))
    }

    async fn get_active_blog(&self, id: i64) -> AppResult<Option<Blog>> {
        Ok(sqlx::query_as::<_, Blog>(
            r#"
            SELECT id, name, blogger_id, description, time_of_upload, date_uploaded, status
            FROM blogs WHERE id = $1 AND status = 'active'
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn get_blog(&self, id: i64) -> AppResult<Option<Blog>> {
        Ok(sqlx::query_as::<_, Blog>(
            r#"
            SELECT id, name, blogger_id, description, time_of_upload, date_uploaded, status
            FROM blogs WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn create_blog(&self, blogger_id: i64, req: CreateBlogRequest) -> AppResult<Blog> {
        Ok(sqlx::query_as::<_, Blog>(
            r#"
            INSERT INTO blogs (name, blogger_id, description, date_uploaded)
            VALUES ($1, $2, $3, $4)
            RETURNING id, name, blogger_id, description, time_of_upload, date_uploaded, status
            "#,
        )
        .bind(req.name)
        .bind(blogger_id)
        .bind(req.description)
        .bind(req.date_uploaded)
        .fetch_one(&self.pool)
        .await?)
    }

    /// update_blog
    ///
    /// `COALESCE` keeps columns whose field is `None`. Deleted blogs are never updated.
    async fn update_blog(&self, id: i64, req: UpdateBlogRequest) -> AppResult<Option<Blog>> {
        Ok(sqlx::query_as::<_, Blog>(
            r#"
            UPDATE blogs
            SET name = COALESCE($2, name),
                description = COALESCE($3, description)
            WHERE id = $1 AND status = 'active'
            RETURNING id, name, blogger_id, description, time_of_upload, date_uploaded, status
            "#,
        )
        .bind(id)
        .bind(req.name)
        .bind(req.description)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn soft_delete_blog(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE blogs SET status = 'deleted' WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- COMMENTS ---

    /// add_comment
    ///
    /// Inserts and joins the author's username in one statement through a CTE. The insert
    /// selects from the blog row under `FOR SHARE`, so a blog soft-deleted concurrently
    /// yields no row and the call reports `NotFound`.
    async fn add_comment(&self, blog_id: i64, user_id: Uuid, text: String) -> AppResult<Comment> {
        sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (blog_id, user_id, comment)
                SELECT b.id, $2, $3
                FROM blogs b
                WHERE b.id = $1 AND b.status = 'active'
                FOR SHARE
                RETURNING id, user_id, blog_id, comment, created_at, status
            )
            SELECT i.id, i.user_id, i.blog_id, i.comment, i.created_at, i.status,
                   u.username AS author_username
            FROM inserted i LEFT JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(blog_id)
        .bind(user_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound)
    }

    async fn get_comment(&self, id: i64) -> AppResult<Option<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>> {
        let sql = format!("{COMMENT_SELECT} WHERE c.blog_id = $1 ORDER BY c.created_at, c.id");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(blog_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn get_visible_comments(&self, blog_id: i64) -> AppResult<Vec<Comment>> {
        let sql = format!(
            "{COMMENT_SELECT} WHERE c.blog_id = $1 AND c.status = 'active' \
             ORDER BY c.created_at, c.id"
        );
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(blog_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_comment(&self, id: i64, text: String) -> AppResult<Option<Comment>> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH updated AS (
                UPDATE comments SET comment = $2
                WHERE id = $1 AND status = 'active'
                RETURNING id, user_id, blog_id, comment, created_at, status
            )
            SELECT d.id, d.user_id, d.blog_id, d.comment, d.created_at, d.status,
                   u.username AS author_username
            FROM updated d LEFT JOIN users u ON u.id = d.user_id
            "#,
        )
        .bind(id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn soft_delete_comment(&self, id: i64) -> AppResult<bool> {
        let res = sqlx::query(
            "UPDATE comments SET status = 'deleted' WHERE id = $1 AND status = 'active'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    // --- BLOGGER REQUESTS ---

    async fn latest_request_for_user(&self, user_id: Uuid) -> AppResult<Option<BloggerRequest>> {
        Ok(sqlx::query_as::<_, BloggerRequest>(
            r#"
            SELECT id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            FROM blogger_requests
            WHERE user_id = $1
            ORDER BY request_date DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// create_request
    ///
    /// The partial unique index on `(user_id) WHERE status IN ('pending', 'accepted')`
    /// closes the check-then-insert race between two concurrent submissions.
    async fn create_request(
        &self,
        user_id: Uuid,
        form: BloggerRequestForm,
    ) -> AppResult<BloggerRequest> {
        let result = sqlx::query_as::<_, BloggerRequest>(
            r#"
            INSERT INTO blogger_requests
                (user_id, first_name, last_name, date_of_birth, bio, request_date, status)
            VALUES ($1, $2, $3, $4, $5, NOW(), 'pending')
            RETURNING id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            "#,
        )
        .bind(user_id)
        .bind(form.first_name)
        .bind(form.last_name)
        .bind(form.date_of_birth)
        .bind(form.bio)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(request) => Ok(request),
            Err(e) if is_unique_violation(&e) => {
                Err(AppError::DuplicateRequest(DuplicateReason::AlreadyPending))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_request(&self, id: i64) -> AppResult<Option<BloggerRequest>> {
        Ok(sqlx::query_as::<_, BloggerRequest>(
            r#"
            SELECT id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            FROM blogger_requests WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_pending_requests(&self, page: PageRequest) -> AppResult<Page<BloggerRequest>> {
        let total = self
            .count("SELECT COUNT(*) FROM blogger_requests WHERE status = 'pending'")
            .await?;
        let items = sqlx::query_as::<_, BloggerRequest>(
            r#"
            SELECT id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            FROM blogger_requests
            WHERE status = 'pending'
            ORDER BY request_date, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(Page::new(items, page, total))
    }

    /// approve_request
    ///
    /// One transaction: the status-guarded UPDATE only matches a Pending row, so two
    /// concurrent approvals cannot both succeed; the Blogger insert runs in the same
    /// transaction and any failure rolls the status back to Pending.
    async fn approve_request(&self, id: i64) -> AppResult<ApprovalOutcome> {
        let mut tx = self.pool.begin().await?;

        let accepted = sqlx::query_as::<_, BloggerRequest>(
            r#"
            UPDATE blogger_requests SET status = 'accepted'
            WHERE id = $1 AND status = 'pending'
            RETURNING id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(request) = accepted else {
            tx.rollback().await?;
            return Err(self.transition_error(id).await);
        };

        let Some(user_id) = request.user_id else {
            tx.rollback().await?;
            return Err(AppError::PromotionFailed(
                "the requesting account no longer exists",
            ));
        };

        let inserted = sqlx::query_as::<_, Blogger>(
            r#"
            INSERT INTO bloggers (user_id, first_name, last_name, date_of_birth, date_joined, bio)
            VALUES ($1, $2, $3, $4, CURRENT_DATE, $5)
            RETURNING id, user_id, first_name, last_name, date_of_birth, date_joined, bio
            "#,
        )
        .bind(user_id)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.date_of_birth)
        .bind(&request.bio)
        .fetch_one(&mut *tx)
        .await;

        let blogger = match inserted {
            Ok(blogger) => blogger,
            Err(e) => {
                tx.rollback().await?;
                if is_unique_violation(&e) {
                    return Err(AppError::PromotionFailed(
                        "the requesting account is already a blogger",
                    ));
                }
                return Err(e.into());
            }
        };

        tx.commit().await?;
        Ok(ApprovalOutcome { request, blogger })
    }

    async fn reject_request(&self, id: i64) -> AppResult<BloggerRequest> {
        let rejected = sqlx::query_as::<_, BloggerRequest>(
            r#"
            UPDATE blogger_requests SET status = 'rejected'
            WHERE id = $1 AND status = 'pending'
            RETURNING id, user_id, first_name, last_name, date_of_birth, bio, request_date, status
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match rejected {
            Some(request) => Ok(request),
            None => Err(self.transition_error(id).await),
        }
    }
}
