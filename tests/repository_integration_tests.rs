//! Postgres-backed repository tests.
//!
//! Ignored by default; run with `DATABASE_URL` pointing at a disposable database:
//! `cargo test --test repository_integration_tests -- --ignored`

use miniblog::{
    AppError,
    error::DuplicateReason,
    models::{
        Blogger, BloggerRequestForm, CreateBlogRequest, NewUser, PageRequest, RequestStatus,
        UpdateBlogRequest, User,
    },
    repository::{PostgresRepository, Repository},
    session,
};
use sqlx::PgPool;
use tower_sessions::{
    ExpiredDeletion, SessionStore,
    cookie::time::{Duration, OffsetDateTime},
    session::{Id, Record},
};
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        let context = DbTestContext { pool };
        context
            .repository()
            .migrate()
            .await
            .expect("Failed to run database migrations.");
        context
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Usernames are unique per run so tests can share one database.
async fn create_test_user(repo: &PostgresRepository, is_editor: bool) -> User {
    let username = format!("user_{}", Uuid::new_v4().simple());
    repo.create_user(NewUser {
        email: format!("{username}@test.com"),
        username,
        password_hash: "$argon2id$v=19$placeholder".to_string(),
        is_editor,
    })
    .await
    .expect("Failed to create test user")
}

fn request_form() -> BloggerRequestForm {
    BloggerRequestForm {
        first_name: "Pat".to_string(),
        last_name: "Postgres".to_string(),
        bio: "Relational at heart.".to_string(),
        date_of_birth: None,
    }
}

/// Promotes a fresh account through the request workflow's storage operations.
async fn create_test_blogger(repo: &PostgresRepository) -> (User, Blogger) {
    let user = create_test_user(repo, false).await;
    let request = repo.create_request(user.id, request_form()).await.unwrap();
    let outcome = repo.approve_request(request.id).await.unwrap();
    (user, outcome.blogger)
}

// --- Tests ---

#[tokio::test]
#[ignore]
async fn test_user_round_trip_and_duplicate_username() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let user = create_test_user(&repo, true).await;
    let fetched = repo.get_user(user.id).await.unwrap().unwrap();
    assert_eq!(fetched.username, user.username);
    assert!(fetched.is_editor);
    assert_eq!(fetched.blogger_id, None);

    let creds = repo.find_credentials(&user.username).await.unwrap().unwrap();
    assert_eq!(creds.user.id, user.id);
    assert!(creds.password_hash.starts_with("$argon2id$"));

    let duplicate = repo
        .create_user(NewUser {
            username: user.username.clone(),
            email: "other@test.com".to_string(),
            password_hash: String::new(),
            is_editor: false,
        })
        .await;
    match duplicate {
        Err(AppError::ValidationFailed(fields)) => assert!(fields.contains("username")),
        other => panic!("expected ValidationFailed, got {other:?}"),
    }

    let editors = repo.list_editors().await.unwrap();
    assert!(editors.iter().any(|e| e.id == user.id));
}

#[tokio::test]
#[ignore]
async fn test_blog_soft_delete_and_partial_update() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let (_, blogger) = create_test_blogger(&repo).await;

    let blog = repo
        .create_blog(
            blogger.id,
            CreateBlogRequest {
                name: "Integration".to_string(),
                description: "Original".to_string(),
                date_uploaded: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(blog.blogger_id, Some(blogger.id));

    let updated = repo
        .update_blog(
            blog.id,
            UpdateBlogRequest {
                name: Some("Renamed".to_string()),
                description: None,
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.description, "Original");

    assert!(repo.soft_delete_blog(blog.id).await.unwrap());
    assert!(!repo.soft_delete_blog(blog.id).await.unwrap());
    assert!(repo.get_active_blog(blog.id).await.unwrap().is_none());
    assert!(
        repo.update_blog(blog.id, UpdateBlogRequest::default())
            .await
            .unwrap()
            .is_none()
    );

    let by_blogger = repo
        .list_blogs_by_blogger(blogger.id, PageRequest::new(None))
        .await
        .unwrap();
    assert_eq!(by_blogger.total, 0);
    assert!(by_blogger.items.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_comment_visibility_asymmetry() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let (_, blogger) = create_test_blogger(&repo).await;
    let reader = create_test_user(&repo, false).await;
    let blog = repo
        .create_blog(
            blogger.id,
            CreateBlogRequest {
                name: "Comments".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let kept = repo
        .add_comment(blog.id, reader.id, "kept".to_string())
        .await
        .unwrap();
    let removed = repo
        .add_comment(blog.id, reader.id, "removed".to_string())
        .await
        .unwrap();
    assert_eq!(kept.author_username.as_deref(), Some(reader.username.as_str()));

    assert!(repo.soft_delete_comment(removed.id).await.unwrap());
    assert!(
        repo.update_comment(removed.id, "revived".to_string())
            .await
            .unwrap()
            .is_none()
    );

    let visible = repo.get_visible_comments(blog.id).await.unwrap();
    assert_eq!(visible.iter().map(|c| c.id).collect::<Vec<_>>(), vec![kept.id]);

    let raw = repo.get_comments(blog.id).await.unwrap();
    assert_eq!(raw.len(), 2);
}

#[tokio::test]
#[ignore]
async fn test_comment_insert_guards_on_blog_status() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let (_, blogger) = create_test_blogger(&repo).await;
    let reader = create_test_user(&repo, false).await;
    let blog = repo
        .create_blog(
            blogger.id,
            CreateBlogRequest {
                name: "Closing".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(repo.soft_delete_blog(blog.id).await.unwrap());

    let result = repo.add_comment(blog.id, reader.id, "too late".to_string()).await;
    assert!(matches!(result, Err(AppError::NotFound)));
    assert!(repo.get_comments(blog.id).await.unwrap().is_empty());

    // Moderation still sees the deleted blog; an unknown id does not exist at all.
    assert!(repo.get_blog(blog.id).await.unwrap().is_some());
    assert!(repo.get_blog(i64::MAX).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
async fn test_open_request_unique_per_user() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, false).await;

    let first = repo.create_request(user.id, request_form()).await.unwrap();
    assert_eq!(first.status, RequestStatus::Pending);

    match repo.create_request(user.id, request_form()).await {
        Err(AppError::DuplicateRequest(reason)) => {
            assert_eq!(reason, DuplicateReason::AlreadyPending)
        }
        other => panic!("expected DuplicateRequest, got {other:?}"),
    }

    // A rejected request frees the slot at the storage level.
    repo.reject_request(first.id).await.unwrap();
    let second = repo.create_request(user.id, request_form()).await.unwrap();
    let latest = repo.latest_request_for_user(user.id).await.unwrap().unwrap();
    assert_eq!(latest.id, second.id);
}

#[tokio::test]
#[ignore]
async fn test_approve_is_transactional_and_single_shot() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, false).await;
    let request = repo.create_request(user.id, request_form()).await.unwrap();

    let outcome = repo.approve_request(request.id).await.unwrap();
    assert_eq!(outcome.request.status, RequestStatus::Accepted);
    assert_eq!(outcome.blogger.user_id, Some(user.id));
    assert_eq!(
        repo.get_user(user.id).await.unwrap().unwrap().blogger_id,
        Some(outcome.blogger.id)
    );

    match repo.approve_request(request.id).await {
        Err(AppError::InvalidTransition { from }) => assert_eq!(from, RequestStatus::Accepted),
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
    match repo.reject_request(request.id).await {
        Err(AppError::InvalidTransition { from }) => assert_eq!(from, RequestStatus::Accepted),
        other => panic!("expected InvalidTransition, got {other:?}"),
    }
}

#[tokio::test]
#[ignore]
async fn test_concurrent_approvals_promote_once() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, false).await;
    let request = repo.create_request(user.id, request_form()).await.unwrap();

    let other = ctx.repository();
    let (a, b) = tokio::join!(
        repo.approve_request(request.id),
        other.approve_request(request.id)
    );

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let bloggers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bloggers WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(bloggers, 1);
}

#[tokio::test]
#[ignore]
async fn test_approval_rolls_back_when_requester_is_gone() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let user = create_test_user(&repo, false).await;
    let request = repo.create_request(user.id, request_form()).await.unwrap();

    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user.id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let result = repo.approve_request(request.id).await;
    assert!(matches!(result, Err(AppError::PromotionFailed(_))));

    let stored = repo.get_request(request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RequestStatus::Pending);
    assert_eq!(stored.user_id, None);
}

#[tokio::test]
#[ignore]
async fn test_session_store_sweeps_expired_records() {
    let ctx = DbTestContext::setup().await;
    let (store, sweeper) = session::postgres_store(ctx.pool.clone()).await.unwrap();
    sweeper.abort();

    let mut expired = Record {
        id: Id::default(),
        data: Default::default(),
        expiry_date: OffsetDateTime::now_utc() - Duration::minutes(1),
    };
    let mut live = Record {
        id: Id::default(),
        data: Default::default(),
        expiry_date: OffsetDateTime::now_utc() + Duration::hours(1),
    };
    store.create(&mut expired).await.unwrap();
    store.create(&mut live).await.unwrap();

    store.delete_expired().await.unwrap();

    let stored = |id: String| {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tower_sessions.session WHERE id = $1")
            .bind(id)
            .fetch_one(&ctx.pool)
    };
    assert_eq!(stored(expired.id.to_string()).await.unwrap(), 0);
    assert_eq!(stored(live.id.to_string()).await.unwrap(), 1);
}
