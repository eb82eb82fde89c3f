use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, Uri, header, request::Parts},
};
use miniblog::{
    AppError, AppState, MemoryRepository, MockMailer,
    auth::{self, AuthUser, Claims},
    config::{AppConfig, Env},
    models::{NewUser, User},
    repository::Repository,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

const TEST_JWT_SECRET: &str = "test-secret-for-auth-extractor";

// --- Helpers ---

fn create_token(user_id: Uuid, secret: &str, offset_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + offset_secs) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn create_app_state(env: Env, repo: Arc<MemoryRepository>) -> AppState {
    let mut config = AppConfig::default();
    config.env = env;
    config.jwt_secret = TEST_JWT_SECRET.to_string();

    AppState {
        repo,
        mailer: Arc::new(MockMailer::new()),
        config,
    }
}

async fn seed_user(repo: &MemoryRepository, username: &str, is_editor: bool) -> User {
    repo.create_user(NewUser {
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: auth::hash_password("correct horse battery").unwrap(),
        is_editor,
    })
    .await
    .unwrap()
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "alice", false).await;
    let app_state = create_app_state(Env::Production, repo);

    let token = create_token(user.id, TEST_JWT_SECRET, 3600);
    let mut parts = get_request_parts(Method::GET, "/blogs/1".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.username, "alice");
    assert!(!auth_user.is_editor);
    assert_eq!(auth_user.blogger_id, None);
}

#[tokio::test]
async fn test_issued_token_round_trips_through_extractor() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "editor", true).await;
    let app_state = create_app_state(Env::Production, repo);

    let (token, expires_in) = auth::issue_token(&app_state.config, user.id).unwrap();
    assert_eq!(expires_in, app_state.config.jwt_ttl_secs);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert!(auth_user.is_editor);
}

#[tokio::test]
async fn test_promotion_is_visible_on_next_request() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "writer", false).await;
    let blogger = repo.seed_blogger(Some(user.id), "Wendy", "Writer").unwrap();
    let app_state = create_app_state(Env::Production, repo);

    let token = create_token(user.id, TEST_JWT_SECRET, 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.blogger_id, Some(blogger.id));
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/bloggers/".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();

    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    match err {
        AppError::Unauthenticated { next } => assert_eq!(next.as_deref(), Some("/bloggers/")),
        other => panic!("expected Unauthenticated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auth_failure_keeps_query_in_next() {
    let app_state = create_app_state(Env::Production, Arc::new(MemoryRepository::new()));
    let mut parts = get_request_parts(Method::GET, "/bloggers/?page=2".parse().unwrap());

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();

    match err {
        AppError::Unauthenticated { next } => {
            assert_eq!(next.as_deref(), Some("/bloggers/?page=2"))
        }
        other => panic!("expected Unauthenticated, got {other:?}"),
    }
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "late", false).await;
    let app_state = create_app_state(Env::Production, repo);

    // Well past the default validation leeway.
    let token = create_token(user.id, TEST_JWT_SECRET, -3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_wrong_secret() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "mallory", false).await;
    let app_state = create_app_state(Env::Production, repo);

    let token = create_token(user.id, "some-other-secret", 3600);
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn test_auth_failure_for_deleted_account() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "gone", false).await;
    let token = create_token(user.id, TEST_JWT_SECRET, 3600);
    assert!(repo.delete_user(user.id).unwrap());
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let err = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthenticated { .. }));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "local", true).await;
    let app_state = create_app_state(Env::Local, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let auth_user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(auth_user.id, user.id);
    assert!(auth_user.is_editor);
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let repo = Arc::new(MemoryRepository::new());
    let user = seed_user(&repo, "prod", false).await;
    let app_state = create_app_state(Env::Production, repo);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&user.id.to_string()).unwrap(),
    );

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_local_bypass_unknown_user_is_rejected() {
    let app_state = create_app_state(Env::Local, Arc::new(MemoryRepository::new()));

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&Uuid::new_v4().to_string()).unwrap(),
    );

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated { .. })));
}

#[test]
fn test_password_hash_and_verify() {
    let hash = auth::hash_password("s3cret-pass").unwrap();
    assert!(hash.starts_with("$argon2id$"));
    assert!(auth::verify_password("s3cret-pass", &hash));
    assert!(!auth::verify_password("wrong-pass", &hash));
    assert!(!auth::verify_password("s3cret-pass", "not-a-phc-string"));
}

#[test]
fn test_decode_token_rejects_garbage() {
    let config = AppConfig::default();
    assert!(auth::decode_token(&config, "not.a.jwt").is_err());
}
