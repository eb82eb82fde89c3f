use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tower_sessions::SessionStore;
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod mailer;
pub mod models;
pub mod policy;
pub mod repository;
pub mod session;
pub mod workflow;

// Routers grouped by access level (Public, Authenticated, Editor).
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, editor, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use mailer::{LogMailer, MailerState, MockMailer, SmtpMailer};
pub use repository::{MemoryRepository, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::index, handlers::signup, handlers::login,
        handlers::list_blogs, handlers::blog_detail, handlers::list_blogs_by_blogger,
        handlers::create_blog, handlers::edit_blog, handlers::delete_blog,
        handlers::list_bloggers, handlers::blogger_detail,
        handlers::create_comment, handlers::edit_comment, handlers::delete_comment,
        handlers::moderation_comments,
        handlers::request_status, handlers::submit_request, handlers::list_pending_requests,
        handlers::approve_request, handlers::reject_request
    ),
    components(
        schemas(
            models::User, models::Blogger, models::Blog, models::Comment,
            models::BloggerRequest, models::ContentStatus, models::RequestStatus,
            models::SignupRequest, models::LoginRequest, models::LoginResponse,
            models::CreateBlogRequest, models::UpdateBlogRequest,
            models::CreateCommentRequest, models::EditCommentRequest,
            models::DeleteCommentRequest, models::BloggerRequestForm,
            models::HomeCounts, models::CommentView, models::BlogDetail,
            models::BloggerBlogs, models::ApprovalOutcome,
        )
    ),
    tags(
        (name = "miniblog", description = "Blogging and moderation API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The shared, cloneable container of every service a handler may need.
#[derive(Clone)]
pub struct AppState {
    /// Persistence: Postgres in production, in-memory in tests.
    pub repo: RepositoryState,
    /// Outbound notifications.
    pub mailer: MailerState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

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

/// auth_middleware
///
/// Runs the `AuthUser` extractor ahead of the handler. An anonymous or invalid caller is
/// rejected with the extractor's 401 before any handler code executes.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, the session layer and the observability stack, and binds
/// the application state. `sessions` is the Postgres store in production and
/// `MemoryStore` in tests.
pub fn create_router<S>(state: AppState, sessions: S) -> Router
where
    S: SessionStore + Clone,
{
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // Cookie-backed server-side session; holds the home page visit counter.
    let sessions = session::session_layer(sessions, state.config.env);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .merge(editor::editor_routes())
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware,
                )),
        )
        .with_state(state)
        .layer(sessions);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the per-request span, tagged with the method, URI and `x-request-id` so every
/// log line of one request can be correlated.
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
