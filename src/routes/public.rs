use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without credentials: the home page, account creation and login,
/// and the read-only blog listings. Deleted blogs are filtered at the repository level.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers and container orchestration.
        .route("/health", get(|| async { "ok" }))
        // GET /
        // Site counts plus the session visit counter.
        .route("/", get(handlers::index))
        // POST /signup/
        .route("/signup/", post(handlers::signup))
        // POST /login/
        // Issues the bearer token used by every authenticated route.
        .route("/login/", post(handlers::login))
        // GET /blogs/?page=
        .route("/blogs/", get(handlers::list_blogs))
        // GET /blogs/{id}/blogger/?page=
        // `id` is the blogger id here, not a blog id.
        .route("/blogs/{id}/blogger/", get(handlers::list_blogs_by_blogger))
}
