use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Editor Router Module
///
/// Review and moderation endpoints. The group sits behind the same authentication layer
/// as the authenticated routes; membership in the Editors group is checked by
/// `policy::can_review_requests` inside each handler.
pub fn editor_routes() -> Router<AppState> {
    Router::new()
        // GET /blogger-request-list/?page=
        // Pending requests, oldest first.
        .route(
            "/blogger-request-list/",
            get(handlers::list_pending_requests),
        )
        // POST /approved-request/?id=
        // Accepts the request and creates the blogger in one transaction.
        .route("/approved-request/", post(handlers::approve_request))
        // POST /rejected-request/?id=
        .route("/rejected-request/", post(handlers::reject_request))
        // GET /moderation/blogs/{id}/comments
        // Every comment of the blog, deleted ones included.
        .route(
            "/moderation/blogs/{id}/comments",
            get(handlers::moderation_comments),
        )
}
