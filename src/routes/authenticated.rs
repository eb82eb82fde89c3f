use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Authenticated Router Module
///
/// Routes for any signed-in account. The `auth_middleware` layer in `create_router`
/// rejects anonymous callers with a 401 carrying a login URL; ownership and role checks
/// happen inside the handlers through the policy module.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Blogs ---
        // GET /blogs/{id}
        // Detail view with the visible comments and per-comment edit/delete flags.
        .route("/blogs/{id}", get(handlers::blog_detail))
        // POST /create-blog/
        // Blogger only. The owner is taken from the caller, never from the body.
        .route("/create-blog/", post(handlers::create_blog))
        // POST /edit-blog/?id=
        .route("/edit-blog/", post(handlers::edit_blog))
        // POST /delete-blog/?id=
        // Soft delete; the row is kept with status `deleted`.
        .route("/delete-blog/", post(handlers::delete_blog))
        // --- Bloggers ---
        .route("/bloggers/", get(handlers::list_bloggers))
        .route("/bloggers/{id}", get(handlers::blogger_detail))
        // --- Comments ---
        // POST /blogs/{id}/comment-create
        .route("/blogs/{id}/comment-create", post(handlers::create_comment))
        // POST /blogs/{id}/comment-edit
        // Author only, within five minutes of posting.
        .route("/blogs/{id}/comment-edit", post(handlers::edit_comment))
        // POST /blogs/{id}/comment-delete
        // Author or the blog's owner.
        .route("/blogs/{id}/comment-delete", post(handlers::delete_comment))
        // --- Blogger Requests ---
        // GET shows the caller's latest request; POST submits a new one.
        .route(
            "/request-to-be-blogger/",
            get(handlers::request_status).post(handlers::submit_request),
        )
}
