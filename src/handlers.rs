use crate::{
    AppState,
    auth::{self, AuthUser},
    error::{AppError, AppResult, DenialReason},
    forms::Validate,
    models::{
        ApprovalOutcome, Blog, BlogDetail, Blogger, BloggerBlogs, BloggerRequest,
        BloggerRequestForm, Comment, CommentView, CreateBlogRequest, CreateCommentRequest,
        DeleteCommentRequest, EditCommentRequest, HomeCounts, IdQuery, LoginRequest,
        LoginResponse, NewUser, Page, PageQuery, PageRequest, SignupRequest, UpdateBlogRequest,
        User,
    },
    policy,
    repository::RepositoryState,
    workflow::RequestWorkflow,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use tower_sessions::Session;

/// Session key of the per-visitor home page counter.
pub const VISITS_KEY: &str = "num_visits";

// --- Helpers ---

async fn active_blog(repo: &RepositoryState, id: i64) -> AppResult<Blog> {
    repo.get_active_blog(id).await?.ok_or(AppError::NotFound)
}

/// Loads a non-deleted comment and checks it belongs to the non-deleted blog `blog_id`.
async fn visible_comment(
    repo: &RepositoryState,
    blog_id: i64,
    comment_id: i64,
) -> AppResult<(Blog, Comment)> {
    let blog = active_blog(repo, blog_id).await?;
    let comment = repo
        .get_comment(comment_id)
        .await?
        .filter(|c| c.blog_id == blog.id && c.is_active())
        .ok_or(AppError::NotFound)?;
    Ok((blog, comment))
}

// --- Home & Accounts ---

/// index
///
/// [Public Route] Site-wide counts plus the caller's visit count for this session.
/// The count shown is the one before this visit; the session is then incremented.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Home counts", body = HomeCounts))
)]
pub async fn index(
    State(state): State<AppState>,
    session: Session,
) -> AppResult<Json<HomeCounts>> {
    let visits: i64 = session
        .get(VISITS_KEY)
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?
        .unwrap_or(0);
    session
        .insert(VISITS_KEY, visits + 1)
        .await
        .map_err(|e| AppError::Internal(anyhow::Error::new(e)))?;

    let mut counts = state.repo.home_counts().await?;
    counts.num_visits = visits;
    Ok(Json(counts))
}

/// signup
///
/// [Public Route] Creates a reader account. All field problems are reported together.
#[utoipa::path(
    post,
    path = "/signup/",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created", body = User),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    payload.validate()?;

    let password_hash = auth::hash_password(&payload.password1)?;
    let user = state
        .repo
        .create_user(NewUser {
            username: payload.username.trim().to_string(),
            email: payload.email.trim().to_string(),
            password_hash,
            is_editor: false,
        })
        .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "account created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// login
///
/// [Public Route] Exchanges credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/login/",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 401, description = "Bad credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let bad_credentials = || AppError::Unauthenticated { next: None };

    let credentials = state
        .repo
        .find_credentials(payload.username.trim())
        .await?
        .ok_or_else(bad_credentials)?;
    if !auth::verify_password(&payload.password, &credentials.password_hash) {
        tracing::info!(username = %payload.username, "login refused");
        return Err(bad_credentials());
    }

    let (token, expires_in) = auth::issue_token(&state.config, credentials.user.id)?;
    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        expires_in,
    }))
}

// --- Blogs ---

/// list_blogs
///
/// [Public Route] Non-deleted blogs, five per page, ordered by name then blogger.
#[utoipa::path(
    get,
    path = "/blogs/",
    params(PageQuery),
    responses((status = 200, description = "Blogs", body = Page<Blog>))
)]
pub async fn list_blogs(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Blog>>> {
    let page = state.repo.list_blogs(query.into()).await?;
    Ok(Json(page))
}

/// blog_detail
///
/// [Authenticated Route] A blog, its author and its visible comments. Each comment carries
/// the `editable`/`deletable` flags computed for the caller.
#[utoipa::path(
    get,
    path = "/blogs/{id}",
    params(("id" = i64, Path, description = "Blog id")),
    responses(
        (status = 200, description = "Blog detail", body = BlogDetail),
        (status = 404, description = "Missing or deleted")
    )
)]
pub async fn blog_detail(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<BlogDetail>> {
    let blog = active_blog(&state.repo, id).await?;
    let blogger = match blog.blogger_id {
        Some(blogger_id) => state.repo.get_blogger(blogger_id).await?,
        None => None,
    };

    let now = Utc::now();
    let comments = state
        .repo
        .get_visible_comments(blog.id)
        .await?
        .into_iter()
        .map(|comment| CommentView {
            editable: policy::can_edit_comment(&actor, &comment, now).is_allowed(),
            deletable: policy::can_delete_comment(&actor, &comment, &blog).is_allowed(),
            comment,
        })
        .collect();

    Ok(Json(BlogDetail {
        blog,
        blogger,
        comments,
    }))
}

/// list_blogs_by_blogger
///
/// [Public Route] Non-deleted blogs of one blogger. The path id is the blogger id.
#[utoipa::path(
    get,
    path = "/blogs/{id}/blogger/",
    params(("id" = i64, Path, description = "Blogger id"), PageQuery),
    responses(
        (status = 200, description = "Blogs of the blogger", body = BloggerBlogs),
        (status = 404, description = "Unknown blogger")
    )
)]
pub async fn list_blogs_by_blogger(
    State(state): State<AppState>,
    Path(blogger_id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<BloggerBlogs>> {
    let blogger = state
        .repo
        .get_blogger(blogger_id)
        .await?
        .ok_or(AppError::NotFound)?;
    let blogs = state
        .repo
        .list_blogs_by_blogger(blogger.id, query.into())
        .await?;
    Ok(Json(BloggerBlogs { blogger, blogs }))
}

/// create_blog
///
/// [Blogger Route] Publishes a blog owned by the caller's blogger profile.
#[utoipa::path(
    post,
    path = "/create-blog/",
    request_body = CreateBlogRequest,
    responses(
        (status = 201, description = "Blog created", body = Blog),
        (status = 403, description = "Caller is not a blogger"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn create_blog(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateBlogRequest>,
) -> AppResult<(StatusCode, Json<Blog>)> {
    policy::can_create_blog(&actor).into_result()?;
    let Some(blogger_id) = actor.blogger_id else {
        return Err(AppError::AuthorizationDenied(DenialReason::NotABlogger));
    };
    payload.validate()?;

    let blog = state.repo.create_blog(blogger_id, payload).await?;
    tracing::info!(blog_id = blog.id, blogger_id, "blog created");
    Ok((StatusCode::CREATED, Json(blog)))
}

/// edit_blog
///
/// [Owner Route] Partial update of name and description.
#[utoipa::path(
    post,
    path = "/edit-blog/",
    params(IdQuery),
    request_body = UpdateBlogRequest,
    responses(
        (status = 200, description = "Blog updated", body = Blog),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Missing or deleted")
    )
)]
pub async fn edit_blog(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(IdQuery { id }): Query<IdQuery>,
    Json(payload): Json<UpdateBlogRequest>,
) -> AppResult<Json<Blog>> {
    let blog = active_blog(&state.repo, id).await?;
    policy::can_modify_blog(&actor, &blog).into_result()?;
    payload.validate()?;

    let updated = state
        .repo
        .update_blog(id, payload)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

/// delete_blog
///
/// [Owner Route] Soft-deletes a blog. The row is kept with status `deleted`.
#[utoipa::path(
    post,
    path = "/delete-blog/",
    params(IdQuery),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Missing or already deleted")
    )
)]
pub async fn delete_blog(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(IdQuery { id }): Query<IdQuery>,
) -> AppResult<StatusCode> {
    let blog = active_blog(&state.repo, id).await?;
    policy::can_modify_blog(&actor, &blog).into_result()?;

    if state.repo.soft_delete_blog(id).await? {
        tracing::info!(blog_id = id, user_id = %actor.id, "blog deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

// --- Bloggers ---

/// list_bloggers
///
/// [Authenticated Route] Bloggers ordered by last name, then first name.
#[utoipa::path(
    get,
    path = "/bloggers/",
    params(PageQuery),
    responses((status = 200, description = "Bloggers", body = Page<Blogger>))
)]
pub async fn list_bloggers(
    _actor: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Blogger>>> {
    Ok(Json(state.repo.list_bloggers(query.into()).await?))
}

/// blogger_detail
#[utoipa::path(
    get,
    path = "/bloggers/{id}",
    params(("id" = i64, Path, description = "Blogger id")),
    responses(
        (status = 200, description = "Blogger", body = Blogger),
        (status = 404, description = "Unknown blogger")
    )
)]
pub async fn blogger_detail(
    _actor: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Blogger>> {
    let blogger = state.repo.get_blogger(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(blogger))
}

// --- Comments ---

/// create_comment
///
/// [Authenticated Route] Adds a comment to a non-deleted blog. Author and blog come from
/// the session and the path, never from the body.
#[utoipa::path(
    post,
    path = "/blogs/{id}/comment-create",
    params(("id" = i64, Path, description = "Blog id")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = Comment),
        (status = 404, description = "Missing or deleted blog")
    )
)]
pub async fn create_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    payload.validate()?;
    let blog = active_blog(&state.repo, blog_id).await?;

    let comment = state
        .repo
        .add_comment(blog.id, actor.id, payload.comment)
        .await?;
    tracing::debug!(comment_id = comment.id, blog_id, user_id = %actor.id, "comment added");
    Ok((StatusCode::CREATED, Json(comment)))
}

/// edit_comment
///
/// [Author Route] Replaces the text of the caller's own comment. Only allowed within five
/// minutes of posting.
#[utoipa::path(
    post,
    path = "/blogs/{id}/comment-edit",
    params(("id" = i64, Path, description = "Blog id")),
    request_body = EditCommentRequest,
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 403, description = "Not the author, or the edit window has closed"),
        (status = 404, description = "Missing or deleted")
    )
)]
pub async fn edit_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    Json(payload): Json<EditCommentRequest>,
) -> AppResult<Json<Comment>> {
    let (_, comment) = visible_comment(&state.repo, blog_id, payload.comment_id).await?;
    policy::can_edit_comment(&actor, &comment, Utc::now()).into_result()?;
    payload.validate()?;

    let updated = state
        .repo
        .update_comment(comment.id, payload.comment)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(updated))
}

/// delete_comment
///
/// [Author or Blog Owner Route] Soft-deletes a comment.
#[utoipa::path(
    post,
    path = "/blogs/{id}/comment-delete",
    params(("id" = i64, Path, description = "Blog id")),
    request_body = DeleteCommentRequest,
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Neither the author nor the blog owner"),
        (status = 404, description = "Missing or already deleted")
    )
)]
pub async fn delete_comment(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
    Json(payload): Json<DeleteCommentRequest>,
) -> AppResult<StatusCode> {
    let (blog, comment) = visible_comment(&state.repo, blog_id, payload.comment_id).await?;
    policy::can_delete_comment(&actor, &comment, &blog).into_result()?;

    if state.repo.soft_delete_comment(comment.id).await? {
        tracing::info!(comment_id = comment.id, blog_id, user_id = %actor.id, "comment deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound)
    }
}

/// moderation_comments
///
/// [Editor Route] Every comment of a blog, deleted ones included. Deleted blogs can still be
/// moderated; an unknown id is a 404.
#[utoipa::path(
    get,
    path = "/moderation/blogs/{id}/comments",
    params(("id" = i64, Path, description = "Blog id")),
    responses(
        (status = 200, description = "All comments", body = [Comment]),
        (status = 403, description = "Not an editor"),
        (status = 404, description = "Unknown blog")
    )
)]
pub async fn moderation_comments(
    actor: AuthUser,
    State(state): State<AppState>,
    Path(blog_id): Path<i64>,
) -> AppResult<Json<Vec<Comment>>> {
    policy::can_review_requests(&actor).into_result()?;
    let blog = state
        .repo
        .get_blog(blog_id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(state.repo.get_comments(blog.id).await?))
}

// --- Blogger Requests ---

/// request_status
///
/// [Authenticated Route] The caller's most recent blogger request, or `null`.
#[utoipa::path(
    get,
    path = "/request-to-be-blogger/",
    responses((status = 200, description = "Latest request", body = Option<BloggerRequest>))
)]
pub async fn request_status(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Option<BloggerRequest>>> {
    let workflow = RequestWorkflow::from_state(&state);
    Ok(Json(workflow.own_request(&actor).await?))
}

/// submit_request
///
/// [Authenticated Route] Asks to be promoted to blogger. Editors are notified by email.
#[utoipa::path(
    post,
    path = "/request-to-be-blogger/",
    request_body = BloggerRequestForm,
    responses(
        (status = 201, description = "Request submitted", body = BloggerRequest),
        (status = 403, description = "Already a blogger"),
        (status = 409, description = "A previous request blocks this one"),
        (status = 422, description = "Invalid form")
    )
)]
pub async fn submit_request(
    actor: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<BloggerRequestForm>,
) -> AppResult<(StatusCode, Json<BloggerRequest>)> {
    let workflow = RequestWorkflow::from_state(&state);
    let request = workflow.submit(&actor, payload).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// list_pending_requests
///
/// [Editor Route] Pending requests, oldest first.
#[utoipa::path(
    get,
    path = "/blogger-request-list/",
    params(PageQuery),
    responses(
        (status = 200, description = "Pending requests", body = Page<BloggerRequest>),
        (status = 403, description = "Not an editor")
    )
)]
pub async fn list_pending_requests(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<BloggerRequest>>> {
    let workflow = RequestWorkflow::from_state(&state);
    let page = workflow.pending(&actor, PageRequest::from(query)).await?;
    Ok(Json(page))
}

/// approve_request
///
/// [Editor Route] Accepts a pending request and creates the blogger profile atomically.
#[utoipa::path(
    post,
    path = "/approved-request/",
    params(IdQuery),
    responses(
        (status = 200, description = "Request accepted", body = ApprovalOutcome),
        (status = 403, description = "Not an editor"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request is not pending, or promotion failed")
    )
)]
pub async fn approve_request(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(IdQuery { id }): Query<IdQuery>,
) -> AppResult<Json<ApprovalOutcome>> {
    let workflow = RequestWorkflow::from_state(&state);
    Ok(Json(workflow.approve(&actor, id).await?))
}

/// reject_request
///
/// [Editor Route] Rejects a pending request.
#[utoipa::path(
    post,
    path = "/rejected-request/",
    params(IdQuery),
    responses(
        (status = 200, description = "Request rejected", body = BloggerRequest),
        (status = 403, description = "Not an editor"),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Request is not pending")
    )
)]
pub async fn reject_request(
    actor: AuthUser,
    State(state): State<AppState>,
    Query(IdQuery { id }): Query<IdQuery>,
) -> AppResult<Json<BloggerRequest>> {
    let workflow = RequestWorkflow::from_state(&state);
    Ok(Json(workflow.reject(&actor, id).await?))
}
