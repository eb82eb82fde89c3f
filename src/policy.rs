//! Capability checks.
//!
//! Every role-gated action is decided here by a pure function returning a `Decision`.
//! Handlers and the workflow engine call these before touching the store; nothing in this
//! module performs I/O, so the rules are testable with plain values.

use chrono::{DateTime, Duration, Utc};

use crate::{
    auth::AuthUser,
    error::{AppError, AppResult, DenialReason},
    models::{Blog, Comment},
};

/// How long after posting a comment its author may still edit it.
pub const COMMENT_EDIT_WINDOW_SECS: i64 = 5 * 60;

pub fn comment_edit_window() -> Duration {
    Duration::seconds(COMMENT_EDIT_WINDOW_SECS)
}

/// Decision
///
/// Outcome of a capability check. Checks fail closed: every path that does not
/// positively establish the right returns `Denied`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn into_result(self) -> AppResult<()> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(AppError::AuthorizationDenied(reason)),
        }
    }
}

/// Only accounts promoted to blogger may publish.
pub fn can_create_blog(actor: &AuthUser) -> Decision {
    match actor.blogger_id {
        Some(_) => Decision::Allowed,
        None => Decision::Denied(DenialReason::NotABlogger),
    }
}

/// Edit and soft-delete of a blog are reserved to its owning blogger.
pub fn can_modify_blog(actor: &AuthUser, blog: &Blog) -> Decision {
    match (actor.blogger_id, blog.blogger_id) {
        (Some(actor_blogger), Some(owner)) if actor_blogger == owner => Decision::Allowed,
        _ => Decision::Denied(DenialReason::NotOwner),
    }
}

/// True while the comment is younger than the edit window. Does not look at the actor.
pub fn within_edit_window(comment: &Comment, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(comment.created_at) < comment_edit_window()
}

/// The original author may edit, and only inside the edit window.
pub fn can_edit_comment(actor: &AuthUser, comment: &Comment, now: DateTime<Utc>) -> Decision {
    if comment.user_id != Some(actor.id) {
        return Decision::Denied(DenialReason::NotAuthor);
    }
    if !within_edit_window(comment, now) {
        return Decision::Denied(DenialReason::EditWindowClosed);
    }
    Decision::Allowed
}

/// The comment's author or the blog's owner may soft-delete it.
pub fn can_delete_comment(actor: &AuthUser, comment: &Comment, blog: &Blog) -> Decision {
    if comment.user_id == Some(actor.id) || can_modify_blog(actor, blog).is_allowed() {
        Decision::Allowed
    } else {
        Decision::Denied(DenialReason::NotAuthorOrBlogOwner)
    }
}

/// Reviewing blogger requests (list, approve, reject) and raw comment moderation are
/// limited to the Editors group.
pub fn can_review_requests(actor: &AuthUser) -> Decision {
    if actor.is_editor {
        Decision::Allowed
    } else {
        Decision::Denied(DenialReason::NotEditor)
    }
}

/// An account that already publishes has nothing to request.
pub fn can_request_promotion(actor: &AuthUser) -> Decision {
    match actor.blogger_id {
        Some(_) => Decision::Denied(DenialReason::AlreadyBlogger),
        None => Decision::Allowed,
    }
}
