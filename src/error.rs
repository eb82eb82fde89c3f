use std::collections::BTreeMap;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::models::RequestStatus;

/// DenialReason
///
/// Why a capability check refused an action. Surfaced to clients as a machine-readable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotOwner,
    NotABlogger,
    NotAuthor,
    EditWindowClosed,
    NotAuthorOrBlogOwner,
    NotEditor,
    AlreadyBlogger,
}

impl DenialReason {
    pub fn code(self) -> &'static str {
        match self {
            DenialReason::NotOwner => "not_owner",
            DenialReason::NotABlogger => "not_a_blogger",
            DenialReason::NotAuthor => "not_author",
            DenialReason::EditWindowClosed => "edit_window_closed",
            DenialReason::NotAuthorOrBlogOwner => "not_author_or_blog_owner",
            DenialReason::NotEditor => "not_editor",
            DenialReason::AlreadyBlogger => "already_blogger",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// DuplicateReason
///
/// Which earlier request blocked a new blogger request submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateReason {
    AlreadyPending,
    AlreadyAccepted,
    PreviouslyRejected,
}

impl DuplicateReason {
    /// The message shown to the requester.
    pub fn message(self) -> &'static str {
        match self {
            DuplicateReason::AlreadyPending => {
                "Your blogger request already exists and is pending."
            }
            DuplicateReason::AlreadyAccepted => "Your blogger request has already been accepted.",
            DuplicateReason::PreviouslyRejected => "Your blogger request has been rejected.",
        }
    }
}

/// FieldErrors
///
/// Validation messages keyed by form field, returned alongside a 422.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, otherwise `ValidationFailed`.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::ValidationFailed(self))
        }
    }
}

/// AppError
///
/// The error taxonomy shared by the repository, workflow and handler layers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("authentication required")]
    Unauthenticated { next: Option<String> },

    #[error("permission denied: {0}")]
    AuthorizationDenied(DenialReason),

    #[error("validation failed")]
    ValidationFailed(FieldErrors),

    #[error("{}", .0.message())]
    DuplicateRequest(DuplicateReason),

    #[error("request is already {from} and cannot change state")]
    InvalidTransition { from: RequestStatus },

    #[error("promotion failed: {0}")]
    PromotionFailed(&'static str),

    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

/// Result type alias using AppError.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationDenied(_) => StatusCode::FORBIDDEN,
            AppError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DuplicateRequest(_) => StatusCode::CONFLICT,
            AppError::InvalidTransition { .. } => StatusCode::CONFLICT,
            AppError::PromotionFailed(_) => StatusCode::CONFLICT,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Unauthenticated { .. } => "unauthenticated",
            AppError::AuthorizationDenied(_) => "authorization_denied",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::DuplicateRequest(_) => "duplicate_request",
            AppError::InvalidTransition { .. } => "invalid_transition",
            AppError::PromotionFailed(_) => "promotion_failed",
            AppError::Database(_) | AppError::Internal(_) => "internal",
        }
    }
}

/// Builds the login redirect target carrying the original path, percent-encoded.
pub fn login_url(next: Option<&str>) -> String {
    match next {
        Some(path) => format!("/login/?next={}", urlencoding::encode(path)),
        None => "/login/".to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        // Internal details are logged, never returned.
        let body = match &self {
            AppError::Database(e) => {
                tracing::error!(error = %e, "database error");
                json!({ "error": code, "message": "internal server error" })
            }
            AppError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                json!({ "error": code, "message": "internal server error" })
            }
            AppError::Unauthenticated { next } => json!({
                "error": code,
                "message": self.to_string(),
                "login_url": login_url(next.as_deref()),
            }),
            AppError::AuthorizationDenied(reason) => json!({
                "error": code,
                "message": self.to_string(),
                "reason": reason,
            }),
            AppError::ValidationFailed(fields) => json!({
                "error": code,
                "message": self.to_string(),
                "fields": fields,
            }),
            _ => json!({ "error": code, "message": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
