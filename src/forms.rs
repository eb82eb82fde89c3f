//! Form validation for every write payload.
//!
//! Each payload reports all field problems at once through `FieldErrors`, which the error
//! layer renders as a 422 with per-field messages.

use crate::{
    error::{AppResult, FieldErrors},
    models::{
        BloggerRequestForm, CreateBlogRequest, CreateCommentRequest, EditCommentRequest,
        SignupRequest, UpdateBlogRequest,
    },
};

pub const USERNAME_MAX: usize = 150;
pub const PASSWORD_MIN: usize = 8;
pub const BLOG_NAME_MAX: usize = 200;
pub const BLOG_DESCRIPTION_MAX: usize = 2000;
pub const COMMENT_MAX: usize = 1000;
pub const PERSON_NAME_MAX: usize = 100;
pub const BIO_MAX: usize = 2000;

/// Validate
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

fn required(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "This field is required.");
    }
}

fn max_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {max} characters (it has {len})."),
        );
    }
}

fn valid_username(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

/// A single `@`, a non-empty local part and a dotted domain.
pub fn valid_email(value: &str) -> bool {
    let mut parts = value.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    !local.is_empty()
        && !value.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

impl Validate for SignupRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();

        required(&mut errors, "username", &self.username);
        max_len(&mut errors, "username", &self.username, USERNAME_MAX);
        if !valid_username(&self.username) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }

        required(&mut errors, "email", &self.email);
        if !self.email.trim().is_empty() && !valid_email(self.email.trim()) {
            errors.add("email", "Enter a valid email address.");
        }

        required(&mut errors, "password1", &self.password1);
        if self.password1.chars().count() < PASSWORD_MIN {
            errors.add(
                "password1",
                format!("This password is too short. It must contain at least {PASSWORD_MIN} characters."),
            );
        }
        if self.password1 != self.password2 {
            errors.add("password2", "The two password fields didn't match.");
        }

        errors.into_result()
    }
}

impl Validate for CreateBlogRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        required(&mut errors, "name", &self.name);
        max_len(&mut errors, "name", &self.name, BLOG_NAME_MAX);
        max_len(
            &mut errors,
            "description",
            &self.description,
            BLOG_DESCRIPTION_MAX,
        );
        errors.into_result()
    }
}

impl Validate for UpdateBlogRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            required(&mut errors, "name", name);
            max_len(&mut errors, "name", name, BLOG_NAME_MAX);
        }
        if let Some(description) = &self.description {
            max_len(&mut errors, "description", description, BLOG_DESCRIPTION_MAX);
        }
        errors.into_result()
    }
}

fn validate_comment_text(errors: &mut FieldErrors, text: &str) {
    required(errors, "comment", text);
    max_len(errors, "comment", text, COMMENT_MAX);
}

impl Validate for CreateCommentRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        validate_comment_text(&mut errors, &self.comment);
        errors.into_result()
    }
}

impl Validate for EditCommentRequest {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        validate_comment_text(&mut errors, &self.comment);
        errors.into_result()
    }
}

impl Validate for BloggerRequestForm {
    fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        required(&mut errors, "first_name", &self.first_name);
        max_len(&mut errors, "first_name", &self.first_name, PERSON_NAME_MAX);
        required(&mut errors, "last_name", &self.last_name);
        max_len(&mut errors, "last_name", &self.last_name, PERSON_NAME_MAX);
        required(&mut errors, "bio", &self.bio);
        max_len(&mut errors, "bio", &self.bio, BIO_MAX);
        errors.into_result()
    }
}
