use chrono::{Duration, TimeZone, Utc};
use miniblog::{
    AppError,
    auth::AuthUser,
    error::DenialReason,
    models::{Blog, Comment},
    policy::{self, Decision},
};
use uuid::Uuid;

fn user(blogger_id: Option<i64>, is_editor: bool) -> AuthUser {
    AuthUser {
        id: Uuid::new_v4(),
        username: "someone".to_string(),
        is_editor,
        blogger_id,
    }
}

fn blog_owned_by(blogger_id: i64) -> Blog {
    Blog {
        id: 1,
        name: "Owned".to_string(),
        blogger_id: Some(blogger_id),
        ..Blog::default()
    }
}

fn comment_by(author: &AuthUser, created_minutes_ago: i64) -> Comment {
    let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
    Comment {
        id: 10,
        user_id: Some(author.id),
        blog_id: 1,
        comment: "hello".to_string(),
        created_at: now - Duration::minutes(created_minutes_ago),
        ..Comment::default()
    }
}

fn fixed_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

#[test]
fn test_only_bloggers_create_blogs() {
    assert_eq!(policy::can_create_blog(&user(Some(3), false)), Decision::Allowed);
    assert_eq!(
        policy::can_create_blog(&user(None, true)),
        Decision::Denied(DenialReason::NotABlogger)
    );
}

#[test]
fn test_only_owner_modifies_blog() {
    let blog = blog_owned_by(7);
    assert!(policy::can_modify_blog(&user(Some(7), false), &blog).is_allowed());
    assert_eq!(
        policy::can_modify_blog(&user(Some(8), false), &blog),
        Decision::Denied(DenialReason::NotOwner)
    );
    // Editors get no ownership rights.
    assert!(!policy::can_modify_blog(&user(None, true), &blog).is_allowed());

    let orphan = Blog {
        blogger_id: None,
        ..blog_owned_by(7)
    };
    assert!(!policy::can_modify_blog(&user(Some(7), false), &orphan).is_allowed());
}

#[test]
fn test_edit_window_boundaries() {
    let author = user(None, false);
    let now = fixed_now();

    assert!(policy::within_edit_window(&comment_by(&author, 0), now));
    assert!(policy::within_edit_window(&comment_by(&author, 4), now));

    let mut at_limit = comment_by(&author, 0);
    at_limit.created_at = now - policy::comment_edit_window();
    assert!(!policy::within_edit_window(&at_limit, now));

    let mut just_inside = comment_by(&author, 0);
    just_inside.created_at = now - policy::comment_edit_window() + Duration::seconds(1);
    assert!(policy::within_edit_window(&just_inside, now));

    assert!(!policy::within_edit_window(&comment_by(&author, 6), now));
}

#[test]
fn test_comment_edit_checks_author_before_window() {
    let author = user(None, false);
    let other = user(Some(1), true);
    let now = fixed_now();

    assert_eq!(
        policy::can_edit_comment(&author, &comment_by(&author, 1), now),
        Decision::Allowed
    );
    assert_eq!(
        policy::can_edit_comment(&author, &comment_by(&author, 6), now),
        Decision::Denied(DenialReason::EditWindowClosed)
    );
    assert_eq!(
        policy::can_edit_comment(&other, &comment_by(&author, 1), now),
        Decision::Denied(DenialReason::NotAuthor)
    );
    assert_eq!(
        policy::can_edit_comment(&other, &comment_by(&author, 6), now),
        Decision::Denied(DenialReason::NotAuthor)
    );
}

#[test]
fn test_orphaned_comment_is_nobodys() {
    let someone = user(None, false);
    let mut orphan = comment_by(&someone, 1);
    orphan.user_id = None;

    assert!(!policy::can_edit_comment(&someone, &orphan, fixed_now()).is_allowed());
    assert!(!policy::can_delete_comment(&someone, &orphan, &blog_owned_by(5)).is_allowed());
}

#[test]
fn test_comment_delete_by_author_or_blog_owner() {
    let author = user(None, false);
    let owner = user(Some(5), false);
    let stranger = user(Some(6), true);
    let blog = blog_owned_by(5);
    // Deletion is not time-boxed.
    let comment = comment_by(&author, 60);

    assert!(policy::can_delete_comment(&author, &comment, &blog).is_allowed());
    assert!(policy::can_delete_comment(&owner, &comment, &blog).is_allowed());
    assert_eq!(
        policy::can_delete_comment(&stranger, &comment, &blog),
        Decision::Denied(DenialReason::NotAuthorOrBlogOwner)
    );
}

#[test]
fn test_review_and_promotion_rights() {
    assert!(policy::can_review_requests(&user(None, true)).is_allowed());
    assert_eq!(
        policy::can_review_requests(&user(Some(1), false)),
        Decision::Denied(DenialReason::NotEditor)
    );

    assert!(policy::can_request_promotion(&user(None, false)).is_allowed());
    assert_eq!(
        policy::can_request_promotion(&user(Some(1), false)),
        Decision::Denied(DenialReason::AlreadyBlogger)
    );
}

#[test]
fn test_denied_decision_maps_to_forbidden() {
    let err = Decision::Denied(DenialReason::NotOwner)
        .into_result()
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::AuthorizationDenied(DenialReason::NotOwner)
    ));
    assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    assert!(Decision::Allowed.into_result().is_ok());
}
