//! Blogger-request workflow.
//!
//! Pending → Accepted | Rejected, both terminal. Submission notifies the Editors group;
//! approval promotes the requester inside one repository transaction and notifies them
//! only after it commits. Notification failures are logged and never undo a state change.

use crate::{
    AppState,
    auth::AuthUser,
    config::ResubmitPolicy,
    error::{AppError, AppResult, DuplicateReason},
    forms::Validate,
    mailer::MailerState,
    models::{ApprovalOutcome, BloggerRequest, BloggerRequestForm, Page, PageRequest, RequestStatus},
    policy,
    repository::RepositoryState,
};

/// RequestAction
///
/// The two reviewer actions on a blogger request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    Approve,
    Reject,
}

impl RequestStatus {
    /// The transition function of the request state machine.
    pub fn apply(self, action: RequestAction) -> AppResult<RequestStatus> {
        match (self, action) {
            (RequestStatus::Pending, RequestAction::Approve) => Ok(RequestStatus::Accepted),
            (RequestStatus::Pending, RequestAction::Reject) => Ok(RequestStatus::Rejected),
            (from, _) => Err(AppError::InvalidTransition { from }),
        }
    }
}

/// Why an existing request blocks a new submission, if it does.
pub fn duplicate_reason(
    existing: &BloggerRequest,
    policy: ResubmitPolicy,
) -> Option<DuplicateReason> {
    match (existing.status, policy) {
        (RequestStatus::Pending, _) => Some(DuplicateReason::AlreadyPending),
        (RequestStatus::Accepted, _) => Some(DuplicateReason::AlreadyAccepted),
        (RequestStatus::Rejected, ResubmitPolicy::Deny) => Some(DuplicateReason::PreviouslyRejected),
        (RequestStatus::Rejected, ResubmitPolicy::Allow) => None,
    }
}

/// RequestWorkflow
///
/// Orchestrates the request lifecycle over the repository and mailer seams.
#[derive(Clone)]
pub struct RequestWorkflow {
    repo: RepositoryState,
    mailer: MailerState,
    resubmit_policy: ResubmitPolicy,
}

impl RequestWorkflow {
    pub fn new(repo: RepositoryState, mailer: MailerState, resubmit_policy: ResubmitPolicy) -> Self {
        Self {
            repo,
            mailer,
            resubmit_policy,
        }
    }

    pub fn from_state(state: &AppState) -> Self {
        Self::new(
            state.repo.clone(),
            state.mailer.clone(),
            state.config.resubmit_policy,
        )
    }

    /// The caller's most recent request, if any.
    pub async fn own_request(&self, actor: &AuthUser) -> AppResult<Option<BloggerRequest>> {
        self.repo.latest_request_for_user(actor.id).await
    }

    /// submit
    ///
    /// Creates a Pending request for the actor, then notifies every Editor.
    pub async fn submit(
        &self,
        actor: &AuthUser,
        form: BloggerRequestForm,
    ) -> AppResult<BloggerRequest> {
        form.validate()?;
        policy::can_request_promotion(actor).into_result()?;

        if let Some(existing) = self.repo.latest_request_for_user(actor.id).await? {
            if let Some(reason) = duplicate_reason(&existing, self.resubmit_policy) {
                tracing::info!(
                    user_id = %actor.id,
                    existing_request = existing.id,
                    ?reason,
                    "duplicate blogger request refused"
                );
                return Err(AppError::DuplicateRequest(reason));
            }
        }

        let request = self.repo.create_request(actor.id, form).await?;
        tracing::info!(request_id = request.id, user_id = %actor.id, "blogger request submitted");

        self.notify_editors(actor).await;
        Ok(request)
    }

    /// Editor-only listing of Pending requests.
    pub async fn pending(
        &self,
        actor: &AuthUser,
        page: PageRequest,
    ) -> AppResult<Page<BloggerRequest>> {
        policy::can_review_requests(actor).into_result()?;
        self.repo.list_pending_requests(page).await
    }

    /// approve
    ///
    /// Accepts the request and creates the linked Blogger in one repository transaction.
    /// The acceptance email is sent only once both have been committed.
    pub async fn approve(&self, actor: &AuthUser, id: i64) -> AppResult<ApprovalOutcome> {
        policy::can_review_requests(actor).into_result()?;

        let request = self.repo.get_request(id).await?.ok_or(AppError::NotFound)?;
        request.status.apply(RequestAction::Approve)?;

        let outcome = self.repo.approve_request(id).await.inspect_err(|e| {
            tracing::warn!(request_id = id, error = %e, "blogger request approval rolled back");
        })?;
        tracing::info!(
            request_id = id,
            blogger_id = outcome.blogger.id,
            reviewer = %actor.id,
            "blogger request approved"
        );

        let body = format!(
            "CONGRATULATIONS {} {}, your request to become an author has been approved. Happy writing!",
            outcome.request.first_name, outcome.request.last_name
        );
        self.notify_requester(&outcome.request, "Blogger Request Accepted", &body)
            .await;
        Ok(outcome)
    }

    /// reject
    ///
    /// Moves a Pending request to Rejected. The requester gets a best-effort notice.
    pub async fn reject(&self, actor: &AuthUser, id: i64) -> AppResult<BloggerRequest> {
        policy::can_review_requests(actor).into_result()?;

        let request = self.repo.get_request(id).await?.ok_or(AppError::NotFound)?;
        request.status.apply(RequestAction::Reject)?;

        let rejected = self.repo.reject_request(id).await?;
        tracing::info!(request_id = id, reviewer = %actor.id, "blogger request rejected");

        let body = format!(
            "Hello {} {}, your request to become an author has not been approved.",
            rejected.first_name, rejected.last_name
        );
        self.notify_requester(&rejected, "Blogger Request Rejected", &body)
            .await;
        Ok(rejected)
    }

    async fn notify_editors(&self, actor: &AuthUser) {
        let editors = match self.repo.list_editors().await {
            Ok(editors) => editors,
            Err(e) => {
                tracing::warn!(error = %e, "could not load editors; new request not announced");
                return;
            }
        };
        let body = format!("{} has requested to become an Author", actor.username);
        for editor in editors.iter().filter(|e| !e.email.is_empty()) {
            self.send(&editor.email, "New Author Request", &body).await;
        }
    }

    async fn notify_requester(&self, request: &BloggerRequest, subject: &str, body: &str) {
        let Some(user_id) = request.user_id else {
            return;
        };
        match self.repo.get_user(user_id).await {
            Ok(Some(user)) if !user.email.is_empty() => self.send(&user.email, subject, body).await,
            Ok(_) => tracing::warn!(request_id = request.id, "requester has no email address"),
            Err(e) => tracing::warn!(request_id = request.id, error = %e, "could not load requester"),
        }
    }

    async fn send(&self, to: &str, subject: &str, body: &str) {
        if let Err(e) = self.mailer.send(to, subject, body).await {
            tracing::warn!(to, subject, error = %e, "notification failed; state change kept");
        }
    }
}
