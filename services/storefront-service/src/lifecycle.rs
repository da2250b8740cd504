use std::sync::Arc;

use async_trait::async_trait;
use common_auth::Principal;
use common_http_errors::ApiError;
use common_security::{ensure_capability, Capability, SecurityError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::metrics::record_transition;
use crate::models::{Order, OrderStatus, Review};

pub const MAX_REASON_CHARS: usize = 255;
pub const MAX_COMMENT_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    CannotCancel,
    OrderNotCompleted,
    ReviewExists,
    InvalidTransition,
}

impl ConflictKind {
    pub fn code(&self) -> &'static str {
        match self {
            ConflictKind::CannotCancel => "cannot_cancel",
            ConflictKind::OrderNotCompleted => "order_not_completed",
            ConflictKind::ReviewExists => "review_exists",
            ConflictKind::InvalidTransition => "invalid_transition",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ConflictKind::CannotCancel => "this order cannot be cancelled",
            ConflictKind::OrderNotCompleted => "a review can only be left for a completed order",
            ConflictKind::ReviewExists => "a review for this order already exists",
            ConflictKind::InvalidTransition => "the requested status transition is not allowed",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    /// Absent and not-owned orders are deliberately indistinguishable.
    #[error("order not found")]
    NotFound,
    #[error("{}", .0.message())]
    Conflict(ConflictKind),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error(transparent)]
    Forbidden(#[from] SecurityError),
    #[error("order store failure: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl OrderError {
    pub fn store<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OrderError::Store(Box::new(err))
    }

    fn outcome(&self) -> &'static str {
        match self {
            OrderError::NotFound => "not_found",
            OrderError::Conflict(_) => "conflict",
            OrderError::InvalidInput(_) => "invalid",
            OrderError::Forbidden(_) => "forbidden",
            OrderError::Store(_) => "error",
        }
    }

    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            OrderError::NotFound => ApiError::not_found("order_not_found", trace_id),
            OrderError::Conflict(kind) => ApiError::conflict(kind.code(), kind.message(), trace_id),
            OrderError::InvalidInput(code) => ApiError::bad_request(code, trace_id),
            OrderError::Forbidden(err) => err.into_api_error(trace_id),
            OrderError::Store(err) => ApiError::internal(err, trace_id),
        }
    }
}

/// Transition rules. Both store implementations call these with the row locked.
impl OrderStatus {
    pub fn check_cancel(self) -> Result<(), OrderError> {
        match self {
            OrderStatus::Active => Ok(()),
            _ => Err(OrderError::Conflict(ConflictKind::CannotCancel)),
        }
    }

    pub fn check_review(self) -> Result<(), OrderError> {
        match self {
            OrderStatus::Completed => Ok(()),
            _ => Err(OrderError::Conflict(ConflictKind::OrderNotCompleted)),
        }
    }

    /// Admin-driven transitions; only fulfilment (`Active -> Completed`) is allowed.
    pub fn check_transition(self, target: OrderStatus) -> Result<(), OrderError> {
        match (self, target) {
            (OrderStatus::Active, OrderStatus::Completed) => Ok(()),
            _ => Err(OrderError::Conflict(ConflictKind::InvalidTransition)),
        }
    }
}

/// Persistence contract for order transitions. Every mutating method must run its
/// status check and its writes inside one transaction holding the order row lock.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Orders owned by `user_id` with `status`, newest first.
    async fn list_for_user(&self, user_id: i64, status: OrderStatus) -> Result<Vec<Order>, OrderError>;

    async fn list_for_tenant(&self, tenant: &str, status: OrderStatus) -> Result<Vec<Order>, OrderError>;

    /// Load `(order_id, user_id)`, require Active, append a cancellation and set Cancelled.
    async fn cancel(&self, order_id: i64, user_id: i64, reason: &str) -> Result<Order, OrderError>;

    /// Load `(order_id, user_id)`, require Completed and no prior review, insert the review.
    async fn insert_review(
        &self,
        order_id: i64,
        user_id: i64,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, OrderError>;

    /// Load `(order_id, tenant)` and move it to `target` if the transition is allowed.
    async fn transition(&self, order_id: i64, tenant: &str, target: OrderStatus) -> Result<Order, OrderError>;
}

fn validate_reason(reason: &str) -> Result<&str, OrderError> {
    let reason = reason.trim();
    if reason.is_empty() || reason.chars().count() > MAX_REASON_CHARS {
        return Err(OrderError::InvalidInput("invalid_reason"));
    }
    Ok(reason)
}

fn validate_rating(rating: i64) -> Result<i16, OrderError> {
    if (1..=5).contains(&rating) {
        Ok(rating as i16)
    } else {
        Err(OrderError::InvalidInput("invalid_rating"))
    }
}

fn validate_comment(comment: Option<&str>) -> Result<Option<&str>, OrderError> {
    match comment.map(str::trim).filter(|c| !c.is_empty()) {
        Some(c) if c.chars().count() > MAX_COMMENT_CHARS => Err(OrderError::InvalidInput("invalid_comment")),
        other => Ok(other),
    }
}

#[derive(Clone)]
pub struct OrderLifecycle {
    store: Arc<dyn OrderStore>,
}

impl OrderLifecycle {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn list_orders(&self, principal: &Principal, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        ensure_capability(principal, Capability::Customer)?;
        self.store.list_for_user(principal.subject_id(), status).await
    }

    pub async fn cancel(&self, principal: &Principal, order_id: i64, reason: &str) -> Result<Order, OrderError> {
        ensure_capability(principal, Capability::Customer)?;
        let reason = validate_reason(reason)?;
        let user_id = principal.subject_id();

        let result = self.store.cancel(order_id, user_id, reason).await;
        match &result {
            Ok(_) => {
                info!(order_id, user_id, "order cancelled");
                record_transition("cancel", "ok");
            }
            Err(err) => {
                warn!(order_id, user_id, error = %err, "order cancel rejected");
                record_transition("cancel", err.outcome());
            }
        }
        result
    }

    pub async fn leave_review(
        &self,
        principal: &Principal,
        order_id: i64,
        rating: i64,
        comment: Option<&str>,
    ) -> Result<Review, OrderError> {
        ensure_capability(principal, Capability::Customer)?;
        let rating = validate_rating(rating)?;
        let comment = validate_comment(comment)?;
        let user_id = principal.subject_id();

        let result = self.store.insert_review(order_id, user_id, rating, comment).await;
        match &result {
            Ok(_) => {
                info!(order_id, user_id, rating, "review recorded");
                record_transition("review", "ok");
            }
            Err(err) => {
                warn!(order_id, user_id, error = %err, "review rejected");
                record_transition("review", err.outcome());
            }
        }
        result
    }

    pub async fn tenant_orders(
        &self,
        principal: &Principal,
        tenant: &str,
        status: OrderStatus,
    ) -> Result<Vec<Order>, OrderError> {
        ensure_capability(principal, Capability::TenantAdmin(tenant))?;
        self.store.list_for_tenant(tenant, status).await
    }

    pub async fn update_status(
        &self,
        principal: &Principal,
        tenant: &str,
        order_id: i64,
        target: OrderStatus,
    ) -> Result<Order, OrderError> {
        ensure_capability(principal, Capability::TenantAdmin(tenant))?;

        let result = self.store.transition(order_id, tenant, target).await;
        match &result {
            Ok(order) => {
                info!(order_id, tenant, status = %order.status, "order status updated");
                record_transition("complete", "ok");
            }
            Err(err) => {
                warn!(order_id, tenant, target = %target, error = %err, "order status update rejected");
                record_transition("complete", err.outcome());
            }
        }
        result
    }
}
