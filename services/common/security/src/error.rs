use axum::response::{IntoResponse, Response};
use common_auth::{AuthError, Role};
use common_http_errors::ApiError;
use once_cell::sync::Lazy;
use prometheus::{IntCounterVec, Opts, Registry};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),
    #[error("principal lacks required role {required}")]
    MissingRole { required: Role },
    #[error("principal tenant does not match route tenant")]
    TenantMismatch,
    #[error("route has no tenant segment")]
    MissingTenantScope,
}

impl SecurityError {
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityError::Unauthenticated(err) => err.kind(),
            SecurityError::MissingRole { .. } | SecurityError::TenantMismatch => "wrong_role_or_tenant",
            SecurityError::MissingTenantScope => "internal",
        }
    }

    pub fn into_api_error(self, trace_id: Option<Uuid>) -> ApiError {
        match self {
            SecurityError::Unauthenticated(err) if err.is_internal() => ApiError::internal(err, trace_id),
            SecurityError::Unauthenticated(err) => ApiError::Unauthorized { reason: err.kind(), trace_id },
            SecurityError::MissingRole { required } => ApiError::ForbiddenMissingRole { role: required.as_str(), trace_id },
            SecurityError::TenantMismatch => ApiError::Forbidden { trace_id },
            SecurityError::MissingTenantScope => ApiError::internal("tenant capability on route without :tenant", trace_id),
        }
    }
}

impl From<SecurityError> for ApiError {
    fn from(value: SecurityError) -> Self {
        value.into_api_error(None)
    }
}

impl IntoResponse for SecurityError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

pub(crate) static AUTH_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("auth_rejections_total", "Requests rejected by the access guard"),
        &["kind"],
    )
    .expect("valid auth_rejections_total opts")
});

pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(AUTH_REJECTIONS_TOTAL.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn tenant_mismatch_is_forbidden() {
        let resp = SecurityError::TenantMismatch.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "forbidden");
    }

    #[test]
    fn missing_role_names_the_role() {
        let resp = SecurityError::MissingRole { required: Role::SuperAdmin }.into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");
    }

    #[test]
    fn authentication_failures_are_401() {
        let err = SecurityError::from(AuthError::InvalidOrExpired("ExpiredSignature".into()));
        assert_eq!(err.kind(), "invalid_or_expired");
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
