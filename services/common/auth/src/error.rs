use axum::response::{IntoResponse, Response};
use common_http_errors::ApiError;
use jsonwebtoken::errors::ErrorKind;
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingAuthorization,
    #[error("authorization header malformed")]
    InvalidAuthorization,
    #[error("token invalid or expired: {0}")]
    InvalidOrExpired(String),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("JWT signing secret is not configured")]
    MissingSecret,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl AuthError {
    /// Stable rejection kind used in responses, logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MissingAuthorization | AuthError::InvalidAuthorization => "missing_token",
            AuthError::InvalidOrExpired(_) => "invalid_or_expired",
            AuthError::InvalidClaim(_, _) | AuthError::InvalidJson(_) => "invalid_claims",
            AuthError::MissingSecret | AuthError::Signing(_) => "internal",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AuthError::MissingSecret | AuthError::Signing(_))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        match value.kind() {
            ErrorKind::MissingRequiredClaim(claim) => Self::InvalidClaim("required", claim.clone()),
            ErrorKind::Json(err) => Self::InvalidJson(err.to_string()),
            _ => Self::InvalidOrExpired(value.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        if value.is_internal() {
            ApiError::internal(value, None)
        } else {
            ApiError::Unauthorized { reason: value.kind(), trace_id: None }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn rejection_kinds_map_to_401() {
        for err in [
            AuthError::MissingAuthorization,
            AuthError::InvalidOrExpired("ExpiredSignature".into()),
            AuthError::InvalidClaim("tid", "x".into()),
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn signing_failure_is_internal() {
        let resp = AuthError::Signing("bad key".into()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
