use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderValue};

use crate::claims::VerifiedClaims;
use crate::error::{AuthError, AuthResult};
use crate::verifier::JwtVerifier;

/// Verified claims of the caller, with no capability requirement beyond a live token.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub claims: VerifiedClaims,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    Arc<JwtVerifier>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = Arc::<JwtVerifier>::from_ref(state);
        let claims = authenticate_header(&verifier, parts.headers.get(AUTHORIZATION))?;
        Ok(Self { claims })
    }
}

/// Verify an optional `Authorization` header value. A header that is present but
/// not a usable bearer credential is treated the same as no header at all.
pub fn authenticate_header(verifier: &JwtVerifier, header: Option<&HeaderValue>) -> AuthResult<VerifiedClaims> {
    let token = parse_bearer(header.ok_or(AuthError::MissingAuthorization)?)?;
    verifier.verify(token)
}

/// Scheme match is case-insensitive.
pub fn parse_bearer(value: &HeaderValue) -> AuthResult<&str> {
    let (scheme, token) = value
        .to_str()
        .ok()
        .and_then(|raw| raw.trim().split_once(' '))
        .ok_or(AuthError::InvalidAuthorization)?;
    match token.trim() {
        token if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() => Ok(token),
        _ => Err(AuthError::InvalidAuthorization),
    }
}
