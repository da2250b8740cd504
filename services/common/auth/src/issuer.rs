use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::debug;

use crate::claims::{Principal, TokenClaims};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Absolute token lifetimes per role family.
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub customer: Duration,
    pub admin: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            customer: Duration::hours(72),
            admin: Duration::hours(8),
        }
    }
}

impl TokenLifetimes {
    pub fn for_role(&self, role: Role) -> Duration {
        match role {
            Role::Customer => self.customer,
            Role::TenantAdmin | Role::SuperAdmin => self.admin,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig, lifetimes: TokenLifetimes) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret()),
            lifetimes,
        }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn issue(&self, principal: &Principal) -> AuthResult<IssuedToken> {
        self.issue_at(principal, Utc::now())
    }

    /// Mint with an explicit `iat`; expiry is `now + lifetime(role)`.
    pub fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> AuthResult<IssuedToken> {
        let expires_at = now + self.lifetimes.for_role(principal.role());
        let claims = TokenClaims::for_principal(principal, now, expires_at);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Signing(err.to_string()))?;
        debug!(
            subject_id = principal.subject_id(),
            role = %principal.role(),
            tenant = principal.tenant().unwrap_or("-"),
            %expires_at,
            "issued token"
        );
        Ok(IssuedToken {
            token,
            token_type: "Bearer",
            issued_at: now,
            expires_at,
        })
    }
}
