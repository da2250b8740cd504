use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};
use crate::roles::Role;

/// Verified caller identity. Tenant-scoped roles always carry a tenant and the
/// super admin never does, so the combination cannot be represented wrongly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Customer { subject_id: i64, tenant: String },
    TenantAdmin { subject_id: i64, tenant: String },
    SuperAdmin { subject_id: i64 },
}

impl Principal {
    pub fn new(subject_id: i64, role: Role, tenant: Option<String>) -> AuthResult<Self> {
        let tenant = tenant.filter(|t| !t.is_empty());
        match (role, tenant) {
            (Role::Customer, Some(tenant)) => Ok(Principal::Customer { subject_id, tenant }),
            (Role::TenantAdmin, Some(tenant)) => Ok(Principal::TenantAdmin { subject_id, tenant }),
            (Role::SuperAdmin, None) => Ok(Principal::SuperAdmin { subject_id }),
            (Role::SuperAdmin, Some(tenant)) => Err(AuthError::InvalidClaim("tid", tenant)),
            (_, None) => Err(AuthError::InvalidClaim("tid", "<missing>".into())),
        }
    }

    pub fn customer(subject_id: i64, tenant: impl Into<String>) -> Self {
        Principal::Customer { subject_id, tenant: tenant.into() }
    }

    pub fn tenant_admin(subject_id: i64, tenant: impl Into<String>) -> Self {
        Principal::TenantAdmin { subject_id, tenant: tenant.into() }
    }

    pub fn super_admin(subject_id: i64) -> Self {
        Principal::SuperAdmin { subject_id }
    }

    pub fn subject_id(&self) -> i64 {
        match self {
            Principal::Customer { subject_id, .. }
            | Principal::TenantAdmin { subject_id, .. }
            | Principal::SuperAdmin { subject_id } => *subject_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Principal::Customer { .. } => Role::Customer,
            Principal::TenantAdmin { .. } => Role::TenantAdmin,
            Principal::SuperAdmin { .. } => Role::SuperAdmin,
        }
    }

    pub fn tenant(&self) -> Option<&str> {
        match self {
            Principal::Customer { tenant, .. } | Principal::TenantAdmin { tenant, .. } => Some(tenant),
            Principal::SuperAdmin { .. } => None,
        }
    }
}

/// Wire form of the token payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: i64,
    pub rol: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

impl TokenClaims {
    pub fn for_principal(principal: &Principal, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: principal.subject_id(),
            rol: principal.role(),
            tid: principal.tenant().map(str::to_owned),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }
}

/// Claims after signature and expiry checks, decoded into a typed principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub principal: Principal,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

fn timestamp(claim: &'static str, value: i64) -> AuthResult<DateTime<Utc>> {
    Utc.timestamp_opt(value, 0)
        .single()
        .ok_or_else(|| AuthError::InvalidClaim(claim, value.to_string()))
}

impl TryFrom<TokenClaims> for VerifiedClaims {
    type Error = AuthError;

    fn try_from(value: TokenClaims) -> AuthResult<Self> {
        let issued_at = timestamp("iat", value.iat)?;
        let expires_at = timestamp("exp", value.exp)?;
        let principal = Principal::new(value.sub, value.rol, value.tid)?;
        Ok(Self { principal, issued_at, expires_at })
    }
}

impl TryFrom<serde_json::Value> for VerifiedClaims {
    type Error = AuthError;

    fn try_from(value: serde_json::Value) -> AuthResult<Self> {
        let repr: TokenClaims =
            serde_json::from_value(value).map_err(|err| AuthError::InvalidJson(err.to_string()))?;
        VerifiedClaims::try_from(repr)
    }
}
