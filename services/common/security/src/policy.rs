use std::sync::Arc;

use axum::http::HeaderValue;
use common_auth::{authenticate_header, JwtVerifier, Principal, Role, VerifiedClaims};
use tracing::{debug, warn};

use crate::error::{SecurityError, AUTH_REJECTIONS_TOTAL};

/// What a route requires of its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability<'a> {
    Any,
    Customer,
    /// Tenant admin of exactly this tenant.
    TenantAdmin(&'a str),
    SuperAdmin,
}

pub fn ensure_capability(principal: &Principal, cap: Capability<'_>) -> Result<(), SecurityError> {
    match (cap, principal) {
        (Capability::Any, _) => Ok(()),
        (Capability::Customer, Principal::Customer { .. }) => Ok(()),
        (Capability::Customer, _) => Err(SecurityError::MissingRole { required: Role::Customer }),
        (Capability::TenantAdmin(route_tenant), Principal::TenantAdmin { tenant, .. }) => {
            if tenant == route_tenant {
                Ok(())
            } else {
                Err(SecurityError::TenantMismatch)
            }
        }
        (Capability::TenantAdmin(_), _) => Err(SecurityError::MissingRole { required: Role::TenantAdmin }),
        (Capability::SuperAdmin, Principal::SuperAdmin { .. }) => Ok(()),
        (Capability::SuperAdmin, _) => Err(SecurityError::MissingRole { required: Role::SuperAdmin }),
    }
}

/// Verifies the bearer token and enforces a capability. Authentication always
/// runs before the capability check, and either failure ends the request.
#[derive(Clone)]
pub struct AccessGuard {
    verifier: Arc<JwtVerifier>,
}

impl AccessGuard {
    pub fn new(verifier: Arc<JwtVerifier>) -> Self {
        Self { verifier }
    }

    pub fn verifier(&self) -> &Arc<JwtVerifier> {
        &self.verifier
    }

    pub fn verify(&self, header: Option<&HeaderValue>) -> Result<VerifiedClaims, SecurityError> {
        authenticate_header(&self.verifier, header).map_err(|err| {
            AUTH_REJECTIONS_TOTAL.with_label_values(&[err.kind()]).inc();
            if err.is_internal() {
                warn!(error = %err, "token verification failed internally");
            } else {
                debug!(kind = err.kind(), error = %err, "rejected credential");
            }
            SecurityError::from(err)
        })
    }

    pub fn authorize(&self, principal: &Principal, cap: Capability<'_>) -> Result<(), SecurityError> {
        ensure_capability(principal, cap).map_err(|err| {
            AUTH_REJECTIONS_TOTAL.with_label_values(&[err.kind()]).inc();
            warn!(
                subject_id = principal.subject_id(),
                role = %principal.role(),
                principal_tenant = principal.tenant().unwrap_or("-"),
                required = ?cap,
                "capability_check_failed"
            );
            err
        })
    }

    pub fn authenticate(
        &self,
        header: Option<&HeaderValue>,
        cap: Capability<'_>,
    ) -> Result<VerifiedClaims, SecurityError> {
        let claims = self.verify(header)?;
        self.authorize(&claims.principal, cap)?;
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_auth::{JwtConfig, TokenIssuer, TokenLifetimes};

    fn guard_and_issuer() -> (AccessGuard, TokenIssuer) {
        let cfg = JwtConfig::new("policy-secret").unwrap();
        (
            AccessGuard::new(Arc::new(JwtVerifier::new(&cfg))),
            TokenIssuer::new(&cfg, TokenLifetimes::default()),
        )
    }

    fn bearer(issuer: &TokenIssuer, principal: &Principal) -> HeaderValue {
        let token = issuer.issue(principal).unwrap().token;
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap()
    }

    #[test]
    fn tenant_admin_of_a_is_rejected_on_b() {
        let admin = Principal::tenant_admin(3, "a");
        assert!(ensure_capability(&admin, Capability::TenantAdmin("a")).is_ok());
        assert!(matches!(
            ensure_capability(&admin, Capability::TenantAdmin("b")),
            Err(SecurityError::TenantMismatch)
        ));
    }

    #[test]
    fn customer_cannot_act_as_tenant_admin_of_own_tenant() {
        let customer = Principal::customer(7, "a");
        assert!(matches!(
            ensure_capability(&customer, Capability::TenantAdmin("a")),
            Err(SecurityError::MissingRole { required: Role::TenantAdmin })
        ));
    }

    #[test]
    fn super_admin_is_not_a_tenant_admin() {
        let root = Principal::super_admin(1);
        assert!(ensure_capability(&root, Capability::SuperAdmin).is_ok());
        assert!(ensure_capability(&root, Capability::TenantAdmin("a")).is_err());
        assert!(ensure_capability(&root, Capability::Customer).is_err());
    }

    #[test]
    fn any_accepts_every_role() {
        for p in [Principal::customer(1, "a"), Principal::tenant_admin(2, "a"), Principal::super_admin(3)] {
            assert!(ensure_capability(&p, Capability::Any).is_ok());
        }
    }

    #[test]
    fn authenticate_checks_token_before_capability() {
        let (guard, _) = guard_and_issuer();
        let err = guard.authenticate(None, Capability::SuperAdmin).unwrap_err();
        assert_eq!(err.kind(), "missing_token");
    }

    #[test]
    fn authenticate_returns_principal_for_matching_capability() {
        let (guard, issuer) = guard_and_issuer();
        let header = bearer(&issuer, &Principal::tenant_admin(3, "pizzaco"));
        let claims = guard
            .authenticate(Some(&header), Capability::TenantAdmin("pizzaco"))
            .unwrap();
        assert_eq!(claims.principal.tenant(), Some("pizzaco"));
    }

    #[test]
    fn authenticate_rejects_foreign_tenant() {
        let (guard, issuer) = guard_and_issuer();
        let header = bearer(&issuer, &Principal::tenant_admin(3, "a"));
        let err = guard.authenticate(Some(&header), Capability::TenantAdmin("b")).unwrap_err();
        assert_eq!(err.kind(), "wrong_role_or_tenant");
    }
}
