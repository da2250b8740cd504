use std::collections::HashMap;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts, Path};
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use chrono::{DateTime, Utc};
use common_auth::Principal;
use common_http_errors::ApiError;
use tracing::Span;
use uuid::Uuid;

use crate::policy::{AccessGuard, Capability};
use crate::SecurityError;

/// Request-scoped identity. Built per request from a verified token and dropped with it.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub principal: Principal,
    pub expires_at: DateTime<Utc>,
    pub trace_id: Uuid,
}

pub fn trace_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers.get("X-Trace-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[derive(Clone, Copy)]
enum Requirement {
    Any,
    Customer,
    TenantAdminOfRoute,
    SuperAdmin,
}

async fn route_tenant<S: Send + Sync>(parts: &mut Parts, state: &S) -> Result<String, SecurityError> {
    let Path(params) = Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map_err(|_| SecurityError::MissingTenantScope)?;
    params.get("tenant").cloned().ok_or(SecurityError::MissingTenantScope)
}

async fn secure<S>(parts: &mut Parts, state: &S, requirement: Requirement) -> Result<SecurityContext, ApiError>
where
    Arc<AccessGuard>: FromRef<S>,
    S: Send + Sync,
{
    let guard = Arc::<AccessGuard>::from_ref(state);
    let trace_id = trace_id_from_headers(&parts.headers).unwrap_or_else(Uuid::new_v4);
    Span::current().record("trace_id", tracing::field::display(trace_id));

    let claims = guard
        .verify(parts.headers.get(AUTHORIZATION))
        .map_err(|e| e.into_api_error(Some(trace_id)))?;

    let outcome = match requirement {
        Requirement::Any => guard.authorize(&claims.principal, Capability::Any),
        Requirement::Customer => guard.authorize(&claims.principal, Capability::Customer),
        Requirement::SuperAdmin => guard.authorize(&claims.principal, Capability::SuperAdmin),
        Requirement::TenantAdminOfRoute => {
            let tenant = route_tenant(parts, state)
                .await
                .map_err(|e| e.into_api_error(Some(trace_id)))?;
            guard.authorize(&claims.principal, Capability::TenantAdmin(&tenant))
        }
    };
    outcome.map_err(|e| e.into_api_error(Some(trace_id)))?;

    let span = Span::current();
    span.record("subject_id", claims.principal.subject_id());
    span.record("role", claims.principal.role().as_str());
    if let Some(tenant) = claims.principal.tenant() {
        span.record("tenant", tenant);
    }

    let ctx = SecurityContext {
        principal: claims.principal,
        expires_at: claims.expires_at,
        trace_id,
    };
    parts.extensions.insert(ctx.clone());
    Ok(ctx)
}

macro_rules! capability_extractor {
    ($(#[$meta:meta])* $name:ident, $requirement:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub SecurityContext);

        #[async_trait]
        impl<S> FromRequestParts<S> for $name
        where
            Arc<AccessGuard>: FromRef<S>,
            S: Send + Sync,
        {
            type Rejection = ApiError;

            async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
                secure(parts, state, $requirement).await.map($name)
            }
        }
    };
}

capability_extractor!(
    /// Any verified principal.
    Authenticated,
    Requirement::Any
);
capability_extractor!(CustomerCtx, Requirement::Customer);
capability_extractor!(
    /// Tenant admin whose tenant equals the `:tenant` route segment.
    TenantAdminCtx,
    Requirement::TenantAdminOfRoute
);
capability_extractor!(SuperAdminCtx, Requirement::SuperAdmin);
