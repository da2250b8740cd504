use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::{middleware, routing::{get, post, put}, Router};
use common_auth::{JwtConfig, JwtVerifier, TokenIssuer, TokenLifetimes};
use common_http_errors::http_error_metrics_layer;
use common_security::AccessGuard;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::field::Empty;

use crate::admin_handlers::{list_tenant_orders, update_order_status, update_tenant_config};
use crate::cache::CacheBackend;
use crate::config::DEFAULT_CORS_ORIGINS;
use crate::config_cache::{CacheSettings, ConfigCache, TenantStore};
use crate::credentials::{Authenticator, CredentialStore};
use crate::lifecycle::{OrderLifecycle, OrderStore};
use crate::metrics::{self, SERVICE_NAME};
use crate::order_handlers::{cancel_order, leave_review, list_orders};
use crate::session_handlers::current_session;
use crate::tenant_handlers::{
    create_tenant, delete_tenant, get_tenant_config, list_tenants, register, super_admin_login, tenant_login,
};

pub async fn health() -> &'static str { "ok" }

async fn metrics_endpoint() -> (StatusCode, String) {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("metrics encode error: {e}")),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub access_guard: Arc<AccessGuard>,
    pub jwt_verifier: Arc<JwtVerifier>,
    pub authenticator: Authenticator,
    pub orders: OrderLifecycle,
    pub tenant_configs: ConfigCache,
}

impl FromRef<AppState> for Arc<AccessGuard> {
    fn from_ref(state: &AppState) -> Self { state.access_guard.clone() }
}

impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self { state.jwt_verifier.clone() }
}

/// Collaborators injected at construction; nothing here is global.
pub struct Backends {
    pub orders: Arc<dyn OrderStore>,
    pub tenants: Arc<dyn TenantStore>,
    pub cache: Arc<dyn CacheBackend>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    pub fn new(jwt: &JwtConfig, lifetimes: TokenLifetimes, cache_settings: CacheSettings, backends: Backends) -> Self {
        let jwt_verifier = Arc::new(JwtVerifier::new(jwt));
        let issuer = Arc::new(TokenIssuer::new(jwt, lifetimes));
        Self {
            access_guard: Arc::new(AccessGuard::new(jwt_verifier.clone())),
            jwt_verifier,
            authenticator: Authenticator::new(backends.credentials, issuer),
            orders: OrderLifecycle::new(backends.orders),
            tenant_configs: ConfigCache::new(backends.tenants, backends.cache, cache_settings),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            cors_allowed_origins: DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
            request_timeout: Duration::from_secs(15),
        }
    }
}

fn request_span(req: &Request<Body>) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = %req.method(),
        uri = %req.uri(),
        trace_id = Empty,
        subject_id = Empty,
        role = Empty,
        tenant = Empty,
    )
}

pub fn build_router(state: AppState, options: RouterOptions) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            options
                .cors_allowed_origins
                .iter()
                .filter_map(|o| o.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION, HeaderName::from_static("x-trace-id")]);

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/session", get(current_session))
        // Public tenant surface
        .route("/tenant/:tenant", get(get_tenant_config))
        .route("/:tenant/login", post(tenant_login))
        .route("/:tenant/register", post(register))
        // Customer
        .route("/orders", get(list_orders))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .route("/orders/:order_id/review", post(leave_review))
        // Tenant admin
        .route("/:tenant/admin/config", put(update_tenant_config))
        .route("/:tenant/admin/orders", get(list_tenant_orders))
        .route("/:tenant/admin/orders/:order_id/status", put(update_order_status))
        // Super admin
        .route("/superadmin/login", post(super_admin_login))
        .route("/superadmin/tenants", get(list_tenants).post(create_tenant))
        .route("/superadmin/tenants/:tenant", axum::routing::delete(delete_tenant))
        .with_state(state)
        .layer(middleware::from_fn(http_error_metrics_layer(SERVICE_NAME)))
        .layer(TimeoutLayer::new(options.request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(cors)
}
