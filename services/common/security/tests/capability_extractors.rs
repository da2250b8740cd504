use std::sync::Arc;

use axum::body::Body;
use axum::extract::FromRef;
use axum::http::{header::AUTHORIZATION, Request, StatusCode};
use axum::routing::{get, put};
use axum::Router;
use common_auth::{JwtConfig, JwtVerifier, Principal, TokenIssuer, TokenLifetimes};
use common_security::{AccessGuard, CustomerCtx, SuperAdminCtx, TenantAdminCtx};
use tower::ServiceExt;

#[derive(Clone)]
struct TestState {
    guard: Arc<AccessGuard>,
}

impl FromRef<TestState> for Arc<AccessGuard> {
    fn from_ref(state: &TestState) -> Self {
        state.guard.clone()
    }
}

async fn admin_config(TenantAdminCtx(ctx): TenantAdminCtx) -> String {
    ctx.principal.tenant().unwrap_or_default().to_string()
}

async fn customer_orders(CustomerCtx(ctx): CustomerCtx) -> String {
    ctx.principal.subject_id().to_string()
}

async fn tenants(SuperAdminCtx(_): SuperAdminCtx) -> &'static str {
    "ok"
}

fn setup() -> (Router, TokenIssuer) {
    let cfg = JwtConfig::new("extractor-secret").unwrap();
    let state = TestState {
        guard: Arc::new(AccessGuard::new(Arc::new(JwtVerifier::new(&cfg)))),
    };
    let router = Router::new()
        .route("/:tenant/admin/config", put(admin_config))
        .route("/orders", get(customer_orders))
        .route("/superadmin/tenants", get(tenants))
        .with_state(state);
    (router, TokenIssuer::new(&cfg, TokenLifetimes::default()))
}

fn request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn tenant_admin_passes_on_own_tenant() {
    let (app, issuer) = setup();
    let token = issuer.issue(&Principal::tenant_admin(3, "a")).unwrap().token;
    let resp = app.oneshot(request("PUT", "/a/admin/config", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_admin_for_a_is_forbidden_on_b() {
    let (app, issuer) = setup();
    let token = issuer.issue(&Principal::tenant_admin(3, "a")).unwrap().token;
    let resp = app.oneshot(request("PUT", "/b/admin/config", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn missing_token_is_401_even_on_tenant_route() {
    let (app, _) = setup();
    let resp = app.oneshot(request("PUT", "/a/admin/config", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_token_cannot_reach_super_admin_routes() {
    let (app, issuer) = setup();
    let token = issuer.issue(&Principal::customer(7, "a")).unwrap().token;
    let resp = app.oneshot(request("GET", "/superadmin/tenants", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(resp.headers().get("X-Error-Code").unwrap(), "missing_role");
}

#[tokio::test]
async fn admin_token_cannot_reach_customer_routes() {
    let (app, issuer) = setup();
    let token = issuer.issue(&Principal::tenant_admin(3, "a")).unwrap().token;
    let resp = app.oneshot(request("GET", "/orders", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn customer_reaches_customer_routes() {
    let (app, issuer) = setup();
    let token = issuer.issue(&Principal::customer(7, "a")).unwrap().token;
    let resp = app.oneshot(request("GET", "/orders", Some(&token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
