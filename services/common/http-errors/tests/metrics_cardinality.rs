use std::sync::atomic::{AtomicUsize, Ordering};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::{middleware, routing::get, Router};
use common_http_errors::{http_error_metrics_layer, register_metrics, ApiError};
use prometheus::{Encoder, Registry, TextEncoder};
use tower::ServiceExt;

static NEXT_TENANT: AtomicUsize = AtomicUsize::new(0);

// A handler that leaks a per-request value into the error code, the way a careless
// caller might, so every response carries a new code.
async fn per_tenant_error() -> Result<&'static str, ApiError> {
    let n = NEXT_TENANT.fetch_add(1, Ordering::Relaxed);
    let code: &'static str = Box::leak(format!("tenant_{n}_missing").into_boxed_str());
    Err(ApiError::not_found(code, None))
}

async fn ok() -> &'static str {
    "ok"
}

fn exposition(registry: &Registry) -> String {
    let mut buf = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buf).unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn unbounded_codes_collapse_into_other() {
    let app = Router::new()
        .route("/err", get(per_tenant_error))
        .route("/ok", get(ok))
        .layer(middleware::from_fn(http_error_metrics_layer("storefront-test")));

    for _ in 0..60 {
        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/err").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
    let resp = app
        .oneshot(Request::builder().uri("/ok").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let registry = Registry::new();
    register_metrics(&registry).unwrap();
    let text = exposition(&registry);
    assert!(text.contains("service=\"storefront-test\""));
    assert!(text.contains("code=\"other\""), "overflow label missing:\n{text}");
    assert!(!text.contains("tenant_59_missing"));
    assert!(text.contains("http_error_code_overflow_total"));
}
