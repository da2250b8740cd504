use axum::http::StatusCode;
use axum::response::IntoResponse;
use common_http_errors::{ApiError, ERROR_CODE_HEADER};
use http_body_util::BodyExt;
use serde_json::Value;
use uuid::Uuid;

async fn render(err: ApiError) -> (StatusCode, String, Value) {
    let resp = err.into_response();
    let status = resp.status();
    let code = resp
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    (status, code, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn every_variant_maps_status_and_code() {
    let cases = [
        (ApiError::ForbiddenMissingRole { role: "CUSTOMER", trace_id: None }, StatusCode::FORBIDDEN, "missing_role"),
        (ApiError::Forbidden { trace_id: None }, StatusCode::FORBIDDEN, "forbidden"),
        (ApiError::bad_request("invalid_rating", None), StatusCode::BAD_REQUEST, "invalid_rating"),
        (ApiError::not_found("order_not_found", None), StatusCode::NOT_FOUND, "order_not_found"),
        (ApiError::conflict("cannot_cancel", "this order cannot be cancelled", None), StatusCode::CONFLICT, "cannot_cancel"),
        (ApiError::Unauthorized { reason: "missing_token", trace_id: None }, StatusCode::UNAUTHORIZED, "unauthenticated"),
    ];
    for (err, status, code) in cases {
        let (got_status, header, body) = render(err).await;
        assert_eq!(got_status, status, "{code}");
        assert_eq!(header, code);
        assert_eq!(body["code"], code);
    }
}

#[tokio::test]
async fn missing_role_names_the_role() {
    let (_, _, body) = render(ApiError::ForbiddenMissingRole { role: "SUPER_ADMIN", trace_id: None }).await;
    assert_eq!(body["missing_role"], "SUPER_ADMIN");
}

#[tokio::test]
async fn unauthorized_carries_reason_and_bearer_challenge() {
    let resp = ApiError::Unauthorized { reason: "invalid_or_expired", trace_id: None }.into_response();
    assert_eq!(resp.headers().get("WWW-Authenticate").unwrap(), "Bearer");
    let (_, _, body) = render(ApiError::Unauthorized { reason: "invalid_or_expired", trace_id: None }).await;
    assert_eq!(body["message"], "invalid_or_expired");
}

#[tokio::test]
async fn internal_errors_hide_the_cause_but_keep_the_trace() {
    let trace = Uuid::new_v4();
    let (status, code, body) = render(ApiError::internal("connection refused by db-primary", Some(trace))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(code, "internal_error");
    assert!(body.get("message").map_or(true, Value::is_null));
    assert_eq!(body["trace_id"], trace.to_string());
    assert!(!body.to_string().contains("db-primary"));
}
