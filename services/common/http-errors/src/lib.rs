use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use axum::{
    body::Body,
    http::{header::WWW_AUTHENTICATE, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")] pub missing_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")] pub trace_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")] pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized { reason: &'static str, trace_id: Option<Uuid> },
    ForbiddenMissingRole { role: &'static str, trace_id: Option<Uuid> },
    Forbidden { trace_id: Option<Uuid> },
    BadRequest { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    NotFound { code: &'static str, trace_id: Option<Uuid> },
    Conflict { code: &'static str, trace_id: Option<Uuid>, message: Option<String> },
    Internal { trace_id: Option<Uuid>, message: Option<String> },
}

impl ApiError {
    /// Logs the underlying error and returns a generic 500; the detail never reaches the client.
    pub fn internal<E: std::fmt::Display>(e: E, trace_id: Option<Uuid>) -> Self {
        error!(error = %e, ?trace_id, "internal error");
        Self::Internal { trace_id, message: None }
    }
    pub fn bad_request(code: &'static str, trace_id: Option<Uuid>) -> Self { Self::BadRequest { code, trace_id, message: None } }
    pub fn not_found(code: &'static str, trace_id: Option<Uuid>) -> Self { Self::NotFound { code, trace_id } }
    pub fn conflict(code: &'static str, message: impl Into<String>, trace_id: Option<Uuid>) -> Self {
        Self::Conflict { code, trace_id, message: Some(message.into()) }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::ForbiddenMissingRole { .. } | ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let unauthorized = status == StatusCode::UNAUTHORIZED;
        let (body, error_code) = match self {
            ApiError::Unauthorized { reason, trace_id } => (
                ErrorBody { code: "unauthenticated".into(), missing_role: None, trace_id, message: Some(reason.into()) },
                "unauthenticated"
            ),
            ApiError::ForbiddenMissingRole { role, trace_id } => (
                ErrorBody { code: "missing_role".into(), missing_role: Some(role.into()), trace_id, message: None },
                "missing_role"
            ),
            ApiError::Forbidden { trace_id } => (
                ErrorBody { code: "forbidden".into(), missing_role: None, trace_id, message: None },
                "forbidden"
            ),
            ApiError::BadRequest { code, trace_id, message } => (
                ErrorBody { code: code.into(), missing_role: None, trace_id, message },
                code
            ),
            ApiError::NotFound { code, trace_id } => (
                ErrorBody { code: code.into(), missing_role: None, trace_id, message: None },
                code
            ),
            ApiError::Conflict { code, trace_id, message } => (
                ErrorBody { code: code.into(), missing_role: None, trace_id, message },
                code
            ),
            ApiError::Internal { trace_id, message } => (
                ErrorBody { code: "internal_error".into(), missing_role: None, trace_id, message },
                "internal_error"
            ),
        };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        if unauthorized {
            resp.headers_mut().insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

// --- Error metrics ---
// Error codes are free-form strings, so label cardinality is capped; codes past the
// cap are folded into OVERFLOW_CODE.
const MAX_ERROR_CODES: usize = 40;
const OVERFLOW_CODE: &str = "other";

static HTTP_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_errors_total", "Count of HTTP error responses emitted (status >= 400)"),
        &["service", "code", "status"],
    ).expect("valid http_errors_total opts")
});

static ERROR_CODES_DISTINCT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("http_error_codes_distinct", "Distinct error codes tracked as metric labels")
        .expect("valid http_error_codes_distinct opts")
});

static ERROR_CODE_OVERFLOW_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("http_error_code_overflow_total", "Error responses whose code exceeded the label guard")
        .expect("valid http_error_code_overflow_total opts")
});

static SEEN_CODES: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Register the shared error metrics on a service registry.
pub fn register_metrics(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(HTTP_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(ERROR_CODES_DISTINCT.clone()))?;
    registry.register(Box::new(ERROR_CODE_OVERFLOW_TOTAL.clone()))?;
    Ok(())
}

fn code_label(code: &str) -> String {
    let mut seen = SEEN_CODES.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if seen.contains(code) {
        return code.to_string();
    }
    if seen.len() < MAX_ERROR_CODES {
        seen.insert(code.to_string());
        ERROR_CODES_DISTINCT.set(seen.len() as i64);
        return code.to_string();
    }
    ERROR_CODE_OVERFLOW_TOTAL.inc();
    OVERFLOW_CODE.to_string()
}

pub fn record_error_response(service: &str, resp: &Response) {
    let status = resp.status();
    if status.as_u16() < 400 {
        return;
    }
    let code = resp
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let label = code_label(code);
    HTTP_ERRORS_TOTAL.with_label_values(&[service, &label, status.as_str()]).inc();
}

pub type MetricsFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Middleware function for `axum::middleware::from_fn` counting error responses per code.
pub fn http_error_metrics_layer(
    service: &'static str,
) -> impl Fn(Request<Body>, Next) -> MetricsFuture + Clone + Send + Sync + 'static {
    move |req: Request<Body>, next: Next| {
        Box::pin(async move {
            let resp = next.run(req).await;
            record_error_response(service, &resp);
            resp
        }) as MetricsFuture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_labels_fold_into_overflow_past_the_cap() {
        for i in 0..MAX_ERROR_CODES + 5 {
            code_label(&format!("unit_code_{i}"));
        }
        assert!(ERROR_CODES_DISTINCT.get() as usize <= MAX_ERROR_CODES);
        assert_eq!(code_label("unit_code_never_seen"), OVERFLOW_CODE);
        assert!(ERROR_CODE_OVERFLOW_TOTAL.get() > 0);
    }
}
