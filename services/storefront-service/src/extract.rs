use axum::extract::rejection::JsonRejection;
use axum::Json;
use common_http_errors::ApiError;
use uuid::Uuid;

use crate::models::OrderStatus;

pub fn parse_order_id(raw: &str, trace_id: Option<Uuid>) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request("invalid_order_id", trace_id))
}

/// Missing status filters default to `Active`.
pub fn parse_status_filter(raw: Option<&str>, trace_id: Option<Uuid>) -> Result<OrderStatus, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(OrderStatus::Active),
        Some(value) => OrderStatus::parse(value).ok_or_else(|| ApiError::bad_request("invalid_status", trace_id)),
    }
}

pub fn json_body<T>(payload: Result<Json<T>, JsonRejection>, trace_id: Option<Uuid>) -> Result<T, ApiError> {
    match payload {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::BadRequest {
            code: "invalid_body",
            trace_id,
            message: Some(rejection.body_text()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_must_be_positive_integers() {
        assert_eq!(parse_order_id("42", None).unwrap(), 42);
        assert!(parse_order_id("abc", None).is_err());
        assert!(parse_order_id("-1", None).is_err());
        assert!(parse_order_id("4.2", None).is_err());
    }

    #[test]
    fn status_filter_defaults_to_active() {
        assert_eq!(parse_status_filter(None, None).unwrap(), OrderStatus::Active);
        assert_eq!(parse_status_filter(Some(""), None).unwrap(), OrderStatus::Active);
        assert_eq!(parse_status_filter(Some("cancelled"), None).unwrap(), OrderStatus::Cancelled);
        assert!(parse_status_filter(Some("lost"), None).is_err());
    }
}
