use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use common_http_errors::ApiResult;
use common_security::CustomerCtx;
use serde::Deserialize;

use crate::extract::{json_body, parse_order_id, parse_status_filter};
use crate::models::{Order, Review};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelOrderRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

pub async fn list_orders(
    State(state): State<AppState>,
    CustomerCtx(ctx): CustomerCtx,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let trace_id = Some(ctx.trace_id);
    let status = parse_status_filter(query.status.as_deref(), trace_id)?;
    let orders = state
        .orders
        .list_orders(&ctx.principal, status)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(orders))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    CustomerCtx(ctx): CustomerCtx,
    Path(order_id): Path<String>,
    payload: Result<Json<CancelOrderRequest>, JsonRejection>,
) -> ApiResult<Json<Order>> {
    let trace_id = Some(ctx.trace_id);
    let order_id = parse_order_id(&order_id, trace_id)?;
    let body = json_body(payload, trace_id)?;
    let order = state
        .orders
        .cancel(&ctx.principal, order_id, &body.reason)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(order))
}

pub async fn leave_review(
    State(state): State<AppState>,
    CustomerCtx(ctx): CustomerCtx,
    Path(order_id): Path<String>,
    payload: Result<Json<ReviewRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let trace_id = Some(ctx.trace_id);
    let order_id = parse_order_id(&order_id, trace_id)?;
    let body = json_body(payload, trace_id)?;
    let review = state
        .orders
        .leave_review(&ctx.principal, order_id, body.rating, body.comment.as_deref())
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok((StatusCode::CREATED, Json(review)))
}
