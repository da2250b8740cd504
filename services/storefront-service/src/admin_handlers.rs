use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use common_http_errors::{ApiError, ApiResult};
use common_security::TenantAdminCtx;
use serde::Deserialize;

use crate::extract::{json_body, parse_order_id, parse_status_filter};
use crate::models::{Order, OrderStatus, TenantConfig};
use crate::order_handlers::StatusQuery;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

pub async fn update_tenant_config(
    State(state): State<AppState>,
    TenantAdminCtx(ctx): TenantAdminCtx,
    Path(tenant): Path<String>,
    payload: Result<Json<TenantConfig>, JsonRejection>,
) -> ApiResult<Json<TenantConfig>> {
    let trace_id = Some(ctx.trace_id);
    let config = json_body(payload, trace_id)?;
    let updated = state
        .tenant_configs
        .update(&ctx.principal, &tenant, config)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(updated))
}

pub async fn list_tenant_orders(
    State(state): State<AppState>,
    TenantAdminCtx(ctx): TenantAdminCtx,
    Path(tenant): Path<String>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<Json<Vec<Order>>> {
    let trace_id = Some(ctx.trace_id);
    let status = parse_status_filter(query.status.as_deref(), trace_id)?;
    let orders = state
        .orders
        .tenant_orders(&ctx.principal, &tenant, status)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(orders))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    TenantAdminCtx(ctx): TenantAdminCtx,
    Path((tenant, order_id)): Path<(String, String)>,
    payload: Result<Json<UpdateOrderStatusRequest>, JsonRejection>,
) -> ApiResult<Json<Order>> {
    let trace_id = Some(ctx.trace_id);
    let order_id = parse_order_id(&order_id, trace_id)?;
    let body = json_body(payload, trace_id)?;
    let target = OrderStatus::parse(&body.status)
        .ok_or_else(|| ApiError::bad_request("invalid_status", trace_id))?;
    let order = state
        .orders
        .update_status(&ctx.principal, &tenant, order_id, target)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(order))
}
