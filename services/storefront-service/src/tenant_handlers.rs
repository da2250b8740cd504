use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use common_auth::IssuedToken;
use common_http_errors::ApiResult;
use common_security::{trace_id_from_headers, SuperAdminCtx};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::Registration;
use crate::extract::json_body;
use crate::models::{Tenant, TenantConfig};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

impl From<IssuedToken> for LoginResponse {
    fn from(issued: IssuedToken) -> Self {
        Self {
            token: issued.token,
            token_type: issued.token_type,
            expires_at: issued.expires_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: i64,
    pub tenant: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub config: TenantConfig,
}

/// Unauthenticated routes have no security context; honour a caller-supplied trace id.
fn trace_id_from(headers: &HeaderMap) -> Uuid {
    trace_id_from_headers(headers).unwrap_or_else(Uuid::new_v4)
}

pub async fn get_tenant_config(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<TenantConfig>> {
    let trace_id = Some(trace_id_from(&headers));
    let config = state
        .tenant_configs
        .get(&tenant)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(config))
}

pub async fn tenant_login(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let trace_id = Some(trace_id_from(&headers));
    let body = json_body(payload, trace_id)?;
    let issued = state
        .authenticator
        .login_tenant(&tenant, &body.email, &body.password)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(issued.into()))
}

/// Self-service CUSTOMER sign-up; admins are provisioned out of band.
pub async fn register(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    let trace_id = Some(trace_id_from(&headers));
    let body = json_body(payload, trace_id)?;
    state
        .tenant_configs
        .get(&tenant)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    let registration = Registration::new(&tenant, &body.email, &body.full_name, &body.password)
        .map_err(|e| e.into_api_error(trace_id))?;
    let id = state
        .authenticator
        .register_customer(&registration)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id,
            tenant: registration.tenant,
            email: registration.email,
        }),
    ))
}

pub async fn super_admin_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<LoginResponse>> {
    let trace_id = Some(trace_id_from(&headers));
    let body = json_body(payload, trace_id)?;
    let issued = state
        .authenticator
        .login_super_admin(&body.email, &body.password)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(issued.into()))
}

pub async fn list_tenants(
    State(state): State<AppState>,
    SuperAdminCtx(ctx): SuperAdminCtx,
) -> ApiResult<Json<Vec<Tenant>>> {
    let trace_id = Some(ctx.trace_id);
    let tenants = state
        .tenant_configs
        .list_tenants(&ctx.principal)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(Json(tenants))
}

pub async fn create_tenant(
    State(state): State<AppState>,
    SuperAdminCtx(ctx): SuperAdminCtx,
    payload: Result<Json<CreateTenantRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Tenant>)> {
    let trace_id = Some(ctx.trace_id);
    let body = json_body(payload, trace_id)?;
    let tenant = Tenant {
        name: body.name.trim().to_string(),
        config: body.config,
    };
    let created = state
        .tenant_configs
        .create_tenant(&ctx.principal, tenant)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_tenant(
    State(state): State<AppState>,
    SuperAdminCtx(ctx): SuperAdminCtx,
    Path(tenant): Path<String>,
) -> ApiResult<StatusCode> {
    let trace_id = Some(ctx.trace_id);
    state
        .tenant_configs
        .delete_tenant(&ctx.principal, &tenant)
        .await
        .map_err(|e| e.into_api_error(trace_id))?;
    Ok(StatusCode::NO_CONTENT)
}
