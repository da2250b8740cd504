use axum::Json;
use chrono::{DateTime, Utc};
use common_auth::Role;
use common_security::Authenticated;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub subject_id: i64,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub async fn current_session(Authenticated(ctx): Authenticated) -> Json<SessionView> {
    Json(SessionView {
        subject_id: ctx.principal.subject_id(),
        role: ctx.principal.role(),
        tenant: ctx.principal.tenant().map(str::to_owned),
        expires_at: ctx.expires_at,
    })
}
