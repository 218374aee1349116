pub mod audit;
pub mod orders;
pub mod wallet;

use crate::AppState;
use crate::db::models::User;
use crate::db::queries;
use crate::error::AppError;
use async_trait::async_trait;
use axum::{
    Json,
    extract::{FromRequestParts, State},
    http::{StatusCode, request::Parts},
    response::IntoResponse,
};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Caller identity from the `x-user-id` header. Authentication itself lives
/// outside this service; the header is the boundary contract.
pub struct CallerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-user-id")
            .ok_or_else(|| AppError::Unauthorized("missing x-user-id header".to_string()))?;
        let id = raw
            .to_str()
            .ok()
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or_else(|| AppError::Validation("x-user-id must be a UUID".to_string()))?;
        Ok(CallerId(id))
    }
}

/// Load the caller and require one of the given roles.
pub async fn require_role(
    state: &AppState,
    caller: &CallerId,
    allowed: &[&str],
) -> Result<User, AppError> {
    let user = queries::get_user(&state.db, caller.0, false)
        .await?
        .ok_or_else(|| AppError::Unauthorized("unknown caller".to_string()))?;
    if !user.is_active {
        return Err(AppError::Forbidden("account is not active".to_string()));
    }
    if !allowed.contains(&user.role.as_str()) {
        return Err(AppError::Forbidden(format!(
            "requires one of roles: {}",
            allowed.join(", ")
        )));
    }
    Ok(user)
}

#[derive(Serialize, ToSchema)]
pub struct DbPoolStats {
    pub active_connections: u32,
    pub idle_connections: u32,
    pub max_connections: u32,
}

#[derive(Serialize, ToSchema)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub db_pool: DbPoolStats,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthStatus),
        (status = 503, description = "Service is unhealthy", body = HealthStatus)
    ),
    tag = "Health"
)]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected",
        Err(_) => "disconnected",
    };

    let pool = &state.db;
    let health_response = HealthStatus {
        status: if db_status == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        db_pool: DbPoolStats {
            active_connections: pool.size(),
            idle_connections: pool.num_idle() as u32,
            max_connections: pool.options().get_max_connections(),
        },
    };

    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
