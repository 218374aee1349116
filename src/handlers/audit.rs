use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header, header::HeaderValue},
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use csv::Writer;
use serde::Deserialize;

use crate::AppState;
use crate::db::queries;
use crate::error::AppError;
use crate::handlers::{CallerId, require_role};
use crate::services::AuditService;
use crate::services::audit::{BalanceReport, ReconciliationReport};

#[derive(Debug, Deserialize, Default)]
pub struct ExportQuery {
    /// Start date filter (inclusive) - format: YYYY-MM-DD
    pub start_date: Option<String>,
    /// End date filter (inclusive) - format: YYYY-MM-DD
    pub end_date: Option<String>,
}

/// Parse a YYYY-MM-DD (or full RFC 3339) date string.
fn parse_date(date_str: &str) -> Result<DateTime<Utc>, String> {
    let date_str = if date_str.len() == 10 {
        format!("{}T00:00:00Z", date_str)
    } else {
        date_str.to_string()
    };

    DateTime::parse_from_rfc3339(&date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("Invalid date format: {}", e))
}

#[utoipa::path(
    get,
    path = "/audit/reconcile",
    responses(
        (status = 200, description = "Reconciliation report over all COMPLETED orders", body = ReconciliationReport)
    ),
    tag = "Audit"
)]
pub async fn reconcile(
    State(state): State<AppState>,
    caller: CallerId,
) -> Result<impl IntoResponse, AppError> {
    require_role(&state, &caller, &["SUPERADMIN"]).await?;
    let service = AuditService::new(state.db.clone(), state.config.platform_account_key.clone());
    let report = service.reconcile_all().await?;
    Ok(Json(report))
}

#[utoipa::path(
    get,
    path = "/audit/balance",
    responses(
        (status = 200, description = "Global wallet vs ledger totals", body = BalanceReport)
    ),
    tag = "Audit"
)]
pub async fn balance(
    State(state): State<AppState>,
    caller: CallerId,
) -> Result<impl IntoResponse, AppError> {
    require_role(&state, &caller, &["SUPERADMIN"]).await?;
    let service = AuditService::new(state.db.clone(), state.config.platform_account_key.clone());
    let report = service.verify_global_balance().await;
    Ok(Json(report))
}

/// CSV export of financial snapshots, optionally bounded by start/end date
/// (both inclusive).
pub async fn export(
    State(state): State<AppState>,
    caller: CallerId,
    Query(query): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    require_role(&state, &caller, &["SUPERADMIN"]).await?;

    let start = match query.start_date.as_deref() {
        Some(raw) => Some(parse_date(raw).map_err(AppError::Validation)?),
        None => None,
    };
    // Push the bound to the next midnight so the entire end date is included.
    let end = match query.end_date.as_deref() {
        Some(raw) => Some(parse_date(raw).map_err(AppError::Validation)? + Duration::days(1)),
        None => None,
    };

    let rows = queries::list_audit_export_rows(&state.db, start, end).await?;

    let mut writer = Writer::from_writer(vec![]);
    writer
        .write_record([
            "order_id",
            "user",
            "organization",
            "stand",
            "total_amount",
            "commission_amount",
            "net_amount",
            "created_at",
        ])
        .map_err(|e| AppError::Internal(e.to_string()))?;
    for row in &rows {
        writer
            .write_record([
                row.order_id.to_string(),
                row.username.clone().unwrap_or_default(),
                row.organization_name.clone().unwrap_or_default(),
                row.stand_name.clone().unwrap_or_default(),
                row.total_amount.to_string(),
                row.commission_amount.to_string(),
                row.net_amount.to_string(),
                row.created_at.to_rfc3339(),
            ])
            .map_err(|e| AppError::Internal(e.to_string()))?;
    }
    let body = writer
        .into_inner()
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let body = String::from_utf8(body).map_err(|e| AppError::Internal(e.to_string()))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"financial_audit_export.csv\""),
    );

    Ok((StatusCode::OK, headers, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        let result = parse_date("2026-01-01");
        assert!(result.is_ok());
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("not-a-date").is_err());
        assert!(parse_date("2026-13-99").is_err());
    }

    #[test]
    fn test_parse_date_accepts_rfc3339() {
        let result = parse_date("2026-01-01T12:30:00Z");
        assert!(result.is_ok());
    }
}
