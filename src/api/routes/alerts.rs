//! Alert endpoints (customer keys)

use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::domain::{AlertSeverity, AlertStatus};
use crate::tenant::TenantContext;

use super::{PageQuery, time_window};

/// Query parameters for the trend window
#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    /// Start time (ISO 8601 format, default: 24 hours before `end`)
    start: Option<DateTime<Utc>>,

    /// End time (ISO 8601 format, default: now)
    end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    status: String,
}

fn alert_list(alerts: Vec<crate::domain::Alert>) -> Json<Value> {
    Json(json!({
        "count": alerts.len(),
        "alerts": alerts,
    }))
}

/// GET /api/v1/alerts
pub async fn list_alerts(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let alerts = state
        .alerts
        .list_alerts(&tenant.organization_id, query.page())
        .await?;
    Ok(alert_list(alerts))
}

/// GET /api/v1/alerts/:id
pub async fn get_alert(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let alert = state.alerts.get_alert(&tenant.organization_id, id).await?;
    Ok(Json(json!(alert)))
}

/// GET /api/v1/alerts/status/:status
pub async fn list_by_status(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(status): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let status: AlertStatus = status.parse().map_err(ApiError::InvalidRequest)?;
    let alerts = state
        .alerts
        .list_by_status(&tenant.organization_id, status, query.page())
        .await?;
    Ok(alert_list(alerts))
}

/// GET /api/v1/alerts/severity/:severity
pub async fn list_by_severity(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(severity): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let severity: AlertSeverity = severity.parse().map_err(ApiError::InvalidRequest)?;
    let alerts = state
        .alerts
        .list_by_severity(&tenant.organization_id, severity, query.page())
        .await?;
    Ok(alert_list(alerts))
}

/// GET /api/v1/alerts/source/:source
pub async fn list_by_source(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(source): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let alerts = state
        .alerts
        .list_by_source(&tenant.organization_id, &source, query.page())
        .await?;
    Ok(alert_list(alerts))
}

/// GET /api/v1/alerts/trends
pub async fn get_trends(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Json<Value>> {
    let (start, end) = time_window(
        query.start,
        query.end,
        state.clock.now(),
        Duration::hours(24),
    )?;
    if start > end {
        return Err(ApiError::InvalidRequest(
            "start must not be after end".to_string(),
        ));
    }

    let trends = state
        .alerts
        .get_trends(&tenant.organization_id, start, end)
        .await?;
    Ok(Json(json!(trends)))
}

/// GET /api/v1/alerts/counts
///
/// Organization-wide totals per status and severity, plus the number of
/// alerts created in the requested window (default: the last 24 hours).
pub async fn get_counts(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<TrendQuery>,
) -> ApiResult<Json<Value>> {
    let (start, end) = time_window(
        query.start,
        query.end,
        state.clock.now(),
        Duration::hours(24),
    )?;
    if start > end {
        return Err(ApiError::InvalidRequest(
            "start must not be after end".to_string(),
        ));
    }

    let org = &tenant.organization_id;
    let mut by_status = BTreeMap::new();
    for status in AlertStatus::ALL {
        by_status.insert(status.as_str(), state.alerts.count_by_status(org, status).await?);
    }
    let mut by_severity = BTreeMap::new();
    for severity in AlertSeverity::ALL {
        by_severity.insert(
            severity.as_str(),
            state.alerts.count_by_severity(org, severity).await?,
        );
    }
    let in_window = state.alerts.count_by_time_range(org, start, end).await?;

    Ok(Json(json!({
        "by_status": by_status,
        "by_severity": by_severity,
        "window": {
            "start": start.to_rfc3339(),
            "end": end.to_rfc3339(),
            "count": in_window,
        },
    })))
}

/// PUT /api/v1/alerts/:id/status
pub async fn update_status(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Value>> {
    let status: AlertStatus = update.status.parse().map_err(ApiError::InvalidRequest)?;
    let alert = state
        .alerts
        .update_status(&tenant.organization_id, id, status)
        .await?;
    Ok(Json(json!(alert)))
}
