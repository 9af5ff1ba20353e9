//! Log query endpoints (customer keys)

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::api::{error::ApiResult, state::ApiState};
use crate::tenant::TenantContext;

use super::{PageQuery, time_window};

/// Query parameters for a time range
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Start time (ISO 8601 format, default: 1 hour before `end`)
    start: Option<DateTime<Utc>>,

    /// End time (ISO 8601 format, default: now)
    end: Option<DateTime<Utc>>,

    limit: Option<usize>,
    offset: Option<usize>,
}

/// GET /api/v1/logs
pub async fn list_logs(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<Value>> {
    let page = query.page();
    let logs = state
        .queries
        .list_logs(&tenant.organization_id, page)
        .await?;

    Ok(Json(json!({
        "logs": logs,
        "count": logs.len(),
        "limit": page.limit,
        "offset": page.offset,
    })))
}

/// GET /api/v1/logs/range
pub async fn list_logs_by_range(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Query(query): Query<RangeQuery>,
) -> ApiResult<Json<Value>> {
    let (start, end) = time_window(
        query.start,
        query.end,
        state.clock.now(),
        Duration::hours(1),
    )?;
    let page = PageQuery {
        limit: query.limit,
        offset: query.offset,
    }
    .page();

    let logs = state
        .queries
        .list_by_time_range(&tenant.organization_id, start, end, page)
        .await?;

    Ok(Json(json!({
        "logs": logs,
        "count": logs.len(),
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
    })))
}

/// GET /api/v1/logs/:id
pub async fn get_log(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let log = state.queries.get_log(&tenant.organization_id, id).await?;
    Ok(Json(json!(log)))
}

/// GET /api/v1/logs/:id/processes
pub async fn get_log_processes(
    State(state): State<ApiState>,
    Extension(tenant): Extension<TenantContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let processes = state
        .queries
        .processes_for_log(&tenant.organization_id, id)
        .await?;

    Ok(Json(json!({
        "log_id": id,
        "processes": processes,
        "count": processes.len(),
    })))
}
