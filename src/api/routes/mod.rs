//! Route handlers, one module per resource

pub mod alerts;
pub mod health;
pub mod ingest;
pub mod keys;
pub mod logs;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::storage::Page;

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// `?limit=&offset=` on list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    /// Max results (default: 100, capped at 1000)
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        Page::new(limit, self.offset.unwrap_or(0))
    }
}

/// Resolve an optional `start`/`end` pair
///
/// A missing `end` is `now`; a missing `start` is `lookback` before `end`.
pub fn time_window(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    lookback: Duration,
) -> ApiResult<(DateTime<Utc>, DateTime<Utc>)> {
    let end = end.unwrap_or(now);
    let start = match start {
        Some(start) => start,
        None => end.checked_sub_signed(lookback).ok_or_else(|| {
            ApiError::InvalidRequest("end is too early for the default window".to_string())
        })?,
    };
    Ok((start, end))
}
