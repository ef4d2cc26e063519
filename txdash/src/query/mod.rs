//! Read-side aggregation for the dashboard.
//!
//! Turns filtered transaction rows into the three shapes the front end
//! consumes: a per-minute count series, per-scheme stat cards and the list of
//! status codes seen so far.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::prelude::*;
use crate::store::{
    queries::{self, TransactionFilter},
    StorageError, Store,
};

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y%m%dT%H%M%S%.f",
    "%Y%m%dT%H%M",
];

// `%#z` takes `Z`, `+HH`, `+HHMM` and `+HH:MM`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
    "%Y%m%dT%H%M%S%.f%#z",
    "%Y%m%dT%H%M%#z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field} {value:?}: expected an ISO-8601 timestamp")]
    InvalidTimestamp { field: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Filters accepted by [`QueryEngine::get_series`].
///
/// Field names follow the HTTP query string of the dashboard.
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub card_scheme: Option<String>,
    #[serde(rename = "reject_code")]
    pub status_code: Option<String>,
}

impl SeriesParams {
    /// Validates the time bounds and builds the store filter.
    pub fn to_filter(&self) -> Result<TransactionFilter, ValidationError> {
        Ok(TransactionFilter {
            start: parse_bound("start_time", self.start_time.as_deref())?,
            end: parse_bound("end_time", self.end_time.as_deref())?,
            card_scheme: self.card_scheme.clone(),
            status_code: self.status_code.clone(),
        })
    }
}

/// One chart point: a minute bucket and the number of transactions in it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesPoint {
    pub x: String,
    pub y: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemeStats {
    pub total: u64,
    pub approved: u64,
}

#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<Store>,
    catalog: Arc<Catalog>,
}

impl QueryEngine {
    pub fn new(store: Arc<Store>, catalog: Arc<Catalog>) -> Self {
        Self { store, catalog }
    }

    /// Per-minute transaction counts for the rows matching `params`.
    ///
    /// Only minutes with at least one match are returned, in ascending order.
    /// A timestamp exactly on a minute boundary belongs to that minute.
    pub fn get_series(&self, params: &SeriesParams) -> Result<Vec<SeriesPoint>, QueryError> {
        let filter = params.to_filter()?;
        let points = queries::minute_counts(&self.store, &filter)?
            .into_iter()
            .map(|row| SeriesPoint {
                x: row.minute,
                y: row.count,
            })
            .collect();
        Ok(points)
    }

    /// Total and approved counts for every configured scheme.
    pub fn get_stats(&self) -> Result<BTreeMap<String, SchemeStats>, QueryError> {
        let mut stats: BTreeMap<String, SchemeStats> = self
            .catalog
            .schemes()
            .iter()
            .map(|scheme| (scheme.clone(), SchemeStats::default()))
            .collect();

        for row in queries::scheme_counts(&self.store)? {
            if let Some(entry) = stats.get_mut(&row.card_scheme) {
                entry.total = row.total;
                entry.approved = row.approved;
            }
        }
        Ok(stats)
    }

    /// Status pairs that have actually been stored, each listed once.
    pub fn get_status_codes(&self) -> Result<Vec<StatusEntry>, QueryError> {
        Ok(queries::distinct_statuses(&self.store)?)
    }
}

/// Parses an optional ISO-8601 bound. Blank input counts as absent.
///
/// Offsets are converted to local wall-clock time, which is how the store
/// records timestamps.
fn parse_bound(field: &'static str, value: Option<&str>) -> Result<Option<NaiveDateTime>, ValidationError> {
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };

    let with_offset = DateTime::parse_from_rfc3339(raw)
        .ok()
        .or_else(|| OFFSET_FORMATS.iter().find_map(|f| DateTime::parse_from_str(raw, f).ok()));
    if let Some(dt) = with_offset {
        return Ok(Some(dt.with_timezone(&Local).naive_local()));
    }
    if let Some(dt) = NAIVE_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
    {
        return Ok(Some(dt));
    }
    if let Some(date) = DATE_FORMATS.iter().find_map(|f| NaiveDate::parse_from_str(raw, f).ok()) {
        return Ok(Some(date.and_time(chrono::NaiveTime::MIN)));
    }

    Err(ValidationError::InvalidTimestamp {
        field,
        value: raw.to_string(),
    })
}
