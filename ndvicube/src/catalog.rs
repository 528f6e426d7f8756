//! Catalog search abstraction.
//!
//! The catalog answers "which acquisitions exist over this bbox in this
//! interval with acceptable quality". Implementations live in
//! [`crate::provider`]; tests use in-memory catalogs.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::coord::BoundingBox;
use crate::dekad::TimeInterval;

/// Default maximum cloud cover (percent, exclusive) for usable acquisitions.
pub const MAX_CLOUD_COVER: f64 = 10.0;

/// One catalog item.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Acquisition instant.
    pub timestamp: DateTime<Utc>,
    /// Catalog identifier, opaque to the core.
    pub id: String,
    /// Cloud cover in percent, if the catalog reports it.
    pub cloud_cover: Option<f64>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, id: impl Into<String>) -> Self {
        Self {
            timestamp,
            id: id.into(),
            cloud_cover: None,
        }
    }

    pub fn with_cloud_cover(mut self, cloud_cover: f64) -> Self {
        self.cloud_cover = Some(cloud_cover);
        self
    }
}

/// Quality constraint applied by the catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityFilter {
    /// Acquisitions must have strictly less cloud cover than this.
    pub max_cloud_cover: f64,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self {
            max_cloud_cover: MAX_CLOUD_COVER,
        }
    }
}

impl QualityFilter {
    /// CQL2 text expression for the filter.
    pub fn to_cql2(&self) -> String {
        format!("eo:cloud_cover < {}", self.max_cloud_cover)
    }

    /// Whether an observation passes. Unknown cloud cover passes.
    pub fn accepts(&self, observation: &Observation) -> bool {
        observation
            .cloud_cover
            .map_or(true, |cc| cc < self.max_cloud_cover)
    }
}

/// Errors from a catalog query.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("catalog request failed: {0}")]
    Request(String),

    #[error("unexpected catalog response: {0}")]
    InvalidResponse(String),
}

/// Searches a catalog of acquisitions.
pub trait CatalogSearch: Send + Sync {
    /// Returns all acquisitions intersecting `bbox` within `interval` that
    /// satisfy `filter`.
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        filter: &QualityFilter,
    ) -> Result<Vec<Observation>, CatalogError>;
}

impl<T: CatalogSearch + ?Sized> CatalogSearch for &T {
    fn search(
        &self,
        bbox: &BoundingBox,
        interval: &TimeInterval,
        filter: &QualityFilter,
    ) -> Result<Vec<Observation>, CatalogError> {
        (**self).search(bbox, interval, filter)
    }
}

/// Sorts observations by time and collapses items sharing a timestamp.
///
/// Several catalog items (granules) can share one acquisition instant; a
/// raster request for that instant covers all of them, so only the first is
/// kept.
pub fn unique_by_timestamp(mut observations: Vec<Observation>) -> Vec<Observation> {
    observations.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    observations.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);
    observations
}
