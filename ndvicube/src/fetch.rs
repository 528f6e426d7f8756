//! Raster fetching.
//!
//! The pipeline prepares every independent `(timestamp, tile)` request up
//! front and hands the whole set to [`fetch_all`], which runs them on a
//! bounded worker pool and returns the results keyed by timestamp and tile.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

use crate::dekad::TimeInterval;
use crate::source::SourceKind;
use crate::tile::Tile;

/// Default number of concurrent raster requests.
pub const DEFAULT_MAX_THREADS: usize = 5;

/// Errors from a raster fetch.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The service had no data for this request. The fragment is skipped.
    #[error("raster unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Request(String),

    #[error("failed to start fetch workers: {0}")]
    Pool(String),
}

/// One raster to fetch: a source, a time range and a tile.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    /// Timestamp the result belongs to in the observation cube.
    pub timestamp: DateTime<Utc>,
    /// Time range passed to the service.
    pub time_range: TimeInterval,
    pub tile: Tile,
    pub source: SourceKind,
}

impl FetchRequest {
    /// Request for a single acquisition instant.
    pub fn at_instant(timestamp: DateTime<Utc>, tile: Tile, source: SourceKind) -> Self {
        Self {
            timestamp,
            time_range: TimeInterval::instant(timestamp),
            tile,
            source,
        }
    }

    pub fn key(&self) -> FetchKey {
        (self.timestamp, self.tile.index)
    }
}

/// `(timestamp, tile index)`
pub type FetchKey = (DateTime<Utc>, usize);

/// Raw raster payload as returned by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedRaster {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Fetches a single raster.
pub trait RasterFetch: Send + Sync {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedRaster, FetchError>;
}

impl<T: RasterFetch + ?Sized> RasterFetch for &T {
    fn fetch(&self, request: &FetchRequest) -> Result<FetchedRaster, FetchError> {
        (**self).fetch(request)
    }
}

/// Progress callback: `(completed, total)`.
pub type FetchProgressCallback = dyn Fn(usize, usize) + Send + Sync;

/// Result of a batch fetch.
#[derive(Debug, Default)]
pub struct FetchBatch {
    pub rasters: BTreeMap<FetchKey, (FetchRequest, FetchedRaster)>,
    /// Requests skipped because the service reported them unavailable.
    pub skipped: Vec<FetchKey>,
}

/// Runs all requests on a pool of at most `max_threads` workers.
///
/// [`FetchError::Unavailable`] results are logged and recorded in
/// [`FetchBatch::skipped`]; the first other error aborts the batch.
pub fn fetch_all<F: RasterFetch>(
    fetcher: &F,
    requests: Vec<FetchRequest>,
    max_threads: usize,
    on_progress: Option<&(dyn Fn(usize, usize) + Send + Sync + '_)>,
) -> Result<FetchBatch, FetchError> {
    let total = requests.len();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(max_threads.max(1))
        .build()
        .map_err(|e| FetchError::Pool(e.to_string()))?;

    let completed = AtomicUsize::new(0);
    let results: Vec<(FetchRequest, Result<FetchedRaster, FetchError>)> = pool.install(|| {
        requests
            .into_par_iter()
            .map(|request| {
                let result = fetcher.fetch(&request);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = on_progress {
                    cb(done, total);
                }
                (request, result)
            })
            .collect()
    });

    let mut batch = FetchBatch::default();
    for (request, result) in results {
        match result {
            Ok(raster) => {
                batch.rasters.insert(request.key(), (request, raster));
            }
            Err(FetchError::Unavailable(reason)) => {
                warn!(
                    timestamp = %request.timestamp,
                    tile = request.tile.index,
                    reason = %reason,
                    "Raster unavailable, skipping"
                );
                batch.skipped.push(request.key());
            }
            Err(e) => return Err(e),
        }
    }

    debug!(
        fetched = batch.rasters.len(),
        skipped = batch.skipped.len(),
        "Batch fetch complete"
    );
    Ok(batch)
}
