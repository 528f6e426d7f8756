//! Gap filling from the secondary NDVI source.
//!
//! A gap is a target whose composite has no valid pixel. For each gap the
//! CLMS 300 m NDVI product for that calendar day is fetched, tiled and
//! mosaicked onto the cube's grid, rescaled to NDVI, and written over the
//! gap's slice. No other slice is touched.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::cube::{CubeError, RasterCube};
use crate::dekad::{format_instant, TimeInterval};
use crate::fetch::{fetch_all, FetchError, FetchProgressCallback, FetchRequest, RasterFetch};
use crate::mosaic::{assemble, AssembleError, MosaicGrid};
use crate::source::{ClmsEpoch, SourceError, SourceKind};
use crate::tile::TilePlan;

/// Errors from gap filling.
#[derive(Debug, Error)]
pub enum GapFillError {
    #[error(transparent)]
    UnsupportedEpoch(#[from] SourceError),

    #[error("secondary fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Assemble(#[from] AssembleError),

    #[error("secondary raster for {timestamp} has shape {actual:?}, cube expects {expected:?}")]
    ShapeMismatch {
        timestamp: DateTime<Utc>,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(transparent)]
    Cube(#[from] CubeError),
}

/// Outcome of [`GapFiller::fill`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GapFillReport {
    /// Gaps overwritten with secondary data.
    pub filled: Vec<DateTime<Utc>>,
    /// Gaps for which the secondary source had no data.
    pub unavailable: Vec<DateTime<Utc>>,
}

/// Replaces gap slices with rescaled secondary-source rasters.
pub struct GapFiller<'a, F> {
    fetcher: F,
    plan: &'a TilePlan,
    max_threads: usize,
}

impl<'a, F: RasterFetch> GapFiller<'a, F> {
    pub fn new(fetcher: F, plan: &'a TilePlan) -> Self {
        Self {
            fetcher,
            plan,
            max_threads: crate::fetch::DEFAULT_MAX_THREADS,
        }
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads.max(1);
        self
    }

    /// Fills every gap in `cube`.
    ///
    /// Epochs are resolved for all gaps before anything is fetched, so an
    /// unsupported year fails without side effects.
    pub fn fill(
        &self,
        cube: &mut RasterCube,
        gaps: &[DateTime<Utc>],
        on_progress: Option<&FetchProgressCallback>,
    ) -> Result<GapFillReport, GapFillError> {
        let mut report = GapFillReport::default();
        if gaps.is_empty() {
            return Ok(report);
        }

        let sources = gaps
            .iter()
            .map(|&gap| Ok((gap, SourceKind::Clms(ClmsEpoch::for_date(gap)?))))
            .collect::<Result<Vec<_>, SourceError>>()?;

        let mut requests = Vec::with_capacity(gaps.len() * self.plan.tiles().len());
        for &(gap, source) in &sources {
            info!(
                target_date = %format_instant(gap),
                source = %source,
                "Filling gap from secondary source"
            );
            for tile in self.plan.tiles() {
                requests.push(FetchRequest {
                    timestamp: gap,
                    time_range: TimeInterval::day_of(gap),
                    tile: *tile,
                    source,
                });
            }
        }

        let batch = fetch_all(&self.fetcher, requests, self.max_threads, on_progress)?;
        let grid = MosaicGrid::for_plan(self.plan);
        let mut rasters = assemble(batch, &grid, self.plan.tiles().len())?;

        for &(gap, _) in &sources {
            let Some(raster) = rasters.remove(&gap) else {
                warn!(
                    target_date = %format_instant(gap),
                    "No secondary data for gap, leaving it missing"
                );
                report.unavailable.push(gap);
                continue;
            };
            if raster.shape() != cube.shape() {
                return Err(GapFillError::ShapeMismatch {
                    timestamp: gap,
                    expected: cube.shape(),
                    actual: raster.shape(),
                });
            }
            cube.replace(gap, raster.into_data())?;
            report.filled.push(gap);
        }

        Ok(report)
    }
}
