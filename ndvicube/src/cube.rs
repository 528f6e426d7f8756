//! Time-indexed raster cube.
//!
//! A [`RasterCube`] is an ordered map from timestamp to a 2D slice on one
//! fixed grid. Every slice has the cube's shape; missing pixels are NaN.

use std::collections::BTreeMap;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use thiserror::Error;

use crate::coord::BoundingBox;
use crate::raster::{all_missing, Raster};

/// Errors from cube operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CubeError {
    #[error("slice at {timestamp} has shape {actual:?}, cube expects {expected:?}")]
    ShapeMismatch {
        timestamp: DateTime<Utc>,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("no slice at {0}")]
    MissingSlice(DateTime<Utc>),

    #[error("cannot merge cubes on different grids")]
    GridMismatch,
}

/// Ordered stack of raster slices on a shared grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterCube {
    bounds: BoundingBox,
    shape: (usize, usize),
    slices: BTreeMap<DateTime<Utc>, Array2<f32>>,
}

impl RasterCube {
    /// Creates an empty cube. `shape` is `(rows, cols)`.
    pub fn new(bounds: BoundingBox, shape: (usize, usize)) -> Self {
        Self {
            bounds,
            shape,
            slices: BTreeMap::new(),
        }
    }

    /// Empty cube on the grid of `raster`.
    pub fn on_grid_of(raster: &Raster) -> Self {
        Self::new(raster.bounds(), raster.shape())
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    pub fn get(&self, timestamp: &DateTime<Utc>) -> Option<&Array2<f32>> {
        self.slices.get(timestamp)
    }

    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        self.slices.contains_key(timestamp)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.slices.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DateTime<Utc>, &Array2<f32>)> {
        self.slices.iter()
    }

    /// Inserts a slice, returning the one previously stored at `timestamp`.
    pub fn insert(
        &mut self,
        timestamp: DateTime<Utc>,
        slice: Array2<f32>,
    ) -> Result<Option<Array2<f32>>, CubeError> {
        self.check_shape(timestamp, &slice)?;
        Ok(self.slices.insert(timestamp, slice))
    }

    /// Overwrites an existing slice. Fails if there is none at `timestamp`.
    pub fn replace(&mut self, timestamp: DateTime<Utc>, slice: Array2<f32>) -> Result<(), CubeError> {
        self.check_shape(timestamp, &slice)?;
        match self.slices.get_mut(&timestamp) {
            Some(existing) => {
                *existing = slice;
                Ok(())
            }
            None => Err(CubeError::MissingSlice(timestamp)),
        }
    }

    /// Slices with timestamps inside the given bounds, in time order.
    pub fn window(
        &self,
        lower: Bound<DateTime<Utc>>,
        upper: Bound<DateTime<Utc>>,
    ) -> impl DoubleEndedIterator<Item = (&DateTime<Utc>, &Array2<f32>)> {
        self.slices.range((lower, upper))
    }

    /// Moves every slice of `other` into this cube. Slices of `other` replace
    /// slices here with the same timestamp.
    pub fn merge(&mut self, other: RasterCube) -> Result<(), CubeError> {
        if other.shape != self.shape || other.bounds != self.bounds {
            return Err(CubeError::GridMismatch);
        }
        self.slices.extend(other.slices);
        Ok(())
    }

    /// Timestamps whose slice has no valid pixel.
    pub fn empty_slices(&self) -> Vec<DateTime<Utc>> {
        self.slices
            .iter()
            .filter(|(_, slice)| all_missing(slice))
            .map(|(t, _)| *t)
            .collect()
    }

    /// Summary statistics over all slices.
    pub fn stats(&self) -> CubeStats {
        CubeStats::of(self.slices.values())
    }

    /// Statistics of a single slice.
    pub fn slice_stats(slice: &Array2<f32>) -> CubeStats {
        CubeStats::of(std::iter::once(slice))
    }

    fn check_shape(&self, timestamp: DateTime<Utc>, slice: &Array2<f32>) -> Result<(), CubeError> {
        if slice.dim() != self.shape {
            return Err(CubeError::ShapeMismatch {
                timestamp,
                expected: self.shape,
                actual: slice.dim(),
            });
        }
        Ok(())
    }
}

/// Descriptive statistics of a cube's pixel values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeStats {
    pub total_pixels: usize,
    pub missing_pixels: usize,
    /// Minimum valid value, `None` if every pixel is missing.
    pub min: Option<f32>,
    pub max: Option<f32>,
}

impl CubeStats {
    fn of<'a>(slices: impl Iterator<Item = &'a Array2<f32>>) -> Self {
        let mut stats = CubeStats {
            total_pixels: 0,
            missing_pixels: 0,
            min: None,
            max: None,
        };
        for &v in slices.flat_map(|s| s.iter()) {
            stats.total_pixels += 1;
            if v.is_nan() {
                stats.missing_pixels += 1;
                continue;
            }
            stats.min = Some(stats.min.map_or(v, |m| m.min(v)));
            stats.max = Some(stats.max.map_or(v, |m| m.max(v)));
        }
        stats
    }

    /// Fraction of missing pixels, 0 for an empty cube.
    pub fn missing_ratio(&self) -> f64 {
        if self.total_pixels == 0 {
            0.0
        } else {
            self.missing_pixels as f64 / self.total_pixels as f64
        }
    }
}
