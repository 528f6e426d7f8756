//! JSON run manifest.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use super::{date_stem, ensure_dir, OutputError, OutputMetadata, OutputSink};
use crate::cube::RasterCube;
use crate::dekad::format_instant;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Per-dekad entry of the manifest.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ManifestSlice {
    pub date: String,
    pub missing_ratio: f64,
    pub min: Option<f32>,
    pub max: Option<f32>,
    /// Slice was a gap after compositing.
    pub gap: bool,
    /// Slice was overwritten with secondary data.
    pub filled: bool,
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Manifest {
    pub version: String,
    pub requested: String,
    pub search_window: String,
    pub window_complete: bool,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub bbox: [f64; 4],
    pub resolution: f64,
    /// `[rows, cols]`
    pub shape: [usize; 2],
    pub observations: Vec<String>,
    pub slices: Vec<ManifestSlice>,
}

impl Manifest {
    pub fn new(cube: &RasterCube, metadata: &OutputMetadata) -> Self {
        let (rows, cols) = cube.shape();
        let slices = cube
            .iter()
            .map(|(t, slice)| {
                let stats = RasterCube::slice_stats(slice);
                ManifestSlice {
                    date: date_stem(*t),
                    missing_ratio: stats.missing_ratio(),
                    min: stats.min,
                    max: stats.max,
                    gap: metadata.gaps.contains(t),
                    filled: metadata.filled.contains(t),
                }
            })
            .collect();

        Self {
            version: crate::VERSION.to_string(),
            requested: metadata.requested.to_iso_range(),
            search_window: metadata.search_window.to_iso_range(),
            window_complete: metadata.window_complete,
            bbox: metadata.bbox.to_array(),
            resolution: metadata.resolution,
            shape: [rows, cols],
            observations: metadata
                .observations
                .iter()
                .map(|t| format_instant(*t))
                .collect(),
            slices,
        }
    }
}

/// Writes [`MANIFEST_FILE_NAME`] next to the rasters.
pub struct ManifestSink {
    path: PathBuf,
}

impl ManifestSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            path: directory.into().join(MANIFEST_FILE_NAME),
        }
    }
}

impl OutputSink for ManifestSink {
    fn name(&self) -> &str {
        "manifest"
    }

    fn write(&self, cube: &RasterCube, metadata: &OutputMetadata) -> Result<Vec<PathBuf>, OutputError> {
        let manifest = Manifest::new(cube, metadata);
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let file = File::create(&self.path).map_err(|e| OutputError::io(&self.path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &manifest)?;
        writer
            .flush()
            .map_err(|e| OutputError::io(&self.path, e))?;
        debug!(path = %self.path.display(), slices = manifest.slices.len(), "Wrote manifest");
        Ok(vec![self.path.clone()])
    }
}
