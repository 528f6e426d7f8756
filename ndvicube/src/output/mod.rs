//! Output sinks for the finished cube.
//!
//! A sink receives the gap-filled dekadal cube plus run metadata and writes
//! it somewhere. Three sinks are provided:
//!
//! - [`GeoTiffSink`]: one float32 GeoTIFF per dekad
//! - [`PreviewSink`]: a PNG contact sheet of all dekads
//! - [`ManifestSink`]: a JSON summary of the run

mod geotiff;
mod manifest;
mod preview;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::coord::BoundingBox;
use crate::cube::RasterCube;
use crate::dekad::TimeInterval;

pub use geotiff::{write_geotiff, GeoTiffSink};
pub use manifest::{Manifest, ManifestSink, MANIFEST_FILE_NAME};
pub use preview::{ndvi_color, render_contact_sheet, PreviewSink, PREVIEW_FILE_NAME};

/// Errors writing output.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF encoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cube has no slices to write")]
    EmptyCube,
}

impl OutputError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        OutputError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Facts about a run that sinks may record alongside the cube.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputMetadata {
    /// Interval the user asked for.
    pub requested: TimeInterval,
    /// Interval actually searched after widening.
    pub search_window: TimeInterval,
    /// Whether widening supported both edge targets.
    pub window_complete: bool,
    pub bbox: BoundingBox,
    /// Ground resolution in metres per pixel.
    pub resolution: f64,
    /// Acquisition instants that made it into the observation cube.
    pub observations: Vec<DateTime<Utc>>,
    /// Targets that were gaps after compositing.
    pub gaps: Vec<DateTime<Utc>>,
    /// Gaps overwritten with secondary data.
    pub filled: Vec<DateTime<Utc>>,
}

/// Destination for the finished cube.
pub trait OutputSink {
    /// Short name for logging.
    fn name(&self) -> &str;

    /// Writes the cube and returns the paths created.
    fn write(&self, cube: &RasterCube, metadata: &OutputMetadata) -> Result<Vec<PathBuf>, OutputError>;
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<(), OutputError> {
    std::fs::create_dir_all(dir).map_err(|e| OutputError::io(dir, e))
}

/// `YYYY-MM-DD` for file names.
pub(crate) fn date_stem(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%d").to_string()
}
