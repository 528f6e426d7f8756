//! PNG contact sheet of the dekadal series.
//!
//! Dekads are laid out left to right, top to bottom, three per row, using a
//! diverging purple-to-green colormap over NDVI [-1, 1]. Missing pixels are
//! transparent.

use std::path::PathBuf;

use image::{imageops, Rgba, RgbaImage};
use ndarray::Array2;
use tracing::debug;

use super::{ensure_dir, OutputError, OutputMetadata, OutputSink};
use crate::cube::RasterCube;

pub const PREVIEW_FILE_NAME: &str = "ndvi_composite.png";

const COLUMNS: u32 = 3;
const MARGIN: u32 = 8;
/// Longest side of one cell in the sheet.
const MAX_CELL: u32 = 256;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const MISSING: Rgba<u8> = Rgba([0, 0, 0, 0]);

// Colormap stops at NDVI -1, 0 and 1.
const LOW: [f32; 3] = [64.0, 0.0, 75.0];
const MID: [f32; 3] = [247.0, 247.0, 247.0];
const HIGH: [f32; 3] = [0.0, 68.0, 27.0];

/// Colour for one NDVI value.
pub fn ndvi_color(value: f32) -> Rgba<u8> {
    if value.is_nan() {
        return MISSING;
    }
    let v = value.clamp(-1.0, 1.0);
    let (from, to, t) = if v < 0.0 {
        (LOW, MID, v + 1.0)
    } else {
        (MID, HIGH, v)
    };
    let channel = |i: usize| (from[i] + (to[i] - from[i]) * t).round() as u8;
    Rgba([channel(0), channel(1), channel(2), 255])
}

fn render_slice(slice: &Array2<f32>) -> RgbaImage {
    let (rows, cols) = slice.dim();
    RgbaImage::from_fn(cols as u32, rows as u32, |x, y| {
        ndvi_color(slice[[y as usize, x as usize]])
    })
}

/// Cell size for a slice of `(rows, cols)`, scaled so the longer side is at
/// most [`MAX_CELL`].
fn cell_size(rows: usize, cols: usize) -> (u32, u32) {
    let longest = rows.max(cols).max(1) as f64;
    let scale = (f64::from(MAX_CELL) / longest).min(1.0);
    (
        ((cols as f64 * scale).round() as u32).max(1),
        ((rows as f64 * scale).round() as u32).max(1),
    )
}

/// Renders every slice of the cube into one image.
pub fn render_contact_sheet(cube: &RasterCube) -> Result<RgbaImage, OutputError> {
    if cube.is_empty() {
        return Err(OutputError::EmptyCube);
    }
    let (rows, cols) = cube.shape();
    let (cell_w, cell_h) = cell_size(rows, cols);
    let count = cube.len() as u32;
    let sheet_cols = count.min(COLUMNS);
    let sheet_rows = count.div_ceil(COLUMNS);

    let mut sheet = RgbaImage::from_pixel(
        sheet_cols * (cell_w + MARGIN) + MARGIN,
        sheet_rows * (cell_h + MARGIN) + MARGIN,
        BACKGROUND,
    );

    for (i, (_, slice)) in cube.iter().enumerate() {
        let mut cell = render_slice(slice);
        if cell.dimensions() != (cell_w, cell_h) {
            cell = imageops::resize(&cell, cell_w, cell_h, imageops::FilterType::Nearest);
        }
        let i = i as u32;
        let x = MARGIN + (i % COLUMNS) * (cell_w + MARGIN);
        let y = MARGIN + (i / COLUMNS) * (cell_h + MARGIN);
        imageops::replace(&mut sheet, &cell, i64::from(x), i64::from(y));
    }
    Ok(sheet)
}

/// Writes the contact sheet as a PNG.
pub struct PreviewSink {
    path: PathBuf,
}

impl PreviewSink {
    /// Sink writing [`PREVIEW_FILE_NAME`] inside `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            path: directory.into().join(PREVIEW_FILE_NAME),
        }
    }
}

impl OutputSink for PreviewSink {
    fn name(&self) -> &str {
        "preview"
    }

    fn write(&self, cube: &RasterCube, _metadata: &OutputMetadata) -> Result<Vec<PathBuf>, OutputError> {
        let sheet = render_contact_sheet(cube)?;
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        sheet.save_with_format(&self.path, image::ImageFormat::Png)?;
        debug!(path = %self.path.display(), "Wrote preview");
        Ok(vec![self.path.clone()])
    }
}
