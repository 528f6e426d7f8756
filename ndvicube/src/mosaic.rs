//! Mosaicking of per-tile raster fragments.
//!
//! Fragments of one acquisition are painted into a single grid covering the
//! target bbox. The grid's resolution is taken from the first fragment; its
//! dimensions and bounds are whatever the merge produces, and downstream code
//! uses them as-is.

use std::collections::BTreeMap;
use std::ops::Range;

use chrono::{DateTime, Utc};
use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use crate::coord::BoundingBox;
use crate::fetch::FetchBatch;
use crate::raster::{decode_geotiff, Raster, RasterError};
use crate::tile::TilePlan;

/// Errors from mosaicking.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MosaicError {
    #[error("no fragments to merge")]
    NoFragments,

    #[error("fragment has zero size")]
    EmptyFragment,
}

/// Errors turning a fetched batch into one raster per timestamp.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("failed to decode raster for {timestamp} tile {tile}: {source}")]
    Decode {
        timestamp: DateTime<Utc>,
        tile: usize,
        #[source]
        source: RasterError,
    },

    #[error(transparent)]
    Mosaic(#[from] MosaicError),
}

/// Output grid of a merge: bounds plus `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MosaicGrid {
    pub bounds: BoundingBox,
    pub rows: usize,
    pub cols: usize,
    /// Pixel size in degrees `(x, y)`.
    pub pixel_size: (f64, f64),
}

impl MosaicGrid {
    /// Grid covering `bounds` at the given pixel size.
    ///
    /// Dimensions are rounded to the nearest whole pixel (minimum 1) and the
    /// bounds are snapped to the resulting grid from the north-west corner.
    pub fn covering(bounds: BoundingBox, pixel_size: (f64, f64)) -> Self {
        let (px, py) = pixel_size;
        let cols = ((bounds.width_deg() / px).round() as usize).max(1);
        let rows = ((bounds.height_deg() / py).round() as usize).max(1);
        let snapped = BoundingBox {
            min_lon: bounds.min_lon,
            max_lon: bounds.min_lon + cols as f64 * px,
            max_lat: bounds.max_lat,
            min_lat: bounds.max_lat - rows as f64 * py,
        };
        Self {
            bounds: snapped,
            rows,
            cols,
            pixel_size,
        }
    }

    /// The grid every assembled raster of `plan` lands on.
    ///
    /// A single tile is used as delivered; a split plan is merged onto the
    /// plan's bbox at the first tile's pixel size.
    pub fn for_plan(plan: &TilePlan) -> Self {
        let tiles = plan.tiles();
        match tiles {
            [tile] => Self {
                bounds: tile.bbox,
                rows: tile.size.1 as usize,
                cols: tile.size.0 as usize,
                pixel_size: (
                    tile.bbox.width_deg() / f64::from(tile.size.0.max(1)),
                    tile.bbox.height_deg() / f64::from(tile.size.1.max(1)),
                ),
            },
            _ => {
                let first = tiles.first().map_or((plan.bbox(), (1, 1)), |t| (t.bbox, t.size));
                let pixel_size = (
                    first.0.width_deg() / f64::from(first.1 .0.max(1)),
                    first.0.height_deg() / f64::from(first.1 .1.max(1)),
                );
                Self::covering(plan.bbox(), pixel_size)
            }
        }
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Merges the fragments of one timestamp into a single raster.
///
/// A single fragment is returned unchanged. Otherwise fragments are painted
/// in order onto an all-NaN grid covering `target`; a fragment's non-NaN
/// pixels overwrite whatever is already there, NaN pixels never do.
pub fn merge(mut fragments: Vec<Raster>, target: &BoundingBox) -> Result<Raster, MosaicError> {
    match fragments.len() {
        0 => return Err(MosaicError::NoFragments),
        1 => return fragments.pop().ok_or(MosaicError::NoFragments),
        _ => {}
    }

    let grid = MosaicGrid::covering(*target, fragments[0].pixel_size());
    merge_onto(&fragments, &grid)
}

/// Paints fragments in order onto an all-NaN raster on `grid`.
pub fn merge_onto(fragments: &[Raster], grid: &MosaicGrid) -> Result<Raster, MosaicError> {
    if fragments.is_empty() {
        return Err(MosaicError::NoFragments);
    }
    if fragments.iter().any(|f| f.width() == 0 || f.height() == 0) {
        return Err(MosaicError::EmptyFragment);
    }

    let mut out = Array2::from_elem(grid.shape(), f32::NAN);
    for fragment in fragments {
        paint(&mut out, grid, fragment);
    }
    Ok(Raster::new(out, grid.bounds))
}

/// Decodes every fetched fragment, converts it to NDVI for its source and
/// mosaics the fragments of each timestamp onto `grid`.
///
/// Fragments are painted in tile order. A timestamp with all `tiles`
/// fragments goes through [`merge`]; one with missing fragments is painted
/// straight onto `grid` so its shape still matches. Timestamps with no
/// fragment in the batch are absent from the result.
pub fn assemble(
    batch: FetchBatch,
    grid: &MosaicGrid,
    tiles: usize,
) -> Result<BTreeMap<DateTime<Utc>, Raster>, AssembleError> {
    let mut fragments: BTreeMap<DateTime<Utc>, Vec<Raster>> = BTreeMap::new();
    for ((timestamp, tile), (request, fetched)) in batch.rasters {
        let raster = decode_geotiff(
            &fetched.bytes,
            fetched.width,
            fetched.height,
            request.tile.bbox,
        )
        .map_err(|source| AssembleError::Decode {
            timestamp,
            tile,
            source,
        })?;
        let source = request.source;
        fragments
            .entry(timestamp)
            .or_default()
            .push(raster.map_values(|v| source.to_ndvi(v)));
    }

    let mut rasters = BTreeMap::new();
    for (timestamp, parts) in fragments {
        let raster = if parts.len() == tiles {
            merge(parts, &grid.bounds)?
        } else {
            debug!(
                timestamp = %timestamp,
                fragments = parts.len(),
                tiles,
                "Mosaicking partial coverage"
            );
            merge_onto(&parts, grid)?
        };
        rasters.insert(timestamp, raster);
    }
    Ok(rasters)
}

/// Samples `fragment` onto every pixel of `out` whose centre falls inside it.
///
/// Each destination pixel takes the fragment pixel containing its centre
/// (nearest neighbour), so fragments with a pixel size different from the
/// grid's land at their true position. NaN source pixels are skipped.
fn paint(out: &mut Array2<f32>, grid: &MosaicGrid, fragment: &Raster) {
    let footprint = fragment.bounds();
    let (frag_rows, frag_cols) = fragment.shape();
    let (frag_px, frag_py) = fragment.pixel_size();
    let (px, py) = grid.pixel_size;
    let origin = grid.bounds;
    let data = fragment.data();

    let rows = candidate_range(
        (origin.max_lat - footprint.max_lat) / py,
        (origin.max_lat - footprint.min_lat) / py,
        grid.rows,
    );
    let cols = candidate_range(
        (footprint.min_lon - origin.min_lon) / px,
        (footprint.max_lon - origin.min_lon) / px,
        grid.cols,
    );

    for row in rows {
        let lat = origin.max_lat - (row as f64 + 0.5) * py;
        let Some(src_row) = source_index(footprint.max_lat - lat, frag_py, frag_rows) else {
            continue;
        };
        for col in cols.clone() {
            let lon = origin.min_lon + (col as f64 + 0.5) * px;
            let Some(src_col) = source_index(lon - footprint.min_lon, frag_px, frag_cols) else {
                continue;
            };
            let v = data[[src_row, src_col]];
            if !v.is_nan() {
                out[[row, col]] = v;
            }
        }
    }
}

/// Destination indices that may overlap `[start, end)` in pixel units.
fn candidate_range(start: f64, end: f64, len: usize) -> Range<usize> {
    let hi = (end.ceil().max(0.0) as usize).min(len);
    let lo = (start.floor().max(0.0) as usize).min(hi);
    lo..hi
}

/// Fragment index containing `offset` (degrees from its origin), if inside.
fn source_index(offset: f64, pixel: f64, len: usize) -> Option<usize> {
    if offset < 0.0 || pixel <= 0.0 {
        return None;
    }
    let index = (offset / pixel).floor() as usize;
    (index < len).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dekad::parse_instant;
    use crate::fetch::{FetchRequest, FetchedRaster};
    use crate::raster::tests::encode_f32;
    use crate::source::{ClmsEpoch, SourceKind};
    use crate::aoi::Aoi;
    use crate::tile::Tile;
    use ndarray::array;

    fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> BoundingBox {
        BoundingBox::new(min_lon, min_lat, max_lon, max_lat).unwrap()
    }

    #[test]
    fn test_merge_single_fragment_unchanged() {
        let fragment = Raster::new(array![[1.0, 2.0], [3.0, 4.0]], bbox(0.0, 0.0, 1.0, 1.0));
        let merged = merge(vec![fragment.clone()], &bbox(0.0, 0.0, 5.0, 5.0)).unwrap();
        assert_eq!(merged, fragment);
    }

    #[test]
    fn test_merge_no_fragments() {
        assert_eq!(
            merge(vec![], &bbox(0.0, 0.0, 1.0, 1.0)),
            Err(MosaicError::NoFragments)
        );
    }

    #[test]
    fn test_merge_side_by_side() {
        let west = Raster::new(array![[1.0, 2.0], [3.0, 4.0]], bbox(0.0, 0.0, 1.0, 1.0));
        let east = Raster::new(array![[5.0, 6.0], [7.0, 8.0]], bbox(1.0, 0.0, 2.0, 1.0));
        let merged = merge(vec![west, east], &bbox(0.0, 0.0, 2.0, 1.0)).unwrap();

        assert_eq!(merged.shape(), (2, 4));
        assert_eq!(
            merged.data(),
            &array![[1.0, 2.0, 5.0, 6.0], [3.0, 4.0, 7.0, 8.0]]
        );
        assert_eq!(merged.bounds(), bbox(0.0, 0.0, 2.0, 1.0));
    }

    #[test]
    fn test_merge_two_by_two_grid() {
        let nw = Raster::new(array![[1.0]], bbox(0.0, 1.0, 1.0, 2.0));
        let ne = Raster::new(array![[2.0]], bbox(1.0, 1.0, 2.0, 2.0));
        let sw = Raster::new(array![[3.0]], bbox(0.0, 0.0, 1.0, 1.0));
        let se = Raster::new(array![[4.0]], bbox(1.0, 0.0, 2.0, 1.0));
        let merged = merge(vec![nw, ne, sw, se], &bbox(0.0, 0.0, 2.0, 2.0)).unwrap();
        assert_eq!(merged.data(), &array![[1.0, 2.0], [3.0, 4.0]]);
    }

    #[test]
    fn test_merge_later_valid_fragment_wins() {
        let first = Raster::new(array![[1.0, 1.0]], bbox(0.0, 0.0, 2.0, 1.0));
        let second = Raster::new(array![[9.0, f32::NAN]], bbox(0.0, 0.0, 2.0, 1.0));
        let merged = merge(vec![first, second], &bbox(0.0, 0.0, 2.0, 1.0)).unwrap();
        assert_eq!(merged.data(), &array![[9.0, 1.0]]);
    }

    #[test]
    fn test_merge_uncovered_pixels_are_missing() {
        let west = Raster::new(array![[1.0]], bbox(0.0, 0.0, 1.0, 1.0));
        let other = Raster::new(array![[2.0]], bbox(0.0, 0.0, 1.0, 1.0));
        let merged = merge(vec![west, other], &bbox(0.0, 0.0, 3.0, 1.0)).unwrap();
        assert_eq!(merged.shape(), (1, 3));
        assert_eq!(merged.data()[[0, 0]], 2.0);
        assert!(merged.data()[[0, 1]].is_nan());
        assert!(merged.data()[[0, 2]].is_nan());
    }

    #[test]
    fn test_merge_clips_to_target() {
        let wide = Raster::new(array![[1.0, 2.0, 3.0, 4.0]], bbox(-1.0, 0.0, 3.0, 1.0));
        let other = Raster::new(array![[f32::NAN]], bbox(0.0, 0.0, 1.0, 1.0));
        let merged = merge(vec![wide, other], &bbox(0.0, 0.0, 2.0, 1.0)).unwrap();
        assert_eq!(merged.data(), &array![[2.0, 3.0]]);
    }

    #[test]
    fn test_grid_snaps_bounds() {
        let grid = MosaicGrid::covering(bbox(0.0, 0.0, 1.04, 1.0), (0.1, 0.1));
        assert_eq!(grid.cols, 10);
        assert_eq!(grid.rows, 10);
        assert!((grid.bounds.max_lon - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_merge_resamples_rows_with_different_pixel_widths() {
        // Two degrees of latitude at 60N: each tile row gets its own width.
        let aoi = Aoi::from_bbox(bbox(10.0, 60.0, 11.0, 62.0));
        let plan = TilePlan::for_aoi(&aoi, 1000.0, 60).unwrap();
        let widths: Vec<u32> = plan.tiles().iter().map(|t| t.size.0).collect();
        assert!(widths.iter().any(|&w| w != widths[0]), "widths {:?}", widths);

        // Every fragment pixel holds the longitude of its own centre.
        let fragments: Vec<Raster> = plan
            .tiles()
            .iter()
            .map(|tile| {
                let (w, h) = (tile.size.0 as usize, tile.size.1 as usize);
                let px = tile.bbox.width_deg() / w as f64;
                let data = Array2::from_shape_fn((h, w), |(_, c)| {
                    (tile.bbox.min_lon + (c as f64 + 0.5) * px) as f32
                });
                Raster::new(data, tile.bbox)
            })
            .collect();

        let grid = MosaicGrid::for_plan(&plan);
        let merged = merge_onto(&fragments, &grid).unwrap();
        let tolerance = grid.pixel_size.0 * 0.5 + 1e-4;

        let mut valid = 0;
        for ((_, col), &v) in merged.data().indexed_iter() {
            if v.is_nan() {
                continue;
            }
            valid += 1;
            let centre = grid.bounds.min_lon + (col as f64 + 0.5) * grid.pixel_size.0;
            assert!(
                (f64::from(v) - centre).abs() <= tolerance,
                "col {} holds lon {}, centre {}",
                col,
                v,
                centre
            );
        }
        assert!(valid as f64 >= 0.99 * (grid.rows * grid.cols) as f64);
    }

    #[test]
    fn test_merge_finer_fragment_is_sampled_not_copied() {
        let coarse = Raster::new(array![[1.0, 2.0]], bbox(0.0, 1.0, 2.0, 2.0));
        let fine = Raster::new(array![[3.0, 4.0, 5.0, 6.0]], bbox(0.0, 0.0, 2.0, 1.0));
        let merged = merge(vec![coarse, fine], &bbox(0.0, 0.0, 2.0, 2.0)).unwrap();
        assert_eq!(merged.data(), &array![[1.0, 2.0], [4.0, 6.0]]);
    }

    fn batch_of(parts: Vec<(usize, BoundingBox, Vec<f32>)>, source: SourceKind) -> FetchBatch {
        let t = parse_instant("2024-01-05T10:00:00Z").unwrap();
        let mut batch = FetchBatch::default();
        for (index, bbox, values) in parts {
            let tile = Tile {
                index,
                column: index as u32,
                row: 0,
                bbox,
                size: (values.len() as u32, 1),
            };
            let fetched = FetchedRaster {
                bytes: encode_f32(values.len() as u32, 1, &values),
                width: values.len() as u32,
                height: 1,
            };
            batch.rasters.insert(
                (t, index),
                (FetchRequest::at_instant(t, tile, source), fetched),
            );
        }
        batch
    }

    #[test]
    fn test_assemble_full_coverage() {
        let batch = batch_of(
            vec![
                (0, bbox(0.0, 0.0, 1.0, 1.0), vec![0.1, 0.2]),
                (1, bbox(1.0, 0.0, 2.0, 1.0), vec![0.3, 0.4]),
            ],
            SourceKind::Sentinel2L2A,
        );
        let grid = MosaicGrid::covering(bbox(0.0, 0.0, 2.0, 1.0), (0.5, 1.0));
        let rasters = assemble(batch, &grid, 2).unwrap();
        assert_eq!(rasters.len(), 1);
        let raster = rasters.values().next().unwrap();
        assert_eq!(raster.data(), &array![[0.1, 0.2, 0.3, 0.4]]);
    }

    #[test]
    fn test_assemble_partial_coverage_keeps_grid_shape() {
        let batch = batch_of(
            vec![(1, bbox(1.0, 0.0, 2.0, 1.0), vec![0.3, 0.4])],
            SourceKind::Sentinel2L2A,
        );
        let grid = MosaicGrid::covering(bbox(0.0, 0.0, 2.0, 1.0), (0.5, 1.0));
        let rasters = assemble(batch, &grid, 2).unwrap();
        let raster = rasters.values().next().unwrap();
        assert_eq!(raster.shape(), (1, 4));
        assert!(raster.data()[[0, 0]].is_nan());
        assert_eq!(raster.data()[[0, 3]], 0.4);
    }

    #[test]
    fn test_assemble_rescales_secondary_source() {
        let batch = batch_of(
            vec![(0, bbox(0.0, 0.0, 1.0, 1.0), vec![145.0, 255.0])],
            SourceKind::Clms(ClmsEpoch::V2),
        );
        let grid = MosaicGrid::covering(bbox(0.0, 0.0, 1.0, 1.0), (0.5, 1.0));
        let rasters = assemble(batch, &grid, 1).unwrap();
        let raster = rasters.values().next().unwrap();
        assert!((raster.data()[[0, 0]] - 0.5).abs() < 1e-6);
        assert!(raster.data()[[0, 1]].is_nan());
    }

    #[test]
    fn test_assemble_decode_failure() {
        let mut batch = batch_of(
            vec![(0, bbox(0.0, 0.0, 1.0, 1.0), vec![0.1])],
            SourceKind::Sentinel2L2A,
        );
        for (_, fetched) in batch.rasters.values_mut() {
            fetched.bytes = b"garbage".to_vec();
        }
        let grid = MosaicGrid::covering(bbox(0.0, 0.0, 1.0, 1.0), (1.0, 1.0));
        let result = assemble(batch, &grid, 1);
        assert!(matches!(result, Err(AssembleError::Decode { tile: 0, .. })));
    }
}
