//! Spatial tiling of an AOI.
//!
//! A single raster request is limited to [`MAX_TILE_SIZE`] pixels per side.
//! Larger AOIs are split into an `nx × ny` grid of tiles which together
//! partition the AOI's bounding envelope exactly.

use crate::aoi::{Aoi, AoiError};
use crate::coord::BoundingBox;

/// Maximum pixels per side of a single raster request.
pub const MAX_TILE_SIZE: u32 = 2500;

/// One cell of the tiling grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    /// Position in row-major order.
    pub index: usize,
    /// Grid column, west to east.
    pub column: u32,
    /// Grid row, north to south.
    pub row: u32,
    /// Geographic extent of the tile.
    pub bbox: BoundingBox,
    /// Pixel `(width, height)` requested for this tile.
    pub size: (u32, u32),
}

/// Number of tiles needed along each axis: `(nx, ny)`.
pub fn tile_count(bbox: &BoundingBox, resolution: f64, max_size: u32) -> (u32, u32) {
    let (width, height) = bbox.pixel_dimensions(resolution);
    (width.div_ceil(max_size), height.div_ceil(max_size))
}

/// Splits `envelope` into an `nx × ny` grid in row-major order, starting at
/// the north-west corner.
///
/// Cell edges are computed from the envelope bounds by index, so adjacent
/// tiles share their edge exactly and the outer edges equal the envelope.
pub fn split(envelope: &BoundingBox, nx: u32, ny: u32, resolution: f64) -> Vec<Tile> {
    let nx = nx.max(1);
    let ny = ny.max(1);

    if nx == 1 && ny == 1 {
        return vec![Tile {
            index: 0,
            column: 0,
            row: 0,
            bbox: *envelope,
            size: envelope.pixel_dimensions(resolution),
        }];
    }

    let lon_edge = |i: u32| {
        if i == nx {
            envelope.max_lon
        } else {
            envelope.min_lon + envelope.width_deg() * f64::from(i) / f64::from(nx)
        }
    };
    // Rows count southward from the northern edge.
    let lat_edge = |j: u32| {
        if j == ny {
            envelope.min_lat
        } else {
            envelope.max_lat - envelope.height_deg() * f64::from(j) / f64::from(ny)
        }
    };

    let mut tiles = Vec::with_capacity((nx * ny) as usize);
    for row in 0..ny {
        for column in 0..nx {
            let bbox = BoundingBox {
                min_lon: lon_edge(column),
                max_lon: lon_edge(column + 1),
                min_lat: lat_edge(row + 1),
                max_lat: lat_edge(row),
            };
            tiles.push(Tile {
                index: tiles.len(),
                column,
                row,
                bbox,
                size: bbox.pixel_dimensions(resolution),
            });
        }
    }
    tiles
}

/// Spatial decomposition of one extraction run.
#[derive(Debug, Clone)]
pub struct TilePlan {
    bbox: BoundingBox,
    shape: (u32, u32),
    tiles: Vec<Tile>,
}

impl TilePlan {
    /// Plans tiles for an AOI.
    ///
    /// When a single tile suffices the AOI's bbox is used directly; otherwise
    /// the AOI geometry's envelope is split.
    pub fn for_aoi(aoi: &Aoi, resolution: f64, max_size: u32) -> Result<Self, AoiError> {
        let bbox = aoi.bbox();
        let (nx, ny) = tile_count(&bbox, resolution, max_size);

        let tiles = if nx > 1 || ny > 1 {
            let envelope = aoi.geometry().envelope()?;
            split(&envelope, nx, ny, resolution)
        } else {
            split(&bbox, 1, 1, resolution)
        };

        let plan = Self {
            bbox,
            shape: (nx, ny),
            tiles,
        };

        if plan.is_split() {
            tracing::info!(
                size = ?bbox.pixel_dimensions(resolution),
                nx,
                ny,
                "AOI exceeds maximum tile size, splitting bounding box"
            );
        } else {
            tracing::info!(size = ?bbox.pixel_dimensions(resolution), "AOI fits in a single tile");
        }

        Ok(plan)
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// `(nx, ny)` grid shape.
    pub fn shape(&self) -> (u32, u32) {
        self.shape
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn is_split(&self) -> bool {
        self.tiles.len() > 1
    }
}
