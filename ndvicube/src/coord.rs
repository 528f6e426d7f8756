//! Geographic bounding boxes and their pixel footprint.
//!
//! All boxes are axis-aligned in WGS84 longitude/latitude. Pixel dimensions
//! are derived from the box's ground extent at a fixed resolution in metres
//! per pixel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ground resolution of the primary product, in metres per pixel.
pub const RESOLUTION: f64 = 10.0;

/// Minimum latitude accepted for a bounding box.
pub const MIN_LAT: f64 = -90.0;
/// Maximum latitude accepted for a bounding box.
pub const MAX_LAT: f64 = 90.0;
/// Minimum longitude accepted for a bounding box.
pub const MIN_LON: f64 = -180.0;
/// Maximum longitude accepted for a bounding box.
pub const MAX_LON: f64 = 180.0;

/// Errors for bounding box construction.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Latitude outside [-90, 90].
    InvalidLatitude(f64),
    /// Longitude outside [-180, 180].
    InvalidLongitude(f64),
    /// min is not strictly less than max on some axis.
    EmptyExtent {
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    },
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLatitude(lat) => write!(f, "invalid latitude: {}", lat),
            CoordError::InvalidLongitude(lon) => write!(f, "invalid longitude: {}", lon),
            CoordError::EmptyExtent {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            } => write!(
                f,
                "bounding box has no area: [{}, {}, {}, {}]",
                min_lon, min_lat, max_lon, max_lat
            ),
        }
    }
}

impl std::error::Error for CoordError {}

/// Axis-aligned WGS84 rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Creates a validated bounding box.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Result<Self, CoordError> {
        for lat in [min_lat, max_lat] {
            if !(MIN_LAT..=MAX_LAT).contains(&lat) {
                return Err(CoordError::InvalidLatitude(lat));
            }
        }
        for lon in [min_lon, max_lon] {
            if !(MIN_LON..=MAX_LON).contains(&lon) {
                return Err(CoordError::InvalidLongitude(lon));
            }
        }
        if min_lon >= max_lon || min_lat >= max_lat {
            return Err(CoordError::EmptyExtent {
                min_lon,
                min_lat,
                max_lon,
                max_lat,
            });
        }
        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Width in degrees of longitude.
    #[inline]
    pub fn width_deg(&self) -> f64 {
        self.max_lon - self.min_lon
    }

    /// Height in degrees of latitude.
    #[inline]
    pub fn height_deg(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub fn to_array(&self) -> [f64; 4] {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
    }

    /// Ground extent in metres as `(east-west, north-south)`.
    ///
    /// East-west is measured along the widest parallel inside the box (the
    /// one closest to the equator); north-south uses the largest
    /// metres-per-degree of latitude inside the box. A sub-box therefore
    /// never measures more per degree than the box containing it.
    pub fn extent_metres(&self) -> (f64, f64) {
        let widest_lat = if self.min_lat <= 0.0 && self.max_lat >= 0.0 {
            0.0
        } else {
            self.min_lat.abs().min(self.max_lat.abs())
        };
        let steepest_lat = self.min_lat.abs().max(self.max_lat.abs());

        let x = self.width_deg() * metres_per_degree_lon(widest_lat);
        let y = self.height_deg() * metres_per_degree_lat(steepest_lat);
        (x, y)
    }

    /// Pixel `(width, height)` at `resolution` metres per pixel, minimum 1.
    pub fn pixel_dimensions(&self, resolution: f64) -> (u32, u32) {
        let (x, y) = self.extent_metres();
        let to_px = |m: f64| ((m / resolution).round() as u32).max(1);
        (to_px(x), to_px(y))
    }

    /// True if the two boxes share any area.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.min_lon < other.max_lon
            && other.min_lon < self.max_lon
            && self.min_lat < other.max_lat
            && other.min_lat < self.max_lat
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}]",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Metres per degree of latitude at `lat` on the WGS84 ellipsoid.
#[inline]
pub fn metres_per_degree_lat(lat: f64) -> f64 {
    let phi = lat.to_radians();
    111_132.92 - 559.82 * (2.0 * phi).cos() + 1.175 * (4.0 * phi).cos()
        - 0.0023 * (6.0 * phi).cos()
}

/// Metres per degree of longitude at `lat` on the WGS84 ellipsoid.
#[inline]
pub fn metres_per_degree_lon(lat: f64) -> f64 {
    let phi = lat.to_radians();
    (111_412.84 * phi.cos() - 93.5 * (3.0 * phi).cos() + 0.118 * (5.0 * phi).cos()).max(0.0)
}
