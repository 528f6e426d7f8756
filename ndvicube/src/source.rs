//! Raster data sources.
//!
//! Each source kind carries everything needed to request and interpret its
//! rasters: the data collection, the evalscript run server-side, and the
//! rescale from delivered values to NDVI.

use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;

/// Sentinel-2 L2A collection type.
pub const S2L2A_COLLECTION: &str = "sentinel-2-l2a";

/// CLMS NDVI 300 m, 10-daily, 2014–2020 (V1).
pub const CLMS_NDVI_V1: &str = "byoc-41f33765-18a0-4e1a-ade2-b4093254ce68";

/// CLMS NDVI 300 m, 10-daily, 2020–present (V2).
pub const CLMS_NDVI_V2: &str = "byoc-ab0e1e8e-508c-4faa-9b5b-c9c4734ef29e";

/// CLMS digital numbers are converted with `dn * CLMS_SCALE + CLMS_OFFSET`.
pub const CLMS_SCALE: f32 = 1.0 / 250.0;
pub const CLMS_OFFSET: f32 = -0.08;

/// CLMS digital numbers above this are flags, not measurements.
pub const CLMS_MAX_VALID_DN: f32 = 250.0;

/// NDVI from Sentinel-2 L2A, cloud/shadow/water masked with the scene
/// classification layer, delivered as FLOAT32 with NaN for masked pixels.
pub const S2_NDVI_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["B04", "B08", "SCL", "dataMask"] }],
    output: { bands: 1, sampleType: "FLOAT32" }
  };
}

// SCL classes kept: vegetation, bare soil, unclassified
const VALID_SCL = [4, 5, 7];

function evaluatePixel(s) {
  if (s.dataMask === 0 || VALID_SCL.indexOf(s.SCL) === -1) {
    return [NaN];
  }
  const denom = s.B08 + s.B04;
  if (denom === 0) {
    return [NaN];
  }
  return [(s.B08 - s.B04) / denom];
}
"#;

/// Raw CLMS NDVI digital numbers (0-255) as UINT8.
pub const CLMS_NDVI_EVALSCRIPT: &str = r#"//VERSION=3
function setup() {
  return {
    input: [{ bands: ["NDVI", "dataMask"] }],
    output: { bands: 1, sampleType: "UINT8" }
  };
}

function evaluatePixel(s) {
  if (s.dataMask === 0) {
    return [255];
  }
  return [s.NDVI];
}
"#;

/// Errors selecting a secondary source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("no secondary NDVI product covers year {year} (supported: 2014-2019, 2020 onwards)")]
    UnsupportedEpoch { year: i32 },
}

/// Product version of the CLMS NDVI secondary source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClmsEpoch {
    /// 2014 through 2019.
    V1,
    /// 2020 onwards.
    V2,
}

impl ClmsEpoch {
    /// First year covered by V1.
    pub const V1_FIRST_YEAR: i32 = 2014;
    /// First year covered by V2.
    pub const V2_FIRST_YEAR: i32 = 2020;

    /// Selects the product version for a calendar year.
    pub fn for_year(year: i32) -> Result<Self, SourceError> {
        match year {
            y if y >= Self::V2_FIRST_YEAR => Ok(ClmsEpoch::V2),
            y if y >= Self::V1_FIRST_YEAR => Ok(ClmsEpoch::V1),
            _ => Err(SourceError::UnsupportedEpoch { year }),
        }
    }

    pub fn for_date(date: DateTime<Utc>) -> Result<Self, SourceError> {
        Self::for_year(date.year())
    }

    pub fn collection(&self) -> &'static str {
        match self {
            ClmsEpoch::V1 => CLMS_NDVI_V1,
            ClmsEpoch::V2 => CLMS_NDVI_V2,
        }
    }
}

/// Where a raster comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Sentinel-2 L2A NDVI, 10 m.
    Sentinel2L2A,
    /// CLMS NDVI 300 m, used to fill gaps.
    Clms(ClmsEpoch),
}

impl SourceKind {
    /// Data collection type for the Process API.
    pub fn collection(&self) -> &'static str {
        match self {
            SourceKind::Sentinel2L2A => S2L2A_COLLECTION,
            SourceKind::Clms(epoch) => epoch.collection(),
        }
    }

    pub fn evalscript(&self) -> &'static str {
        match self {
            SourceKind::Sentinel2L2A => S2_NDVI_EVALSCRIPT,
            SourceKind::Clms(_) => CLMS_NDVI_EVALSCRIPT,
        }
    }

    /// Mosaicking order requested from the Process API, if any.
    pub fn mosaicking_order(&self) -> Option<&'static str> {
        match self {
            SourceKind::Sentinel2L2A => Some("leastCC"),
            SourceKind::Clms(_) => None,
        }
    }

    /// Converts a delivered pixel value to NDVI. NaN stays NaN.
    #[inline]
    pub fn to_ndvi(&self, value: f32) -> f32 {
        match self {
            SourceKind::Sentinel2L2A => value,
            SourceKind::Clms(_) => {
                if value.is_nan() || value > CLMS_MAX_VALID_DN {
                    f32::NAN
                } else {
                    value * CLMS_SCALE + CLMS_OFFSET
                }
            }
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Sentinel2L2A => write!(f, "Sentinel-2 L2A"),
            SourceKind::Clms(ClmsEpoch::V1) => write!(f, "CLMS NDVI 300m V1"),
            SourceKind::Clms(ClmsEpoch::V2) => write!(f, "CLMS NDVI 300m V2"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_boundaries() {
        assert_eq!(ClmsEpoch::for_year(2014), Ok(ClmsEpoch::V1));
        assert_eq!(ClmsEpoch::for_year(2019), Ok(ClmsEpoch::V1));
        assert_eq!(ClmsEpoch::for_year(2020), Ok(ClmsEpoch::V2));
        assert_eq!(ClmsEpoch::for_year(2025), Ok(ClmsEpoch::V2));
    }

    #[test]
    fn test_epoch_2010_unsupported() {
        assert_eq!(
            ClmsEpoch::for_year(2010),
            Err(SourceError::UnsupportedEpoch { year: 2010 })
        );
        assert!(ClmsEpoch::for_year(2013).is_err());
    }

    #[test]
    fn test_clms_rescale() {
        let source = SourceKind::Clms(ClmsEpoch::V2);
        assert!((source.to_ndvi(0.0) - (-0.08)).abs() < 1e-6);
        assert!((source.to_ndvi(250.0) - 0.92).abs() < 1e-6);
        assert!((source.to_ndvi(145.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clms_flags_are_missing() {
        let source = SourceKind::Clms(ClmsEpoch::V1);
        assert!(source.to_ndvi(251.0).is_nan());
        assert!(source.to_ndvi(255.0).is_nan());
        assert!(source.to_ndvi(f32::NAN).is_nan());
    }

    #[test]
    fn test_sentinel_values_pass_through() {
        assert_eq!(SourceKind::Sentinel2L2A.to_ndvi(0.42), 0.42);
        assert!(SourceKind::Sentinel2L2A.to_ndvi(f32::NAN).is_nan());
    }

    #[test]
    fn test_collections() {
        assert_eq!(SourceKind::Sentinel2L2A.collection(), "sentinel-2-l2a");
        assert_eq!(SourceKind::Clms(ClmsEpoch::V1).collection(), CLMS_NDVI_V1);
        assert_eq!(SourceKind::Clms(ClmsEpoch::V2).collection(), CLMS_NDVI_V2);
    }
}
