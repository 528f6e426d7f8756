//! Area-of-interest loading from GeoJSON.
//!
//! Accepts a bare `Polygon` / `MultiPolygon` geometry, a `Feature` wrapping
//! one, or a `FeatureCollection` (all polygon features are combined). Only
//! exterior rings matter for the envelope, but all rings are kept.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::coord::{BoundingBox, CoordError};

/// Errors that can occur while loading an AOI.
#[derive(Debug, Error)]
pub enum AoiError {
    #[error("failed to read AOI file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported GeoJSON geometry type: {0}")]
    UnsupportedGeometry(String),

    #[error("malformed coordinates: {0}")]
    MalformedCoordinates(String),

    #[error("AOI contains no polygon")]
    Empty,

    #[error("AOI envelope is invalid: {0}")]
    Envelope(#[from] CoordError),
}

/// A ring of `(lon, lat)` vertices.
pub type Ring = Vec<(f64, f64)>;

/// Polygon AOI geometry: one or more polygons, each a list of rings with the
/// exterior ring first.
#[derive(Debug, Clone, PartialEq)]
pub struct AoiGeometry {
    polygons: Vec<Vec<Ring>>,
}

impl AoiGeometry {
    /// Builds a geometry from raw polygons.
    pub fn from_polygons(polygons: Vec<Vec<Ring>>) -> Result<Self, AoiError> {
        if polygons.iter().all(|p| p.iter().all(|r| r.is_empty())) {
            return Err(AoiError::Empty);
        }
        Ok(Self { polygons })
    }

    /// Polygon covering exactly `bbox`.
    pub fn from_bbox(bbox: &BoundingBox) -> Self {
        let ring = vec![
            (bbox.min_lon, bbox.min_lat),
            (bbox.max_lon, bbox.min_lat),
            (bbox.max_lon, bbox.max_lat),
            (bbox.min_lon, bbox.max_lat),
            (bbox.min_lon, bbox.min_lat),
        ];
        Self {
            polygons: vec![vec![ring]],
        }
    }

    pub fn polygons(&self) -> &[Vec<Ring>] {
        &self.polygons
    }

    /// The bounding envelope of every vertex.
    pub fn envelope(&self) -> Result<BoundingBox, AoiError> {
        let mut min_lon = f64::INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut max_lat = f64::NEG_INFINITY;

        for &(lon, lat) in self.polygons.iter().flatten().flatten() {
            min_lon = min_lon.min(lon);
            min_lat = min_lat.min(lat);
            max_lon = max_lon.max(lon);
            max_lat = max_lat.max(lat);
        }

        if !min_lon.is_finite() {
            return Err(AoiError::Empty);
        }
        Ok(BoundingBox::new(min_lon, min_lat, max_lon, max_lat)?)
    }
}

/// A loaded area of interest: its geometry and bounding box.
#[derive(Debug, Clone)]
pub struct Aoi {
    geometry: AoiGeometry,
    bbox: BoundingBox,
}

impl Aoi {
    pub fn new(geometry: AoiGeometry) -> Result<Self, AoiError> {
        let bbox = geometry.envelope()?;
        Ok(Self { geometry, bbox })
    }

    /// An AOI that is exactly a rectangle.
    pub fn from_bbox(bbox: BoundingBox) -> Self {
        Self {
            geometry: AoiGeometry::from_bbox(&bbox),
            bbox,
        }
    }

    pub fn geometry(&self) -> &AoiGeometry {
        &self.geometry
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }
}

/// Loads an AOI from a GeoJSON file.
pub fn load_aoi(path: &Path) -> Result<Aoi, AoiError> {
    let text = fs::read_to_string(path).map_err(|source| AoiError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let aoi = parse_aoi(&text)?;
    tracing::debug!(path = %path.display(), bbox = %aoi.bbox(), "Loaded AOI");
    Ok(aoi)
}

/// Parses an AOI from GeoJSON text.
pub fn parse_aoi(text: &str) -> Result<Aoi, AoiError> {
    let value: Value = serde_json::from_str(text)?;
    let mut polygons = Vec::new();
    collect_polygons(&value, &mut polygons)?;
    if polygons.is_empty() {
        return Err(AoiError::Empty);
    }
    Aoi::new(AoiGeometry::from_polygons(polygons)?)
}

fn collect_polygons(value: &Value, out: &mut Vec<Vec<Ring>>) -> Result<(), AoiError> {
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| AoiError::UnsupportedGeometry("missing type".to_string()))?;

    match kind {
        "FeatureCollection" => {
            let features = value
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| AoiError::MalformedCoordinates("features".to_string()))?;
            for feature in features {
                collect_polygons(feature, out)?;
            }
        }
        "Feature" => match value.get("geometry") {
            Some(geometry) if !geometry.is_null() => collect_polygons(geometry, out)?,
            _ => {}
        },
        "GeometryCollection" => {
            if let Some(geometries) = value.get("geometries").and_then(Value::as_array) {
                for geometry in geometries {
                    collect_polygons(geometry, out)?;
                }
            }
        }
        "Polygon" => out.push(parse_polygon(coordinates(value)?)?),
        "MultiPolygon" => {
            let polys = coordinates(value)?
                .as_array()
                .ok_or_else(|| AoiError::MalformedCoordinates("MultiPolygon".to_string()))?;
            for poly in polys {
                out.push(parse_polygon(poly)?);
            }
        }
        other => return Err(AoiError::UnsupportedGeometry(other.to_string())),
    }
    Ok(())
}

fn coordinates(value: &Value) -> Result<&Value, AoiError> {
    value
        .get("coordinates")
        .ok_or_else(|| AoiError::MalformedCoordinates("missing coordinates".to_string()))
}

fn parse_polygon(value: &Value) -> Result<Vec<Ring>, AoiError> {
    let rings = value
        .as_array()
        .ok_or_else(|| AoiError::MalformedCoordinates("polygon is not an array".to_string()))?;

    rings
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| AoiError::MalformedCoordinates("ring is not an array".to_string()))?
                .iter()
                .map(parse_position)
                .collect()
        })
        .collect()
}

fn parse_position(value: &Value) -> Result<(f64, f64), AoiError> {
    let pos = value
        .as_array()
        .filter(|p| p.len() >= 2)
        .ok_or_else(|| AoiError::MalformedCoordinates(value.to_string()))?;
    match (pos[0].as_f64(), pos[1].as_f64()) {
        (Some(lon), Some(lat)) => Ok((lon, lat)),
        _ => Err(AoiError::MalformedCoordinates(value.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const POLYGON: &str = r#"{
        "type": "Polygon",
        "coordinates": [[[10.0, 45.0], [10.5, 45.0], [10.5, 45.4], [10.0, 45.4], [10.0, 45.0]]]
    }"#;

    #[test]
    fn test_parse_polygon_envelope() {
        let aoi = parse_aoi(POLYGON).unwrap();
        assert_eq!(aoi.bbox().to_array(), [10.0, 45.0, 10.5, 45.4]);
        assert_eq!(aoi.geometry().polygons().len(), 1);
    }

    #[test]
    fn test_parse_feature_collection_combines_features() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[1.0, 1.0], [2.0, 1.0], [2.0, 2.0], [1.0, 1.0]]]}},
                {"type": "Feature", "properties": {}, "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[3.0, 0.5], [4.0, 0.5], [4.0, 1.5], [3.0, 0.5]]]]}}
            ]
        }"#;
        let aoi = parse_aoi(text).unwrap();
        assert_eq!(aoi.bbox().to_array(), [1.0, 0.5, 4.0, 2.0]);
        assert_eq!(aoi.geometry().polygons().len(), 2);
    }

    #[test]
    fn test_parse_rejects_points() {
        let text = r#"{"type": "Point", "coordinates": [1.0, 2.0]}"#;
        assert!(matches!(
            parse_aoi(text),
            Err(AoiError::UnsupportedGeometry(t)) if t == "Point"
        ));
    }

    #[test]
    fn test_parse_empty_collection() {
        let text = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(parse_aoi(text), Err(AoiError::Empty)));
    }

    #[test]
    fn test_load_aoi_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(POLYGON.as_bytes()).unwrap();
        let aoi = load_aoi(file.path()).unwrap();
        assert_eq!(aoi.bbox().min_lon, 10.0);
    }

    #[test]
    fn test_load_aoi_missing_file() {
        let result = load_aoi(Path::new("/nonexistent/aoi.geojson"));
        assert!(matches!(result, Err(AoiError::Read { .. })));
    }

    #[test]
    fn test_from_bbox_round_trips_envelope() {
        let bbox = BoundingBox::new(5.0, 50.0, 6.0, 51.0).unwrap();
        let aoi = Aoi::from_bbox(bbox);
        assert_eq!(aoi.geometry().envelope().unwrap(), bbox);
    }
}
