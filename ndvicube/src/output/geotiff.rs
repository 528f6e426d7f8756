//! Float32 GeoTIFF writer.
//!
//! Each dekad is written as a single-band, EPSG:4326 GeoTIFF with NaN as the
//! GDAL nodata value.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tracing::debug;

use super::{date_stem, ensure_dir, OutputError, OutputMetadata, OutputSink};
use crate::coord::BoundingBox;
use crate::cube::RasterCube;

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_NODATA: u16 = 42113;

/// GeoKey directory: geographic model, pixel-is-area, WGS84 (EPSG:4326).
const WGS84_GEO_KEYS: [u16; 16] = [
    1, 1, 0, 3, // header: version, revision, minor, key count
    1024, 0, 1, 2, // GTModelTypeGeoKey = ModelTypeGeographic
    1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
    2048, 0, 1, 4326, // GeographicTypeGeoKey = WGS84
];

/// Encodes one slice as a GeoTIFF into `writer`.
pub fn write_geotiff<W: Write + Seek>(
    writer: W,
    data: &Array2<f32>,
    bounds: &BoundingBox,
) -> Result<(), OutputError> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return Err(OutputError::EmptyCube);
    }
    let pixel_x = bounds.width_deg() / cols as f64;
    let pixel_y = bounds.height_deg() / rows as f64;

    let mut encoder = TiffEncoder::new(writer)?;
    let mut image = encoder.new_image::<colortype::Gray32Float>(cols as u32, rows as u32)?;
    {
        let dir = image.encoder();
        dir.write_tag(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE), &[pixel_x, pixel_y, 0.0][..])?;
        dir.write_tag(
            Tag::from_u16_exhaustive(MODEL_TIEPOINT),
            &[0.0, 0.0, 0.0, bounds.min_lon, bounds.max_lat, 0.0][..],
        )?;
        dir.write_tag(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY), &WGS84_GEO_KEYS[..])?;
        dir.write_tag(Tag::from_u16_exhaustive(GDAL_NODATA), "nan")?;
    }

    let pixels: Vec<f32> = data.iter().copied().collect();
    image.write_data(&pixels)?;
    Ok(())
}

/// Writes `<prefix>_<YYYY-MM-DD>.tif` per dekad into a directory.
pub struct GeoTiffSink {
    directory: PathBuf,
    prefix: String,
}

impl GeoTiffSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "ndvi".to_string(),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn write_file(&self, path: &Path, data: &Array2<f32>, bounds: &BoundingBox) -> Result<(), OutputError> {
        let file = File::create(path).map_err(|e| OutputError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        write_geotiff(&mut writer, data, bounds)?;
        writer.flush().map_err(|e| OutputError::io(path, e))
    }
}

impl OutputSink for GeoTiffSink {
    fn name(&self) -> &str {
        "geotiff"
    }

    fn write(&self, cube: &RasterCube, _metadata: &OutputMetadata) -> Result<Vec<PathBuf>, OutputError> {
        if cube.is_empty() {
            return Err(OutputError::EmptyCube);
        }
        ensure_dir(&self.directory)?;

        let bounds = cube.bounds();
        let mut written = Vec::with_capacity(cube.len());
        for (t, slice) in cube.iter() {
            let path = self
                .directory
                .join(format!("{}_{}.tif", self.prefix, date_stem(*t)));
            self.write_file(&path, slice, &bounds)?;
            debug!(path = %path.display(), "Wrote GeoTIFF");
            written.push(path);
        }
        Ok(written)
    }
}
