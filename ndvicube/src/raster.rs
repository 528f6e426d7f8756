//! Georeferenced single-band rasters.

use std::io::Cursor;

use ndarray::Array2;
use thiserror::Error;
use tiff::decoder::{Decoder, DecodingResult, Limits};

use crate::coord::BoundingBox;

/// Errors decoding or validating raster content.
#[derive(Debug, Error)]
pub enum RasterError {
    #[error("TIFF decoding error: {0}")]
    Decode(#[from] tiff::TiffError),

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("raster is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("unsupported pixel format in TIFF")]
    UnsupportedPixelFormat,
}

/// A single-band raster aligned to a WGS84 bounding box.
///
/// Row 0 is the northern edge, column 0 the western edge. Missing pixels are
/// NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    data: Array2<f32>,
    bounds: BoundingBox,
}

impl Raster {
    pub fn new(data: Array2<f32>, bounds: BoundingBox) -> Self {
        Self { data, bounds }
    }

    /// A raster of the given `(rows, cols)` with every pixel missing.
    pub fn missing(shape: (usize, usize), bounds: BoundingBox) -> Self {
        Self::new(Array2::from_elem(shape, f32::NAN), bounds)
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array2<f32> {
        &mut self.data
    }

    pub fn into_data(self) -> Array2<f32> {
        self.data
    }

    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Pixel size in degrees as `(x, y)`.
    pub fn pixel_size(&self) -> (f64, f64) {
        (
            self.bounds.width_deg() / self.width().max(1) as f64,
            self.bounds.height_deg() / self.height().max(1) as f64,
        )
    }

    /// Applies `f` to every pixel.
    pub fn map_values(mut self, f: impl Fn(f32) -> f32) -> Self {
        self.data.mapv_inplace(f);
        self
    }
}

/// True if every pixel is NaN (also for an empty array).
pub fn all_missing(data: &Array2<f32>) -> bool {
    data.iter().all(|v| v.is_nan())
}

/// Decodes a single-image TIFF into a raster covering `bounds`.
///
/// `width` and `height` are the dimensions the raster was requested with;
/// the decoded image must match them. For multi-sample images only the first
/// sample of each pixel is kept.
pub fn decode_geotiff(
    bytes: &[u8],
    width: u32,
    height: u32,
    bounds: BoundingBox,
) -> Result<Raster, RasterError> {
    let mut decoder = Decoder::new(Cursor::new(bytes))?.with_limits(Limits::unlimited());
    let (actual_width, actual_height) = decoder.dimensions()?;
    if (actual_width, actual_height) != (width, height) {
        return Err(RasterError::DimensionMismatch {
            expected_width: width,
            expected_height: height,
            actual_width,
            actual_height,
        });
    }

    let values: Vec<f32> = match decoder.read_image()? {
        DecodingResult::U8(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::I16(buf) => buf.into_iter().map(f32::from).collect(),
        DecodingResult::U32(buf) => buf.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(buf) => buf,
        DecodingResult::F64(buf) => buf.into_iter().map(|v| v as f32).collect(),
        _ => return Err(RasterError::UnsupportedPixelFormat),
    };

    let pixels = width as usize * height as usize;
    if pixels == 0 || values.len() % pixels != 0 {
        return Err(RasterError::UnsupportedPixelFormat);
    }
    let samples = values.len() / pixels;
    let band: Vec<f32> = if samples == 1 {
        values
    } else {
        values.into_iter().step_by(samples).collect()
    };

    let data = Array2::from_shape_vec((height as usize, width as usize), band)?;
    Ok(Raster::new(data, bounds))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    /// Encodes a FLOAT32 grayscale TIFF.
    pub fn encode_f32(width: u32, height: u32, values: &[f32]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            encoder
                .write_image::<colortype::Gray32Float>(width, height, values)
                .unwrap();
        }
        buf.into_inner()
    }

    /// Encodes a UINT8 grayscale TIFF.
    pub fn encode_u8(width: u32, height: u32, values: &[u8]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf).unwrap();
            encoder
                .write_image::<colortype::Gray8>(width, height, values)
                .unwrap();
        }
        buf.into_inner()
    }

    fn bounds() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()
    }

    #[test]
    fn test_decode_f32_preserves_nan() {
        let bytes = encode_f32(3, 2, &[0.1, f32::NAN, 0.3, 0.4, 0.5, 0.6]);
        let raster = decode_geotiff(&bytes, 3, 2, bounds()).unwrap();
        assert_eq!(raster.shape(), (2, 3));
        assert_eq!(raster.data()[[0, 0]], 0.1);
        assert!(raster.data()[[0, 1]].is_nan());
        assert_eq!(raster.data()[[1, 2]], 0.6);
    }

    #[test]
    fn test_decode_u8() {
        let bytes = encode_u8(2, 2, &[0, 125, 250, 255]);
        let raster = decode_geotiff(&bytes, 2, 2, bounds()).unwrap();
        assert_eq!(raster.data()[[1, 1]], 255.0);
    }

    #[test]
    fn test_decode_dimension_mismatch() {
        let bytes = encode_f32(2, 2, &[0.0; 4]);
        let result = decode_geotiff(&bytes, 4, 4, bounds());
        assert!(matches!(result, Err(RasterError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_decode_garbage() {
        let result = decode_geotiff(b"not a tiff", 1, 1, bounds());
        assert!(matches!(result, Err(RasterError::Decode(_))));
    }

    #[test]
    fn test_all_missing() {
        assert!(all_missing(&Array2::from_elem((2, 2), f32::NAN)));
        let mut partial = Array2::from_elem((2, 2), f32::NAN);
        partial[[1, 0]] = 0.2;
        assert!(!all_missing(&partial));
    }

    #[test]
    fn test_pixel_size() {
        let raster = Raster::missing((4, 2), bounds());
        assert_eq!(raster.pixel_size(), (0.5, 0.25));
    }
}
