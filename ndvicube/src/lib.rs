//! ndvicube - gap-free dekadal NDVI cubes
//!
//! This library turns irregular Sentinel-2 acquisitions over an area of
//! interest into a regular NDVI time series sampled on dekads (the 1st, 11th
//! and 21st of each month). Targets left without valid pixels are filled from
//! the Copernicus Land Monitoring Service 300 m NDVI product.
//!
//! The main entry point is [`pipeline::PipelineContext`]; the individual
//! stages ([`search`], [`tile`], [`fetch`], [`mosaic`], [`composite`],
//! [`gapfill`], [`output`]) can also be used on their own.

pub mod aoi;
pub mod catalog;
pub mod composite;
pub mod config;
pub mod coord;
pub mod cube;
pub mod dekad;
pub mod fetch;
pub mod gapfill;
pub mod logging;
pub mod mosaic;
pub mod output;
pub mod pipeline;
pub mod provider;
pub mod raster;
pub mod search;
pub mod source;
pub mod tile;

pub use pipeline::{PipelineContext, PipelineError, PipelineReport, PipelineSettings};

/// Crate version, recorded in run manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
