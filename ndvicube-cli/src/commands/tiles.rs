//! Tiles command - show how an AOI is split into raster requests.

use std::path::Path;

use ndvicube::aoi::load_aoi;
use ndvicube::config::ConfigFile;
use ndvicube::tile::TilePlan;

use crate::error::CliError;

/// Run the tiles command.
pub fn run(aoi: &Path, resolution: Option<f64>, config: &ConfigFile) -> Result<(), CliError> {
    let resolution = resolution.unwrap_or(config.extraction.resolution);
    if resolution <= 0.0 {
        return Err(CliError::Config(format!(
            "resolution must be positive, got {}",
            resolution
        )));
    }

    let aoi = load_aoi(aoi)?;
    let plan = TilePlan::for_aoi(&aoi, resolution, config.extraction.max_tile_size)?;
    let (width, height) = plan.bbox().pixel_dimensions(resolution);
    let (nx, ny) = plan.shape();

    println!("AOI bbox:   {}", plan.bbox());
    println!("Resolution: {} m", resolution);
    println!("Size:       {} x {} px", width, height);
    println!("Grid:       {} x {} ({} tiles)", nx, ny, plan.tiles().len());
    println!();
    for tile in plan.tiles() {
        println!(
            "  [{:>3}] row {:>2} col {:>2}  {}  {} x {} px",
            tile.index, tile.row, tile.column, tile.bbox, tile.size.0, tile.size.1
        );
    }
    Ok(())
}
