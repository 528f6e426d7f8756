//! End-to-end extraction, compositing and output.
//!
//! A run has three stages:
//!
//! 1. **Extract**: resolve the search window, plan tiles, fetch every
//!    `(acquisition, tile)` raster and mosaic them into an observation cube
//! 2. **Transform**: composite onto dekadal targets, then optionally fill
//!    gaps from the secondary source
//! 3. **Load**: hand the finished cube to each output sink
//!
//! All collaborators and settings come from an explicit [`PipelineContext`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::aoi::{Aoi, AoiError};
use crate::catalog::{CatalogSearch, QualityFilter};
use crate::composite::composite;
use crate::config::{ConfigFile, OutputSettings};
use crate::cube::{CubeError, RasterCube};
use crate::dekad::TimeInterval;
use crate::fetch::{fetch_all, FetchError, FetchProgressCallback, FetchRequest, RasterFetch};
use crate::gapfill::{GapFillError, GapFillReport, GapFiller};
use crate::mosaic::{assemble, AssembleError, MosaicGrid};
use crate::output::{
    GeoTiffSink, ManifestSink, OutputError, OutputMetadata, OutputSink, PreviewSink,
};
use crate::search::{ResolvedWindow, SearchError, SearchWindowResolver, WindowStatus};
use crate::source::SourceKind;
use crate::tile::TilePlan;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    #[error("invalid AOI: {0}")]
    Aoi(#[from] AoiError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("mosaic failed: {0}")]
    Assemble(#[from] AssembleError),

    #[error(transparent)]
    Cube(#[from] CubeError),

    #[error("gap filling failed: {0}")]
    GapFill(#[from] GapFillError),

    #[error("{sink} output failed: {source}")]
    Output {
        sink: String,
        #[source]
        source: OutputError,
    },
}

/// Tunables for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Metres per pixel.
    pub resolution: f64,
    pub max_tile_size: u32,
    pub filter: QualityFilter,
    pub widening_step: Duration,
    pub max_widening_iterations: u32,
    pub max_threads: usize,
    pub gap_fill: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&ConfigFile::default())
    }
}

impl PipelineSettings {
    pub fn from_config(config: &ConfigFile) -> Self {
        let ex = &config.extraction;
        Self {
            resolution: ex.resolution,
            max_tile_size: ex.max_tile_size,
            filter: QualityFilter {
                max_cloud_cover: ex.max_cloud_cover,
            },
            widening_step: Duration::days(ex.widening_step_days),
            max_widening_iterations: ex.max_widening_iterations,
            max_threads: ex.max_threads,
            gap_fill: config.gapfill.enabled,
        }
    }
}

/// Sinks enabled in `settings`, writing under `directory`.
pub fn output_sinks(settings: &OutputSettings, directory: &Path) -> Vec<Box<dyn OutputSink>> {
    let mut sinks: Vec<Box<dyn OutputSink>> = Vec::new();
    if settings.geotiff {
        sinks.push(Box::new(GeoTiffSink::new(directory)));
    }
    if settings.preview {
        sinks.push(Box::new(PreviewSink::new(directory)));
    }
    if settings.manifest {
        sinks.push(Box::new(ManifestSink::new(directory)));
    }
    sinks
}

/// Everything a run needs.
pub struct PipelineContext<'a, C, F> {
    pub catalog: C,
    pub fetcher: F,
    pub settings: PipelineSettings,
    pub sinks: Vec<Box<dyn OutputSink>>,
    /// Called with `(completed, total)` during each batch fetch.
    pub on_progress: Option<&'a FetchProgressCallback>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub window: TimeInterval,
    pub window_status: WindowStatus,
    pub iterations: u32,
    pub targets: Vec<DateTime<Utc>>,
    /// Acquisitions that made it into the observation cube.
    pub observations: Vec<DateTime<Utc>>,
    /// Dekadal cube after gap filling.
    pub cube: RasterCube,
    /// Gaps after compositing, before filling.
    pub gaps: Vec<DateTime<Utc>>,
    pub gap_fill: Option<GapFillReport>,
    pub outputs: Vec<PathBuf>,
}

impl PipelineReport {
    /// Gaps still missing after filling.
    pub fn remaining_gaps(&self) -> Vec<DateTime<Utc>> {
        match &self.gap_fill {
            Some(report) => self
                .gaps
                .iter()
                .filter(|g| !report.filled.contains(g))
                .copied()
                .collect(),
            None => self.gaps.clone(),
        }
    }
}

/// Extraction result: observation cube plus what produced it.
struct Extracted {
    window: ResolvedWindow,
    plan: TilePlan,
    targets: Vec<DateTime<Utc>>,
    observations: RasterCube,
}

impl<'a, C: CatalogSearch, F: RasterFetch> PipelineContext<'a, C, F> {
    pub fn new(catalog: C, fetcher: F) -> Self {
        Self {
            catalog,
            fetcher,
            settings: PipelineSettings::default(),
            sinks: Vec::new(),
            on_progress: None,
        }
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn OutputSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_progress(mut self, on_progress: &'a FetchProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Runs the full pipeline for `aoi` over `requested`.
    pub fn run(&self, aoi: &Aoi, requested: &TimeInterval) -> Result<PipelineReport, PipelineError> {
        let extracted = self.extract(aoi, requested)?;
        let Extracted {
            window,
            plan,
            targets,
            observations,
        } = extracted;

        let result = composite(&observations, &targets)?;
        let mut cube = result.cube;
        let gaps = result.gaps;

        let gap_fill = if self.settings.gap_fill {
            Some(self.fill_gaps(&plan, &mut cube, &gaps)?)
        } else {
            if !gaps.is_empty() {
                warn!(gaps = gaps.len(), "Gap filling disabled, gaps remain missing");
            }
            None
        };

        let metadata = OutputMetadata {
            requested: *requested,
            search_window: window.interval,
            window_complete: window.status.is_complete(),
            bbox: plan.bbox(),
            resolution: self.settings.resolution,
            observations: observations.timestamps().collect(),
            gaps: gaps.clone(),
            filled: gap_fill
                .as_ref()
                .map(|r| r.filled.clone())
                .unwrap_or_default(),
        };
        let outputs = self.load(&cube, &metadata)?;

        Ok(PipelineReport {
            window: window.interval,
            window_status: window.status,
            iterations: window.iterations,
            targets,
            observations: metadata.observations,
            cube,
            gaps,
            gap_fill,
            outputs,
        })
    }

    #[instrument(skip_all, fields(requested = %requested))]
    fn extract(&self, aoi: &Aoi, requested: &TimeInterval) -> Result<Extracted, PipelineError> {
        let bbox = aoi.bbox();
        let resolver = SearchWindowResolver::new(&self.catalog)
            .with_filter(self.settings.filter)
            .with_step(self.settings.widening_step)
            .with_max_iterations(self.settings.max_widening_iterations);
        let window = resolver.resolve(&bbox, requested)?;

        if let WindowStatus::Exhausted {
            valid_start,
            valid_end,
        } = window.status
        {
            warn!(
                valid_start,
                valid_end,
                "Search window incomplete, edge targets may become gaps"
            );
        }

        let targets: Vec<_> = requested.targets().collect();
        let plan = TilePlan::for_aoi(aoi, self.settings.resolution, self.settings.max_tile_size)?;

        let mut requests = Vec::with_capacity(window.observations.len() * plan.tiles().len());
        for observation in &window.observations {
            for tile in plan.tiles() {
                requests.push(FetchRequest::at_instant(
                    observation.timestamp,
                    *tile,
                    SourceKind::Sentinel2L2A,
                ));
            }
        }
        info!(
            observations = window.observations.len(),
            tiles = plan.tiles().len(),
            requests = requests.len(),
            "Fetching observations"
        );

        let batch = fetch_all(
            &self.fetcher,
            requests,
            self.settings.max_threads,
            self.on_progress,
        )?;
        let grid = MosaicGrid::for_plan(&plan);
        let rasters = assemble(batch, &grid, plan.tiles().len())?;

        let mut observations = RasterCube::new(grid.bounds, grid.shape());
        for (timestamp, raster) in rasters {
            observations.insert(timestamp, raster.into_data())?;
        }

        let stats = observations.stats();
        info!(
            slices = observations.len(),
            missing_ratio = stats.missing_ratio(),
            ndvi_min = ?stats.min,
            ndvi_max = ?stats.max,
            "Observation cube"
        );

        Ok(Extracted {
            window,
            plan,
            targets,
            observations,
        })
    }

    #[instrument(skip_all, fields(gaps = gaps.len()))]
    fn fill_gaps(
        &self,
        plan: &TilePlan,
        cube: &mut RasterCube,
        gaps: &[DateTime<Utc>],
    ) -> Result<GapFillReport, PipelineError> {
        let filler = GapFiller::new(&self.fetcher, plan).with_max_threads(self.settings.max_threads);
        let report = filler.fill(cube, gaps, self.on_progress)?;
        if !gaps.is_empty() {
            info!(
                filled = report.filled.len(),
                unavailable = report.unavailable.len(),
                "Gap filling complete"
            );
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(sinks = self.sinks.len()))]
    fn load(&self, cube: &RasterCube, metadata: &OutputMetadata) -> Result<Vec<PathBuf>, PipelineError> {
        let mut outputs = Vec::new();
        for sink in &self.sinks {
            let paths = sink
                .write(cube, metadata)
                .map_err(|source| PipelineError::Output {
                    sink: sink.name().to_string(),
                    source,
                })?;
            info!(sink = sink.name(), files = paths.len(), "Output written");
            outputs.extend(paths);
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::MockCatalog;
    use crate::catalog::Observation;
    use crate::coord::BoundingBox;
    use crate::dekad::parse_instant;
    use crate::fetch::tests::MockFetcher;
    use crate::fetch::FetchedRaster;
    use crate::raster::tests::{encode_f32, encode_u8};

    fn day(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn aoi() -> Aoi {
        Aoi::from_bbox(BoundingBox::new(10.0, 45.0, 10.0005, 45.0003).unwrap())
    }

    fn plan() -> TilePlan {
        TilePlan::for_aoi(&aoi(), 10.0, 2500).unwrap()
    }

    fn constant(value: f32) -> FetchedRaster {
        let (w, h) = plan().tiles()[0].size;
        FetchedRaster {
            bytes: encode_f32(w, h, &vec![value; (w * h) as usize]),
            width: w,
            height: h,
        }
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_run_widens_and_composites() {
        let times = ["2023-12-28T10:00:00Z", "2024-01-05T10:00:00Z", "2024-01-14T10:00:00Z"];
        let catalog = MockCatalog::new(times.iter().map(|t| Observation::new(day(t), *t)).collect());
        let fetcher = MockFetcher::new()
            .with_response((day(times[0]), 0), constant(0.2))
            .with_response((day(times[1]), 0), constant(0.4))
            .with_response((day(times[2]), 0), constant(0.6));

        let ctx = PipelineContext::new(&catalog, &fetcher);
        let report = ctx
            .run(&aoi(), &TimeInterval::parse("2024-01-01", "2024-01-15").unwrap())
            .unwrap();

        assert_eq!(report.iterations, 2);
        assert!(report.window_status.is_complete());
        assert_eq!(report.targets, vec![day("2024-01-01"), day("2024-01-11")]);
        assert_eq!(report.observations.len(), 3);
        assert!(report.gaps.is_empty());
        assert_eq!(report.cube.len(), 2);
        assert!(report.cube.get(&day("2024-01-01")).unwrap().iter().all(|&v| close(v, 0.3)));
        assert!(report.cube.get(&day("2024-01-11")).unwrap().iter().all(|&v| close(v, 0.5)));
    }

    #[test]
    fn test_run_fills_gaps_from_secondary_source() {
        // Nothing in the catalog: every target is a gap.
        let catalog = MockCatalog::new(Vec::new());
        let plan = plan();
        let (w, h) = plan.tiles()[0].size;
        let dn = vec![145u8; (w * h) as usize];
        let fetcher = MockFetcher::new().with_response(
            (day("2024-01-11"), 0),
            FetchedRaster {
                bytes: encode_u8(w, h, &dn),
                width: w,
                height: h,
            },
        );

        let settings = PipelineSettings {
            max_widening_iterations: 2,
            ..PipelineSettings::default()
        };
        let ctx = PipelineContext::new(&catalog, &fetcher).with_settings(settings);
        let report = ctx
            .run(&aoi(), &TimeInterval::parse("2024-01-01", "2024-01-15").unwrap())
            .unwrap();

        assert!(!report.window_status.is_complete());
        assert_eq!(report.gaps.len(), 2);
        let fill = report.gap_fill.as_ref().unwrap();
        assert_eq!(fill.filled, vec![day("2024-01-11")]);
        assert_eq!(fill.unavailable, vec![day("2024-01-01")]);
        assert_eq!(report.remaining_gaps(), vec![day("2024-01-01")]);
        assert!(report.cube.get(&day("2024-01-11")).unwrap().iter().all(|&v| close(v, 0.5)));
    }

    #[test]
    fn test_run_without_gap_fill() {
        let catalog = MockCatalog::new(Vec::new());
        let fetcher = MockFetcher::new();
        let settings = PipelineSettings {
            max_widening_iterations: 1,
            gap_fill: false,
            ..PipelineSettings::default()
        };
        let report = PipelineContext::new(&catalog, &fetcher)
            .with_settings(settings)
            .run(&aoi(), &TimeInterval::parse("2024-01-01", "2024-01-15").unwrap())
            .unwrap();

        assert!(report.gap_fill.is_none());
        assert_eq!(report.remaining_gaps().len(), 2);
        assert!(fetcher.requests.lock().is_empty());
    }

    #[test]
    fn test_run_rejects_interval_without_targets() {
        let catalog = MockCatalog::new(Vec::new());
        let fetcher = MockFetcher::new();
        let result = PipelineContext::new(&catalog, &fetcher)
            .run(&aoi(), &TimeInterval::parse("2024-01-02", "2024-01-09").unwrap());
        assert!(matches!(
            result,
            Err(PipelineError::Search(SearchError::NoTargets(_)))
        ));
    }

    #[test]
    fn test_fatal_fetch_error_aborts() {
        let t = "2024-01-05T10:00:00Z";
        let catalog = MockCatalog::fixed(vec![Observation::new(day(t), t)]);
        let fetcher = MockFetcher::new().with_default_error(FetchError::Http {
            status: 500,
            message: "boom".to_string(),
        });
        let settings = PipelineSettings {
            max_widening_iterations: 1,
            ..PipelineSettings::default()
        };
        let result = PipelineContext::new(&catalog, &fetcher)
            .with_settings(settings)
            .run(&aoi(), &TimeInterval::parse("2024-01-01", "2024-01-15").unwrap());
        assert!(matches!(result, Err(PipelineError::Fetch(FetchError::Http { .. }))));
    }

    #[test]
    fn test_sinks_receive_cube() {
        let dir = tempfile::tempdir().unwrap();
        let times = ["2023-12-28T10:00:00Z", "2024-01-05T10:00:00Z", "2024-01-14T10:00:00Z"];
        let catalog = MockCatalog::fixed(times.iter().map(|t| Observation::new(day(t), *t)).collect());
        let fetcher = times.iter().fold(MockFetcher::new(), |f, t| {
            f.with_response((day(t), 0), constant(0.5))
        });

        let mut ctx = PipelineContext::new(&catalog, &fetcher);
        ctx.sinks = output_sinks(&OutputSettings::default(), dir.path());
        let report = ctx
            .run(&aoi(), &TimeInterval::parse("2024-01-01", "2024-01-15").unwrap())
            .unwrap();

        // Two GeoTIFFs, one preview, one manifest.
        assert_eq!(report.outputs.len(), 4);
        assert!(dir.path().join("ndvi_2024-01-11.tif").exists());
        assert!(dir.path().join(crate::output::MANIFEST_FILE_NAME).exists());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = ConfigFile::default();
        config.extraction.max_cloud_cover = 30.0;
        config.extraction.widening_step_days = 5;
        config.gapfill.enabled = false;
        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.filter.max_cloud_cover, 30.0);
        assert_eq!(settings.widening_step, Duration::days(5));
        assert!(!settings.gap_fill);
    }
}
