//! Run command - build the dekadal NDVI cube for an AOI.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use ndvicube::aoi::load_aoi;
use ndvicube::dekad::TimeInterval;
use ndvicube::pipeline::output_sinks;
use ndvicube::provider::{SentinelHubCatalog, SentinelHubProcess};
use ndvicube::{PipelineContext, PipelineReport, PipelineSettings};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Arguments for the run command.
pub struct RunArgs {
    pub aoi: PathBuf,
    pub start: String,
    pub end: String,
    pub output: Option<PathBuf>,
    pub no_gap_fill: bool,
    pub max_cloud_cover: Option<f64>,
    pub threads: Option<usize>,
}

/// Run the run command.
pub fn run(args: RunArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("run");
    let config = runner.config();

    let aoi = load_aoi(&args.aoi)?;
    let requested = TimeInterval::parse(&args.start, &args.end)?;
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| config.output.directory.clone());

    let mut settings = PipelineSettings::from_config(config);
    if args.no_gap_fill {
        settings.gap_fill = false;
    }
    if let Some(cc) = args.max_cloud_cover {
        settings.filter.max_cloud_cover = cc;
    }
    if let Some(threads) = args.threads {
        settings.max_threads = threads.max(1);
    }

    println!("ndvicube v{}", ndvicube::VERSION);
    println!("==============");
    println!();
    println!("AOI:       {} ({})", args.aoi.display(), aoi.bbox());
    println!("Interval:  {}", requested);
    println!("Output:    {}", output_dir.display());
    println!(
        "Gap fill:  {}",
        if settings.gap_fill { "enabled" } else { "disabled" }
    );
    println!();

    let session = runner.session()?;
    let catalog = SentinelHubCatalog::new(Arc::clone(&session));
    let process = SentinelHubProcess::new(session);

    let bar = progress_bar();
    let bar_handle = bar.clone();
    let on_progress = move |done: usize, total: usize| {
        bar_handle.set_length(total as u64);
        bar_handle.set_position(done as u64);
    };

    let mut ctx = PipelineContext::new(catalog, process)
        .with_settings(settings)
        .with_progress(&on_progress);
    ctx.sinks = output_sinks(&config.output, &output_dir);

    let result = ctx.run(&aoi, &requested);
    bar.finish_and_clear();
    let report = result?;

    print_summary(&report);
    Ok(())
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} rasters ({eta})",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    bar.set_style(style);
    bar
}

fn print_summary(report: &PipelineReport) {
    println!("Run Summary");
    println!("───────────");
    println!("  Search window: {}", report.window);
    if !report.window_status.is_complete() {
        println!(
            "  Warning: window widening stopped after {} queries before both edge targets were supported",
            report.iterations
        );
    }
    println!("  Observations:  {}", report.observations.len());
    println!("  Dekads:        {}", report.targets.len());
    println!("  Gaps:          {}", report.gaps.len());
    if let Some(fill) = &report.gap_fill {
        println!("  Filled:        {}", fill.filled.len());
    }
    let remaining = report.remaining_gaps();
    if !remaining.is_empty() {
        let dates: Vec<String> = remaining
            .iter()
            .map(|t| t.format("%Y-%m-%d").to_string())
            .collect();
        println!("  Still missing: {}", dates.join(", "));
    }
    println!();
    for path in &report.outputs {
        println!("  wrote {}", path.display());
    }
}
