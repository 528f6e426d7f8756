//! Targets command - list the dekadal targets of an interval.

use ndvicube::dekad::TimeInterval;

use crate::error::CliError;

/// Run the targets command.
pub fn run(start: &str, end: &str) -> Result<(), CliError> {
    let interval = TimeInterval::parse(start, end)?;
    let dates = target_dates(&interval);

    if dates.is_empty() {
        println!("No dekadal targets in {}", interval);
        return Ok(());
    }
    for date in &dates {
        println!("{}", date);
    }
    println!();
    println!("{} targets", dates.len());
    Ok(())
}

fn target_dates(interval: &TimeInterval) -> Vec<String> {
    interval
        .targets()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .collect()
}
