//! Search-window resolution.
//!
//! Interpolating a dekadal target needs at least one acquisition strictly
//! before it and one strictly after. Only the first and last targets can
//! lack support because of the window edges, so the resolver widens the
//! catalog query at whichever edge is unsupported until both are covered or
//! the iteration budget runs out.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::catalog::{unique_by_timestamp, CatalogError, CatalogSearch, Observation, QualityFilter};
use crate::coord::BoundingBox;
use crate::dekad::{format_instant, has_observations_around, TimeInterval};

/// Days added to an unsupported edge per widening step.
pub const WIDENING_STEP_DAYS: i64 = 10;

/// Default cap on catalog queries per resolution (one year per edge).
pub const DEFAULT_MAX_ITERATIONS: u32 = 36;

/// Errors from search-window resolution.
#[derive(Debug, Clone, Error)]
pub enum SearchError {
    #[error("requested interval {0} contains no dekadal target")]
    NoTargets(TimeInterval),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Whether the final window supports both edge targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStatus {
    /// Both edge targets have observations on each side.
    Complete,
    /// The iteration budget ran out first.
    Exhausted { valid_start: bool, valid_end: bool },
}

impl WindowStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, WindowStatus::Complete)
    }
}

/// Outcome of [`SearchWindowResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedWindow {
    /// Interval of the last catalog query.
    pub interval: TimeInterval,
    /// Acquisitions in that interval, time-ordered, one per timestamp.
    pub observations: Vec<Observation>,
    /// Catalog queries performed.
    pub iterations: u32,
    pub status: WindowStatus,
}

impl ResolvedWindow {
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.observations.iter().map(|o| o.timestamp).collect()
    }
}

/// Widens a catalog search until both edge targets are interpolable.
pub struct SearchWindowResolver<C> {
    catalog: C,
    filter: QualityFilter,
    step: Duration,
    max_iterations: u32,
}

impl<C: CatalogSearch> SearchWindowResolver<C> {
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            filter: QualityFilter::default(),
            step: Duration::days(WIDENING_STEP_DAYS),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_filter(mut self, filter: QualityFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Caps the number of catalog queries (minimum 1).
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Resolves the search window for `requested`.
    ///
    /// The edge targets are always those of `requested`, never of the
    /// widened interval.
    pub fn resolve(
        &self,
        bbox: &BoundingBox,
        requested: &TimeInterval,
    ) -> Result<ResolvedWindow, SearchError> {
        let mut targets = requested.targets();
        let first = targets.next().ok_or(SearchError::NoTargets(*requested))?;
        let last = targets.last().unwrap_or(first);

        let mut interval = *requested;
        let mut iterations = 0;

        loop {
            let observations =
                unique_by_timestamp(self.catalog.search(bbox, &interval, &self.filter)?);
            iterations += 1;

            let times: Vec<_> = observations.iter().map(|o| o.timestamp).collect();
            let valid_start = has_observations_around(&times, first);
            let valid_end = has_observations_around(&times, last);

            debug!(
                interval = %interval,
                observations = observations.len(),
                valid_start,
                valid_end,
                "Catalog search"
            );

            if valid_start && valid_end {
                return Ok(ResolvedWindow {
                    interval,
                    observations,
                    iterations,
                    status: WindowStatus::Complete,
                });
            }

            if iterations >= self.max_iterations {
                warn!(
                    interval = %interval,
                    iterations,
                    valid_start,
                    valid_end,
                    "Search window widening exhausted"
                );
                return Ok(ResolvedWindow {
                    interval,
                    observations,
                    iterations,
                    status: WindowStatus::Exhausted {
                        valid_start,
                        valid_end,
                    },
                });
            }

            if !valid_start {
                info!(
                    target_date = %format_instant(first),
                    "Not enough data before the start target date, adjusting search interval"
                );
            }
            if !valid_end {
                info!(
                    target_date = %format_instant(last),
                    "Not enough data after the end target date, adjusting search interval"
                );
            }
            interval = interval.widen(!valid_start, !valid_end, self.step);
            info!(interval = %interval, "Adjusted time interval for search");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::MockCatalog;
    use crate::dekad::parse_instant;

    fn day(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn obs(s: &str) -> Observation {
        Observation::new(parse_instant(s).unwrap(), s)
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(10.0, 45.0, 10.1, 45.1).unwrap()
    }

    #[test]
    fn test_resolves_without_widening() {
        let catalog = MockCatalog::new(vec![
            obs("2025-07-28T10:00:00Z"),
            obs("2025-08-09T10:00:00Z"),
            obs("2025-08-19T10:00:00Z"),
            obs("2025-08-25T10:00:00Z"),
        ]);
        // The requested interval must include 07-28 for the start edge to be
        // valid without widening.
        let requested = TimeInterval::parse("2025-07-25", "2025-08-31").unwrap();
        let resolver = SearchWindowResolver::new(&catalog);
        let window = resolver.resolve(&bbox(), &requested).unwrap();

        assert_eq!(window.status, WindowStatus::Complete);
        assert_eq!(window.iterations, 1);
        assert_eq!(window.interval, requested);
        assert_eq!(window.observations.len(), 4);
    }

    #[test]
    fn test_august_scenario_terminates_immediately() {
        let catalog = MockCatalog::fixed(vec![
            obs("2025-07-28T00:00:00Z"),
            obs("2025-08-09T00:00:00Z"),
            obs("2025-08-19T00:00:00Z"),
            obs("2025-08-25T00:00:00Z"),
        ]);
        let requested = TimeInterval::parse("2025-08-01", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .resolve(&bbox(), &requested)
            .unwrap();

        assert!(window.status.is_complete());
        assert_eq!(window.iterations, 1);
        assert_eq!(window.interval, requested);
    }

    #[test]
    fn test_widens_start_only() {
        let catalog = MockCatalog::new(vec![
            obs("2025-07-28T10:00:00Z"),
            obs("2025-08-09T10:00:00Z"),
            obs("2025-08-25T10:00:00Z"),
        ]);
        let requested = TimeInterval::parse("2025-08-01", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .resolve(&bbox(), &requested)
            .unwrap();

        assert!(window.status.is_complete());
        assert_eq!(window.iterations, 2);
        assert_eq!(window.interval.start(), day("2025-07-22"));
        assert_eq!(window.interval.end(), day("2025-08-31"));

        let queries = catalog.queries.lock();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], requested);
    }

    #[test]
    fn test_widens_both_edges_independently() {
        let catalog = MockCatalog::new(vec![
            obs("2025-07-15T10:00:00Z"),
            obs("2025-08-05T10:00:00Z"),
            obs("2025-09-12T10:00:00Z"),
        ]);
        let requested = TimeInterval::parse("2025-08-01", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .resolve(&bbox(), &requested)
            .unwrap();

        // start: 07-22 (miss), 07-12 (hit); end: 09-10 (miss), 09-20 (hit)
        assert!(window.status.is_complete());
        assert_eq!(window.iterations, 3);
        assert_eq!(window.interval.start(), day("2025-07-12"));
        assert_eq!(window.interval.end(), day("2025-09-20"));
    }

    #[test]
    fn test_edge_targets_come_from_requested_interval() {
        // Last target of the request is 08-21; an observation after it
        // exists only beyond 08-31, reached after one widening.
        let catalog = MockCatalog::new(vec![
            obs("2025-07-30T10:00:00Z"),
            obs("2025-08-15T10:00:00Z"),
            obs("2025-09-05T10:00:00Z"),
        ]);
        let requested = TimeInterval::parse("2025-07-29", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .resolve(&bbox(), &requested)
            .unwrap();

        assert!(window.status.is_complete());
        assert_eq!(window.interval.end(), day("2025-09-10"));
        assert_eq!(window.interval.start(), day("2025-07-29"));
    }

    #[test]
    fn test_exhausted_on_sparse_catalog() {
        let catalog = MockCatalog::new(vec![obs("2025-08-05T10:00:00Z")]);
        let requested = TimeInterval::parse("2025-08-01", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .with_max_iterations(4)
            .resolve(&bbox(), &requested)
            .unwrap();

        assert_eq!(window.iterations, 4);
        assert_eq!(
            window.status,
            WindowStatus::Exhausted {
                valid_start: false,
                valid_end: false
            }
        );
        assert_eq!(window.interval.start(), day("2025-07-02"));
        assert_eq!(window.interval.end(), day("2025-09-30"));
    }

    #[test]
    fn test_no_targets() {
        let catalog = MockCatalog::new(vec![]);
        let requested = TimeInterval::parse("2025-08-02", "2025-08-10").unwrap();
        let result = SearchWindowResolver::new(&catalog).resolve(&bbox(), &requested);
        assert!(matches!(result, Err(SearchError::NoTargets(_))));
        assert!(catalog.queries.lock().is_empty());
    }

    #[test]
    fn test_duplicate_timestamps_collapse() {
        let catalog = MockCatalog::new(vec![
            obs("2025-07-28T10:00:00Z"),
            obs("2025-07-28T10:00:00Z"),
            obs("2025-08-25T10:00:00Z"),
        ]);
        let requested = TimeInterval::parse("2025-07-25", "2025-08-31").unwrap();
        let window = SearchWindowResolver::new(&catalog)
            .resolve(&bbox(), &requested)
            .unwrap();
        assert_eq!(window.observations.len(), 2);
    }
}
