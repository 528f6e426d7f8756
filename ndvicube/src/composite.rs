//! Temporal compositing onto dekadal targets.
//!
//! For every target the observations strictly between it and its neighbours
//! are reduced with a maximum-value composite (MVC) on each side. The
//! resulting support points, stamped one day either side of the target, are
//! then linearly interpolated back onto the targets.

use std::ops::Bound;

use chrono::{DateTime, Duration, Utc};
use ndarray::{Array2, Zip};
use tracing::{debug, info};

use crate::cube::{CubeError, RasterCube};
use crate::dekad::format_instant;

/// Exclusive window bounds around one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetWindows {
    pub target: DateTime<Utc>,
    pub left: (Bound<DateTime<Utc>>, Bound<DateTime<Utc>>),
    pub right: (Bound<DateTime<Utc>>, Bound<DateTime<Utc>>),
}

/// Compositing windows for an ordered target series.
///
/// The left window runs from the previous target (or unbounded for the
/// first) to the target, the right window from the target to the next one
/// (or unbounded for the last). All bounds are exclusive.
pub fn target_windows(targets: &[DateTime<Utc>]) -> Vec<TargetWindows> {
    targets
        .iter()
        .enumerate()
        .map(|(i, &target)| {
            let prev = i
                .checked_sub(1)
                .map_or(Bound::Unbounded, |p| Bound::Excluded(targets[p]));
            let next = targets
                .get(i + 1)
                .map_or(Bound::Unbounded, |&n| Bound::Excluded(n));
            TargetWindows {
                target,
                left: (prev, Bound::Excluded(target)),
                right: (Bound::Excluded(target), next),
            }
        })
        .collect()
}

/// Pixel-wise maximum ignoring NaN. A pixel that is NaN in every slice stays
/// NaN. Returns `None` when there are no slices.
pub fn max_value_composite<'a>(mut slices: impl Iterator<Item = &'a Array2<f32>>) -> Option<Array2<f32>> {
    let mut acc = slices.next()?.clone();
    for slice in slices {
        Zip::from(&mut acc).and(slice).for_each(|a, &v| {
            if v.is_nan() {
                return;
            }
            if a.is_nan() || v > *a {
                *a = v;
            }
        });
    }
    Some(acc)
}

/// Builds the support series: one MVC slice per non-empty window, stamped at
/// target − 1 day (left) and target + 1 day (right).
pub fn support_series(
    observations: &RasterCube,
    targets: &[DateTime<Utc>],
) -> Result<RasterCube, CubeError> {
    let mut support = RasterCube::new(observations.bounds(), observations.shape());
    let one_day = Duration::days(1);

    for windows in target_windows(targets) {
        let left = max_value_composite(
            observations
                .window(windows.left.0, windows.left.1)
                .map(|(_, s)| s),
        );
        let right = max_value_composite(
            observations
                .window(windows.right.0, windows.right.1)
                .map(|(_, s)| s),
        );

        debug!(
            target_date = %format_instant(windows.target),
            left = left.is_some(),
            right = right.is_some(),
            "Composited target windows"
        );

        if let Some(slice) = left {
            support.insert(windows.target - one_day, slice)?;
        }
        if let Some(slice) = right {
            support.insert(windows.target + one_day, slice)?;
        }
    }
    Ok(support)
}

/// Samples the support series at `t` by piecewise-linear interpolation.
///
/// An exact timestamp match copies the support slice. Instants outside the
/// support range, or an empty support series, yield an all-NaN slice. NaN in
/// either neighbour makes the interpolated pixel NaN.
pub fn interpolate_at(support: &RasterCube, t: DateTime<Utc>) -> Array2<f32> {
    if let Some(slice) = support.get(&t) {
        return slice.clone();
    }

    let before = support
        .window(Bound::Unbounded, Bound::Excluded(t))
        .next_back();
    let after = support.window(Bound::Excluded(t), Bound::Unbounded).next();

    match (before, after) {
        (Some((&t0, y0)), Some((&t1, y1))) => {
            let span = (t1 - t0).num_milliseconds() as f64;
            let w = ((t - t0).num_milliseconds() as f64 / span) as f32;
            let mut out = y0.clone();
            Zip::from(&mut out)
                .and(y1)
                .for_each(|a, &b| *a += (b - *a) * w);
            out
        }
        _ => Array2::from_elem(support.shape(), f32::NAN),
    }
}

/// Result of compositing.
#[derive(Debug, Clone)]
pub struct Composite {
    /// Exactly one slice per target.
    pub cube: RasterCube,
    /// Targets whose slice has no valid pixel.
    pub gaps: Vec<DateTime<Utc>>,
}

/// Composites an observation cube onto dekadal targets.
pub fn composite(
    observations: &RasterCube,
    targets: &[DateTime<Utc>],
) -> Result<Composite, CubeError> {
    let support = support_series(observations, targets)?;
    let mut cube = RasterCube::new(observations.bounds(), observations.shape());
    for &t in targets {
        cube.insert(t, interpolate_at(&support, t))?;
    }

    let gaps = cube.empty_slices();
    info!(
        targets = targets.len(),
        support = support.len(),
        gaps = gaps.len(),
        "Composited dekadal series"
    );
    Ok(Composite { cube, gaps })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::BoundingBox;
    use crate::dekad::{dekadal_targets, parse_instant};
    use ndarray::array;

    fn day(s: &str) -> DateTime<Utc> {
        parse_instant(s).unwrap()
    }

    fn cube() -> RasterCube {
        RasterCube::new(BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap(), (1, 2))
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_windows_first_middle_last() {
        let targets = vec![day("2024-01-01"), day("2024-01-11"), day("2024-01-21")];
        let windows = target_windows(&targets);

        assert_eq!(windows[0].left, (Bound::Unbounded, Bound::Excluded(targets[0])));
        assert_eq!(
            windows[0].right,
            (Bound::Excluded(targets[0]), Bound::Excluded(targets[1]))
        );
        assert_eq!(
            windows[1].left,
            (Bound::Excluded(targets[0]), Bound::Excluded(targets[1]))
        );
        assert_eq!(windows[2].right, (Bound::Excluded(targets[2]), Bound::Unbounded));
    }

    #[test]
    fn test_windows_single_target() {
        let t = day("2024-01-11");
        let windows = target_windows(&[t]);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].left, (Bound::Unbounded, Bound::Excluded(t)));
        assert_eq!(windows[0].right, (Bound::Excluded(t), Bound::Unbounded));
    }

    #[test]
    fn test_mvc_ignores_nan() {
        let a = array![[0.2, f32::NAN, f32::NAN]];
        let b = array![[0.1, 0.5, f32::NAN]];
        let mvc = max_value_composite([&a, &b].into_iter()).unwrap();
        assert_eq!(mvc[[0, 0]], 0.2);
        assert_eq!(mvc[[0, 1]], 0.5);
        assert!(mvc[[0, 2]].is_nan());
        assert!(max_value_composite(std::iter::empty()).is_none());
    }

    #[test]
    fn test_interpolation_weights_by_distance() {
        let mut support = cube();
        let t = day("2024-01-11");
        support
            .insert(t - Duration::days(4), array![[1.0, 0.0]])
            .unwrap();
        support
            .insert(t + Duration::days(6), array![[0.0, 1.0]])
            .unwrap();

        let out = interpolate_at(&support, t);
        assert!(close(out[[0, 0]], 0.6));
        assert!(close(out[[0, 1]], 0.4));
    }

    #[test]
    fn test_interpolation_exact_hit_and_out_of_range() {
        let mut support = cube();
        support.insert(day("2024-01-10"), array![[0.3, 0.4]]).unwrap();
        support.insert(day("2024-01-12"), array![[0.5, f32::NAN]]).unwrap();

        assert_eq!(interpolate_at(&support, day("2024-01-10")), array![[0.3, 0.4]]);
        let mid = interpolate_at(&support, day("2024-01-11"));
        assert!(close(mid[[0, 0]], 0.4));
        assert!(mid[[0, 1]].is_nan());
        assert!(interpolate_at(&support, day("2024-01-09"))
            .iter()
            .all(|v| v.is_nan()));
        assert!(interpolate_at(&support, day("2024-01-13"))
            .iter()
            .all(|v| v.is_nan()));
    }

    #[test]
    fn test_composite_one_slice_per_target() {
        let mut obs = cube();
        obs.insert(day("2023-12-28T10:00:00Z"), array![[0.2, 0.3]]).unwrap();
        obs.insert(day("2024-01-05T10:00:00Z"), array![[0.4, 0.1]]).unwrap();
        obs.insert(day("2024-01-08T10:00:00Z"), array![[0.3, 0.6]]).unwrap();
        obs.insert(day("2024-01-25T10:00:00Z"), array![[0.5, 0.5]]).unwrap();

        let targets: Vec<_> = dekadal_targets(day("2024-01-01"), day("2024-01-21")).collect();
        let result = composite(&obs, &targets).unwrap();

        assert_eq!(result.cube.len(), targets.len());
        assert_eq!(result.cube.timestamps().collect::<Vec<_>>(), targets);
        assert!(result.gaps.is_empty());

        // Target 01-01: left MVC (12-28) at 12-31, right MVC (01-05, 01-08)
        // at 01-02, equidistant.
        let first = result.cube.get(&targets[0]).unwrap();
        assert!(close(first[[0, 0]], 0.3));
        assert!(close(first[[0, 1]], 0.45));
    }

    #[test]
    fn test_missing_support_poisons_neighbouring_targets() {
        let mut obs = cube();
        obs.insert(day("2023-12-28T10:00:00Z"), array![[0.2, 0.3]]).unwrap();
        obs.insert(day("2024-01-06T10:00:00Z"), array![[f32::NAN, f32::NAN]])
            .unwrap();
        obs.insert(day("2024-01-15T10:00:00Z"), array![[f32::NAN, f32::NAN]])
            .unwrap();
        obs.insert(day("2024-01-25T10:00:00Z"), array![[0.5, 0.5]]).unwrap();

        // Every target has an all-NaN support point on one side.
        let targets = vec![day("2024-01-01"), day("2024-01-11"), day("2024-01-21")];
        let result = composite(&obs, &targets).unwrap();
        assert_eq!(result.gaps, targets);
        assert_eq!(result.cube.len(), 3);
    }

    #[test]
    fn test_empty_windows_interpolate_across_series() {
        let mut obs = cube();
        obs.insert(day("2023-12-28T10:00:00Z"), array![[0.2, 0.2]]).unwrap();
        obs.insert(day("2024-01-25T10:00:00Z"), array![[0.6, f32::NAN]])
            .unwrap();

        // 01-11 has no observation on either side, but the support points at
        // 12-31 and 01-22 still bracket it.
        let targets = vec![day("2024-01-01"), day("2024-01-11"), day("2024-01-21")];
        let result = composite(&obs, &targets).unwrap();
        let middle = result.cube.get(&day("2024-01-11")).unwrap();
        assert!(close(middle[[0, 0]], 0.2 + 0.4 * 11.0 / 22.0));
        assert!(middle[[0, 1]].is_nan());
        assert!(result.gaps.is_empty());
    }

    #[test]
    fn test_no_observations_every_target_is_gap() {
        let targets = vec![day("2024-01-01"), day("2024-01-11")];
        let result = composite(&cube(), &targets).unwrap();
        assert_eq!(result.cube.len(), 2);
        assert_eq!(result.gaps, targets);
    }

    #[test]
    fn test_observation_at_target_is_ignored() {
        let mut obs = cube();
        obs.insert(day("2024-01-11"), array![[0.9, 0.9]]).unwrap();
        let support = support_series(&obs, &[day("2024-01-11")]).unwrap();
        assert!(support.is_empty());
    }
}
