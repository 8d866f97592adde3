//! Filtering raw travel-time answers down to the reachable set

use geo::Coord;
use log::debug;

use super::geodesy;
use super::oracle::TableEntry;
use super::sampler::SamplePoint;

/// A sampled destination that passed the duration and snap checks
#[derive(Debug, Clone, PartialEq)]
pub struct ReachablePoint {
    /// Index into the sample grid that produced this point
    pub sample_index: usize,
    /// Snapped location reported by the provider
    pub location: Coord,
    /// Whole seconds
    pub duration: u32,
}

/// Reachable points, furthest-in-time first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReachableSet {
    pub points: Vec<ReachablePoint>,
}

impl ReachableSet {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn locations(&self) -> Vec<Coord> {
        self.points.iter().map(|p| p.location).collect()
    }

    pub fn durations(&self) -> Vec<u32> {
        self.points.iter().map(|p| p.duration).collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReachabilityFilter {
    /// Travel-time budget in seconds
    pub budget_seconds: f64,
    /// Largest accepted gap between sample and snapped location, in meters.
    /// `None` disables the check.
    pub snap_threshold: Option<f64>,
}

impl ReachabilityFilter {
    /// Pair `entries` with the samples they answer and keep the reachable ones
    pub fn apply(&self, samples: &[SamplePoint], entries: &[TableEntry]) -> ReachableSet {
        let mut snapped_away = 0usize;
        let mut points: Vec<ReachablePoint> = samples
            .iter()
            .zip(entries)
            .enumerate()
            .filter_map(|(sample_index, (sample, entry))| {
                // whole seconds are what gets emitted, so they are what gets filtered
                let duration = entry.duration.filter(|d| d.is_finite())?.round();
                if duration <= 0.0 || duration > self.budget_seconds {
                    return None;
                }
                if let Some(threshold) = self.snap_threshold {
                    if geodesy::distance(sample.location, entry.location) > threshold {
                        snapped_away += 1;
                        return None;
                    }
                }
                Some(ReachablePoint {
                    sample_index,
                    location: entry.location,
                    duration: duration as u32,
                })
            })
            .collect();

        if snapped_away > 0 {
            debug!("{snapped_away} samples snapped further than the threshold");
        }

        points.sort_by(|a, b| b.duration.cmp(&a.duration));
        ReachableSet { points }
    }
}
