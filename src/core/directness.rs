//! Route directness: distance ratios, reach per direction and redundancy
//!
//! The distance ratio of a route is its walked length over the straight-line
//! distance between its ends; 1 is a perfectly straight path. Routes are also
//! bucketed by the bearing from start to end into `segment_count` sectors, with
//! sector 0 centred on north.

use geo::Coord;
use serde::{Deserialize, Serialize};

use super::geodesy;
use super::statistics;

/// Node ids a route passes through, used to spot sub-paths
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathSignature(pub Vec<u64>);

impl PathSignature {
    /// `other` is strictly longer and starts with all of `self`
    pub fn is_proper_prefix_of(&self, other: &PathSignature) -> bool {
        other.0.len() > self.0.len() && other.0.starts_with(&self.0)
    }
}

/// Indices of routes that are not a proper prefix of another route
pub fn non_redundant_indices(signatures: &[PathSignature]) -> Vec<usize> {
    signatures
        .iter()
        .enumerate()
        .filter(|(_, signature)| !signatures.iter().any(|other| signature.is_proper_prefix_of(other)))
        .map(|(index, _)| index)
        .collect()
}

/// Sector of `bearing` when 360° is split into `segment_count` sectors
/// centred on multiples of `360 / segment_count`
pub fn segment_index(bearing: f64, segment_count: usize) -> usize {
    let width = 360.0 / segment_count as f64;
    let shifted = (bearing + width / 2.0).rem_euclid(360.0);
    (shifted / width).floor() as usize % segment_count
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteMetrics {
    /// Geodesic path length in meters
    pub length: f64,
    /// Geodesic distance between the first and last coordinate
    pub straight_line: f64,
    /// Compass bearing from first to last coordinate
    pub bearing: f64,
}

impl RouteMetrics {
    pub fn measure(route: &[Coord]) -> Option<Self> {
        let (first, last) = (*route.first()?, *route.last()?);
        Some(Self {
            length: geodesy::path_length(route),
            straight_line: geodesy::distance(first, last),
            bearing: geodesy::bearing(first, last),
        })
    }

    /// Length over straight-line distance, rounded to 6 decimals.
    /// `None` for routes that end where they start.
    pub fn distance_ratio(&self) -> Option<f64> {
        (self.straight_line > 0.0)
            .then(|| geodesy::round_decimals(self.length / self.straight_line, 6))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectnessStats {
    pub distance_ratios_mean: f64,
    pub distance_ratios_std_dev: f64,
    pub distance_ratios_iqr: f64,
    pub weighted_distance_ratio: f64,
    pub lengths_mean: f64,
    pub lengths_std_dev: f64,
    /// Over provider-reported distances, absent when there are none
    pub distances_mean: Option<f64>,
    pub distances_std_dev: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteAnalysis {
    /// Furthest straight-line reach per sector, meters
    pub max_distance_per_segment: Vec<u64>,
    pub stats: DirectnessStats,
}

#[derive(Debug, Clone, Copy)]
pub struct DirectnessAnalyzer {
    segment_count: usize,
}

impl DirectnessAnalyzer {
    pub fn new(segment_count: usize) -> Self {
        Self {
            segment_count: segment_count.max(1),
        }
    }

    /// Analyze the routes of one origin
    ///
    /// `distances` are the provider's route distances. Returns `None` when no
    /// route yields a distance ratio.
    pub fn analyze(&self, routes: &[Vec<Coord>], distances: &[f64]) -> Option<RouteAnalysis> {
        let metrics: Vec<RouteMetrics> = routes
            .iter()
            .filter(|route| route.len() >= 2)
            .filter_map(|route| RouteMetrics::measure(route))
            .collect();

        let mut max_distance_per_segment = vec![0u64; self.segment_count];
        for m in &metrics {
            let bucket = &mut max_distance_per_segment[segment_index(m.bearing, self.segment_count)];
            *bucket = (*bucket).max(m.straight_line.round() as u64);
        }

        let lengths: Vec<f64> = metrics.iter().map(|m| m.length.round()).collect();
        let (ratios, ratio_lengths): (Vec<f64>, Vec<f64>) = metrics
            .iter()
            .zip(&lengths)
            .filter_map(|(m, length)| m.distance_ratio().map(|r| (r, *length)))
            .unzip();

        let distance_ratios_mean = statistics::mean(&ratios)?;
        let stats = DirectnessStats {
            distance_ratios_mean,
            distance_ratios_std_dev: statistics::std_dev(&ratios)?,
            distance_ratios_iqr: statistics::interquartile_range(&ratios)?,
            weighted_distance_ratio: statistics::weighted_mean(&ratios, &ratio_lengths)
                .unwrap_or(distance_ratios_mean),
            lengths_mean: statistics::mean(&lengths)?,
            lengths_std_dev: statistics::std_dev(&lengths)?,
            distances_mean: statistics::mean(distances),
            distances_std_dev: statistics::std_dev(distances),
        };

        Some(RouteAnalysis {
            max_distance_per_segment,
            stats,
        })
    }
}
