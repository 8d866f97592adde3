//! Analysis parameters shared by every stage

use std::time::Duration;

use catchment_common::{Error, Result};

use super::corridor::CorridorConfig;
use super::hull::HullConfig;
use super::reachable::ReachabilityFilter;

/// How candidate destinations are laid out around an origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SamplingKind {
    /// Hexagon centers
    #[default]
    Hex,
    /// Square point grid within a disc
    Point,
    /// Point grid within the polygon spanned by the radial endpoints
    Radial,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Travel-time budget
    pub minutes: f64,
    /// km/h
    pub speed_kmh: f64,
    /// Sample spacing and corridor radius, meters
    pub grid_resolution: f64,
    pub concavity: f64,
    /// Meters
    pub length_threshold: f64,
    pub segment_count: usize,
    pub radials: usize,
    pub postcode_length: usize,
    /// Meters, `None` disables the snap check
    pub snap_threshold: Option<f64>,
    pub sampling: SamplingKind,
    /// Meters
    pub simplify_tolerance: f64,
    /// Pause after each table call and after each origin's route batch
    pub request_delay: Duration,
    /// Pause after each route call
    pub route_delay: Duration,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            minutes: 15.0,
            speed_kmh: 5.0,
            grid_resolution: 100.0,
            concavity: 0.5,
            length_threshold: 50.0,
            segment_count: 8,
            radials: 16,
            postcode_length: 6,
            snap_threshold: Some(100.0),
            sampling: SamplingKind::Hex,
            simplify_tolerance: 10.0,
            request_delay: Duration::from_millis(100),
            route_delay: Duration::from_millis(10),
        }
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!("{name} must be positive, got {value}")))
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        positive("minutes", self.minutes)?;
        positive("speed", self.speed_kmh)?;
        positive("grid resolution", self.grid_resolution)?;

        if !(self.concavity.is_finite() && self.concavity >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "concavity must be zero or positive, got {}",
                self.concavity
            )));
        }
        if !(self.length_threshold.is_finite() && self.length_threshold >= 0.0) {
            return Err(Error::InvalidInput(format!(
                "length threshold must be zero or positive, got {}",
                self.length_threshold
            )));
        }
        if self.segment_count == 0 {
            return Err(Error::InvalidInput("segment count must be at least 1".to_string()));
        }
        if self.radials < 3 {
            return Err(Error::InvalidInput(format!(
                "need at least 3 radials, got {}",
                self.radials
            )));
        }
        validate_postcode_length(self.postcode_length)?;
        if let Some(threshold) = self.snap_threshold {
            positive("snap threshold", threshold)?;
        }
        Ok(())
    }

    /// Meters covered at `speed_kmh` in `minutes`
    pub fn max_distance(&self) -> f64 {
        self.minutes / 60.0 * self.speed_kmh * 1000.0
    }

    pub fn budget_seconds(&self) -> f64 {
        self.minutes * 60.0
    }

    pub fn hull_config(&self) -> HullConfig {
        HullConfig {
            concavity: self.concavity,
            length_threshold: self.length_threshold,
            densify_step: self.grid_resolution,
        }
    }

    pub fn corridor_config(&self) -> CorridorConfig {
        CorridorConfig {
            resolution: self.grid_resolution,
            simplify_tolerance: self.simplify_tolerance,
            ..Default::default()
        }
    }

    pub fn reachability_filter(&self) -> ReachabilityFilter {
        ReachabilityFilter {
            budget_seconds: self.budget_seconds(),
            snap_threshold: self.snap_threshold,
        }
    }
}

/// Postcodes are grouped on their first 4, 5 or 6 characters
pub fn validate_postcode_length(length: usize) -> Result<()> {
    if (4..=6).contains(&length) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "postcode length must be 4, 5 or 6, got {length}"
        )))
    }
}
