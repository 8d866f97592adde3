//! Failure types for the catchment engine
//!
//! Geometry failures are typed so a stage can decide whether they cost one
//! corridor, one derived field or the whole origin. `SkipReason` is what a stage
//! reports instead of a record.

use std::fmt;

use catchment_common::Error;
use log::{debug, warn};

/// Geometric degeneracy in hull or union construction
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("need at least 3 distinct points to build a hull, got {0}")]
    TooFewPoints(usize),

    #[error("points are collinear, the hull would have no area")]
    Degenerate,

    #[error("polygon union failed: {0}")]
    UnionFailed(String),

    #[error("no route was long enough to build a corridor")]
    EmptyFootprint,
}

/// Why an origin (or one of its records) produced no output
#[derive(Debug)]
pub enum SkipReason {
    /// Postcode does not match the configured aggregation granularity
    PostcodeLength { postcode: String, expected: usize },

    /// The routing provider failed or answered with garbage
    Provider(Error),

    /// Hull or corridor construction failed
    Geometry(GeometryError),

    /// The sampler produced no candidate destinations
    NoSamples,

    /// Nothing to analyze: no routes in the record, or every route request failed
    NoRoutes,

    /// No usable address lies inside the hexagon
    NoAddress,

    /// The feature belongs to no point-of-interest category
    NoCategory,

    /// Record parsed but is missing what this stage needs
    InvalidRecord(String),

    /// A worker task died before producing a result
    Internal(String),
}

impl SkipReason {
    /// Log the skip at a level matching its cause
    ///
    /// Configuration mismatches are expected in bulk and stay at debug level.
    pub fn log(&self, postcode: &str) {
        match self {
            SkipReason::PostcodeLength { .. } | SkipReason::NoAddress | SkipReason::NoCategory => {
                debug!("Skipping {postcode}: {self}")
            }
            _ => warn!("Skipping {postcode}: {self}"),
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::PostcodeLength { postcode, expected } => write!(
                f,
                "postcode '{postcode}' has {} characters, expected {expected}",
                postcode.chars().count()
            ),
            SkipReason::Provider(err) => write!(f, "routing provider: {err}"),
            SkipReason::Geometry(err) => write!(f, "geometry: {err}"),
            SkipReason::NoSamples => write!(f, "sampler produced no destinations"),
            SkipReason::NoRoutes => write!(f, "no routes to analyze"),
            SkipReason::NoAddress => write!(f, "no numbered address inside"),
            SkipReason::NoCategory => write!(f, "not a point of interest"),
            SkipReason::InvalidRecord(msg) => write!(f, "invalid record: {msg}"),
            SkipReason::Internal(msg) => write!(f, "internal failure: {msg}"),
        }
    }
}

impl From<GeometryError> for SkipReason {
    fn from(err: GeometryError) -> Self {
        SkipReason::Geometry(err)
    }
}

impl From<Error> for SkipReason {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRecord(msg) => SkipReason::InvalidRecord(msg),
            other => SkipReason::Provider(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postcode_length_message() {
        let reason = SkipReason::PostcodeLength {
            postcode: "1012".to_string(),
            expected: 6,
        };
        assert_eq!(
            reason.to_string(),
            "postcode '1012' has 4 characters, expected 6"
        );
    }

    #[test]
    fn test_invalid_record_error_maps_to_invalid_record_reason() {
        let reason: SkipReason = Error::InvalidRecord("origin is a Polygon".to_string()).into();
        assert!(matches!(reason, SkipReason::InvalidRecord(_)));

        let reason: SkipReason = Error::HttpError("503".to_string()).into();
        assert!(matches!(reason, SkipReason::Provider(_)));
    }
}
