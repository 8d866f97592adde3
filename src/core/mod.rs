//! Core modules of the catchment engine
//!
//! Geometry and statistics are synchronous and provider-agnostic; `oracle` is the
//! only module that talks to the network, and `analysis` composes everything into
//! the per-origin work of each pipeline stage.

pub mod analysis;
pub mod config;
pub mod corridor;
pub mod directness;
pub mod error;
pub mod geodesy;
pub mod geojson;
pub mod hull;
pub mod oracle;
pub mod pipeline;
pub mod pois;
pub mod radial;
pub mod reachable;
pub mod records;
pub mod sampler;
pub mod source;
pub mod statistics;
pub mod stream;

// Re-export main types for internal use
pub use analysis::Analyzer;
pub use config::AnalysisConfig;
pub use error::{GeometryError, SkipReason};
pub use oracle::{OsrmClient, OsrmConfig, TravelTimeOracle};
pub use pipeline::{Outcome, StageCounts, StageOptions};
