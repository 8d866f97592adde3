//! # Catchment
//!
//! Pedestrian catchment areas and route directness for postal areas, computed
//! against an OSRM routing service.
//!
//! The work is split into pipeline stages that each read one kind of NDJSON
//! record and write another:
//!
//! ```text
//! addresses -> origins -> reachability -> routes -> analyze -> prepare
//!                      |-> radial
//!                      \-> direct
//! hexgrid -> hexagon-origins -> reachability ...
//! features -> pois
//! ```
//!
//! ## Features
//!
//! - **Sampling**: hexagon, square or radial candidate grids around an origin
//! - **Reachability**: one OSRM table request per origin, filtered on budget and snapping
//! - **Serviced area**: route corridors merged and wrapped in a concave hull
//! - **Directness**: route length against straight-line distance, per bearing segment
//! - **Origins**: one address per postal area or per hexagon of a grid
//! - **Points of interest**: shops, public transport stops and schools from tagged features
//! - **Streaming**: bounded concurrency over NDJSON input, backpressure included
//!
//! ## Example
//!
//! ```rust,no_run
//! use catchment::{AnalysisConfig, Analyzer, OsrmClient, OsrmConfig, Outcome};
//! use catchment::records::OriginRecord;
//!
//! # async fn example(origin: OriginRecord) -> catchment::Result<()> {
//! let client = OsrmClient::new(OsrmConfig::default())?;
//! let analyzer = Analyzer::new(client, AnalysisConfig::default());
//!
//! if let Outcome::Emit(record) = analyzer.reachability(origin).await {
//!     println!("{} reachable locations", record.durations.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use catchment_common::{Error, Result};

pub use crate::core::{
    analysis, config, corridor, directness, geodesy, geojson, hull, oracle, pipeline, pois,
    radial, reachable, records, sampler, source, statistics, stream,
};
pub use crate::core::{
    AnalysisConfig, Analyzer, GeometryError, OsrmClient, OsrmConfig, Outcome, SkipReason,
    StageCounts, StageOptions, TravelTimeOracle,
};
