//! # Catchment CLI
//!
//! One subcommand per pipeline stage. Each stage reads NDJSON records from stdin
//! and writes NDJSON records to stdout; logs and progress go to stderr.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use geo::{Coord, Rect};
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use catchment::analysis::{analyze_blocking, hexagons, prepare, PrepareOptions};
use catchment::config::SamplingKind;
use catchment::pipeline::{run_stage, write_all};
use catchment::pois::classify;
use catchment::records::{
    AddressRecord, AnalysisRecord, FeatureRecord, HexagonRecord, OriginRecord, ReachabilityRecord, RoutesRecord,
};
use catchment::source::{aggregate_origins, load_boundary, AddressIndex};
use catchment::stream::read_all;
use catchment::{AnalysisConfig, Analyzer, OsrmClient, OsrmConfig, Outcome, SkipReason, StageOptions};

mod cli;

use cli::ProgressTracker;

/// Command-line interface for catchment
#[derive(Parser)]
#[command(name = "catchment")]
#[command(about = "Walking catchment areas and route directness from an OSRM routing service")]
#[command(long_about = "Computes catchment areas and route directness per postal area:
  catchment origins --addresses addresses.ndjson > origins.ndjson
  catchment reachability < origins.ndjson > reachability.ndjson
  catchment routes < reachability.ndjson > routes.ndjson
  catchment analyze < routes.ndjson > analysis.ndjson
  catchment prepare < analysis.ndjson > prepared.ndjson

Radial showcase routes and direct radial routes:
  catchment radial < origins.ndjson > radial.ndjson
  catchment direct < origins.ndjson > direct.ndjson

Origins per hexagon instead of per postal area:
  catchment hexgrid --bbox 4.73,52.27,5.07,52.43 > hexagons.ndjson
  catchment hexagon-origins --addresses addresses.ndjson < hexagons.ndjson > origins.ndjson

Points of interest:
  catchment pois < features.ndjson > pois.ndjson

Every stage reads NDJSON from stdin and writes NDJSON to stdout.
Set RUST_LOG to control log output on stderr.")]
#[command(version = env!("CATCHMENT_VERSION"))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Pick one origin address per postal area
    Origins {
        /// Address NDJSON file, or "-" for stdin
        #[arg(long, default_value = "-")]
        addresses: String,

        /// Postcode characters that make up a postal area (4, 5 or 6)
        #[arg(long, env = "POSTCODE_LENGTH", default_value_t = 6)]
        postcode_length: usize,

        /// GeoJSON polygon restricting the addresses
        #[arg(long)]
        intersects: Option<PathBuf>,
    },

    /// Locations reachable from each origin within the time budget
    Reachability {
        /// Layout of the candidate destinations
        #[arg(long, value_enum, default_value_t = SamplingKind::Hex)]
        mode: SamplingKind,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Routes from each origin to its reachable locations
    Routes {
        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Serviced area and directness statistics of each origin's routes
    Analyze {
        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Concave hull and showcase routes along evenly spaced bearings
    Radial {
        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Routes along evenly spaced bearings and how far each ends from its aim
    Direct {
        #[command(flatten)]
        analysis: AnalysisArgs,

        #[command(flatten)]
        provider: ProviderArgs,
    },

    /// Hexagon polygons covering a bounding box
    Hexgrid {
        /// minLon,minLat,maxLon,maxLat
        #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Rect<f64>,

        /// Hexagon side in meters
        #[arg(long, default_value_t = 1000.0)]
        hex_size: f64,
    },

    /// Pick the numbered address nearest the center of each hexagon
    HexagonOrigins {
        /// Address NDJSON file
        #[arg(long)]
        addresses: PathBuf,

        /// Hexagons processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Shops, public transport stops and schools from tagged features
    Pois {
        /// Features processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Simplify analysis records and cut routes into chunks for display
    Prepare {
        /// Chunk length in meters
        #[arg(long, default_value_t = 250.0)]
        chunk_length: f64,

        /// Simplification tolerance in degrees
        #[arg(long, default_value_t = 0.00005)]
        simplify_tolerance: f64,

        /// Records processed at the same time
        #[arg(long)]
        concurrency: Option<usize>,
    },
}

/// Tuning parameters shared by the analysis stages
#[derive(Args, Debug)]
struct AnalysisArgs {
    /// Travel-time budget in minutes
    #[arg(long, env = "MINUTES", default_value_t = 15.0)]
    minutes: f64,

    /// Travel speed in km/h
    #[arg(long, env = "SPEED", default_value_t = 5.0)]
    speed: f64,

    /// Sample spacing and corridor radius in meters
    #[arg(long, env = "GRID_RESOLUTION", default_value_t = 100.0)]
    grid_resolution: f64,

    /// Concave hull concavity, 0 gives the convex hull
    #[arg(long, env = "CONCAVITY", default_value_t = 0.5)]
    concavity: f64,

    /// Hull edges shorter than this (meters) are never refined
    #[arg(long, env = "LENGTH_THRESHOLD", default_value_t = 50.0)]
    length_threshold: f64,

    /// Number of bearing segments for the directness statistics
    #[arg(long, env = "SEGMENT_COUNT", default_value_t = 8)]
    segment_count: usize,

    /// Number of radial bearings
    #[arg(long, env = "RADIALS", default_value_t = 16)]
    radials: usize,

    /// Expected postcode length of the input records
    #[arg(long, env = "POSTCODE_LENGTH", default_value_t = 6)]
    postcode_length: usize,

    /// Drop samples snapped further than this many meters [default: grid resolution]
    #[arg(long, env = "SNAP_THRESHOLD")]
    snap_threshold: Option<f64>,

    /// Keep samples however far the provider snapped them
    #[arg(long)]
    no_snap_check: bool,

    /// Pause after each table request and each origin's routes, in milliseconds
    #[arg(long, env = "REQUEST_DELAY_MS", default_value_t = 100)]
    request_delay_ms: u64,

    /// Pause after each route request, in milliseconds
    #[arg(long, env = "ROUTE_DELAY_MS", default_value_t = 10)]
    route_delay_ms: u64,

    /// Origins processed at the same time [default: number of CPUs]
    #[arg(long)]
    concurrency: Option<usize>,
}

impl AnalysisArgs {
    fn config(&self, sampling: SamplingKind) -> catchment::Result<AnalysisConfig> {
        let snap_threshold = if self.no_snap_check {
            None
        } else {
            Some(self.snap_threshold.unwrap_or(self.grid_resolution))
        };

        let config = AnalysisConfig {
            minutes: self.minutes,
            speed_kmh: self.speed,
            grid_resolution: self.grid_resolution,
            concavity: self.concavity,
            length_threshold: self.length_threshold,
            segment_count: self.segment_count,
            radials: self.radials,
            postcode_length: self.postcode_length,
            snap_threshold,
            sampling,
            request_delay: Duration::from_millis(self.request_delay_ms),
            route_delay: Duration::from_millis(self.route_delay_ms),
            ..Default::default()
        };
        config.validate()?;
        Ok(config)
    }
}

/// Routing provider connection
#[derive(Args, Debug)]
struct ProviderArgs {
    /// OSRM base URL
    #[arg(long, env = "OSRM_URL", default_value = "http://localhost:7000")]
    osrm_url: String,

    /// OSRM routing profile
    #[arg(long, env = "OSRM_PROFILE", default_value = "walking")]
    osrm_profile: String,
}

impl ProviderArgs {
    fn client(&self) -> catchment::Result<OsrmClient> {
        OsrmClient::new(OsrmConfig {
            base_url: self.osrm_url.trim_end_matches('/').to_string(),
            profile: self.osrm_profile.clone(),
            ..Default::default()
        })
    }
}

fn parse_bbox(value: &str) -> Result<Rect<f64>, String> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<f64>, _>>()
        .map_err(|e| format!("invalid bbox '{value}': {e}"))?;

    match parts[..] {
        [min_x, min_y, max_x, max_y] if min_x < max_x && min_y < max_y => Ok(Rect::new(
            Coord { x: min_x, y: min_y },
            Coord { x: max_x, y: max_y },
        )),
        [_, _, _, _] => Err(format!("bbox '{value}' is empty, expected minLon,minLat,maxLon,maxLat")),
        _ => Err(format!("bbox '{value}' needs 4 numbers: minLon,minLat,maxLon,maxLat")),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr, stdout carries records only
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Stderr)
        .init();

    if cli.verbose {
        info!("catchment v{} starting", env!("CATCHMENT_VERSION"));
    }

    match cli.command {
        Command::Origins {
            addresses,
            postcode_length,
            intersects,
        } => run_origins(&addresses, postcode_length, intersects).await,

        Command::Reachability {
            mode,
            analysis,
            provider,
        } => {
            let config = analysis.config(mode)?;
            let analyzer = Analyzer::new(provider.client()?, config);
            let analyzer = &analyzer;
            run_stdio_stage("reachability", analysis.concurrency, move |record: OriginRecord| async move {
                analyzer.reachability(record).await.into_batch()
            })
            .await
        }

        Command::Routes { analysis, provider } => {
            let config = analysis.config(SamplingKind::default())?;
            let analyzer = Analyzer::new(provider.client()?, config);
            let analyzer = &analyzer;
            run_stdio_stage("routes", analysis.concurrency, move |record: ReachabilityRecord| async move {
                analyzer.routes(record).await.into_batch()
            })
            .await
        }

        Command::Analyze { analysis } => {
            let config = analysis.config(SamplingKind::default())?;
            run_stdio_stage("analyze", analysis.concurrency, move |record: RoutesRecord| {
                let config = config.clone();
                async move { analyze_blocking(config, record).await.into_batch() }
            })
            .await
        }

        Command::Radial { analysis, provider } => {
            let config = analysis.config(SamplingKind::Radial)?;
            let analyzer = Analyzer::new(provider.client()?, config);
            let analyzer = &analyzer;
            run_stdio_stage("radial", analysis.concurrency, move |record: OriginRecord| async move {
                analyzer.radial(record).await
            })
            .await
        }

        Command::Direct { analysis, provider } => {
            let config = analysis.config(SamplingKind::Radial)?;
            let analyzer = Analyzer::new(provider.client()?, config);
            let analyzer = &analyzer;
            run_stdio_stage("direct", analysis.concurrency, move |record: OriginRecord| async move {
                analyzer.direct_routes(record).await.into_batch()
            })
            .await
        }

        Command::HexagonOrigins {
            addresses,
            concurrency,
        } => run_hexagon_origins(&addresses, concurrency).await,

        Command::Pois { concurrency } => {
            run_stdio_stage("pois", concurrency, |record: FeatureRecord| async move {
                let pois = classify(&record);
                if pois.is_empty() {
                    Outcome::Skipped(SkipReason::NoCategory)
                } else {
                    Outcome::Emit(pois)
                }
            })
            .await
        }

        Command::Hexgrid { bbox, hex_size } => {
            if !(hex_size.is_finite() && hex_size > 0.0) {
                anyhow::bail!("hex size must be positive, got {hex_size}");
            }
            let written = write_all(tokio::io::stdout(), hexagons(bbox, hex_size)).await?;
            info!("hexgrid finished: {written} hexagons");
            Ok(())
        }

        Command::Prepare {
            chunk_length,
            simplify_tolerance,
            concurrency,
        } => {
            if !(chunk_length.is_finite() && chunk_length > 0.0) {
                anyhow::bail!("chunk length must be positive, got {chunk_length}");
            }
            let options = PrepareOptions {
                simplify_tolerance,
                chunk_length,
            };
            run_stdio_stage("prepare", concurrency, move |record: AnalysisRecord| async move {
                prepare(&options, record).into_batch()
            })
            .await
        }
    }
}

/// Aggregate an address source into one origin per postal area
async fn run_origins(addresses: &str, postcode_length: usize, intersects: Option<PathBuf>) -> anyhow::Result<()> {
    let boundary = intersects
        .map(|path| load_boundary(&path).with_context(|| format!("reading boundary {}", path.display())))
        .transpose()?;

    let (records, malformed): (Vec<AddressRecord>, u64) = if addresses == "-" {
        read_all(tokio::io::stdin()).await
    } else {
        let file = tokio::fs::File::open(addresses)
            .await
            .with_context(|| format!("opening address source {addresses}"))?;
        read_all(file).await
    };
    let read = records.len();

    let origins = aggregate_origins(records, postcode_length, boundary.as_ref())?;
    let written = write_all(tokio::io::stdout(), origins).await?;
    info!("origins finished: {read} addresses, {malformed} malformed, {written} origins");
    Ok(())
}

/// One origin per hexagon read from stdin
async fn run_hexagon_origins(addresses: &Path, concurrency: Option<usize>) -> anyhow::Result<()> {
    let file = tokio::fs::File::open(addresses)
        .await
        .with_context(|| format!("opening address source {}", addresses.display()))?;
    let (records, malformed): (Vec<AddressRecord>, u64) = read_all(file).await;
    let read = records.len();

    let index = AddressIndex::new(records);
    info!("hexagon-origins: {} of {read} addresses usable, {malformed} malformed", index.len());
    if index.is_empty() {
        anyhow::bail!("no address in {} has both a house number and a postcode", addresses.display());
    }

    let index = &index;
    run_stdio_stage("hexagon-origins", concurrency, move |record: HexagonRecord| async move {
        Outcome::from_result("hexagon", index.origin_for(&record)).into_batch()
    })
    .await
}

/// Run one stage from stdin to stdout with a progress display
async fn run_stdio_stage<I, O, F, Fut>(stage: &str, concurrency: Option<usize>, process: F) -> anyhow::Result<()>
where
    I: DeserializeOwned,
    O: Serialize,
    F: FnMut(I) -> Fut,
    Fut: Future<Output = Outcome<Vec<O>>>,
{
    let tracker = Arc::new(ProgressTracker::new(stage));
    let mut options = StageOptions {
        progress: Some(tracker.callback()),
        ..Default::default()
    };
    if let Some(concurrency) = concurrency {
        options.concurrency = concurrency;
    }

    let counts = run_stage(tokio::io::stdin(), tokio::io::stdout(), &options, process).await?;
    tracker.finish(&counts);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = parse_bbox("4.85,52.35,4.95,52.40").unwrap();
        assert_eq!(bbox.min(), Coord { x: 4.85, y: 52.35 });
        assert_eq!(bbox.max(), Coord { x: 4.95, y: 52.40 });

        assert!(parse_bbox("-0.2,51.4,0.1,51.6").is_ok());
        assert!(parse_bbox("4.85,52.35,4.95").is_err());
        assert!(parse_bbox("4.95,52.35,4.85,52.40").is_err());
        assert!(parse_bbox("a,b,c,d").is_err());
    }

    #[test]
    fn test_snap_threshold_defaults_to_resolution() {
        let cli = Cli::try_parse_from(["catchment", "analyze", "--grid-resolution", "75"]).unwrap();
        let Command::Analyze { analysis } = cli.command else {
            panic!("expected analyze");
        };
        let config = analysis.config(SamplingKind::Hex).unwrap();
        assert_eq!(config.snap_threshold, Some(75.0));
        assert_eq!(config.grid_resolution, 75.0);
    }

    #[test]
    fn test_no_snap_check_disables_threshold() {
        let cli = Cli::try_parse_from(["catchment", "routes", "--no-snap-check"]).unwrap();
        let Command::Routes { analysis, .. } = cli.command else {
            panic!("expected routes");
        };
        assert_eq!(analysis.config(SamplingKind::Hex).unwrap().snap_threshold, None);
    }

    #[test]
    fn test_invalid_postcode_length_is_rejected() {
        let cli = Cli::try_parse_from(["catchment", "radial", "--postcode-length", "7"]).unwrap();
        let Command::Radial { analysis, .. } = cli.command else {
            panic!("expected radial");
        };
        assert!(analysis.config(SamplingKind::Radial).is_err());
    }

    #[test]
    fn test_hexagon_origins_needs_addresses() {
        assert!(Cli::try_parse_from(["catchment", "hexagon-origins"]).is_err());
        let cli = Cli::try_parse_from(["catchment", "hexagon-origins", "--addresses", "a.ndjson"]).unwrap();
        assert!(matches!(cli.command, Command::HexagonOrigins { .. }));
    }

    #[test]
    fn test_reachability_mode() {
        let cli = Cli::try_parse_from(["catchment", "reachability", "--mode", "point"]).unwrap();
        let Command::Reachability { mode, .. } = cli.command else {
            panic!("expected reachability");
        };
        assert_eq!(mode, SamplingKind::Point);
    }
}
