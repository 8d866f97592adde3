//! Per-origin work of each pipeline stage
//!
//! Every stage function takes one input record and returns an [`Outcome`]:
//! either the records to emit or the reason the origin was skipped. Failures
//! never escape a single origin.

use std::time::Duration;

use geo::{Coord, LineString, Polygon, Rect, Simplify};
use log::{debug, info, warn};

use catchment_common::Error;

use super::config::{AnalysisConfig, SamplingKind};
use super::corridor::CorridorBuilder;
use super::directness::{non_redundant_indices, DirectnessAnalyzer, PathSignature, RouteMetrics};
use super::error::SkipReason;
use super::geodesy;
use super::geojson::Geometry;
use super::hull::HullBuilder;
use super::oracle::{RouteGeometry, TravelTimeOracle};
use super::pipeline::Outcome;
use super::radial::outer_boundary_points;
use super::reachable::ReachableSet;
use super::records::{
    AnalysisRecord, DirectRoutesRecord, HexagonRecord, OriginRecord, PreparedRecord, RadialRecord,
    ReachabilityRecord, RouteChunk, RoutesRecord,
};
use super::sampler::{hex_grid, radial_points, SampleGrid, Sampler, SamplingMode};
use super::statistics;

type StageResult<T> = std::result::Result<T, SkipReason>;

/// Stages that talk to the routing provider
pub struct Analyzer<O> {
    oracle: O,
    config: AnalysisConfig,
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn check_postcode(postcode: &str, expected: usize) -> StageResult<()> {
    if postcode.chars().count() == expected {
        Ok(())
    } else {
        Err(SkipReason::PostcodeLength {
            postcode: postcode.to_string(),
            expected,
        })
    }
}

impl<O: TravelTimeOracle> Analyzer<O> {
    pub fn new(oracle: O, config: AnalysisConfig) -> Self {
        Self { oracle, config }
    }

    /// Sample around the origin, ask for travel times and keep what is reachable
    pub async fn reachability(&self, record: OriginRecord) -> Outcome<ReachabilityRecord> {
        let postcode = record.postcode.clone();
        Outcome::from_result(&postcode, self.try_reachability(record).await)
    }

    async fn try_reachability(&self, record: OriginRecord) -> StageResult<ReachabilityRecord> {
        check_postcode(&record.postcode, self.config.postcode_length)?;
        let origin = record.origin.as_point()?;
        debug!("Computing grid: {}", record.postcode);

        let grid = self.sample(origin);
        let reachable = self.reachable(origin, &grid).await?;

        Ok(ReachabilityRecord {
            postcode: record.postcode,
            origin: record.origin,
            durations: reachable.durations(),
            geometry: Geometry::multi_point(&reachable.locations()),
        })
    }

    fn sample(&self, origin: Coord) -> SampleGrid {
        let resolution = self.config.grid_resolution;
        let sampler = Sampler::new(origin, self.config.max_distance());
        match self.config.sampling {
            SamplingKind::Hex => sampler.sample(&SamplingMode::HexGrid { resolution }),
            SamplingKind::Point => sampler.sample(&SamplingMode::PointGrid {
                resolution,
                mask: None,
            }),
            SamplingKind::Radial => {
                let radial = sampler.sample(&SamplingMode::Radial {
                    count: self.config.radials,
                });
                sampler.sample(&SamplingMode::PointGrid {
                    resolution,
                    mask: radial.mask,
                })
            }
        }
    }

    /// One table call for the whole grid, then the reachable-set filter
    async fn reachable(&self, origin: Coord, grid: &SampleGrid) -> StageResult<ReachableSet> {
        if grid.is_empty() {
            return Err(SkipReason::NoSamples);
        }

        let entries = self.oracle.table(origin, &grid.locations()).await;
        pause(self.config.request_delay).await;
        let entries = entries?;

        if entries.len() != grid.len() {
            return Err(SkipReason::Provider(Error::RoutingError(format!(
                "{} durations for {} destinations",
                entries.len(),
                grid.len()
            ))));
        }

        Ok(self.config.reachability_filter().apply(&grid.points, &entries))
    }

    /// Fetch routes one after another, `None` where a request failed
    async fn fetch_each(&self, postcode: &str, origin: Coord, destinations: &[Coord]) -> Vec<Option<RouteGeometry>> {
        let mut routes = Vec::with_capacity(destinations.len());
        for (index, destination) in destinations.iter().enumerate() {
            routes.push(match self.oracle.route(origin, *destination).await {
                Ok(route) => Some(route),
                Err(e) => {
                    warn!("Route {index} of {postcode} failed: {e}");
                    None
                }
            });
            pause(self.config.route_delay).await;
        }
        routes
    }

    /// Fetch routes one after another, dropping the ones that fail
    async fn fetch_routes(&self, postcode: &str, origin: Coord, destinations: &[Coord]) -> Vec<RouteGeometry> {
        self.fetch_each(postcode, origin, destinations)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Route to every reachable location and mark the sub-path routes
    pub async fn routes(&self, record: ReachabilityRecord) -> Outcome<RoutesRecord> {
        let postcode = record.postcode.clone();
        Outcome::from_result(&postcode, self.try_routes(record).await)
    }

    async fn try_routes(&self, record: ReachabilityRecord) -> StageResult<RoutesRecord> {
        let origin = record.origin.as_point()?;
        let destinations = record.geometry.as_multi_point()?;
        debug!("Computing routes: {}", record.postcode);

        let routes = self.fetch_routes(&record.postcode, origin, &destinations).await;
        pause(self.config.request_delay).await;

        if routes.is_empty() && !destinations.is_empty() {
            return Err(SkipReason::NoRoutes);
        }

        let signatures: Vec<PathSignature> = routes
            .iter()
            .map(|route| PathSignature(route.nodes.clone()))
            .collect();
        let filtered = non_redundant_indices(&signatures);
        let lines: Vec<Vec<Coord>> = filtered
            .iter()
            .map(|i| routes[*i].coordinates.clone())
            .collect();

        Ok(RoutesRecord {
            postcode: record.postcode,
            origin: record.origin,
            distances: routes.iter().map(|r| r.distance).collect(),
            durations: routes.iter().map(|r| r.duration).collect(),
            filtered_route_indexes: filtered,
            geometry: Geometry::multi_line_string(&lines),
        })
    }

    /// Hull of a radial point grid and showcase routes to where the rays leave it
    pub async fn radial(&self, record: OriginRecord) -> Outcome<Vec<RadialRecord>> {
        let postcode = record.postcode.clone();
        Outcome::from_result(&postcode, self.try_radial(record).await)
    }

    async fn try_radial(&self, record: OriginRecord) -> StageResult<Vec<RadialRecord>> {
        check_postcode(&record.postcode, self.config.postcode_length)?;
        let origin = record.origin.as_point()?;
        debug!("Computing radial routes: {}", record.postcode);

        let max_distance = self.config.max_distance();
        let ray_ends = radial_points(origin, max_distance, self.config.radials);
        let mask = Polygon::new(LineString::from(ray_ends.clone()), vec![]);
        let grid = Sampler::new(origin, max_distance).sample(&SamplingMode::PointGrid {
            resolution: self.config.grid_resolution,
            mask: Some(mask),
        });

        let reachable = self.reachable(origin, &grid).await?;
        let hull = HullBuilder::new(self.config.hull_config()).from_points(&reachable.locations())?;

        let boundary = outer_boundary_points(origin, &ray_ends, &hull.polygon);
        if boundary.is_empty() {
            info!("No intersections with concave hull found for {}", record.postcode);
        }
        let destinations: Vec<Coord> = boundary.iter().map(|b| b.location).collect();
        let routes = self.fetch_routes(&record.postcode, origin, &destinations).await;

        let ratios: Vec<f64> = routes
            .iter()
            .filter_map(|route| RouteMetrics::measure(&route.coordinates)?.distance_ratio())
            .collect();
        let mean_distance_ratio = statistics::mean(&ratios);
        let lines: Vec<Vec<Coord>> = routes.into_iter().map(|r| r.coordinates).collect();

        Ok(vec![
            RadialRecord::Origin {
                postcode: record.postcode.clone(),
                mean_distance_ratio,
                geometry: record.origin,
            },
            RadialRecord::ConcaveHull {
                postcode: record.postcode.clone(),
                mean_distance_ratio,
                area: hull.area,
                geometry: Geometry::polygon(&hull.polygon),
            },
            RadialRecord::Routes {
                postcode: record.postcode,
                mean_distance_ratio,
                geometry: Geometry::multi_line_string(&lines),
            },
        ])
    }

    /// Route towards evenly spaced points at the full travel distance and
    /// measure how far each route ends from where it was aimed
    pub async fn direct_routes(&self, record: OriginRecord) -> Outcome<DirectRoutesRecord> {
        let postcode = record.postcode.clone();
        Outcome::from_result(&postcode, self.try_direct_routes(record).await)
    }

    async fn try_direct_routes(&self, record: OriginRecord) -> StageResult<DirectRoutesRecord> {
        check_postcode(&record.postcode, self.config.postcode_length)?;
        let origin = record.origin.as_point()?;
        debug!("Computing direct routes: {}", record.postcode);

        let destinations = radial_points(origin, self.config.max_distance(), self.config.radials);
        let routes = self.fetch_each(&record.postcode, origin, &destinations).await;
        pause(self.config.request_delay).await;

        let (targets, routes): (Vec<Coord>, Vec<RouteGeometry>) = destinations
            .iter()
            .zip(routes)
            .filter_map(|(destination, route)| Some((*destination, route?)))
            .filter(|(_, route)| !route.coordinates.is_empty())
            .unzip();
        if routes.is_empty() {
            return Err(SkipReason::NoRoutes);
        }

        let distances_to_destination: Vec<f64> = targets
            .iter()
            .zip(&routes)
            .filter_map(|(target, route)| {
                let end = *route.coordinates.last()?;
                Some(geodesy::round_decimals(geodesy::distance(*target, end), 6))
            })
            .collect();
        let distance_ratios: Vec<Option<f64>> = routes
            .iter()
            .map(|route| RouteMetrics::measure(&route.coordinates)?.distance_ratio())
            .collect();
        let ratios: Vec<f64> = distance_ratios.iter().flatten().copied().collect();
        let lines: Vec<Vec<Coord>> = routes.into_iter().map(|r| r.coordinates).collect();

        Ok(DirectRoutesRecord {
            postcode: record.postcode,
            origin: record.origin,
            destinations: Geometry::multi_point(&destinations),
            mean_distance_to_destination: statistics::mean(&distances_to_destination),
            distances_to_destination,
            mean_distance_ratio: statistics::mean(&ratios),
            distance_ratios,
            routes: Geometry::multi_line_string(&lines),
        })
    }
}

/// Serviced area and directness of one origin's routes
pub fn analyze(config: &AnalysisConfig, record: RoutesRecord) -> Outcome<AnalysisRecord> {
    let postcode = record.postcode.clone();
    Outcome::from_result(&postcode, try_analyze(config, record))
}

fn try_analyze(config: &AnalysisConfig, record: RoutesRecord) -> StageResult<AnalysisRecord> {
    let lines = record.geometry.as_multi_line_string()?;
    if lines.is_empty() {
        return Err(SkipReason::NoRoutes);
    }
    let origin = record.origin.as_point()?;
    debug!("Analyzing routes: {}", record.postcode);

    let footprint = CorridorBuilder::new(config.corridor_config(), origin).footprint(&lines)?;
    let hull = HullBuilder::new(config.hull_config()).from_footprint(&footprint)?;
    let routes = DirectnessAnalyzer::new(config.segment_count)
        .analyze(&lines, &record.distances)
        .ok_or(SkipReason::NoRoutes)?;

    Ok(AnalysisRecord {
        routes_record: record,
        area: hull.summary(),
        routes,
    })
}

/// [`analyze`] on the blocking pool, so several origins use several cores
pub async fn analyze_blocking(config: AnalysisConfig, record: RoutesRecord) -> Outcome<AnalysisRecord> {
    let postcode = record.postcode.clone();
    match tokio::task::spawn_blocking(move || analyze(&config, record)).await {
        Ok(outcome) => outcome,
        Err(e) => Outcome::from_result(&postcode, Err(SkipReason::Internal(e.to_string()))),
    }
}

/// Display-ready version of an analysis record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrepareOptions {
    /// Degrees
    pub simplify_tolerance: f64,
    /// Meters
    pub chunk_length: f64,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            simplify_tolerance: 0.00005,
            chunk_length: 250.0,
        }
    }
}

pub fn prepare(options: &PrepareOptions, record: AnalysisRecord) -> Outcome<PreparedRecord> {
    let postcode = record.routes_record.postcode.clone();
    Outcome::from_result(&postcode, try_prepare(options, record))
}

fn try_prepare(options: &PrepareOptions, record: AnalysisRecord) -> StageResult<PreparedRecord> {
    let lines = record.routes_record.geometry.as_multi_line_string()?;
    let tolerance = options.simplify_tolerance;

    let mut chunks = Vec::new();
    for (route, line) in lines.iter().enumerate() {
        if geodesy::path_length(line) == 0.0 {
            continue;
        }
        let simplified = LineString::from(line.clone()).simplify(&tolerance);
        for (index, chunk) in geodesy::line_chunks(&simplified.0, options.chunk_length)
            .into_iter()
            .enumerate()
        {
            chunks.push(RouteChunk {
                route,
                index,
                geometry: Geometry::line_string(&chunk),
            });
        }
    }

    let area = record.area.geometry.as_polygon()?.simplify(&tolerance);

    Ok(PreparedRecord {
        postcode: record.routes_record.postcode,
        area: Geometry::polygon(&area),
        chunks,
    })
}

/// Hexagon cells covering `bbox`
pub fn hexagons(bbox: Rect<f64>, side: f64) -> Vec<HexagonRecord> {
    hex_grid(bbox, side)
        .iter()
        .map(|hexagon| HexagonRecord {
            geometry: Geometry::polygon(hexagon),
        })
        .collect()
}
