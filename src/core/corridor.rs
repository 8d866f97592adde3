//! Route corridors and the footprint they cover together
//!
//! Each route is simplified and buffered by the grid resolution in a metric
//! projection around the origin. Corridors are unioned one at a time; a union
//! that fails costs only the corridor being added.

use std::panic::{catch_unwind, AssertUnwindSafe};

use geo::{BooleanOps, ConvexHull, Coord, LineString, MultiPoint, MultiPolygon, Polygon, Simplify};
use log::warn;

use super::error::GeometryError;
use super::geodesy::{self, LocalProjection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorridorConfig {
    /// Buffer radius in meters, also the minimum route length
    pub resolution: f64,
    /// Douglas-Peucker tolerance in meters
    pub simplify_tolerance: f64,
    /// Vertices per circle when buffering
    pub arc_steps: usize,
}

impl Default for CorridorConfig {
    fn default() -> Self {
        Self {
            resolution: 100.0,
            simplify_tolerance: 10.0,
            arc_steps: 16,
        }
    }
}

/// Buffers routes that start at one origin
#[derive(Debug, Clone, Copy)]
pub struct CorridorBuilder {
    config: CorridorConfig,
    projection: LocalProjection,
}

impl CorridorBuilder {
    pub fn new(config: CorridorConfig, origin: Coord) -> Self {
        Self {
            config,
            projection: LocalProjection::new(origin),
        }
    }

    /// Whether a route is long enough to be worth buffering
    pub fn accepts(&self, route: &[Coord]) -> bool {
        route.len() >= 2 && geodesy::path_length(route) > self.config.resolution
    }

    /// Buffered corridor of one route as simple hole-free polygons (projected)
    pub fn corridor(&self, route: &[Coord]) -> Vec<Polygon<f64>> {
        let line = self
            .projection
            .project_line(route)
            .simplify(&self.config.simplify_tolerance);

        match buffer_line(&line, self.config.resolution, self.config.arc_steps) {
            Ok(buffer) => strip_holes(buffer).0,
            Err(err) => {
                warn!("Could not buffer route with {} points: {err}", route.len());
                Vec::new()
            }
        }
    }

    /// Union of all corridors without holes, in WGS84
    pub fn footprint(&self, routes: &[Vec<Coord>]) -> Result<MultiPolygon<f64>, GeometryError> {
        let corridors = routes
            .iter()
            .filter(|route| self.accepts(route))
            .flat_map(|route| self.corridor(route));

        let union = union_corridors(corridors, checked_union).ok_or(GeometryError::EmptyFootprint)?;
        Ok(self
            .projection
            .unproject_multi_polygon(&strip_holes(union)))
    }
}

/// Polygon around a segment: convex hull of two circles
fn capsule(a: Coord, b: Coord, radius: f64, steps: usize) -> Polygon<f64> {
    let circle = |c: Coord| {
        (0..steps).map(move |i| {
            let angle = std::f64::consts::TAU * i as f64 / steps as f64;
            Coord {
                x: c.x + radius * angle.cos(),
                y: c.y + radius * angle.sin(),
            }
        })
    };
    let points: Vec<Coord> = circle(a).chain(circle(b)).collect();
    MultiPoint::from(points).convex_hull()
}

/// Buffer of a planar line as the union of its segment capsules
fn buffer_line(line: &LineString<f64>, radius: f64, steps: usize) -> Result<MultiPolygon<f64>, GeometryError> {
    let capsules = line
        .lines()
        .filter(|segment| segment.start != segment.end)
        .map(|segment| capsule(segment.start, segment.end, radius, steps));

    let mut buffer: Option<MultiPolygon<f64>> = None;
    for capsule in capsules {
        buffer = Some(match buffer {
            None => MultiPolygon::new(vec![capsule]),
            Some(acc) => checked_union(&acc, &capsule)?,
        });
    }
    buffer.ok_or(GeometryError::TooFewPoints(line.0.len()))
}

/// Union that reports numerical failure instead of panicking or returning garbage
pub fn checked_union(acc: &MultiPolygon<f64>, next: &Polygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let other = MultiPolygon::new(vec![next.clone()]);
    let union = catch_unwind(AssertUnwindSafe(|| acc.union(&other)))
        .map_err(|_| GeometryError::UnionFailed("boolean operation panicked".to_string()))?;

    if union.0.is_empty() && !(acc.0.is_empty() && other.0.is_empty()) {
        return Err(GeometryError::UnionFailed("union is empty".to_string()));
    }
    let finite = union
        .iter()
        .flat_map(|p| p.exterior().coords())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if !finite {
        return Err(GeometryError::UnionFailed("non-finite coordinates".to_string()));
    }
    Ok(union)
}

/// Fold polygons into a running union, skipping any polygon whose union fails
pub fn union_corridors<I, F>(corridors: I, mut union: F) -> Option<MultiPolygon<f64>>
where
    I: IntoIterator<Item = Polygon<f64>>,
    F: FnMut(&MultiPolygon<f64>, &Polygon<f64>) -> Result<MultiPolygon<f64>, GeometryError>,
{
    let mut acc: Option<MultiPolygon<f64>> = None;
    for (index, corridor) in corridors.into_iter().enumerate() {
        acc = match acc {
            None => Some(MultiPolygon::new(vec![corridor])),
            Some(current) => match union(&current, &corridor) {
                Ok(merged) => Some(merged),
                Err(err) => {
                    warn!("Skipping corridor {index}: {err}");
                    Some(current)
                }
            },
        };
    }
    acc
}

/// Keep only outer rings
pub fn strip_holes(polygons: MultiPolygon<f64>) -> MultiPolygon<f64> {
    polygons
        .into_iter()
        .map(|polygon| {
            let (exterior, _) = polygon.into_inner();
            Polygon::new(exterior, vec![])
        })
        .collect()
}
