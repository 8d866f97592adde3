//! Concave hull extraction and area figures
//!
//! The hull starts from the convex hull and digs into it edge by edge: for
//! every edge the nearest interior point is inserted when it is close enough
//! relative to the edge length (`concavity`), provided the new edges touch the
//! ring only at their own endpoints and no input point would fall outside.
//! Edges shorter than `length_threshold` are left alone.
//!
//! Input coordinates are rounded to 6 decimals first and hull vertices are
//! exactly those points. Lengths come from a local metric projection, while
//! contacts and containment are decided with exact predicates on the emitted
//! coordinates, so the ring stays simple.

use std::collections::{HashMap, HashSet, VecDeque};

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::algorithm::orient::{Direction, Orient};
use geo::kernels::{Kernel, Orientation, RobustKernel};
use geo::{
    Area, ChamberlainDuquetteArea, ConvexHull, Coord, Line, LineString, MultiPoint, MultiPolygon,
    Polygon,
};
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::{Deserialize, Serialize};

use super::error::GeometryError;
use super::geodesy::{self, LocalProjection};
use super::geojson::Geometry;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullConfig {
    /// 0 gives the convex hull, higher values follow the points more closely
    pub concavity: f64,
    /// Edges shorter than this many meters are never refined
    pub length_threshold: f64,
    /// Vertex spacing in meters when hulling a polygon boundary
    pub densify_step: f64,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            concavity: 0.5,
            length_threshold: 50.0,
            densify_step: 100.0,
        }
    }
}

/// Area figures as written to analysis records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaSummary {
    /// Square meters
    pub area: f64,
    /// Meters
    pub circumference: f64,
    pub area_circumference_ratio: f64,
    pub geometry: Geometry,
}

/// A hull polygon in WGS84 with its rounded area and perimeter
#[derive(Debug, Clone, PartialEq)]
pub struct CatchmentHull {
    pub polygon: Polygon<f64>,
    pub area: f64,
    pub circumference: f64,
}

impl CatchmentHull {
    fn from_polygon(polygon: Polygon<f64>) -> Result<Self, GeometryError> {
        let area = polygon.chamberlain_duquette_unsigned_area().round();
        let circumference = geodesy::path_length(&polygon.exterior().0).round();
        if area <= 0.0 || circumference <= 0.0 {
            return Err(GeometryError::Degenerate);
        }
        Ok(Self {
            polygon,
            area,
            circumference,
        })
    }

    pub fn area_circumference_ratio(&self) -> f64 {
        geodesy::round_decimals(self.area / self.circumference, 6)
    }

    pub fn summary(&self) -> AreaSummary {
        AreaSummary {
            area: self.area,
            circumference: self.circumference,
            area_circumference_ratio: self.area_circumference_ratio(),
            geometry: Geometry::polygon(&self.polygon),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HullBuilder {
    config: HullConfig,
}

fn coord_key(c: Coord) -> (u64, u64) {
    (c.x.to_bits(), c.y.to_bits())
}

impl HullBuilder {
    pub fn new(config: HullConfig) -> Self {
        Self { config }
    }

    /// Concave hull around a point set
    pub fn from_points(&self, points: &[Coord]) -> Result<CatchmentHull, GeometryError> {
        let mut seen = HashSet::new();
        let unique: Vec<Coord> = points
            .iter()
            .filter(|c| c.x.is_finite() && c.y.is_finite())
            .map(|c| geodesy::round_coord(*c))
            .filter(|c| seen.insert(coord_key(*c)))
            .collect();

        if unique.len() < 3 {
            return Err(GeometryError::TooFewPoints(unique.len()));
        }

        let projection =
            LocalProjection::centered_on(&unique).ok_or(GeometryError::TooFewPoints(0))?;
        let projected: Vec<Coord> = unique.iter().map(|c| projection.project(*c)).collect();

        let points = HullPoints {
            coords: &unique,
            metric: &projected,
        };
        let ring = concave_hull(&points, self.config.concavity, self.config.length_threshold)?;
        let exterior: Vec<Coord> = ring.into_iter().map(|id| unique[id]).collect();

        let polygon = Polygon::new(LineString::from(exterior), vec![]).orient(Direction::Default);
        CatchmentHull::from_polygon(polygon)
    }

    /// Concave hull around the outer rings of a footprint, densified first
    pub fn from_footprint(&self, footprint: &MultiPolygon<f64>) -> Result<CatchmentHull, GeometryError> {
        let points: Vec<Coord> = footprint
            .iter()
            .flat_map(|polygon| geodesy::densify(&polygon.exterior().0, self.config.densify_step))
            .collect();
        self.from_points(&points)
    }
}

fn sq_dist(a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (a.x - b.x, a.y - b.y);
    dx * dx + dy * dy
}

/// Squared distance from `p` to segment `a`-`b`
fn sq_seg_dist(p: Coord, a: Coord, b: Coord) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len = dx * dx + dy * dy;
    if len == 0.0 {
        return sq_dist(p, a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len).clamp(0.0, 1.0);
    sq_dist(p, Coord { x: a.x + t * dx, y: a.y + t * dy })
}

fn orient(a: Coord, b: Coord, c: Coord) -> Orientation {
    RobustKernel::orient2d(a, b, c)
}

type Indexed = GeomWithData<[f64; 2], usize>;

fn indexed(c: Coord, id: usize) -> Indexed {
    GeomWithData::new([c.x, c.y], id)
}

fn envelope(coords: &[Coord], margin: f64) -> AABB<[f64; 2]> {
    let (mut min, mut max) = ([f64::INFINITY; 2], [f64::NEG_INFINITY; 2]);
    for c in coords {
        min = [min[0].min(c.x), min[1].min(c.y)];
        max = [max[0].max(c.x), max[1].max(c.y)];
    }
    AABB::from_corners(
        [min[0] - margin, min[1] - margin],
        [max[0] + margin, max[1] + margin],
    )
}

/// Input points in two spaces with shared indices
///
/// Topology (contacts, orientation, containment) is decided on `coords`, the
/// space the ring is emitted in. Distances are measured on `metric`.
pub(crate) struct HullPoints<'a> {
    pub coords: &'a [Coord],
    pub metric: &'a [Coord],
}

/// Hull ring as a doubly linked list of point ids over an append-only arena
struct Ring {
    ids: Vec<usize>,
    next: Vec<usize>,
    prev: Vec<usize>,
}

impl Ring {
    fn new(ids: Vec<usize>) -> Self {
        let n = ids.len();
        Self {
            ids,
            next: (0..n).map(|i| (i + 1) % n).collect(),
            prev: (0..n).map(|i| (i + n - 1) % n).collect(),
        }
    }

    fn insert_after(&mut self, slot: usize, id: usize) -> usize {
        let b = self.next[slot];
        let i = self.ids.len();
        self.ids.push(id);
        self.next.push(b);
        self.prev.push(slot);
        self.next[slot] = i;
        self.prev[b] = i;
        i
    }

    /// Whether segment `from`-`to` would touch the ring anywhere other than
    /// at `from` itself, ignoring the edge starting at `replaced`
    fn touched_by(&self, coords: &[Coord], from: usize, to: usize, replaced: usize) -> bool {
        let (s, e) = (coords[from], coords[to]);
        let segment = Line::new(s, e);
        (0..self.ids.len()).filter(|slot| *slot != replaced).any(|slot| {
            let (i, j) = (self.ids[slot], self.ids[self.next[slot]]);
            let Some(contact) = line_intersection(segment, Line::new(coords[i], coords[j])) else {
                return false;
            };
            let shares_from = i == from || j == from;
            match contact {
                LineIntersection::SinglePoint { intersection, .. } => !(shares_from && intersection == s),
                LineIntersection::Collinear { .. } => true,
            }
        })
    }

    fn ids(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.ids.len());
        let mut slot = 0;
        loop {
            out.push(self.ids[slot]);
            slot = self.next[slot];
            if slot == 0 {
                break;
            }
        }
        out
    }
}

/// Whether replacing edge `a`-`b` by `a`-`p`-`b` would leave any point outside
fn excludes_points(coords: &[Coord], all: &RTree<Indexed>, a: usize, p: usize, b: usize) -> bool {
    let (ca, cp, cb) = (coords[a], coords[p], coords[b]);
    let turn = orient(ca, cp, cb);
    all.locate_in_envelope(&envelope(&[ca, cp, cb], 0.0))
        .filter(|q| q.data != a && q.data != p && q.data != b)
        .map(|q| coords[q.data])
        .any(|q| {
            let base = orient(cb, ca, q);
            orient(ca, cp, q) == turn
                && orient(cp, cb, q) == turn
                && (base == turn || base == Orientation::Collinear)
        })
}

fn find_candidate(
    points: &HullPoints,
    remaining: &RTree<Indexed>,
    all: &RTree<Indexed>,
    ring: &Ring,
    a: usize,
    max_sq_len: f64,
) -> Option<usize> {
    let b = ring.next[a];
    let (ia, ib) = (ring.ids[a], ring.ids[b]);
    let metric = points.metric;
    let (pa, pb) = (metric[ia], metric[ib]);
    let before = metric[ring.ids[ring.prev[a]]];
    let after = metric[ring.ids[ring.next[b]]];

    let mut candidates: Vec<(f64, usize)> = remaining
        .locate_in_envelope(&envelope(&[pa, pb], max_sq_len.sqrt()))
        .map(|p| (sq_seg_dist(metric[p.data], pa, pb), p.data))
        .filter(|(d, _)| *d <= max_sq_len)
        .collect();
    candidates.sort_by(|x, y| x.0.total_cmp(&y.0));

    candidates.into_iter().find_map(|(d, p)| {
        // closer to both neighbouring edges than to this one
        let mp = metric[p];
        if sq_seg_dist(mp, before, pa) < d && sq_seg_dist(mp, pb, after) < d {
            return None;
        }
        if orient(points.coords[ia], points.coords[p], points.coords[ib]) == Orientation::Collinear {
            return None;
        }
        if ring.touched_by(points.coords, ia, p, a) || ring.touched_by(points.coords, ib, p, a) {
            return None;
        }
        if excludes_points(points.coords, all, ia, p, ib) {
            return None;
        }
        Some(p)
    })
}

/// Concave hull ring as ids into `points`, open and simple
pub(crate) fn concave_hull(
    points: &HullPoints,
    concavity: f64,
    length_threshold: f64,
) -> Result<Vec<usize>, GeometryError> {
    let (coords, metric) = (points.coords, points.metric);
    let id_of: HashMap<(u64, u64), usize> = coords
        .iter()
        .enumerate()
        .map(|(id, c)| (coord_key(*c), id))
        .collect();

    let convex = MultiPoint::from(coords.to_vec()).convex_hull();
    let mut hull: Vec<usize> = convex
        .exterior()
        .0
        .iter()
        .filter_map(|c| id_of.get(&coord_key(*c)).copied())
        .collect();
    if hull.len() > 1 && hull.first() == hull.last() {
        hull.pop();
    }
    if hull.len() < 3 {
        return Err(GeometryError::Degenerate);
    }
    let hull_metric = Polygon::new(hull.iter().map(|id| metric[*id]).collect(), vec![]);
    if hull_metric.unsigned_area() <= 1e-6 {
        return Err(GeometryError::Degenerate);
    }

    let on_hull: HashSet<usize> = hull.iter().copied().collect();
    let all: RTree<Indexed> =
        RTree::bulk_load(coords.iter().enumerate().map(|(id, c)| indexed(*c, id)).collect());
    let mut remaining: RTree<Indexed> = RTree::bulk_load(
        metric
            .iter()
            .enumerate()
            .filter(|(id, _)| !on_hull.contains(id))
            .map(|(id, c)| indexed(*c, id))
            .collect(),
    );

    let mut ring = Ring::new(hull);
    let mut queue: VecDeque<usize> = (0..ring.ids.len()).collect();
    let concavity_sq = concavity * concavity;
    let threshold_sq = length_threshold * length_threshold;

    while let Some(a) = queue.pop_front() {
        let b = ring.next[a];
        let (ma, mb) = (metric[ring.ids[a]], metric[ring.ids[b]]);
        let sq_len = sq_dist(ma, mb);
        if sq_len < threshold_sq {
            continue;
        }

        let max_sq_len = sq_len * concavity_sq;
        if max_sq_len <= 0.0 {
            continue;
        }

        let Some(p) = find_candidate(points, &remaining, &all, &ring, a, max_sq_len) else {
            continue;
        };
        let nearest_end = sq_dist(metric[p], ma).min(sq_dist(metric[p], mb));
        if nearest_end > max_sq_len {
            continue;
        }

        remaining.remove(&indexed(metric[p], p));
        let inserted = ring.insert_after(a, p);
        queue.push_back(a);
        queue.push_back(inserted);
    }

    Ok(ring.ids())
}
