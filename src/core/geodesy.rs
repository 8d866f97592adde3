//! Geodesic helpers on WGS84 `[lon, lat]` coordinates
//!
//! Distances, bearings and destinations use the haversine formulas from `geo`
//! (mean earth radius 6 371 008.8 m). Metric work such as buffering and hull
//! extraction happens in a [`LocalProjection`] around the origin.

#![allow(deprecated)]

use geo::{
    Coord, HaversineBearing, HaversineDestination, HaversineDistance, LineString, MapCoords,
    MultiPolygon, Point, Polygon,
};

/// Mean earth radius in meters, same as `geo` and turf
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Haversine distance in meters
pub fn distance(a: Coord, b: Coord) -> f64 {
    Point::from(a).haversine_distance(&Point::from(b))
}

/// Initial compass bearing from `a` to `b`, normalized to `[0, 360)`
pub fn bearing(a: Coord, b: Coord) -> f64 {
    let bearing = Point::from(a).haversine_bearing(Point::from(b));
    bearing.rem_euclid(360.0)
}

/// Point reached from `origin` after `distance` meters along `bearing` degrees
pub fn destination(origin: Coord, bearing: f64, distance: f64) -> Coord {
    Point::from(origin)
        .haversine_destination(bearing, distance)
        .into()
}

/// Geodesic length of a polyline in meters
pub fn path_length(coords: &[Coord]) -> f64 {
    coords.windows(2).map(|w| distance(w[0], w[1])).sum()
}

pub fn round_decimals(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Round to 6 decimals (about 0.1 m)
pub fn round_coord(c: Coord) -> Coord {
    Coord {
        x: round_decimals(c.x, 6),
        y: round_decimals(c.y, 6),
    }
}

fn interpolate(a: Coord, b: Coord, t: f64) -> Coord {
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}

/// Cut a polyline into consecutive pieces of `chunk_length` meters
///
/// The last piece holds the remainder. Lines shorter than two positions yield
/// no chunks.
pub fn line_chunks(coords: &[Coord], chunk_length: f64) -> Vec<Vec<Coord>> {
    if coords.len() < 2 {
        return Vec::new();
    }
    if chunk_length <= 0.0 {
        return vec![coords.to_vec()];
    }

    let mut chunks = Vec::new();
    let mut current = vec![coords[0]];
    let mut remaining = chunk_length;

    for w in coords.windows(2) {
        let (start, end) = (w[0], w[1]);
        let seg = distance(start, end);
        let mut consumed = 0.0;

        while seg - consumed > remaining + 1e-9 {
            consumed += remaining;
            let cut = interpolate(start, end, consumed / seg);
            current.push(cut);
            chunks.push(std::mem::replace(&mut current, vec![cut]));
            remaining = chunk_length;
        }

        if current.last() != Some(&end) {
            current.push(end);
        }
        remaining -= seg - consumed;

        if remaining <= 1e-9 {
            if current.len() > 1 {
                chunks.push(std::mem::replace(&mut current, vec![end]));
            }
            remaining = chunk_length;
        }
    }

    if current.len() > 1 {
        chunks.push(current);
    }
    chunks
}

/// Insert vertices so that no edge is longer than `step` meters
pub fn densify(coords: &[Coord], step: f64) -> Vec<Coord> {
    let chunks = line_chunks(coords, step);
    let mut iter = chunks.into_iter();
    let Some(mut dense) = iter.next() else {
        return coords.to_vec();
    };
    for chunk in iter {
        dense.extend(chunk.into_iter().skip(1));
    }
    dense
}

/// Equirectangular projection to meters around a fixed center
///
/// Accurate to well under a percent over the few kilometres a walking
/// catchment spans.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    center: Coord,
    meters_per_lon: f64,
}

impl LocalProjection {
    pub fn new(center: Coord) -> Self {
        Self {
            center,
            meters_per_lon: METERS_PER_DEGREE * center.y.to_radians().cos(),
        }
    }

    /// Center on the mean of `coords`
    pub fn centered_on(coords: &[Coord]) -> Option<Self> {
        if coords.is_empty() {
            return None;
        }
        let n = coords.len() as f64;
        let (sx, sy) = coords.iter().fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
        Some(Self::new(Coord { x: sx / n, y: sy / n }))
    }

    pub fn project(&self, c: Coord) -> Coord {
        Coord {
            x: (c.x - self.center.x) * self.meters_per_lon,
            y: (c.y - self.center.y) * METERS_PER_DEGREE,
        }
    }

    pub fn unproject(&self, c: Coord) -> Coord {
        Coord {
            x: self.center.x + c.x / self.meters_per_lon,
            y: self.center.y + c.y / METERS_PER_DEGREE,
        }
    }

    pub fn project_polygon(&self, polygon: &Polygon<f64>) -> Polygon<f64> {
        polygon.map_coords(|c| self.project(c))
    }

    pub fn unproject_multi_polygon(&self, polygons: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        polygons.map_coords(|c| self.unproject(c))
    }

    pub fn project_line(&self, coords: &[Coord]) -> LineString<f64> {
        coords.iter().map(|c| self.project(*c)).collect()
    }
}
