//! Where straight rays from the origin leave the catchment hull

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, Polygon};
use log::debug;

use super::geodesy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryPoint {
    /// Index of the ray, bearing `360 / count * index`
    pub bearing_index: usize,
    pub location: Coord,
}

/// Crossing of the ray `origin`-`end` with the hull ring nearest to the origin
pub fn ray_exit(origin: Coord, end: Coord, hull: &Polygon<f64>) -> Option<Coord> {
    let ray = Line::new(origin, end);
    hull.exterior()
        .lines()
        .filter_map(|edge| match line_intersection(ray, edge)? {
            LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
            LineIntersection::Collinear { intersection } => {
                let (a, b) = (intersection.start, intersection.end);
                if geodesy::distance(origin, a) <= geodesy::distance(origin, b) {
                    Some(a)
                } else {
                    Some(b)
                }
            }
        })
        .min_by(|a, b| {
            geodesy::distance(origin, *a).total_cmp(&geodesy::distance(origin, *b))
        })
}

/// One boundary point per ray that crosses the hull
///
/// Rays that never reach the hull ring are logged and left out.
pub fn outer_boundary_points(origin: Coord, ray_ends: &[Coord], hull: &Polygon<f64>) -> Vec<BoundaryPoint> {
    ray_ends
        .iter()
        .enumerate()
        .filter_map(|(bearing_index, end)| {
            let exit = ray_exit(origin, *end, hull);
            if exit.is_none() {
                debug!("Ray {bearing_index} does not cross the hull");
            }
            exit.map(|location| BoundaryPoint {
                bearing_index,
                location: geodesy::round_coord(location),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sampler::{disc, radial_points};

    const ORIGIN: Coord = Coord { x: 4.8952, y: 52.3702 };

    #[test]
    fn test_rays_exit_a_disc_at_its_radius() {
        let hull = disc(ORIGIN, 600.0, 64);
        let ends = radial_points(ORIGIN, 1000.0, 8);
        let points = outer_boundary_points(ORIGIN, &ends, &hull);

        assert_eq!(points.len(), 8);
        for (i, p) in points.iter().enumerate() {
            assert_eq!(p.bearing_index, i);
            let d = geodesy::distance(ORIGIN, p.location);
            assert!((d - 600.0).abs() < 5.0, "ray {i}: {d}");
        }
    }

    #[test]
    fn test_short_rays_are_left_out() {
        let hull = disc(ORIGIN, 600.0, 64);
        let ends = radial_points(ORIGIN, 300.0, 4);
        assert!(outer_boundary_points(ORIGIN, &ends, &hull).is_empty());
    }

    #[test]
    fn test_nearest_crossing_wins() {
        // origin west of the hull: the ray enters at 4.90 and leaves at 4.92
        let hull = Polygon::new(
            vec![(4.90, 52.36), (4.92, 52.36), (4.92, 52.38), (4.90, 52.38), (4.90, 52.36)].into(),
            vec![],
        );
        let origin = Coord { x: 4.89, y: 52.37 };
        let end = Coord { x: 4.94, y: 52.37 };
        let exit = ray_exit(origin, end, &hull).unwrap();
        assert!((exit.x - 4.90).abs() < 1e-9);
        assert!((exit.y - 52.37).abs() < 1e-9);
    }
}
