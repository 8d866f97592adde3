//! Candidate destination sampling around an origin
//!
//! Three layouts are supported: a flat-topped hexagon grid (sample = hexagon
//! center), a square point grid, and evenly spaced radial endpoints. Grids are
//! laid out in a [`LocalProjection`] centred on the origin so that spacing is
//! in meters, then converted back to WGS84 and rounded to 6 decimals.

use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect};

use super::geodesy::{self, LocalProjection};

const SQRT_3: f64 = 1.732_050_807_568_877_2;

/// Vertices used to approximate a buffered disc
pub const DISC_STEPS: usize = 64;

#[derive(Debug, Clone)]
pub enum SamplingMode {
    /// Hexagon centers, `resolution` is the hexagon side in meters
    HexGrid { resolution: f64 },
    /// Square grid, optionally restricted to `mask`
    PointGrid {
        resolution: f64,
        mask: Option<Polygon<f64>>,
    },
    /// `count` endpoints at the maximum distance, bearings `360 / count * i`
    Radial { count: usize },
}

/// Which cell of the layout produced a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCell {
    Hex { col: i64, row: i64 },
    Grid { col: i64, row: i64 },
    Radial { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint {
    pub location: Coord,
    pub cell: SampleCell,
}

/// Candidate destinations plus the polygon that bounded them
#[derive(Debug, Clone)]
pub struct SampleGrid {
    pub points: Vec<SamplePoint>,
    pub mask: Option<Polygon<f64>>,
}

impl SampleGrid {
    pub fn locations(&self) -> Vec<Coord> {
        self.points.iter().map(|p| p.location).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }
}

/// Sampler for one origin and travel distance
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    origin: Coord,
    max_distance: f64,
    projection: LocalProjection,
}

impl Sampler {
    pub fn new(origin: Coord, max_distance: f64) -> Self {
        Self {
            origin,
            max_distance,
            projection: LocalProjection::new(origin),
        }
    }

    pub fn sample(&self, mode: &SamplingMode) -> SampleGrid {
        match mode {
            SamplingMode::HexGrid { resolution } => self.hex_grid(*resolution),
            SamplingMode::PointGrid { resolution, mask } => {
                self.point_grid(*resolution, mask.as_ref())
            }
            SamplingMode::Radial { count } => self.radial(*count),
        }
    }

    /// Hexagon centers whose distance to the origin is within `max + 2 * resolution`
    fn hex_grid(&self, resolution: f64) -> SampleGrid {
        let radius = self.max_distance + 2.0 * resolution;
        let dx = 1.5 * resolution;
        let dy = SQRT_3 * resolution;
        let cols = (radius / dx).ceil() as i64;
        let rows = (radius / dy).ceil() as i64 + 1;

        let mut points = Vec::new();
        for col in -cols..=cols {
            let x = col as f64 * dx;
            let offset = if col.rem_euclid(2) == 1 { dy / 2.0 } else { 0.0 };
            for row in -rows..=rows {
                let y = row as f64 * dy + offset;
                if x.hypot(y) > radius {
                    continue;
                }
                points.push(SamplePoint {
                    location: self.to_wgs84(Coord { x, y }),
                    cell: SampleCell::Hex { col, row },
                });
            }
        }

        SampleGrid {
            points,
            mask: Some(disc(self.origin, radius, DISC_STEPS)),
        }
    }

    /// Square grid aligned on the origin, kept where the mask contains it
    ///
    /// Without a mask the grid is bounded by a disc of `max + resolution`.
    fn point_grid(&self, resolution: f64, mask: Option<&Polygon<f64>>) -> SampleGrid {
        let mask = mask
            .cloned()
            .unwrap_or_else(|| disc(self.origin, self.max_distance + resolution, DISC_STEPS));
        let projected = self.projection.project_polygon(&mask);

        let Some(bounds) = projected.bounding_rect() else {
            return SampleGrid {
                points: Vec::new(),
                mask: Some(mask),
            };
        };

        let (min_col, max_col) = grid_span(bounds.min().x, bounds.max().x, resolution);
        let (min_row, max_row) = grid_span(bounds.min().y, bounds.max().y, resolution);

        let mut points = Vec::new();
        for col in min_col..=max_col {
            for row in min_row..=max_row {
                let c = Coord {
                    x: col as f64 * resolution,
                    y: row as f64 * resolution,
                };
                if projected.contains(&Point::from(c)) {
                    points.push(SamplePoint {
                        location: self.to_wgs84(c),
                        cell: SampleCell::Grid { col, row },
                    });
                }
            }
        }

        SampleGrid {
            points,
            mask: Some(mask),
        }
    }

    fn radial(&self, count: usize) -> SampleGrid {
        let points: Vec<SamplePoint> = radial_points(self.origin, self.max_distance, count)
            .into_iter()
            .enumerate()
            .map(|(index, location)| SamplePoint {
                location,
                cell: SampleCell::Radial { index },
            })
            .collect();

        let mask = (points.len() >= 3)
            .then(|| Polygon::new(points.iter().map(|p| p.location).collect(), vec![]));

        SampleGrid { points, mask }
    }

    fn to_wgs84(&self, projected: Coord) -> Coord {
        geodesy::round_coord(self.projection.unproject(projected))
    }
}

fn grid_span(min: f64, max: f64, step: f64) -> (i64, i64) {
    ((min / step).ceil() as i64, (max / step).floor() as i64)
}

/// Endpoints at `distance` meters along bearings `360 / count * i`
pub fn radial_points(origin: Coord, distance: f64, count: usize) -> Vec<Coord> {
    (0..count)
        .map(|i| {
            let bearing = 360.0 / count as f64 * i as f64;
            geodesy::round_coord(geodesy::destination(origin, bearing, distance))
        })
        .collect()
}

/// Geodesic circle approximated by `steps` vertices
pub fn disc(center: Coord, radius: f64, steps: usize) -> Polygon<f64> {
    let ring: Vec<Coord> = (0..steps)
        .map(|i| geodesy::destination(center, 360.0 / steps as f64 * i as f64, radius))
        .collect();
    Polygon::new(LineString::from(ring), vec![])
}

/// Flat-topped hexagons with side `side` meters covering `bbox`
pub fn hex_grid(bbox: Rect<f64>, side: f64) -> Vec<Polygon<f64>> {
    let projection = LocalProjection::new(bbox.center());
    let min = projection.project(bbox.min());
    let max = projection.project(bbox.max());

    let dx = 1.5 * side;
    let dy = SQRT_3 * side;
    let cols = ((max.x - min.x) / dx).ceil() as i64;
    let rows = ((max.y - min.y) / dy).ceil() as i64;

    let mut hexagons = Vec::new();
    for col in 0..=cols {
        let x = min.x + col as f64 * dx;
        let offset = if col % 2 == 1 { dy / 2.0 } else { 0.0 };
        for row in 0..=rows {
            let y = min.y + row as f64 * dy + offset;
            if y - dy / 2.0 > max.y || x - side > max.x {
                continue;
            }
            let ring: Vec<Coord> = (0..6)
                .map(|k| {
                    let angle = (60.0 * k as f64).to_radians();
                    let vertex = Coord {
                        x: x + side * angle.cos(),
                        y: y + side * angle.sin(),
                    };
                    geodesy::round_coord(projection.unproject(vertex))
                })
                .collect();
            hexagons.push(Polygon::new(LineString::from(ring), vec![]));
        }
    }
    hexagons
}
