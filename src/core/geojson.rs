//! GeoJSON geometries as they travel between pipeline stages
//!
//! Only the geometry kinds this toolkit reads or writes are modelled. Positions
//! are `[lon, lat]` in WGS84.

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use catchment_common::{Error, Result};

/// `[lon, lat]`
pub type Position = [f64; 2];

/// A GeoJSON geometry, tagged by its `type` member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
}

fn position(c: Coord) -> Position {
    [c.x, c.y]
}

fn coord(p: &Position) -> Coord {
    Coord { x: p[0], y: p[1] }
}

fn ring_positions(ring: &LineString<f64>) -> Vec<Position> {
    ring.coords().map(|c| position(*c)).collect()
}

impl Geometry {
    pub fn point(c: Coord) -> Self {
        Geometry::Point {
            coordinates: position(c),
        }
    }

    pub fn multi_point(coords: &[Coord]) -> Self {
        Geometry::MultiPoint {
            coordinates: coords.iter().copied().map(position).collect(),
        }
    }

    pub fn line_string(coords: &[Coord]) -> Self {
        Geometry::LineString {
            coordinates: coords.iter().copied().map(position).collect(),
        }
    }

    pub fn multi_line_string(lines: &[Vec<Coord>]) -> Self {
        Geometry::MultiLineString {
            coordinates: lines
                .iter()
                .map(|line| line.iter().copied().map(position).collect())
                .collect(),
        }
    }

    pub fn polygon(polygon: &Polygon<f64>) -> Self {
        let mut rings = vec![ring_positions(polygon.exterior())];
        rings.extend(polygon.interiors().iter().map(ring_positions));
        Geometry::Polygon { coordinates: rings }
    }

    /// GeoJSON type name
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
        }
    }

    fn unexpected(&self, expected: &str) -> Error {
        Error::InvalidRecord(format!("expected {expected}, got {}", self.kind()))
    }

    pub fn as_point(&self) -> Result<Coord> {
        match self {
            Geometry::Point { coordinates } => Ok(coord(coordinates)),
            other => Err(other.unexpected("Point")),
        }
    }

    pub fn as_multi_point(&self) -> Result<Vec<Coord>> {
        match self {
            Geometry::MultiPoint { coordinates } => Ok(coordinates.iter().map(coord).collect()),
            other => Err(other.unexpected("MultiPoint")),
        }
    }

    pub fn as_line_string(&self) -> Result<Vec<Coord>> {
        match self {
            Geometry::LineString { coordinates } => Ok(coordinates.iter().map(coord).collect()),
            other => Err(other.unexpected("LineString")),
        }
    }

    pub fn as_multi_line_string(&self) -> Result<Vec<Vec<Coord>>> {
        match self {
            Geometry::MultiLineString { coordinates } => Ok(coordinates
                .iter()
                .map(|line| line.iter().map(coord).collect())
                .collect()),
            other => Err(other.unexpected("MultiLineString")),
        }
    }

    pub fn as_polygon(&self) -> Result<Polygon<f64>> {
        match self {
            Geometry::Polygon { coordinates } => {
                let mut rings = coordinates
                    .iter()
                    .map(|ring| LineString::from(ring.iter().map(coord).collect::<Vec<_>>()));
                let exterior = rings
                    .next()
                    .ok_or_else(|| Error::InvalidRecord("polygon without rings".to_string()))?;
                Ok(Polygon::new(exterior, rings.collect()))
            }
            other => Err(other.unexpected("Polygon")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_serializes_with_type_tag() {
        let geometry = Geometry::point(Coord { x: 4.9, y: 52.37 });
        let json = serde_json::to_string(&geometry).unwrap();
        assert_eq!(json, r#"{"type":"Point","coordinates":[4.9,52.37]}"#);
    }

    #[test]
    fn test_parse_multi_line_string() {
        let json = r#"{"type":"MultiLineString","coordinates":[[[4.0,52.0],[4.1,52.1]],[[4.0,52.0],[3.9,51.9]]]}"#;
        let geometry: Geometry = serde_json::from_str(json).unwrap();
        let lines = geometry.as_multi_line_string().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1][1], Coord { x: 3.9, y: 51.9 });
    }

    #[test]
    fn test_unknown_geometry_type_is_rejected() {
        let json = r#"{"type":"GeometryCollection","geometries":[]}"#;
        assert!(serde_json::from_str::<Geometry>(json).is_err());
    }

    #[test]
    fn test_wrong_kind_is_invalid_record() {
        let geometry = Geometry::multi_point(&[Coord { x: 1.0, y: 2.0 }]);
        match geometry.as_point() {
            Err(Error::InvalidRecord(msg)) => assert!(msg.contains("MultiPoint")),
            other => panic!("expected InvalidRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_polygon_keeps_holes() {
        let exterior = LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]);
        let hole = LineString::from(vec![(1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 1.0)]);
        let polygon = Polygon::new(exterior, vec![hole]);

        let geometry = Geometry::polygon(&polygon);
        let parsed: Geometry = serde_json::from_str(&serde_json::to_string(&geometry).unwrap()).unwrap();
        let back = parsed.as_polygon().unwrap();
        assert_eq!(back.interiors().len(), 1);
        assert_eq!(back, polygon);
    }
}
