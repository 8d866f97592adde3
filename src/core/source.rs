//! Origins from an address point source
//!
//! Addresses are grouped into postal areas by a postcode prefix. Each area is
//! represented by the address closest to the centroid of all its addresses.
//! Alternatively every hexagon of a grid is represented by the numbered
//! address inside it that lies closest to its center.

use std::collections::BTreeMap;
use std::path::Path;

use geo::{BoundingRect, Coord, Intersects, Point, Polygon};
use log::debug;
use rstar::primitives::GeomWithData;
use rstar::{RTree, AABB};
use serde::Deserialize;

use catchment_common::{Error, Result};

use super::config::validate_postcode_length;
use super::error::SkipReason;
use super::geodesy;
use super::geojson::Geometry;
use super::records::{AddressRecord, HexagonOriginRecord, HexagonRecord, OriginRecord};

/// Postal area key of `postcode`, `None` for blank postcodes
///
/// Whitespace is dropped and letters upper-cased, so "1012 ab" and "1012AB"
/// land in the same area.
pub fn postcode_group(postcode: &str, length: usize) -> Option<String> {
    let normalized: String = postcode
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect();
    if normalized.is_empty() {
        return None;
    }
    if length == 6 {
        Some(normalized)
    } else {
        Some(normalized.chars().take(length).collect())
    }
}

fn centroid(points: &[Coord]) -> Option<Coord> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), c| (sx + c.x, sy + c.y));
    Some(Coord { x: sx / n, y: sy / n })
}

/// One origin per postal area, ordered by postcode
pub fn aggregate_origins(
    addresses: impl IntoIterator<Item = AddressRecord>,
    postcode_length: usize,
    boundary: Option<&Polygon<f64>>,
) -> Result<Vec<OriginRecord>> {
    validate_postcode_length(postcode_length)?;

    let mut areas: BTreeMap<String, Vec<Coord>> = BTreeMap::new();
    for address in addresses {
        let Some(group) = address
            .postcode
            .as_deref()
            .and_then(|p| postcode_group(p, postcode_length))
        else {
            continue;
        };
        let location = match address.geometry.as_point() {
            Ok(location) => location,
            Err(e) => {
                debug!("Skipping address in {group}: {e}");
                continue;
            }
        };
        if let Some(boundary) = boundary {
            if !boundary.intersects(&Point::from(location)) {
                continue;
            }
        }
        areas.entry(group).or_default().push(location);
    }

    Ok(areas
        .into_iter()
        .filter_map(|(postcode, points)| {
            let center = centroid(&points)?;
            let nearest = points.iter().copied().min_by(|a, b| {
                geodesy::distance(center, *a).total_cmp(&geodesy::distance(center, *b))
            })?;
            Some(OriginRecord {
                postcode,
                origin: Geometry::point(nearest),
            })
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct FeatureInput {
    geometry: Option<Geometry>,
}

/// The GeoJSON objects a boundary file may hold
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum GeoJsonContainer {
    Feature { geometry: Option<Geometry> },
    FeatureCollection { features: Vec<FeatureInput> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeoJsonInput {
    Container(GeoJsonContainer),
    Geometry(Geometry),
}

impl GeoJsonInput {
    fn into_geometry(self) -> Option<Geometry> {
        match self {
            GeoJsonInput::Container(GeoJsonContainer::Feature { geometry }) => geometry,
            GeoJsonInput::Container(GeoJsonContainer::FeatureCollection { features }) => {
                features.into_iter().next().and_then(|f| f.geometry)
            }
            GeoJsonInput::Geometry(geometry) => Some(geometry),
        }
    }
}

/// Parse a boundary polygon from GeoJSON: a bare Polygon, a Feature or the
/// first feature of a FeatureCollection
pub fn parse_boundary(json: &str) -> Result<Polygon<f64>> {
    let input: GeoJsonInput = serde_json::from_str(json)
        .map_err(|e| Error::InvalidInput(format!("boundary is not a GeoJSON geometry or feature: {e}")))?;
    let geometry = input
        .into_geometry()
        .ok_or_else(|| Error::InvalidInput("boundary has no geometry".to_string()))?;

    geometry
        .as_polygon()
        .map_err(|e| Error::InvalidInput(format!("boundary must be a polygon: {e}")))
}

pub fn load_boundary(path: &Path) -> Result<Polygon<f64>> {
    let json = std::fs::read_to_string(path)?;
    parse_boundary(&json)
}

/// An address usable as a hexagon origin
#[derive(Debug, Clone)]
struct NumberedAddress {
    osm_id: Option<i64>,
    housenumber: String,
    postcode: String,
    location: Coord,
}

/// Numbered, postcoded addresses indexed by location
pub struct AddressIndex {
    addresses: Vec<NumberedAddress>,
    tree: RTree<GeomWithData<[f64; 2], usize>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl AddressIndex {
    /// Index the addresses that carry both a house number and a postcode
    pub fn new(addresses: impl IntoIterator<Item = AddressRecord>) -> Self {
        let addresses: Vec<NumberedAddress> = addresses
            .into_iter()
            .filter_map(|address| {
                let location = address.geometry.as_point().ok()?;
                Some(NumberedAddress {
                    osm_id: address.osm_id,
                    housenumber: non_blank(address.housenumber)?,
                    postcode: non_blank(address.postcode)?,
                    location,
                })
            })
            .collect();
        let tree = RTree::bulk_load(
            addresses
                .iter()
                .enumerate()
                .map(|(i, a)| GeomWithData::new([a.location.x, a.location.y], i))
                .collect(),
        );
        Self { addresses, tree }
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// The address inside `hexagon` nearest to the center of its bounds
    pub fn nearest_inside(&self, hexagon: &Polygon<f64>) -> Option<HexagonOriginRecord> {
        let bounds = hexagon.bounding_rect()?;
        let center = bounds.center();
        let envelope = AABB::from_corners([bounds.min().x, bounds.min().y], [bounds.max().x, bounds.max().y]);

        let nearest = self
            .tree
            .locate_in_envelope(&envelope)
            .map(|entry| &self.addresses[entry.data])
            .filter(|a| hexagon.intersects(&Point::from(a.location)))
            .min_by(|a, b| {
                geodesy::distance(center, a.location).total_cmp(&geodesy::distance(center, b.location))
            })?;

        Some(HexagonOriginRecord {
            osm_id: nearest.osm_id,
            housenumber: nearest.housenumber.clone(),
            postcode: nearest.postcode.clone(),
            origin: Geometry::point(nearest.location),
        })
    }

    /// Origin of one hexagon record
    pub fn origin_for(&self, hexagon: &HexagonRecord) -> std::result::Result<HexagonOriginRecord, SkipReason> {
        let polygon = hexagon.geometry.as_polygon()?;
        self.nearest_inside(&polygon).ok_or(SkipReason::NoAddress)
    }
}
