//! NDJSON records exchanged between pipeline stages
//!
//! Every stage reads one record type from stdin and writes another to stdout,
//! one JSON object per line. Field names are camelCase on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::directness::RouteAnalysis;
use super::geojson::Geometry;
use super::hull::AreaSummary;
use super::pois::PoiCategory;

/// One address point from the address source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    #[serde(default, rename = "osmId", skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub housenumber: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
    pub geometry: Geometry,
}

/// A mapped feature with its OSM tags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(default, alias = "properties")]
    pub tags: BTreeMap<String, String>,
    pub geometry: Geometry,
}

/// A point of interest, tagged with its category
///
/// The tags that put the feature in its category are written next to `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoiRecord {
    #[serde(rename = "type")]
    pub category: PoiCategory,
    #[serde(flatten)]
    pub tags: BTreeMap<String, String>,
    pub geometry: Geometry,
}

/// A postal area and the address chosen to represent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginRecord {
    pub postcode: String,
    pub origin: Geometry,
}

/// Snapped locations reachable from an origin, furthest-in-time first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReachabilityRecord {
    pub postcode: String,
    pub origin: Geometry,
    pub durations: Vec<u32>,
    pub geometry: Geometry,
}

/// Routes from an origin to each reachable location
///
/// `distances` and `durations` cover every fetched route, `geometry` only the
/// routes listed in `filteredRouteIndexes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutesRecord {
    pub postcode: String,
    pub origin: Geometry,
    pub distances: Vec<f64>,
    pub durations: Vec<f64>,
    pub filtered_route_indexes: Vec<usize>,
    pub geometry: Geometry,
}

/// A routes record with its serviced area and directness figures attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    #[serde(flatten)]
    pub routes_record: RoutesRecord,
    pub area: AreaSummary,
    pub routes: RouteAnalysis,
}

/// Output of the radial stage, three per origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RadialRecord {
    Origin {
        postcode: String,
        #[serde(rename = "meanDistanceRatio")]
        mean_distance_ratio: Option<f64>,
        geometry: Geometry,
    },
    ConcaveHull {
        postcode: String,
        #[serde(rename = "meanDistanceRatio")]
        mean_distance_ratio: Option<f64>,
        area: f64,
        geometry: Geometry,
    },
    Routes {
        postcode: String,
        #[serde(rename = "meanDistanceRatio")]
        mean_distance_ratio: Option<f64>,
        geometry: Geometry,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HexagonRecord {
    pub geometry: Geometry,
}

/// The address representing one hexagon, readable as an [`OriginRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HexagonOriginRecord {
    #[serde(default, rename = "osmId", skip_serializing_if = "Option::is_none")]
    pub osm_id: Option<i64>,
    pub housenumber: String,
    pub postcode: String,
    pub origin: Geometry,
}

/// Routes along evenly spaced bearings at the full travel distance
///
/// Per-route arrays are aligned with each other and with `routes`; bearings
/// whose route failed are left out of all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectRoutesRecord {
    pub postcode: String,
    pub origin: Geometry,
    /// Every requested destination, failed or not
    pub destinations: Geometry,
    /// Meters between each destination and where its route ends
    pub distances_to_destination: Vec<f64>,
    pub mean_distance_to_destination: Option<f64>,
    /// `null` for routes that end where they start
    pub distance_ratios: Vec<Option<f64>>,
    pub mean_distance_ratio: Option<f64>,
    pub routes: Geometry,
}

/// A fixed-length piece of a simplified route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteChunk {
    pub route: usize,
    pub index: usize,
    pub geometry: Geometry,
}

/// Analysis output reduced for map display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRecord {
    pub postcode: String,
    pub area: Geometry,
    pub chunks: Vec<RouteChunk>,
}
