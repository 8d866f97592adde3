//! Points of interest from a tagged feature source
//!
//! A feature belongs to a category when one of the category's keys carries one
//! of its values. Areas are reduced to their centroid; public transport stops
//! are only taken from point features. A feature can land in more than one
//! category.

use std::collections::BTreeMap;

use geo::{Centroid, Coord};
use log::debug;
use serde::{Deserialize, Serialize};

use super::geojson::Geometry;
use super::records::{FeatureRecord, PoiRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoiCategory {
    Shops,
    PublicTransport,
    Schools,
}

impl PoiCategory {
    pub const ALL: [PoiCategory; 3] = [PoiCategory::Shops, PoiCategory::PublicTransport, PoiCategory::Schools];

    /// `(key, accepted values)` pairs, any of which qualifies a feature
    fn rules(self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            PoiCategory::Shops => &[("shop", &["supermarket", "bakery", "deli", "convenience", "food"])],
            PoiCategory::PublicTransport => &[("highway", &["bus_stop"]), ("railway", &["station", "tram_stop"])],
            PoiCategory::Schools => &[("amenity", &["school", "kindergarten", "college", "university"])],
        }
    }

    fn accepts_areas(self) -> bool {
        !matches!(self, PoiCategory::PublicTransport)
    }

    /// The tags that qualify `tags` for this category, `None` if there are none
    fn matching_tags(self, tags: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
        let matched: BTreeMap<String, String> = self
            .rules()
            .iter()
            .filter_map(|(key, values)| {
                let value = tags.get(*key)?;
                values
                    .contains(&value.as_str())
                    .then(|| (key.to_string(), value.clone()))
            })
            .collect();
        (!matched.is_empty()).then_some(matched)
    }
}

/// Representative location of a feature, and whether it came from an area
fn location(geometry: &Geometry) -> Option<(Coord, bool)> {
    match geometry {
        Geometry::Point { .. } => geometry.as_point().ok().map(|c| (c, false)),
        Geometry::Polygon { .. } => {
            let polygon = geometry.as_polygon().ok()?;
            polygon.centroid().map(|p| (p.0, true))
        }
        _ => None,
    }
}

/// Every category `feature` belongs to, as POI records
pub fn classify(feature: &FeatureRecord) -> Vec<PoiRecord> {
    let Some((location, is_area)) = location(&feature.geometry) else {
        debug!("Skipping {} feature", feature.geometry.kind());
        return Vec::new();
    };

    PoiCategory::ALL
        .iter()
        .filter(|category| !is_area || category.accepts_areas())
        .filter_map(|category| {
            let tags = category.matching_tags(&feature.tags)?;
            Some(PoiRecord {
                category: *category,
                tags,
                geometry: Geometry::point(location),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(tags: &[(&str, &str)], geometry: Geometry) -> FeatureRecord {
        FeatureRecord {
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            geometry,
        }
    }

    fn point() -> Geometry {
        Geometry::point(Coord { x: 4.9, y: 52.37 })
    }

    fn square() -> Geometry {
        Geometry::Polygon {
            coordinates: vec![vec![[4.0, 52.0], [4.2, 52.0], [4.2, 52.2], [4.0, 52.2], [4.0, 52.0]]],
        }
    }

    #[test]
    fn test_shop_point() {
        let pois = classify(&feature(&[("shop", "bakery"), ("name", "Bakker")], point()));
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].category, PoiCategory::Shops);
        assert_eq!(pois[0].tags.len(), 1);
        assert_eq!(pois[0].tags["shop"], "bakery");
    }

    #[test]
    fn test_unlisted_values_are_ignored() {
        assert!(classify(&feature(&[("shop", "furniture")], point())).is_empty());
        assert!(classify(&feature(&[("amenity", "bench")], point())).is_empty());
        assert!(classify(&feature(&[], point())).is_empty());
    }

    #[test]
    fn test_school_area_uses_centroid() {
        let pois = classify(&feature(&[("amenity", "school")], square()));
        assert_eq!(pois.len(), 1);
        assert_eq!(pois[0].category, PoiCategory::Schools);
        let c = pois[0].geometry.as_point().unwrap();
        assert!((c.x - 4.1).abs() < 1e-9 && (c.y - 52.1).abs() < 1e-9);
    }

    #[test]
    fn test_stations_only_from_points() {
        let stop = classify(&feature(&[("railway", "tram_stop")], point()));
        assert_eq!(stop.len(), 1);
        assert_eq!(stop[0].category, PoiCategory::PublicTransport);

        assert!(classify(&feature(&[("railway", "station")], square())).is_empty());
    }

    #[test]
    fn test_feature_in_two_categories() {
        let pois = classify(&feature(&[("shop", "convenience"), ("highway", "bus_stop")], point()));
        let categories: Vec<PoiCategory> = pois.iter().map(|p| p.category).collect();
        assert_eq!(categories, vec![PoiCategory::Shops, PoiCategory::PublicTransport]);
    }

    #[test]
    fn test_lines_are_skipped() {
        let line = Geometry::line_string(&[Coord { x: 4.0, y: 52.0 }, Coord { x: 4.1, y: 52.0 }]);
        assert!(classify(&feature(&[("shop", "deli")], line)).is_empty());
    }
}
