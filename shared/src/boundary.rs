use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;

use crate::colors::{Color, color_for};

/// One `[lon, lat]` (or planar `[x, y]`) vertex.
pub type Coord = [f64; 2];
/// A closed ring. The closing vertex may or may not repeat the first one.
pub type Ring = Vec<Coord>;
/// Outer ring followed by any hole rings.
pub type Polygon = Vec<Ring>;

/// Boundary dataset as delivered by the loader: a GeoJSON-style feature collection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub properties: FeatureProperties,
    pub geometry: Option<RawGeometry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureProperties {
    #[serde(default)]
    pub name: Option<String>,
}

/// Geometry kept loosely typed so one unsupported feature doesn't reject the whole dataset.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetError {
    MissingName { index: usize },
    DuplicateName { index: usize, name: String },
    MissingGeometry { index: usize },
    UnsupportedGeometry { index: usize, kind: String },
    MalformedCoordinates { index: usize },
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingName { index } => write!(f, "feature {index} has no name"),
            Self::DuplicateName { index, name } => {
                write!(f, "feature {index} repeats region name {name:?}")
            }
            Self::MissingGeometry { index } => write!(f, "feature {index} has no geometry"),
            Self::UnsupportedGeometry { index, kind } => {
                write!(f, "feature {index} has unsupported geometry type {kind:?}")
            }
            Self::MalformedCoordinates { index } => {
                write!(f, "feature {index} has malformed coordinates")
            }
        }
    }
}

/// Axis-aligned envelope in dataset coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub const EMPTY: Self = Self {
        min_x: f64::INFINITY,
        min_y: f64::INFINITY,
        max_x: f64::NEG_INFINITY,
        max_y: f64::NEG_INFINITY,
    };

    pub fn include(&mut self, [x, y]: Coord) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.min_x <= self.max_x && self.min_y <= self.max_y)
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A named, colored claimable territory.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub polygons: Vec<Polygon>,
    pub color: Color,
    pub bounds: Bounds,
}

impl Region {
    /// Build a region whose color comes from its position in dataset order.
    pub fn new(name: impl Into<String>, polygons: Vec<Polygon>, dataset_index: usize) -> Self {
        let mut bounds = Bounds::EMPTY;
        for ring in polygons.iter().flatten() {
            for &coord in ring {
                bounds.include(coord);
            }
        }
        Self {
            name: name.into(),
            polygons,
            color: color_for(dataset_index),
            bounds,
        }
    }
}

/// Convert a feature collection into regions, one per usable feature.
///
/// Colors are keyed by the feature's dataset index, so skipping a broken
/// feature never shifts the colors of the features after it.
pub fn load_regions(collection: &FeatureCollection) -> (Vec<Region>, Vec<DatasetError>) {
    let mut regions = Vec::with_capacity(collection.features.len());
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (index, feature) in collection.features.iter().enumerate() {
        let Some(name) = feature
            .properties
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            errors.push(DatasetError::MissingName { index });
            continue;
        };
        if !seen.insert(name.to_string()) {
            errors.push(DatasetError::DuplicateName {
                index,
                name: name.to_string(),
            });
            continue;
        }
        let Some(geometry) = feature.geometry.as_ref() else {
            errors.push(DatasetError::MissingGeometry { index });
            continue;
        };
        match parse_geometry(geometry, index) {
            Ok(polygons) => regions.push(Region::new(name, polygons, index)),
            Err(e) => errors.push(e),
        }
    }

    (regions, errors)
}

fn parse_geometry(geometry: &RawGeometry, index: usize) -> Result<Vec<Polygon>, DatasetError> {
    let malformed = || DatasetError::MalformedCoordinates { index };
    match geometry.kind.as_str() {
        "Polygon" => {
            let polygon: Polygon =
                serde_json::from_value(geometry.coordinates.clone()).map_err(|_| malformed())?;
            Ok(vec![polygon])
        }
        "MultiPolygon" => {
            serde_json::from_value(geometry.coordinates.clone()).map_err(|_| malformed())
        }
        other => Err(DatasetError::UnsupportedGeometry {
            index,
            kind: other.to_string(),
        }),
    }
}

/// Region names in alphabetical order, for the region chooser.
pub fn sorted_names(regions: &[Region]) -> Vec<String> {
    let mut names: Vec<String> = regions.iter().map(|r| r.name.clone()).collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(json: &str) -> FeatureCollection {
        serde_json::from_str(json).expect("test dataset should parse")
    }

    #[test]
    fn loads_polygon_and_multipolygon_features() {
        let fc = collection(
            r#"{"type":"FeatureCollection","features":[
                {"properties":{"name":"Ankara"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[2,0],[2,2],[0,2],[0,0]]]}},
                {"properties":{"name":"Izmir"},"geometry":{"type":"MultiPolygon","coordinates":[
                    [[[3,3],[4,3],[4,4],[3,3]]],
                    [[[5,5],[6,5],[6,7],[5,5]]]
                ]}}
            ]}"#,
        );

        let (regions, errors) = load_regions(&fc);
        assert!(errors.is_empty());
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].name, "Ankara");
        assert_eq!(regions[0].polygons.len(), 1);
        assert_eq!(regions[1].polygons.len(), 2);
        assert_eq!(regions[1].bounds.min_x, 3.0);
        assert_eq!(regions[1].bounds.max_y, 7.0);
    }

    #[test]
    fn skipped_features_keep_later_colors_stable() {
        let fc = collection(
            r#"{"features":[
                {"properties":{"name":"A"},"geometry":{"type":"Point","coordinates":[0,0]}},
                {"properties":{"name":"B"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}}
            ]}"#,
        );

        let (regions, errors) = load_regions(&fc);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].color, color_for(1));
        assert_eq!(
            errors,
            vec![DatasetError::UnsupportedGeometry {
                index: 0,
                kind: "Point".to_string()
            }]
        );
    }

    #[test]
    fn rejects_missing_and_duplicate_names() {
        let fc = collection(
            r#"{"features":[
                {"properties":{},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}},
                {"properties":{"name":"A"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}},
                {"properties":{"name":"A"},"geometry":{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1]]]}},
                {"properties":{"name":"B"},"geometry":{"type":"Polygon","coordinates":"nope"}},
                {"properties":{"name":"C"},"geometry":null}
            ]}"#,
        );

        let (regions, errors) = load_regions(&fc);
        assert_eq!(regions.len(), 1);
        assert_eq!(errors.len(), 4);
        assert!(matches!(errors[0], DatasetError::MissingName { index: 0 }));
        assert!(matches!(errors[1], DatasetError::DuplicateName { index: 2, .. }));
        assert!(matches!(
            errors[2],
            DatasetError::MalformedCoordinates { index: 3 }
        ));
        assert!(matches!(errors[3], DatasetError::MissingGeometry { index: 4 }));
    }

    #[test]
    fn sorted_names_are_alphabetical() {
        let regions = vec![
            Region::new("Zonguldak", Vec::new(), 0),
            Region::new("Adana", Vec::new(), 1),
            Region::new("Mersin", Vec::new(), 2),
        ];
        assert_eq!(sorted_names(&regions), vec!["Adana", "Mersin", "Zonguldak"]);
    }
}
