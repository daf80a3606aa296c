//! Flat rows handed to exporters.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::geometry::{Feature, GeometryKind};
use crate::model::Tags;

/// Prefix of the columns holding tag values.
pub const TAG_PREFIX: &str = "tags.";

/// A resolved feature flattened for tabular export.
///
/// Serializes to a flat map:
/// `{"id", "Region", "Type", "lonlat", "refs", "tags.<key>"...}`, where `refs`
/// is omitted for nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub id: i64,
    pub region: String,
    pub kind: GeometryKind,
    /// `[lon, lat]` pairs in decimal degrees.
    pub lonlat: Vec<[f64; 2]>,
    pub refs: Option<Vec<i64>>,
    pub tags: Tags,
}

impl Row {
    /// Tag columns with their namespaced names.
    pub fn tag_columns(&self) -> impl Iterator<Item = (String, &str)> + '_ {
        self.tags
            .iter()
            .map(|(key, value)| (format!("{}{}", TAG_PREFIX, key), value.as_str()))
    }
}

/// Converts a resolved feature into a row.
pub fn flatten(feature: Feature, region: &str) -> Row {
    let Feature {
        id,
        kind,
        coords,
        refs,
        tags,
    } = feature;
    Row {
        id,
        region: region.to_owned(),
        kind,
        lonlat: coords.iter().map(|c| c.lonlat()).collect(),
        refs: match kind {
            GeometryKind::Node => None,
            GeometryKind::Way | GeometryKind::Area => refs,
        },
        tags,
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("Region", &self.region)?;
        map.serialize_entry("Type", &self.kind)?;
        map.serialize_entry("lonlat", &self.lonlat)?;
        if let Some(ref refs) = self.refs {
            map.serialize_entry("refs", refs)?;
        }
        for (column, value) in self.tag_columns() {
            map.serialize_entry(&column, value)?;
        }
        map.end()
    }
}
