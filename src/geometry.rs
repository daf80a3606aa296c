//! Assembly of way geometries from resolved node coordinates.

use ahash::AHashMap;
use log::debug;
use serde::Serialize;

use std::fmt;

use crate::model::{Coord, Node, Tags, Way};

/// Coordinates of nodes by id.
pub type CoordinateLookup = AHashMap<i64, Coord>;

/// Minimum number of points of an area: a closed ring of three distinct points.
pub const MIN_AREA_POINTS: usize = 4;
/// Minimum number of points of a polyline.
pub const MIN_WAY_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    Node,
    Way,
    Area,
}

impl GeometryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GeometryKind::Node => "node",
            GeometryKind::Way => "way",
            GeometryKind::Area => "area",
        }
    }

    /// Classifies a sequence of way coordinates.
    ///
    /// Returns `None` if the points cannot form any line.
    pub fn of_way(coords: &[Coord]) -> Option<GeometryKind> {
        if coords.len() >= MIN_AREA_POINTS && coords.first() == coords.last() {
            Some(GeometryKind::Area)
        } else if coords.len() >= MIN_WAY_POINTS {
            Some(GeometryKind::Way)
        } else {
            None
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node or way together with its complete geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: i64,
    pub kind: GeometryKind,
    pub coords: Vec<Coord>,
    /// Node references, only present for ways and areas.
    pub refs: Option<Vec<i64>>,
    pub tags: Tags,
}

impl Feature {
    pub fn from_node(node: &Node) -> Self {
        Self {
            id: node.id,
            kind: GeometryKind::Node,
            coords: vec![node.coord],
            refs: None,
            tags: node.tags.clone(),
        }
    }
}

/// Reason why a way could not be assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    MissingNode(i64),
    TooFewPoints(usize),
}

impl fmt::Display for Dropped {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Dropped::MissingNode(id) => write!(f, "references missing node {}", id),
            Dropped::TooFewPoints(n) => write!(f, "has only {} point(s)", n),
        }
    }
}

/// Joins the coordinates of the referenced nodes onto a way.
pub fn try_assemble(way: &Way, lookup: &CoordinateLookup) -> Result<Feature, Dropped> {
    let coords = way
        .refs
        .iter()
        .map(|id| lookup.get(id).copied().ok_or(Dropped::MissingNode(*id)))
        .collect::<Result<Vec<_>, _>>()?;
    let kind = GeometryKind::of_way(&coords).ok_or(Dropped::TooFewPoints(coords.len()))?;
    Ok(Feature {
        id: way.id,
        kind,
        coords,
        refs: Some(way.refs.clone()),
        tags: way.tags.clone(),
    })
}

/// Same as `try_assemble`, logging why a way is dropped.
pub fn assemble(way: &Way, lookup: &CoordinateLookup) -> Option<Feature> {
    match try_assemble(way, lookup) {
        Ok(feature) => Some(feature),
        Err(reason) => {
            debug!("Skipping way {}: {}", way.id, reason);
            None
        }
    }
}
