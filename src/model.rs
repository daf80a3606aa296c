//! Decoded OSM primitives.

use std::collections::BTreeMap;

/// Free-form OSM tags of a single entity.
pub type Tags = BTreeMap<String, String>;

/// Factor between nanodegrees and degrees.
pub const NANODEGREES: f64 = 1e9;

/// Position of a node in nanodegrees.
///
/// Coordinates are kept in their fixed-point form, so equality is exact and
/// does not suffer from floating point rounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Coord {
    pub lon: i64,
    pub lat: i64,
}

impl Coord {
    pub fn new(lon: i64, lat: i64) -> Self {
        Self { lon, lat }
    }

    /// Longitude in decimal degrees.
    pub fn lon_degrees(&self) -> f64 {
        self.lon as f64 / NANODEGREES
    }

    /// Latitude in decimal degrees.
    pub fn lat_degrees(&self) -> f64 {
        self.lat as f64 / NANODEGREES
    }

    /// `[lon, lat]` pair in decimal degrees.
    pub fn lonlat(&self) -> [f64; 2] {
        [self.lon_degrees(), self.lat_degrees()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    pub tags: Tags,
    pub coord: Coord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    pub tags: Tags,
    /// Absolute ids of the referenced nodes, in order.
    pub refs: Vec<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

// indexed by the wire value of the member type
static MEMBER_TYPES: [MemberType; 3] = [MemberType::Node, MemberType::Way, MemberType::Relation];
static MEMBER_TYPE_NAMES: [&str; 3] = ["NODE", "WAY", "RELATION"];

impl MemberType {
    pub fn from_i32(value: i32) -> Option<Self> {
        usize::try_from(value)
            .ok()
            .and_then(|idx| MEMBER_TYPES.get(idx))
            .copied()
    }

    pub fn name(self) -> &'static str {
        MEMBER_TYPE_NAMES[self as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub member_type: MemberType,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub tags: Tags,
    pub members: Vec<Member>,
}

/// Any decoded primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Node(Node),
    Way(Way),
    Relation(Relation),
}

impl Entity {
    pub fn id(&self) -> i64 {
        match self {
            Entity::Node(node) => node.id,
            Entity::Way(way) => way.id,
            Entity::Relation(relation) => relation.id,
        }
    }

    pub fn tags(&self) -> &Tags {
        match self {
            Entity::Node(node) => &node.tags,
            Entity::Way(way) => &way.tags,
            Entity::Relation(relation) => &relation.tags,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_member_type_lookup() {
        assert_eq!(MemberType::from_i32(0), Some(MemberType::Node));
        assert_eq!(MemberType::from_i32(1), Some(MemberType::Way));
        assert_eq!(MemberType::from_i32(2), Some(MemberType::Relation));
        assert_eq!(MemberType::from_i32(3), None);
        assert_eq!(MemberType::from_i32(-1), None);
        assert_eq!(MemberType::Way.name(), "WAY");
    }

    #[test]
    fn test_coord_degrees() {
        let coord = Coord::new(10_100_000_000, -20_000_000_000);
        assert_eq!(coord.lonlat(), [10.1, -20.0]);
    }
}
