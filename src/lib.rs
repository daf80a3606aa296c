//! Extraction of tagged OpenStreetMap features from osm.pbf files.
//!
//! The entry point is [`extract`]: it scans a PBF file for the nodes, ways and
//! relations selected by a [`TagFilter`], resolves the coordinates of all
//! referenced nodes, and returns an [`Extraction`] which yields flat [`Row`]s.
//!
//! ```no_run
//! use osmfeatures::{extract, ExtractConfig, TagFilter};
//!
//! let filter = TagFilter::new("power", ["line", "cable"])?;
//! let extraction = extract("germany.osm.pbf", &filter, "de", &ExtractConfig::parallel())?;
//! for row in extraction.rows() {
//!     println!("{} {} {:?}", row.id, row.kind, row.lonlat);
//! }
//! # Ok::<(), osmfeatures::Error>(())
//! ```

mod config;
mod decode;
mod error;
mod extract;
mod filter;
mod geometry;
mod model;
pub mod osmpbf;
mod parallel;
mod resolve;
mod row;
mod stats;
mod strings;

pub use crate::config::ExtractConfig;
pub use crate::decode::{decode_block, delta_decode, BlockDecoder};
pub use crate::error::{Error, Phase, Result};
pub use crate::extract::{extract, extract_from_bytes, Extraction, Rows};
pub use crate::filter::{tag_value_matches, TagFilter, VALUE_SEPARATOR, WILDCARD_PREFIX};
pub use crate::geometry::{
    assemble, try_assemble, CoordinateLookup, Dropped, Feature, GeometryKind, MIN_AREA_POINTS,
    MIN_WAY_POINTS,
};
pub use crate::model::{Coord, Entity, Member, MemberType, Node, Relation, Tags, Way, NANODEGREES};
pub use crate::osmpbf::{BlobType, BlockIndex, BlockIndexIterator, BlockType, BlockTypes, PbfFile};
pub use crate::resolve::{
    scan_candidates_block, scan_coordinates_block, scan_ways_block, CandidateFindings, Resolution,
    Resolver,
};
pub use crate::row::{flatten, Row, TAG_PREFIX};
pub use crate::stats::Stats;
pub use crate::strings::StringTable;
