//! Decoding of primitive blocks into nodes, ways and relations.

use itertools::izip;
use log::trace;
use prost::Message;

use crate::error::{Error, Result};
use crate::model::{Coord, Entity, Member, MemberType, Node, Relation, Tags, Way};
use crate::osmpbf;
use crate::strings::StringTable;

/// Reconstructs absolute values from a delta-encoded sequence by a running sum.
///
/// Returns `None` if the sum leaves the range of `i64`.
pub fn delta_decode(deltas: &[i64]) -> Option<Vec<i64>> {
    let mut acc = 0i64;
    deltas
        .iter()
        .map(|&delta| {
            acc = acc.checked_add(delta)?;
            Some(acc)
        })
        .collect()
}

/// Running sums of the id, lat and lon columns of dense nodes.
#[derive(Default)]
struct DenseCursor {
    id: i64,
    lat: i64,
    lon: i64,
}

impl DenseCursor {
    fn advance(&mut self, id: i64, lat: i64, lon: i64) -> Option<()> {
        self.id = self.id.checked_add(id)?;
        self.lat = self.lat.checked_add(lat)?;
        self.lon = self.lon.checked_add(lon)?;
        Some(())
    }
}

/// Decoder of a single primitive block.
///
/// The string table is resolved once when the decoder is created. Decoding of
/// the individual primitive kinds is done on demand, so that a scan interested
/// only in node coordinates never materializes ways or relations.
pub struct BlockDecoder<'a> {
    block: &'a osmpbf::PrimitiveBlock,
    strings: StringTable,
    offset: u64,
}

impl<'a> BlockDecoder<'a> {
    pub fn new(block: &'a osmpbf::PrimitiveBlock, offset: u64) -> Result<Self> {
        if block.primitivegroup.iter().any(|group| !group.nodes.is_empty()) {
            return Err(Error::UnsupportedSparseNodes { offset });
        }
        let strings = StringTable::decode(&block.stringtable, offset)?;
        Ok(Self {
            block,
            strings,
            offset,
        })
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    fn tags(&self, keys: &[u32], vals: &[u32]) -> Result<Tags> {
        if keys.len() != vals.len() {
            return Err(Error::truncated(
                self.offset,
                format!("{} tag keys but {} tag values", keys.len(), vals.len()),
            ));
        }
        keys.iter()
            .zip(vals)
            .map(|(&k, &v)| Ok((self.strings.get(k)?.to_owned(), self.strings.get(v)?.to_owned())))
            .collect()
    }

    fn coord(&self, id: i64, lon: i64, lat: i64) -> Result<Coord> {
        let granularity = i64::from(self.block.granularity());
        let scale = |offset: i64, value: i64| granularity.checked_mul(value)?.checked_add(offset);
        match (
            scale(self.block.lon_offset(), lon),
            scale(self.block.lat_offset(), lat),
        ) {
            (Some(lon), Some(lat)) => Ok(Coord::new(lon, lat)),
            _ => Err(Error::truncated(
                self.offset,
                format!("coordinates of node {} out of range", id),
            )),
        }
    }

    fn overflow(&self, what: &str) -> Error {
        Error::truncated(self.offset, format!("delta-encoded {} overflow", what))
    }

    fn dense_columns<'d>(&self, dense: &'d osmpbf::DenseNodes) -> Result<&'d [i64]> {
        if dense.id.len() != dense.lat.len() || dense.id.len() != dense.lon.len() {
            return Err(Error::truncated(
                self.offset,
                format!(
                    "dense nodes with {} ids, {} lats and {} lons",
                    dense.id.len(),
                    dense.lat.len(),
                    dense.lon.len()
                ),
            ));
        }
        Ok(&dense.id)
    }

    /// Decodes the ids and coordinates of all dense nodes, skipping their tags.
    pub fn coordinates(&self) -> Result<Vec<(i64, Coord)>> {
        let mut result = Vec::new();
        for dense in self.block.primitivegroup.iter().filter_map(|g| g.dense.as_ref()) {
            let ids = self.dense_columns(dense)?;
            let mut cursor = DenseCursor::default();
            for i in 0..ids.len() {
                cursor
                    .advance(ids[i], dense.lat[i], dense.lon[i])
                    .ok_or_else(|| self.overflow("dense node columns"))?;
                result.push((cursor.id, self.coord(cursor.id, cursor.lon, cursor.lat)?));
            }
        }
        Ok(result)
    }

    /// Decodes all dense nodes including their tags.
    ///
    /// Tags of dense nodes are stored in a single interleaved list of
    /// `(key, value)` string indices for all nodes of the group. The tags of
    /// consecutive nodes are separated by a single `0`. If no node in the group
    /// has tags, the list is empty.
    pub fn nodes(&self) -> Result<Vec<Node>> {
        let mut result = Vec::new();
        for dense in self.block.primitivegroup.iter().filter_map(|g| g.dense.as_ref()) {
            let ids = self.dense_columns(dense)?;
            let keys_vals = &dense.keys_vals;
            let mut cursor = DenseCursor::default();
            let mut tags_offset = 0;

            for i in 0..ids.len() {
                cursor
                    .advance(ids[i], dense.lat[i], dense.lon[i])
                    .ok_or_else(|| self.overflow("dense node columns"))?;
                let id = cursor.id;

                let mut tags = Tags::new();
                if !keys_vals.is_empty() {
                    loop {
                        let k = *keys_vals.get(tags_offset).ok_or_else(|| {
                            Error::truncated(self.offset, format!("tags of node {} not terminated", id))
                        })?;
                        tags_offset += 1;

                        if k == 0 {
                            break; // separator
                        }

                        let v = *keys_vals.get(tags_offset).ok_or_else(|| {
                            Error::truncated(self.offset, format!("tag of node {} without value", id))
                        })?;
                        tags_offset += 1;

                        tags.insert(self.strings.get(k)?.to_owned(), self.strings.get(v)?.to_owned());
                    }
                }

                result.push(Node {
                    id,
                    tags,
                    coord: self.coord(id, cursor.lon, cursor.lat)?,
                });
            }

            if tags_offset != keys_vals.len() {
                return Err(Error::truncated(
                    self.offset,
                    format!(
                        "{} trailing dense tag indices",
                        keys_vals.len() - tags_offset
                    ),
                ));
            }
        }
        Ok(result)
    }

    pub fn ways(&self) -> Result<Vec<Way>> {
        let mut result = Vec::new();
        for group in &self.block.primitivegroup {
            for pbf_way in &group.ways {
                result.push(Way {
                    id: pbf_way.id,
                    tags: self.tags(&pbf_way.keys, &pbf_way.vals)?,
                    refs: delta_decode(&pbf_way.refs)
                        .ok_or_else(|| self.overflow("way refs"))?,
                });
            }
        }
        Ok(result)
    }

    pub fn relations(&self) -> Result<Vec<Relation>> {
        let mut result = Vec::new();
        for group in &self.block.primitivegroup {
            for pbf_relation in &group.relations {
                if pbf_relation.roles_sid.len() != pbf_relation.memids.len()
                    || pbf_relation.memids.len() != pbf_relation.types.len()
                {
                    return Err(Error::truncated(
                        self.offset,
                        format!("relation {} has inconsistent member lists", pbf_relation.id),
                    ));
                }

                let memids = delta_decode(&pbf_relation.memids)
                    .ok_or_else(|| self.overflow("relation member ids"))?;
                let members = izip!(&memids, &pbf_relation.types, &pbf_relation.roles_sid)
                    .map(|(&id, &member_type, &role)| {
                        let member_type = MemberType::from_i32(member_type).ok_or_else(|| {
                            Error::truncated(
                                self.offset,
                                format!(
                                    "relation {} has member of unknown type {}",
                                    pbf_relation.id, member_type
                                ),
                            )
                        })?;
                        Ok(Member {
                            id,
                            member_type,
                            role: self.strings.get(role)?.to_owned(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                result.push(Relation {
                    id: pbf_relation.id,
                    tags: self.tags(&pbf_relation.keys, &pbf_relation.vals)?,
                    members,
                });
            }
        }
        Ok(result)
    }

    /// Decodes all primitives of the block: nodes first, then ways and relations.
    pub fn entities(&self) -> Result<Vec<Entity>> {
        let mut result: Vec<Entity> = self.nodes()?.into_iter().map(Entity::Node).collect();
        result.extend(self.ways()?.into_iter().map(Entity::Way));
        result.extend(self.relations()?.into_iter().map(Entity::Relation));
        trace!("Decoded {} entities from block at offset {}", result.len(), self.offset);
        Ok(result)
    }
}

/// Decodes a decompressed `PrimitiveBlock` into entities.
pub fn decode_block(raw: &[u8], offset: u64) -> Result<Vec<Entity>> {
    let block = osmpbf::PrimitiveBlock::decode(raw).map_err(|e| Error::truncated(offset, e.to_string()))?;
    BlockDecoder::new(&block, offset)?.entities()
}
