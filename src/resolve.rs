//! Resolution of references between filtered entities.
//!
//! Ways store only the ids of their nodes, and relations only the ids of their
//! members. Since a PBF file stores primitives disjointly, resolving the
//! geometry of the selected entities takes several scans over all blocks:
//!
//! 1. *candidates*: entities matching the filter are collected, together with
//!    the ids of all nodes referenced by matching ways, and the ids of nodes and
//!    ways referenced by matching relations.
//! 2. *member-ways*: ways referenced by matching relations, which do not match
//!    the filter themselves, are captured so that their nodes are resolved as
//!    well. Only a single hop is followed: relations referenced by relations
//!    are not expanded.
//! 3. *coordinates*: nodes referenced but not captured yet are collected.
//!
//! Every scan either runs on the calling thread or on a pool of workers. In
//! both cases the per-block results are merged in file order, so the outcome
//! does not depend on the execution mode.

use ahash::{AHashMap, AHashSet};
use log::{debug, info, trace, warn};
use pbr::ProgressBar;
use prost::Message;
use rayon::prelude::*;

use std::io::{self, Stderr};
use std::ops::ControlFlow;

use crate::config::ExtractConfig;
use crate::decode::BlockDecoder;
use crate::error::{Error, Phase, Result};
use crate::filter::TagFilter;
use crate::geometry::CoordinateLookup;
use crate::model::{Coord, MemberType, Node, Relation, Way};
use crate::osmpbf::{self, BlobType, BlockIndex, BlockIndexIterator, BlockType, BlockTypes};
use crate::parallel::parallel_process;
use crate::stats::Stats;

/// Entities selected by the filter in a single block.
#[derive(Debug, Default)]
pub struct CandidateFindings {
    pub nodes: Vec<Node>,
    pub ways: Vec<Way>,
    pub relations: Vec<Relation>,
}

/// Result of resolving all references of the filtered entities.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Nodes matching the filter, ascending by id.
    pub nodes: Vec<Node>,
    /// Ways matching the filter, ascending by id.
    pub ways: Vec<Way>,
    /// Relations matching the filter, ascending by id.
    pub relations: Vec<Relation>,
    /// Ways referenced by matching relations which do not match the filter.
    pub member_ways: Vec<Way>,
    /// Coordinates of all matching and referenced nodes.
    pub coordinates: CoordinateLookup,
    /// Referenced node ids without coordinates, ascending.
    pub unresolved: Vec<i64>,
    pub stats: Stats,
}

/// Decodes a block and selects the entities matching `filter`.
pub fn scan_candidates_block(
    data: &[u8],
    idx: &BlockIndex,
    filter: &TagFilter,
) -> Result<CandidateFindings> {
    let block: osmpbf::PrimitiveBlock = osmpbf::read_block(data, idx)?;
    let decoder = BlockDecoder::new(&block, idx.offset())?;
    trace!("Scanning block at offset {} for {}", idx.offset(), filter);
    Ok(CandidateFindings {
        nodes: decoder
            .nodes()?
            .into_iter()
            .filter(|node| filter.matches(&node.tags))
            .collect(),
        ways: decoder
            .ways()?
            .into_iter()
            .filter(|way| filter.matches(&way.tags))
            .collect(),
        relations: decoder
            .relations()?
            .into_iter()
            .filter(|relation| filter.matches(&relation.tags))
            .collect(),
    })
}

/// Decodes the ways of a block whose ids are in `targets`.
///
/// Blocks without ways are skipped without decoding their primitives.
pub fn scan_ways_block(data: &[u8], idx: &BlockIndex, targets: &AHashSet<i64>) -> Result<Vec<Way>> {
    let blob = osmpbf::read_blob(data, idx)?;
    if !BlockTypes::from_osmdata_blob(&blob, idx.offset())?.contains(BlockType::Ways) {
        return Ok(Vec::new());
    }
    let block = osmpbf::PrimitiveBlock::decode(blob.as_slice())
        .map_err(|e| Error::truncated(idx.offset(), e.to_string()))?;
    let ways = BlockDecoder::new(&block, idx.offset())?.ways()?;
    Ok(ways.into_iter().filter(|way| targets.contains(&way.id)).collect())
}

/// Decodes the coordinates of the dense nodes of a block whose ids are in `targets`.
///
/// Blocks without dense nodes are skipped without decoding their primitives.
pub fn scan_coordinates_block(
    data: &[u8],
    idx: &BlockIndex,
    targets: &AHashSet<i64>,
) -> Result<Vec<(i64, Coord)>> {
    let blob = osmpbf::read_blob(data, idx)?;
    let types = BlockTypes::from_osmdata_blob(&blob, idx.offset())?;
    if types.contains(BlockType::Nodes) {
        return Err(Error::UnsupportedSparseNodes { offset: idx.offset() });
    }
    if !types.contains(BlockType::DenseNodes) {
        return Ok(Vec::new());
    }
    let block = osmpbf::PrimitiveBlock::decode(blob.as_slice())
        .map_err(|e| Error::truncated(idx.offset(), e.to_string()))?;
    let coords = BlockDecoder::new(&block, idx.offset())?.coordinates()?;
    Ok(coords
        .into_iter()
        .filter(|(id, _)| targets.contains(id))
        .collect())
}

/// Runs the scans of an extraction over the data blocks of a PBF file.
pub struct Resolver<'a> {
    data: &'a [u8],
    blocks: Vec<BlockIndex>,
    config: ExtractConfig,
}

impl<'a> Resolver<'a> {
    /// Indexes the blocks of `data` and validates its header.
    pub fn new(data: &'a [u8], config: ExtractConfig) -> Result<Self> {
        let mut blocks = Vec::new();
        for idx in BlockIndexIterator::new(data) {
            let idx = idx?;
            match idx.blob_type {
                BlobType::Header => {
                    osmpbf::read_header(data, &idx)?;
                }
                BlobType::Data => blocks.push(idx),
            }
        }
        info!("Found {} data blocks", blocks.len());
        Ok(Self {
            data,
            blocks,
            config,
        })
    }

    pub fn blocks(&self) -> &[BlockIndex] {
        &self.blocks
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }

    fn progress_bar(&self, phase: Phase) -> Option<ProgressBar<Stderr>> {
        if !self.config.progress_bar {
            return None;
        }
        let mut pb = ProgressBar::on(io::stderr(), self.blocks.len() as u64);
        pb.message(&format!("Scanning {}... ", phase));
        Some(pb)
    }

    /// Produces data for every block and merges it in file order.
    ///
    /// Returns the number of merged blocks.
    fn scan<Data, Producer, Consumer>(
        &self,
        phase: Phase,
        produce: Producer,
        mut consume: Consumer,
    ) -> Result<usize>
    where
        Producer: Fn(&BlockIndex) -> Result<Data> + Sync,
        Data: Send,
        Consumer: FnMut(Data) -> ControlFlow<()>,
    {
        let mut pb = self.progress_bar(phase);
        let mut scanned = 0;
        let mut merge = |data: Result<Data>| -> Result<ControlFlow<()>> {
            let data = data?;
            scanned += 1;
            if let Some(ref mut pb) = pb {
                pb.inc();
            }
            Ok(consume(data))
        };

        let result = if self.config.multiprocess {
            let workers = self.config.worker_count();
            debug!("Scanning {} blocks for {} with {} workers", self.blocks.len(), phase, workers);
            parallel_process(self.blocks.iter(), workers, |idx| produce(idx), &mut merge)
        } else {
            self.blocks
                .iter()
                .try_for_each(|idx| match merge(produce(idx)) {
                    Ok(ControlFlow::Continue(())) => Ok(()),
                    Ok(ControlFlow::Break(())) => Err(None),
                    Err(e) => Err(Some(e)),
                })
                .or_else(|e| match e {
                    None => Ok(()),
                    Some(e) => Err(e),
                })
        };
        drop(merge);

        if let Some(ref mut pb) = pb {
            pb.finish();
        }
        result.map_err(|e| e.in_phase(phase))?;
        Ok(scanned)
    }

    /// Resolves the filtered entities and all their references.
    pub fn resolve(&self, filter: &TagFilter) -> Result<Resolution> {
        let mut stats = Stats::default();
        info!(
            "Scanning {} blocks for {} candidates (multiprocess={})",
            self.blocks.len(),
            filter,
            self.config.multiprocess
        );

        // candidates
        let mut nodes: AHashMap<i64, Node> = AHashMap::new();
        let mut ways: Vec<Way> = Vec::new();
        let mut relations: Vec<Relation> = Vec::new();
        let mut required_nodes: AHashSet<i64> = AHashSet::new();
        let mut required_ways: AHashSet<i64> = AHashSet::new();

        stats.num_blocks = self.scan(
            Phase::Candidates,
            |idx| scan_candidates_block(self.data, idx, filter),
            |findings| {
                for node in findings.nodes {
                    nodes.insert(node.id, node);
                }
                for way in findings.ways {
                    required_nodes.extend(way.refs.iter().copied());
                    ways.push(way);
                }
                for relation in findings.relations {
                    for member in &relation.members {
                        match member.member_type {
                            MemberType::Node => {
                                required_nodes.insert(member.id);
                            }
                            MemberType::Way => {
                                required_ways.insert(member.id);
                            }
                            MemberType::Relation => (),
                        }
                    }
                    relations.push(relation);
                }
                ControlFlow::Continue(())
            },
        )?;
        stats.num_candidate_nodes = nodes.len();
        stats.num_candidate_ways = ways.len();
        stats.num_candidate_relations = relations.len();
        info!(
            "Completed candidates scan: {} nodes, {} ways, {} relations, {} referenced nodes",
            nodes.len(),
            ways.len(),
            relations.len(),
            required_nodes.len()
        );

        // member ways
        for way in &ways {
            required_ways.remove(&way.id);
        }
        let mut member_ways: AHashMap<i64, Way> = AHashMap::new();
        if !required_ways.is_empty() {
            info!("Capturing {} ways referenced by relations", required_ways.len());
            let targets = &required_ways;
            self.scan(
                Phase::MemberWays,
                |idx| scan_ways_block(self.data, idx, targets),
                |found| {
                    for way in found {
                        member_ways.insert(way.id, way);
                    }
                    if member_ways.len() >= targets.len() {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
            )?;
            for way in member_ways.values() {
                required_nodes.extend(way.refs.iter().copied());
            }
            stats.num_member_ways = member_ways.len();
            stats.num_unresolved_way_ids = required_ways.len() - member_ways.len();
            if stats.num_unresolved_way_ids > 0 {
                warn!(
                    "{} ways referenced by relations are missing in the file",
                    stats.num_unresolved_way_ids
                );
            }
        }

        // gap detection
        let mut coordinates: CoordinateLookup = nodes.values().map(|n| (n.id, n.coord)).collect();
        let missing: AHashSet<i64> = required_nodes
            .into_iter()
            .filter(|id| !coordinates.contains_key(id))
            .collect();

        // coordinates
        let mut unresolved = Vec::new();
        if !missing.is_empty() {
            info!("Capturing {} prerequisite nodes", missing.len());
            let targets = &missing;
            let mut captured = 0;
            self.scan(
                Phase::Coordinates,
                |idx| scan_coordinates_block(self.data, idx, targets),
                |found| {
                    for (id, coord) in found {
                        if coordinates.insert(id, coord).is_none() {
                            captured += 1;
                        }
                    }
                    if captured >= targets.len() {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                },
            )?;
            stats.num_captured_nodes = captured;

            unresolved = missing
                .iter()
                .copied()
                .filter(|id| !coordinates.contains_key(id))
                .collect();
            unresolved.par_sort_unstable();
            stats.num_unresolved_node_ids = unresolved.len();
            if unresolved.is_empty() {
                info!("Captured coordinates for all referenced nodes");
            } else {
                warn!(
                    "{} referenced nodes missing coordinates after collection",
                    unresolved.len()
                );
            }
        }

        let mut nodes: Vec<Node> = nodes.into_iter().map(|(_, node)| node).collect();
        nodes.par_sort_by_key(|node| node.id);
        ways.par_sort_by_key(|way| way.id);
        relations.par_sort_by_key(|relation| relation.id);
        let mut member_ways: Vec<Way> = member_ways.into_iter().map(|(_, way)| way).collect();
        member_ways.par_sort_by_key(|way| way.id);

        Ok(Resolution {
            nodes,
            ways,
            relations,
            member_ways,
            coordinates,
            unresolved,
            stats,
        })
    }
}
