//! Extraction pipeline: from a PBF file and a filter to a stream of rows.

use log::info;

use std::path::Path;
use std::slice;

use crate::config::ExtractConfig;
use crate::error::Result;
use crate::filter::TagFilter;
use crate::geometry::{assemble, Feature};
use crate::model::{Node, Way};
use crate::osmpbf::PbfFile;
use crate::resolve::{Resolution, Resolver};
use crate::row::{flatten, Row};
use crate::stats::Stats;

/// Resolved entities of a single extraction run.
#[derive(Debug)]
pub struct Extraction {
    resolution: Resolution,
    filter: TagFilter,
    region: String,
}

/// Extracts the features selected by `filter` from the PBF file at `path`.
///
/// `region` is a free-form label copied into every row.
pub fn extract<P: AsRef<Path>>(
    path: P,
    filter: &TagFilter,
    region: &str,
    config: &ExtractConfig,
) -> Result<Extraction> {
    let path = path.as_ref();
    info!("Extracting {} from {}", filter, path.display());
    let file = PbfFile::open(path)?;
    extract_from_bytes(file.data(), filter, region, config)
}

/// Same as `extract`, reading from an in-memory PBF file.
pub fn extract_from_bytes(
    data: &[u8],
    filter: &TagFilter,
    region: &str,
    config: &ExtractConfig,
) -> Result<Extraction> {
    let resolution = Resolver::new(data, config.clone())?.resolve(filter)?;
    info!(
        "Region {} ({}): identified {} target nodes, {} target ways",
        region,
        filter,
        resolution.nodes.len(),
        resolution.ways.len()
    );
    Ok(Extraction {
        resolution,
        filter: filter.clone(),
        region: region.to_owned(),
    })
}

impl Extraction {
    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn filter(&self) -> &TagFilter {
        &self.filter
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Referenced node ids that were not found in the file.
    pub fn unresolved(&self) -> &[i64] {
        &self.resolution.unresolved
    }

    /// Rows of all matching nodes followed by all matching ways, each ascending by id.
    ///
    /// Ways whose geometry cannot be assembled are skipped.
    pub fn rows(&self) -> Rows<'_> {
        Rows {
            extraction: self,
            nodes: self.resolution.nodes.iter(),
            ways: self.resolution.ways.iter(),
            num_dropped: 0,
            num_rows: 0,
        }
    }

    /// Rows paired with each accepted filter value they match.
    ///
    /// A row matching several values, e.g. `power=line;cable` for the values
    /// `line` and `cable`, is yielded once per value.
    pub fn rows_by_value(&self) -> impl Iterator<Item = (&str, Row)> + '_ {
        self.rows().flat_map(move |row| {
            self.filter
                .matching_values(&row.tags)
                .into_iter()
                .map(move |value| (value, row.clone()))
        })
    }
}

/// Lazily assembled rows of an extraction.
pub struct Rows<'a> {
    extraction: &'a Extraction,
    nodes: slice::Iter<'a, Node>,
    ways: slice::Iter<'a, Way>,
    num_dropped: usize,
    num_rows: usize,
}

impl<'a> Rows<'a> {
    /// Number of ways skipped so far.
    pub fn num_dropped(&self) -> usize {
        self.num_dropped
    }

    /// Statistics of the run including the rows produced so far.
    pub fn stats(&self) -> Stats {
        let mut stats = self.extraction.resolution.stats.clone();
        stats += Stats {
            num_dropped_ways: self.num_dropped,
            num_rows: self.num_rows,
            ..Stats::default()
        };
        stats
    }
}

impl<'a> Iterator for Rows<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let region = &self.extraction.region;
        if let Some(node) = self.nodes.next() {
            self.num_rows += 1;
            return Some(flatten(Feature::from_node(node), region));
        }
        let coordinates = &self.extraction.resolution.coordinates;
        for way in self.ways.by_ref() {
            match assemble(way, coordinates) {
                Some(feature) => {
                    self.num_rows += 1;
                    return Some(flatten(feature, region));
                }
                None => self.num_dropped += 1,
            }
        }
        None
    }
}
