//! Builder of small synthetic PBF files.
#![allow(dead_code)]

use flate2::write::ZlibEncoder;
use flate2::Compression;
use osmfeatures::osmpbf;
use prost::Message;
use tempfile::NamedTempFile;

use std::io::Write;

pub type Tag<'a> = (&'a str, &'a str);

/// Member of a synthetic relation: (type, id, role) with the type as stored
/// in the file, i.e. 0 = node, 1 = way, 2 = relation.
pub type RawMember<'a> = (i32, i64, &'a str);

/// Coordinate units of the default granularity of 100 nanodegrees.
fn to_units(degrees: f64) -> i64 {
    (degrees * 1e7).round() as i64
}

fn deltas(values: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut last = 0;
    values
        .into_iter()
        .map(|value| {
            let delta = value - last;
            last = value;
            delta
        })
        .collect()
}

/// String table under construction; index 0 is the empty string.
#[derive(Default)]
struct Strings(Vec<String>);

impl Strings {
    fn new() -> Self {
        Strings(vec![String::new()])
    }

    fn index(&mut self, s: &str) -> u32 {
        if let Some(pos) = self.0.iter().position(|x| x == s) {
            return pos as u32;
        }
        self.0.push(s.to_string());
        (self.0.len() - 1) as u32
    }

    fn tags(&mut self, tags: &[Tag]) -> (Vec<u32>, Vec<u32>) {
        tags.iter().map(|(k, v)| (self.index(k), self.index(v))).unzip()
    }

    fn into_table(self) -> osmpbf::StringTable {
        osmpbf::StringTable {
            s: self.0.into_iter().map(String::into_bytes).collect(),
        }
    }
}

/// Frames a blob payload with its length prefix and `BlobHeader`.
pub fn frame(blob_type: &str, blob: &osmpbf::Blob) -> Vec<u8> {
    let blob = blob.encode_to_vec();
    let header = osmpbf::BlobHeader {
        r#type: blob_type.into(),
        indexdata: None,
        datasize: blob.len() as i32,
    }
    .encode_to_vec();
    let mut result = (header.len() as u32).to_be_bytes().to_vec();
    result.extend(header);
    result.extend(blob);
    result
}

pub fn raw_blob(payload: Vec<u8>) -> osmpbf::Blob {
    osmpbf::Blob {
        raw_size: Some(payload.len() as i32),
        raw: Some(payload),
        ..Default::default()
    }
}

pub fn zlib_blob(payload: Vec<u8>) -> osmpbf::Blob {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&payload).unwrap();
    osmpbf::Blob {
        raw_size: Some(payload.len() as i32),
        zlib_data: Some(encoder.finish().unwrap()),
        ..Default::default()
    }
}

/// Appends framed blocks to an in-memory PBF file.
pub struct PbfBuilder {
    data: Vec<u8>,
    zlib: bool,
}

impl PbfBuilder {
    /// Starts a file with a header block requiring the default features.
    pub fn new() -> Self {
        Self::with_features(&["OsmSchema-V0.6", "DenseNodes"])
    }

    pub fn with_features(features: &[&str]) -> Self {
        let header = osmpbf::HeaderBlock {
            required_features: features.iter().map(|f| f.to_string()).collect(),
            writingprogram: Some("osmfeatures-tests".into()),
            ..Default::default()
        };
        let mut builder = Self {
            data: Vec::new(),
            zlib: false,
        };
        builder.blob("OSMHeader", header.encode_to_vec());
        builder
    }

    /// Compresses all blocks added from now on with zlib.
    pub fn zlib(mut self) -> Self {
        self.zlib = true;
        self
    }

    fn blob(&mut self, blob_type: &str, payload: Vec<u8>) {
        let blob = if self.zlib {
            zlib_blob(payload)
        } else {
            raw_blob(payload)
        };
        self.data.extend(frame(blob_type, &blob));
    }

    /// Appends already framed bytes.
    pub fn raw(mut self, bytes: Vec<u8>) -> Self {
        self.data.extend(bytes);
        self
    }

    fn block(mut self, strings: Strings, group: osmpbf::PrimitiveGroup) -> Self {
        let block = osmpbf::PrimitiveBlock {
            stringtable: strings.into_table(),
            primitivegroup: vec![group],
            ..Default::default()
        };
        self.blob("OSMData", block.encode_to_vec());
        self
    }

    /// Appends a block of dense nodes given as (id, lon, lat, tags).
    pub fn dense_nodes(self, nodes: &[(i64, f64, f64, &[Tag])]) -> Self {
        let mut strings = Strings::new();
        let mut keys_vals = Vec::new();
        for (_, _, _, tags) in nodes {
            for (k, v) in tags.iter() {
                keys_vals.push(strings.index(k) as i32);
                keys_vals.push(strings.index(v) as i32);
            }
            keys_vals.push(0);
        }
        if nodes.iter().all(|(_, _, _, tags)| tags.is_empty()) {
            keys_vals.clear();
        }
        let dense = osmpbf::DenseNodes {
            id: deltas(nodes.iter().map(|n| n.0)),
            lon: deltas(nodes.iter().map(|n| to_units(n.1))),
            lat: deltas(nodes.iter().map(|n| to_units(n.2))),
            keys_vals,
        };
        self.block(
            strings,
            osmpbf::PrimitiveGroup {
                dense: Some(dense),
                ..Default::default()
            },
        )
    }

    /// Appends a block of ways given as (id, tags, refs).
    pub fn ways(self, ways: &[(i64, &[Tag], &[i64])]) -> Self {
        let mut strings = Strings::new();
        let ways = ways
            .iter()
            .map(|(id, tags, refs)| {
                let (keys, vals) = strings.tags(tags);
                osmpbf::Way {
                    id: *id,
                    keys,
                    vals,
                    refs: deltas(refs.iter().copied()),
                }
            })
            .collect();
        self.block(
            strings,
            osmpbf::PrimitiveGroup {
                ways,
                ..Default::default()
            },
        )
    }

    /// Appends a block of relations given as (id, tags, members).
    pub fn relations(self, relations: &[(i64, &[Tag], &[RawMember])]) -> Self {
        let mut strings = Strings::new();
        let relations = relations
            .iter()
            .map(|(id, tags, members)| {
                let (keys, vals) = strings.tags(tags);
                osmpbf::Relation {
                    id: *id,
                    keys,
                    vals,
                    roles_sid: members
                        .iter()
                        .map(|(_, _, role)| strings.index(role) as i32)
                        .collect(),
                    memids: deltas(members.iter().map(|(_, id, _)| *id)),
                    types: members.iter().map(|(t, _, _)| *t).collect(),
                }
            })
            .collect();
        self.block(
            strings,
            osmpbf::PrimitiveGroup {
                relations,
                ..Default::default()
            },
        )
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// Writes the file to a temporary location.
    pub fn write(self) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&self.data).unwrap();
        file.flush().unwrap();
        file
    }
}

/// Three nodes tagged `power=tower`, a `power=line` way over them, and an
/// untagged node 4.
pub fn power_line() -> PbfBuilder {
    const TOWER: &[Tag] = &[("power", "tower")];
    PbfBuilder::new()
        .dense_nodes(&[
            (1, 10.0, 20.0, TOWER),
            (2, 10.1, 20.1, TOWER),
            (3, 10.2, 20.2, TOWER),
            (4, 10.3, 20.0, &[]),
        ])
        .ways(&[(100, &[("power", "line"), ("voltage", "110000")], &[1, 2, 3])])
}
