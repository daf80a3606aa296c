//! Low level access to the OSM PBF container format.
//!
//! A PBF file is a sequence of blobs. Each blob is prefixed by the length of its
//! `BlobHeader` (4 bytes, network byte order), followed by the header itself and
//! the `Blob` message whose size is announced in the header. The payload of a
//! blob is either stored raw or zlib compressed.

use byteorder::{ByteOrder, NetworkEndian};
use flate2::read::ZlibDecoder;
use log::{debug, trace};
use memmap2::Mmap;
use prost::encoding::{DecodeContext, WireType};
use prost::Message;

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Upper bound of a serialized `BlobHeader`.
pub const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;
/// Upper bound of a serialized `Blob`.
pub const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;

/// Features from `HeaderBlock::required_features` this crate is able to read.
pub const SUPPORTED_FEATURES: &[&str] = &["OsmSchema-V0.6", "DenseNodes"];

#[derive(Clone, PartialEq, Message)]
pub struct Blob {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub raw: Option<Vec<u8>>,
    #[prost(int32, optional, tag = "2")]
    pub raw_size: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub zlib_data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "4")]
    pub lzma_data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "5")]
    pub obsolete_bzip2_data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "6")]
    pub lz4_data: Option<Vec<u8>>,
    #[prost(bytes = "vec", optional, tag = "7")]
    pub zstd_data: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlobHeader {
    #[prost(string, required, tag = "1")]
    pub r#type: String,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub indexdata: Option<Vec<u8>>,
    #[prost(int32, required, tag = "3")]
    pub datasize: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeaderBlock {
    #[prost(message, optional, tag = "1")]
    pub bbox: Option<HeaderBBox>,
    #[prost(string, repeated, tag = "4")]
    pub required_features: Vec<String>,
    #[prost(string, repeated, tag = "5")]
    pub optional_features: Vec<String>,
    #[prost(string, optional, tag = "16")]
    pub writingprogram: Option<String>,
    #[prost(string, optional, tag = "17")]
    pub source: Option<String>,
    #[prost(int64, optional, tag = "32")]
    pub osmosis_replication_timestamp: Option<i64>,
    #[prost(int64, optional, tag = "33")]
    pub osmosis_replication_sequence_number: Option<i64>,
    #[prost(string, optional, tag = "34")]
    pub osmosis_replication_base_url: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct HeaderBBox {
    #[prost(sint64, required, tag = "1")]
    pub left: i64,
    #[prost(sint64, required, tag = "2")]
    pub right: i64,
    #[prost(sint64, required, tag = "3")]
    pub top: i64,
    #[prost(sint64, required, tag = "4")]
    pub bottom: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct PrimitiveBlock {
    #[prost(message, required, tag = "1")]
    pub stringtable: StringTable,
    #[prost(message, repeated, tag = "2")]
    pub primitivegroup: Vec<PrimitiveGroup>,
    #[prost(int32, optional, tag = "17", default = "100")]
    pub granularity: Option<i32>,
    #[prost(int32, optional, tag = "18", default = "1000")]
    pub date_granularity: Option<i32>,
    #[prost(int64, optional, tag = "19", default = "0")]
    pub lat_offset: Option<i64>,
    #[prost(int64, optional, tag = "20", default = "0")]
    pub lon_offset: Option<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PrimitiveGroup {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,
    #[prost(message, optional, tag = "2")]
    pub dense: Option<DenseNodes>,
    #[prost(message, repeated, tag = "3")]
    pub ways: Vec<Way>,
    #[prost(message, repeated, tag = "4")]
    pub relations: Vec<Relation>,
}

#[derive(Clone, PartialEq, Message)]
pub struct StringTable {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub s: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Node {
    #[prost(sint64, required, tag = "1")]
    pub id: i64,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub keys: Vec<u32>,
    #[prost(uint32, repeated, packed = "true", tag = "3")]
    pub vals: Vec<u32>,
    #[prost(sint64, required, tag = "8")]
    pub lat: i64,
    #[prost(sint64, required, tag = "9")]
    pub lon: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct DenseNodes {
    #[prost(sint64, repeated, packed = "true", tag = "1")]
    pub id: Vec<i64>,
    #[prost(sint64, repeated, packed = "true", tag = "8")]
    pub lat: Vec<i64>,
    #[prost(sint64, repeated, packed = "true", tag = "9")]
    pub lon: Vec<i64>,
    #[prost(int32, repeated, packed = "true", tag = "10")]
    pub keys_vals: Vec<i32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Way {
    #[prost(int64, required, tag = "1")]
    pub id: i64,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub keys: Vec<u32>,
    #[prost(uint32, repeated, packed = "true", tag = "3")]
    pub vals: Vec<u32>,
    #[prost(sint64, repeated, packed = "true", tag = "8")]
    pub refs: Vec<i64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Relation {
    #[prost(int64, required, tag = "1")]
    pub id: i64,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub keys: Vec<u32>,
    #[prost(uint32, repeated, packed = "true", tag = "3")]
    pub vals: Vec<u32>,
    #[prost(int32, repeated, packed = "true", tag = "8")]
    pub roles_sid: Vec<i32>,
    #[prost(sint64, repeated, packed = "true", tag = "9")]
    pub memids: Vec<i64>,
    #[prost(int32, repeated, packed = "true", tag = "10")]
    pub types: Vec<i32>,
}

/// Kind of a blob as announced by its `BlobHeader`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlobType {
    Header,
    Data,
}

/// Location of a single blob inside of a PBF file.
///
/// `blob_start` points at the serialized `Blob` message, i.e. past the length
/// prefix and the `BlobHeader`.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Hash)]
pub struct BlockIndex {
    pub blob_type: BlobType,
    pub blob_start: usize,
    pub blob_len: usize,
}

impl BlockIndex {
    pub fn offset(&self) -> u64 {
        self.blob_start as u64
    }
}

/// Type of primitives stored in a `PrimitiveGroup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockType {
    Nodes,
    DenseNodes,
    Ways,
    Relations,
    ChangeSets,
}

/// Set of `BlockType`s found in the groups of a primitive block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockTypes(u8);

impl BlockTypes {
    fn bit(block_type: BlockType) -> u8 {
        1 << block_type as u8
    }

    pub fn insert(&mut self, block_type: BlockType) {
        self.0 |= Self::bit(block_type);
    }

    pub fn contains(self, block_type: BlockType) -> bool {
        self.0 & Self::bit(block_type) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Collects the primitive kinds of all groups of an inflated `OSMData` blob.
    ///
    /// Only the protobuf keys are walked; field payloads are skipped, so a scan
    /// can tell from the result whether decoding the block is worth it.
    /// `offset` is reported in errors about malformed keys or group lengths.
    pub fn from_osmdata_blob(mut blob: &[u8], offset: u64) -> Result<BlockTypes> {
        const PRIMITIVE_GROUP_TAG: u32 = 2;
        const NODES_TAG: u32 = 1;
        const DENSE_NODES_TAG: u32 = 2;
        const WAYS_TAG: u32 = 3;
        const RELATIONS_TAG: u32 = 4;
        const CHANGESETS_TAG: u32 = 5;

        let malformed = |e: prost::DecodeError| Error::truncated(offset, e.to_string());

        let mut types = BlockTypes::default();
        while !blob.is_empty() {
            // decode fields of PrimitiveBlock
            let (key, wire_type) = prost::encoding::decode_key(&mut blob).map_err(malformed)?;
            if key != PRIMITIVE_GROUP_TAG || wire_type != WireType::LengthDelimited {
                prost::encoding::skip_field(wire_type, key, &mut blob, DecodeContext::default())
                    .map_err(malformed)?;
                continue;
            }

            let len = prost::encoding::decode_varint(&mut blob).map_err(malformed)? as usize;
            if len > blob.len() {
                return Err(Error::truncated(offset, "primitive group exceeds block"));
            }
            let (mut group, rest) = blob.split_at(len);
            blob = rest;

            while !group.is_empty() {
                let (tag, wire_type) = prost::encoding::decode_key(&mut group).map_err(malformed)?;
                match tag {
                    NODES_TAG => types.insert(BlockType::Nodes),
                    DENSE_NODES_TAG => types.insert(BlockType::DenseNodes),
                    WAYS_TAG => types.insert(BlockType::Ways),
                    RELATIONS_TAG => types.insert(BlockType::Relations),
                    CHANGESETS_TAG => types.insert(BlockType::ChangeSets),
                    _ => (),
                }
                prost::encoding::skip_field(wire_type, tag, &mut group, DecodeContext::default())
                    .map_err(malformed)?;
            }
        }
        Ok(types)
    }
}

/// Read-only memory mapped PBF file.
pub struct PbfFile {
    data: Mmap,
}

impl PbfFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // Safety: the file is opened read-only and never mutated by this process
        let data = unsafe { Mmap::map(&file)? };
        Ok(Self { data })
    }

    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }

    /// Lazily iterates through the blob framing of the file.
    pub fn blocks(&self) -> BlockIndexIterator<'_> {
        BlockIndexIterator::new(self.data())
    }
}

/// Iterator over the framing of a PBF file.
///
/// Only the length prefixes and `BlobHeader`s are decoded, blob payloads are
/// skipped. After the first error the iterator is exhausted.
pub struct BlockIndexIterator<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> BlockIndexIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn corrupt(&self, reason: impl Into<String>) -> Error {
        Error::CorruptFraming {
            offset: self.cursor as u64,
            reason: reason.into(),
        }
    }

    fn read(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                self.corrupt(format!(
                    "{} of {} bytes exceeds end of file ({} bytes left)",
                    what,
                    len,
                    self.data.len() - self.cursor
                ))
            })?;
        let data: &'a [u8] = self.data;
        let slice = &data[self.cursor..end];
        self.cursor = end;
        Ok(slice)
    }

    fn next_blob(&mut self) -> Result<Option<BlockIndex>> {
        // read size of blob header
        let blob_header_len = NetworkEndian::read_u32(self.read(4, "blob header length")?) as usize;
        if blob_header_len > MAX_BLOB_HEADER_SIZE {
            return Err(self.corrupt(format!(
                "blob header size {} exceeds limit of {}",
                blob_header_len, MAX_BLOB_HEADER_SIZE
            )));
        }

        let header_start = self.cursor;
        let blob_header = BlobHeader::decode(self.read(blob_header_len, "blob header")?)
            .map_err(|e| Error::CorruptFraming {
                offset: header_start as u64,
                reason: format!("invalid blob header: {}", e),
            })?;

        if blob_header.datasize < 0 || blob_header.datasize as usize > MAX_BLOB_SIZE {
            return Err(self.corrupt(format!("invalid blob size {}", blob_header.datasize)));
        }

        let blob_start = self.cursor;
        let blob_len = blob_header.datasize as usize;
        self.read(blob_len, "blob")?;

        let blob_type = match blob_header.r#type.as_str() {
            "OSMHeader" => BlobType::Header,
            "OSMData" => BlobType::Data,
            other => {
                debug!("Skipping blob of unknown type {:?} at offset {}", other, blob_start);
                return Ok(None);
            }
        };
        trace!("Found {:?} blob at offset {} ({} bytes)", blob_type, blob_start, blob_len);

        Ok(Some(BlockIndex {
            blob_type,
            blob_start,
            blob_len,
        }))
    }
}

impl<'a> Iterator for BlockIndexIterator<'a> {
    type Item = Result<BlockIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.cursor < self.data.len() {
            match self.next_blob() {
                Ok(Some(idx)) => return Some(Ok(idx)),
                Ok(None) => continue,
                Err(e) => {
                    self.cursor = self.data.len();
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn inflate(data: &[u8], offset: u64, raw_size: Option<i32>) -> Result<Vec<u8>> {
    let capacity = match raw_size {
        None => 0,
        Some(size) if size >= 0 && size as usize <= MAX_BLOB_SIZE => size as usize,
        Some(size) => {
            return Err(Error::CorruptFraming {
                offset,
                reason: format!("invalid raw size {}", size),
            })
        }
    };
    let mut blob_buf = Vec::with_capacity(capacity);
    let mut decoder = ZlibDecoder::new(data).take(MAX_BLOB_SIZE as u64 + 1);
    decoder
        .read_to_end(&mut blob_buf)
        .map_err(|e| Error::CorruptFraming {
            offset,
            reason: format!("failed to inflate zlib data: {}", e),
        })?;
    if blob_buf.len() > MAX_BLOB_SIZE {
        return Err(Error::CorruptFraming {
            offset,
            reason: format!("inflated blob exceeds limit of {} bytes", MAX_BLOB_SIZE),
        });
    }
    Ok(blob_buf)
}

/// Loads the payload of a single blob, inflating it if needed.
pub fn read_blob(data: &[u8], idx: &BlockIndex) -> Result<Vec<u8>> {
    let offset = idx.offset();
    let bytes = data
        .get(idx.blob_start..idx.blob_start + idx.blob_len)
        .ok_or_else(|| Error::CorruptFraming {
            offset,
            reason: "blob exceeds end of file".into(),
        })?;
    let blob = Blob::decode(bytes).map_err(|e| Error::CorruptFraming {
        offset,
        reason: format!("invalid blob: {}", e),
    })?;

    let blob_data = if let Some(raw) = blob.raw {
        raw
    } else if let Some(zlib_data) = blob.zlib_data {
        inflate(&zlib_data, offset, blob.raw_size)?
    } else {
        let encoding = if blob.lzma_data.is_some() {
            "lzma"
        } else if blob.obsolete_bzip2_data.is_some() {
            "bzip2"
        } else if blob.lz4_data.is_some() {
            "lz4"
        } else if blob.zstd_data.is_some() {
            "zstd"
        } else {
            "none"
        };
        return Err(Error::UnsupportedBlobEncoding { offset, encoding });
    };

    if let Some(raw_size) = blob.raw_size {
        if raw_size as usize != blob_data.len() {
            return Err(Error::CorruptFraming {
                offset,
                reason: format!(
                    "blob decoded to {} bytes, but raw size is {}",
                    blob_data.len(),
                    raw_size
                ),
            });
        }
    }
    Ok(blob_data)
}

/// Loads a blob and decodes its payload as the message `T`.
pub fn read_block<T: Message + Default>(data: &[u8], idx: &BlockIndex) -> Result<T> {
    let blob_data = read_blob(data, idx)?;
    T::decode(blob_data.as_slice()).map_err(|e| Error::truncated(idx.offset(), e.to_string()))
}

/// Decodes the header block and verifies that all required features are supported.
pub fn read_header(data: &[u8], idx: &BlockIndex) -> Result<HeaderBlock> {
    let header: HeaderBlock = read_block(data, idx)?;
    if let Some(feature) = header
        .required_features
        .iter()
        .find(|f| !SUPPORTED_FEATURES.contains(&f.as_str()))
    {
        return Err(Error::UnsupportedFeature {
            feature: feature.clone(),
        });
    }

    debug!(
        "PBF header: writingprogram={:?}, source={:?}, features={:?}",
        header.writingprogram, header.source, header.required_features
    );
    if let Some(ref bbox) = header.bbox {
        debug!(
            "PBF bbox: left={}, right={}, top={}, bottom={}",
            bbox.left as f64 * 1e-9,
            bbox.right as f64 * 1e-9,
            bbox.top as f64 * 1e-9,
            bbox.bottom as f64 * 1e-9
        );
    }
    Ok(header)
}
