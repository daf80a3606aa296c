mod common;

use common::{frame, power_line, raw_blob, zlib_blob, PbfBuilder};
use osmfeatures::osmpbf::{self, read_blob, read_header};
use osmfeatures::{BlobType, BlockIndexIterator, Error, PbfFile};
use prost::Message;

#[test]
fn iterates_blobs_of_a_file() {
    let file = power_line().write();
    let pbf = PbfFile::open(file.path()).unwrap();
    let blocks: Vec<_> = pbf.blocks().collect::<Result<_, _>>().unwrap();
    assert_eq!(
        blocks.iter().map(|b| b.blob_type).collect::<Vec<_>>(),
        vec![BlobType::Header, BlobType::Data, BlobType::Data]
    );
    let header = read_header(pbf.data(), &blocks[0]).unwrap();
    assert_eq!(header.writingprogram.as_deref(), Some("osmfeatures-tests"));
}

#[test]
fn raw_and_zlib_blobs_decode_to_the_same_payload() {
    let raw = power_line().build();
    let zlib = PbfBuilder::new()
        .zlib()
        .dense_nodes(&[(1, 10.0, 20.0, &[("power", "tower")])])
        .build();
    let raw_first = PbfBuilder::new()
        .dense_nodes(&[(1, 10.0, 20.0, &[("power", "tower")])])
        .build();

    let payloads = |data: &[u8]| -> Vec<Vec<u8>> {
        BlockIndexIterator::new(data)
            .map(|idx| read_blob(data, &idx.unwrap()).unwrap())
            .collect()
    };
    assert_eq!(payloads(&zlib), payloads(&raw_first));
    assert_ne!(zlib, raw_first);
    assert_eq!(payloads(&raw).len(), 3);
}

#[test]
fn unknown_blob_types_are_skipped() {
    let data = PbfBuilder::new()
        .raw(frame("OSMIndex", &raw_blob(vec![1, 2, 3])))
        .dense_nodes(&[(1, 0.0, 0.0, &[])])
        .build();
    let types: Vec<_> = BlockIndexIterator::new(&data)
        .map(|idx| idx.unwrap().blob_type)
        .collect();
    assert_eq!(types, vec![BlobType::Header, BlobType::Data]);
}

#[test]
fn truncated_file_is_corrupt_framing() {
    let mut data = power_line().build();
    data.truncate(data.len() - 3);
    let results: Vec<_> = BlockIndexIterator::new(&data).collect();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].is_ok());
    assert!(matches!(results[2], Err(Error::CorruptFraming { .. })));
}

#[test]
fn negative_blob_size_is_corrupt_framing() {
    let header = osmpbf::BlobHeader {
        r#type: "OSMData".into(),
        indexdata: None,
        datasize: -1,
    }
    .encode_to_vec();
    let mut data = (header.len() as u32).to_be_bytes().to_vec();
    data.extend(header);

    let err = BlockIndexIterator::new(&data).next().unwrap().unwrap_err();
    match err {
        Error::CorruptFraming { offset, .. } => assert!(offset > 0),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn unsupported_encodings_are_named() {
    let blob = osmpbf::Blob {
        raw_size: Some(3),
        zstd_data: Some(vec![1, 2, 3]),
        ..Default::default()
    };
    let data = PbfBuilder::new().raw(frame("OSMData", &blob)).build();
    let blocks: Vec<_> = BlockIndexIterator::new(&data)
        .collect::<Result<_, _>>()
        .unwrap();
    match read_blob(&data, &blocks[1]) {
        Err(Error::UnsupportedBlobEncoding { offset, encoding }) => {
            assert_eq!(encoding, "zstd");
            assert_eq!(offset, blocks[1].offset());
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn raw_size_must_match_the_inflated_length() {
    let mut blob = zlib_blob(vec![0; 64]);
    blob.raw_size = Some(65);
    let data = frame("OSMData", &blob);
    let idx = BlockIndexIterator::new(&data).next().unwrap().unwrap();
    assert!(matches!(
        read_blob(&data, &idx),
        Err(Error::CorruptFraming { .. })
    ));
}

#[test]
fn inflated_size_is_capped() {
    let mut blob = zlib_blob(vec![0; osmpbf::MAX_BLOB_SIZE + 1]);
    blob.raw_size = None;
    let data = frame("OSMData", &blob);
    assert!(data.len() < osmpbf::MAX_BLOB_SIZE);
    let idx = BlockIndexIterator::new(&data).next().unwrap().unwrap();
    match read_blob(&data, &idx) {
        Err(Error::CorruptFraming { reason, .. }) => assert!(reason.contains("exceeds limit")),
        other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
    }
}

#[test]
fn out_of_range_raw_size_is_rejected_before_inflating() {
    for raw_size in [-1, osmpbf::MAX_BLOB_SIZE as i32 + 1] {
        let mut blob = zlib_blob(vec![0; 16]);
        blob.raw_size = Some(raw_size);
        let data = frame("OSMData", &blob);
        let idx = BlockIndexIterator::new(&data).next().unwrap().unwrap();
        match read_blob(&data, &idx) {
            Err(Error::CorruptFraming { reason, .. }) => assert!(reason.contains("invalid raw size")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}

#[test]
fn invalid_zlib_data_is_corrupt_framing() {
    let blob = osmpbf::Blob {
        zlib_data: Some(vec![0xde, 0xad, 0xbe, 0xef]),
        ..Default::default()
    };
    let data = frame("OSMData", &blob);
    let idx = BlockIndexIterator::new(&data).next().unwrap().unwrap();
    assert!(matches!(
        read_blob(&data, &idx),
        Err(Error::CorruptFraming { .. })
    ));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        PbfFile::open(dir.path().join("missing.osm.pbf")),
        Err(Error::Io(_))
    ));
}
