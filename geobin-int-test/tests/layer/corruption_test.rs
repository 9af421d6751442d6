//! Damaged and hostile files must fail cleanly.

use geobin::header::{HEADER_MAX_BUFFER_SIZE, MAGIC, MAX_FEATURE_COUNT};
use geobin::packed_rtree::index_size;
use geobin::{
    BoundingBox, Dimensions, Feature, GeobinError, GeometryKind, GeometryValue, Header,
    LayerReader, LayerWriter, ReaderOptions, TempStoreKind, WriterOptions,
};
use geobin_int_test::test_util::{read_all, sample_columns, sample_point};
use std::io::Cursor;

fn sample_layer(indexed: bool, count: usize) -> Vec<u8> {
    let options = WriterOptions::new("damaged")
        .geometry_kind(GeometryKind::Point)
        .spatial_index(indexed)
        .node_size(2)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    for column in sample_columns() {
        writer.add_column(column).unwrap();
    }
    for i in 0..count {
        writer
            .add_feature(&sample_point(i as u64, i as f64, (i * 2) as f64))
            .unwrap();
    }
    writer.close().unwrap().0.into_inner()
}

fn read_everything(bytes: Vec<u8>, filter: Option<BoundingBox>) -> Result<usize, GeobinError> {
    let mut reader = LayerReader::open(Cursor::new(bytes), ReaderOptions::new())?;
    reader.set_spatial_filter(filter);
    Ok(read_all(&mut reader)?.len())
}

fn header_len(bytes: &[u8]) -> usize {
    Header::read_preamble(&mut Cursor::new(bytes)).unwrap().1 as usize
}

#[test]
fn test_truncation_at_every_byte() {
    for indexed in [false, true] {
        let bytes = sample_layer(indexed, 3);
        assert_eq!(read_everything(bytes.clone(), None).unwrap(), 3);
        for cut in 0..bytes.len() {
            let result = read_everything(bytes[..cut].to_vec(), None);
            match result {
                Err(GeobinError::CorruptData(_)) | Err(GeobinError::Io(_)) => {}
                other => panic!(
                    "cut at {} of {} (indexed: {}) gave {:?}",
                    cut,
                    bytes.len(),
                    indexed,
                    other
                ),
            }
        }
    }
}

#[test]
fn test_truncated_index_with_filter() {
    let bytes = sample_layer(true, 3);
    let tree_end = header_len(&bytes) + index_size(3, 2).unwrap() as usize;
    for cut in header_len(&bytes)..tree_end {
        let err = read_everything(bytes[..cut].to_vec(), Some(BoundingBox::new(0.0, 0.0, 0.5, 0.5)))
            .unwrap_err();
        assert!(err.is_corrupt(), "cut at {}", cut);
    }
}

#[test]
fn test_bad_magic_and_version() {
    let mut bytes = sample_layer(false, 1);
    bytes[0] = b'x';
    assert!(read_everything(bytes, None).unwrap_err().is_corrupt());

    let mut bytes = sample_layer(false, 1);
    bytes[3] = 9;
    let err = read_everything(bytes, None).unwrap_err();
    assert!(err.to_string().contains("version"));
}

#[test]
fn test_oversized_header_length() {
    let mut bytes = MAGIC.to_vec();
    bytes.extend_from_slice(&((HEADER_MAX_BUFFER_SIZE + 1) as u32).to_le_bytes());
    bytes.extend_from_slice(&[0u8; 64]);
    assert!(read_everything(bytes, None).unwrap_err().is_corrupt());
}

#[test]
fn test_hostile_header_values() {
    let mut header = Header::new("hostile", GeometryKind::Point, Dimensions::XY);
    header.features_count = MAX_FEATURE_COUNT + 1;
    assert!(read_everything(header.to_preamble().unwrap(), None)
        .unwrap_err()
        .is_corrupt());

    let mut header = Header::new("hostile", GeometryKind::Point, Dimensions::XY);
    header.index_node_size = 1;
    header.features_count = 10;
    assert!(read_everything(header.to_preamble().unwrap(), None)
        .unwrap_err()
        .is_corrupt());

    // a tree for a billion features cannot fit in a small file
    let mut header = Header::new("hostile", GeometryKind::Point, Dimensions::XY);
    header.index_node_size = 16;
    header.features_count = 1_000_000_000;
    assert!(read_everything(header.to_preamble().unwrap(), None)
        .unwrap_err()
        .is_corrupt());
}

#[test]
fn test_oversized_record_length() {
    let mut bytes = sample_layer(false, 2);
    let at = header_len(&bytes);
    for len in [u32::MAX, i32::MAX as u32, (bytes.len() - at) as u32] {
        bytes[at..at + 4].copy_from_slice(&len.to_le_bytes());
        assert!(read_everything(bytes.clone(), None).unwrap_err().is_corrupt());
    }
}

#[test]
fn test_misaligned_child_offset() {
    let mut bytes = sample_layer(true, 3);
    let root_offset_at = header_len(&bytes) + index_size(3, 2).unwrap() as usize - 8;
    bytes[root_offset_at..root_offset_at + 8].copy_from_slice(&7u64.to_le_bytes());

    // the root is only followed by an index search
    assert_eq!(read_everything(bytes.clone(), None).unwrap(), 3);
    let err = read_everything(bytes, Some(BoundingBox::new(0.0, 0.0, 0.5, 0.5))).unwrap_err();
    assert!(err.is_corrupt());
}

#[test]
fn test_leaf_offset_past_end() {
    let mut bytes = sample_layer(true, 3);
    // leaf 0 offset field
    let at = header_len(&bytes) + 32;
    bytes[at..at + 8].copy_from_slice(&(1u64 << 40).to_le_bytes());
    let mut reader = LayerReader::open(Cursor::new(bytes), ReaderOptions::new()).unwrap();
    assert!(reader.get_feature(0).unwrap_err().is_corrupt());
}

#[test]
fn test_corrupt_geometry_bytes() {
    let options = WriterOptions::new("geom")
        .spatial_index(false)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    writer
        .add_feature(&Feature::new(0).with_geometry(GeometryValue::line_string(&[
            (0.0, 0.0),
            (1.0, 1.0),
        ])))
        .unwrap();
    let mut bytes = writer.close().unwrap().0.into_inner();

    // record prefix, 16 byte table, kind, flags, then the vertex count
    let count_at = header_len(&bytes) + 4 + 16 + 2;
    bytes[count_at..count_at + 4].copy_from_slice(&1_000_000u32.to_le_bytes());
    assert!(read_everything(bytes.clone(), None).unwrap_err().is_corrupt());

    // an unknown kind tag
    bytes[count_at - 2] = 42;
    assert!(read_everything(bytes, None).unwrap_err().is_corrupt());
}
