//! Write targets, temp stores and copy strategies.

use geobin::{
    BoundingBox, CopyStrategyKind, Feature, GeobinError, GeometryKind, GeometryValue, LayerReader,
    LayerWriter, ReaderOptions, Sequential, TempStoreKind, WriterOptions,
};
use geobin_int_test::test_util::{
    cleanup, create_test_context, id_of, point_options, random_points, read_all, run_test,
    sample_columns, sample_point, write_points,
};
use std::io::Cursor;

fn write_in_memory(options: WriterOptions, points: &[(f64, f64)]) -> Vec<u8> {
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    for column in sample_columns() {
        writer.add_column(column).unwrap();
    }
    for (i, (x, y)) in points.iter().enumerate() {
        writer.add_feature(&sample_point(i as u64, *x, *y)).unwrap();
    }
    writer.close().unwrap().0.into_inner()
}

#[test]
fn test_copy_strategies_and_temp_stores_agree() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(3_000, 31);
            let reference = write_in_memory(
                point_options("copy", true)
                    .temp_store(TempStoreKind::Memory)
                    .copy_strategy(CopyStrategyKind::Direct),
                &points,
            );

            let variants = [
                (TempStoreKind::Memory, CopyStrategyKind::Batched, 1usize),
                (TempStoreKind::Memory, CopyStrategyKind::Batched, 4096),
                (TempStoreKind::File, CopyStrategyKind::Direct, 0),
                (TempStoreKind::File, CopyStrategyKind::Auto, 10_000),
                (TempStoreKind::File, CopyStrategyKind::Auto, 100 * 1024 * 1024),
            ];
            for (store, strategy, buffer) in variants {
                let options = point_options("copy", true)
                    .temp_store(store)
                    .temp_dir(ctx.dir())
                    .copy_strategy(strategy)
                    .copy_buffer_size(buffer);
                let bytes = write_in_memory(options, &points);
                assert!(
                    bytes == reference,
                    "{:?}/{:?}/{} differs from direct copy",
                    store,
                    strategy,
                    buffer
                );
            }

            // the temp file is gone once the writer is done
            if cfg!(unix) {
                assert_eq!(std::fs::read_dir(ctx.dir())?.count(), 0);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_writes_are_deterministic() {
    let points = random_points(1_000, 8);
    let first = write_in_memory(point_options("det", true).temp_store(TempStoreKind::Memory), &points);
    let second = write_in_memory(point_options("det", true).temp_store(TempStoreKind::Memory), &points);
    assert!(first == second);
}

#[test]
fn test_sequential_target() {
    let points = random_points(50, 12);
    for indexed in [false, true] {
        let options = point_options("stream", indexed).temp_store(TempStoreKind::Memory);
        let mut writer = LayerWriter::create(Sequential::new(Vec::new()), options).unwrap();
        for column in sample_columns() {
            writer.add_column(column).unwrap();
        }
        for (i, (x, y)) in points.iter().enumerate() {
            writer.add_feature(&sample_point(i as u64, *x, *y)).unwrap();
        }
        let (target, summary) = writer.close().unwrap();
        let bytes = target.into_inner();
        assert_eq!(summary.bytes_written, bytes.len() as u64);

        let mut reader = LayerReader::open(Cursor::new(bytes), ReaderOptions::new()).unwrap();
        // an indexed write never needs to seek, so the count is final
        let declared = if indexed { 50 } else { 0 };
        assert_eq!(reader.header().features_count, declared);
        assert_eq!(reader.feature_count().unwrap(), 50);
        let mut ids: Vec<u64> = read_all(&mut reader).unwrap().iter().map(id_of).collect();
        ids.sort();
        assert_eq!(ids, (0..50).collect::<Vec<u64>>());
    }
}

#[test]
fn test_sequential_target_without_features() {
    let options = point_options("empty", false);
    let writer = LayerWriter::create(Sequential::new(Vec::new()), options).unwrap();
    let (target, summary) = writer.close().unwrap();
    let bytes = target.into_inner();
    assert_eq!(summary.features_written, 0);
    let mut reader = LayerReader::open(Cursor::new(bytes), ReaderOptions::new()).unwrap();
    assert!(reader.next_feature().unwrap().is_none());
    assert_eq!(reader.extent().unwrap(), None);
}

#[test]
fn test_writer_rejections() {
    let options = WriterOptions::new("strict")
        .geometry_kind(GeometryKind::LineString)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();

    let point = Feature::new(0).with_geometry(GeometryValue::point(1.0, 1.0));
    assert!(matches!(
        writer.add_feature(&point),
        Err(GeobinError::InvalidArgument(_))
    ));
    let empty = Feature::new(0).with_geometry(GeometryValue::LineString(Vec::new()));
    assert!(matches!(
        writer.add_feature(&empty),
        Err(GeobinError::InvalidArgument(_))
    ));
    assert!(matches!(
        writer.add_feature(&Feature::new(0)),
        Err(GeobinError::InvalidArgument(_))
    ));
    assert_eq!(writer.feature_count(), 0);

    assert!(LayerWriter::create(Cursor::new(Vec::new()), WriterOptions::new("x").node_size(1)).is_err());
}

#[test]
fn test_large_file_on_disk() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(20_000, 77);
            let path = ctx.file("large.gbn");
            let options = point_options("large", true).copy_buffer_size(64 * 1024);
            let summary = write_points(&path, options, &points)?;
            assert_eq!(summary.bytes_written, std::fs::metadata(&path)?.len());

            let mut reader = LayerReader::open_path(&path, ReaderOptions::new())?;
            reader.set_spatial_filter(Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
            for feature in read_all(&mut reader)? {
                let (x, y) = points[id_of(&feature) as usize];
                assert!(x <= 10.0 && y <= 10.0);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
