//! Columnar batch reads.

use geobin::codec::geometry_codec::decode_geometry;
use geobin::layer::ColumnArray;
use geobin::{BoundingBox, GeometryKind, LayerReader, ReaderOptions};
use geobin_int_test::test_util::{
    brute_force, cleanup, create_test_context, point_options, random_points, read_all, run_test,
    sample_point, write_points,
};

#[test]
fn test_batches_match_feature_iteration() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(1_000, 5);
            let path = ctx.file("batches.gbn");
            write_points(&path, point_options("batches", true), &points)?;

            let features = read_all(&mut LayerReader::open_path(&path, ReaderOptions::new())?)?;
            let mut reader =
                LayerReader::open_path(&path, ReaderOptions::new().max_batch_features(300))?;
            let mut row = 0usize;
            let mut sizes = Vec::new();
            while let Some(batch) = reader.next_batch()? {
                sizes.push(batch.len());
                for i in 0..batch.len() {
                    let feature = &features[row];
                    assert_eq!(Some(batch.fids[i]), feature.fid);
                    let geometry = decode_geometry(
                        batch.geometry_bytes(i).unwrap(),
                        GeometryKind::Point,
                        reader.header().dimensions(),
                    )?;
                    assert_eq!(Some(geometry), feature.geometry);
                    for (c, expected) in feature.properties.iter().enumerate() {
                        assert_eq!(&batch.column(c).unwrap().get(i), expected);
                    }
                    row += 1;
                }
            }
            assert_eq!(sizes, vec![300, 300, 300, 100]);
            assert_eq!(row, features.len());
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_batches_respect_filter_and_projection() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(2_000, 17);
            let query = BoundingBox::new(100.0, 100.0, 600.0, 400.0);
            let expected = brute_force(&points, &query);

            for indexed in [false, true] {
                let path = ctx.file(&format!("filtered-{}.gbn", indexed));
                write_points(&path, point_options("filtered", indexed), &points)?;
                let options = ReaderOptions::new()
                    .ignore_geometry(true)
                    .ignore_column(2)
                    .max_batch_features(64);
                let mut reader = LayerReader::open_path(&path, options)?;
                reader.set_spatial_filter(Some(query));

                let mut ids = Vec::new();
                while let Some(batch) = reader.next_batch()? {
                    assert!(batch.geometry.is_none());
                    assert!(batch.column(2).is_none());
                    let Some(ColumnArray::ULong(values)) = batch.column(0) else {
                        panic!("id column missing");
                    };
                    ids.extend(values.iter().map(|v| v.unwrap()));
                }
                ids.sort();
                assert_eq!(ids, expected, "indexed: {}", indexed);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_memory_limit_splits_batches() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(100, 23);
            let path = ctx.file("limited.gbn");
            write_points(&path, point_options("limited", false), &points)?;

            // every "name" value is "feature-<i>"; keep the string column under 40 bytes
            let options = ReaderOptions::new().ignore_geometry(true).batch_memory_limit(40);
            let mut reader = LayerReader::open_path(&path, options)?;
            let mut fids = Vec::new();
            let mut batches = 0;
            while let Some(batch) = reader.next_batch()? {
                batches += 1;
                assert!(!batch.is_empty());
                assert!(batch.column(1).unwrap().payload_len() <= 40);
                fids.extend(batch.fids.iter().copied());
            }
            assert_eq!(fids, (0..100).collect::<Vec<u64>>());
            assert!(batches > 10);

            // a single row larger than the limit still makes progress
            let options = ReaderOptions::new().ignore_geometry(true).batch_memory_limit(1);
            let mut reader = LayerReader::open_path(&path, options)?;
            let first = reader.next_batch()?.unwrap();
            assert_eq!(first.len(), 1);
            assert_eq!(
                first.column(1).unwrap().get(0),
                sample_point(0, 0.0, 0.0).property(1).cloned()
            );
            assert_eq!(reader.next_batch()?.unwrap().fids, vec![1]);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
