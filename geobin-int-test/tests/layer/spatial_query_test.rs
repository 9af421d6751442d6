//! Spatial filtering through the packed index and by sequential scan.

use geobin::{BoundingBox, Feature, GeometryValue, LayerReader, LayerWriter, ReaderOptions};
use geobin::{TempStoreKind, WriterOptions};
use geobin_int_test::test_util::{
    brute_force, cleanup, create_test_context, id_of, open, point_options, random_points,
    read_all, run_test, sample_columns, sample_point, write_points,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Cursor;

fn random_query(rng: &mut StdRng) -> BoundingBox {
    let x: f64 = rng.gen_range(-50.0..1000.0);
    let y: f64 = rng.gen_range(-50.0..1000.0);
    let w: f64 = rng.gen_range(0.0..200.0);
    let h: f64 = rng.gen_range(0.0..200.0);
    BoundingBox::new(x, y, x + w, y + h)
}

fn ids_matching(path: &std::path::Path, query: BoundingBox) -> geobin::GeobinResult<Vec<u64>> {
    let mut reader = open(path)?;
    reader.set_spatial_filter(Some(query));
    let mut ids: Vec<u64> = read_all(&mut reader)?.iter().map(id_of).collect();
    ids.sort();
    Ok(ids)
}

#[test]
fn test_index_matches_brute_force() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(10_000, 7);
            let mut rng = StdRng::seed_from_u64(99);
            for node_size in [2u16, 16, 64] {
                let indexed = ctx.file(&format!("indexed-{}.gbn", node_size));
                write_points(&indexed, point_options("q", true).node_size(node_size), &points)?;
                let plain = ctx.file(&format!("plain-{}.gbn", node_size));
                write_points(&plain, point_options("q", false), &points)?;

                for _ in 0..20 {
                    let query = random_query(&mut rng);
                    let expected = brute_force(&points, &query);
                    assert_eq!(ids_matching(&indexed, query)?, expected, "{}", query);
                    assert_eq!(ids_matching(&plain, query)?, expected, "{}", query);
                }
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_edge_touching_counts() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points: Vec<(f64, f64)> = (0..100).map(|i| ((i % 10) as f64, (i / 10) as f64)).collect();
            let path = ctx.file("grid.gbn");
            write_points(&path, point_options("grid", true).node_size(4), &points)?;

            // a degenerate query on a grid node touches exactly one point
            let hit = ids_matching(&path, BoundingBox::new(3.0, 4.0, 3.0, 4.0))?;
            assert_eq!(hit, vec![43]);

            // a query whose edges run along grid lines
            let query = BoundingBox::new(2.0, 2.0, 4.0, 3.0);
            assert_eq!(ids_matching(&path, query)?, brute_force(&points, &query));
            assert_eq!(ids_matching(&path, query)?.len(), 6);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_three_points_node_size_two() {
    let options = WriterOptions::new("three")
        .node_size(2)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    for (x, y) in [(0.0, 0.0), (2.0, 2.0), (10.0, 10.0)] {
        let feature = Feature::new(0).with_geometry(GeometryValue::rectangle(&BoundingBox::new(
            x,
            y,
            x + 1.0,
            y + 1.0,
        )));
        writer.add_feature(&feature).unwrap();
    }
    let (target, summary) = writer.close().unwrap();
    assert_eq!(summary.extent, Some(BoundingBox::new(0.0, 0.0, 11.0, 11.0)));

    let mut reader = LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new()).unwrap();
    reader.set_spatial_filter(Some(BoundingBox::new(2.5, 2.5, 2.6, 2.6)));
    let found = read_all(&mut reader).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].geometry.as_ref().and_then(|g| g.bounding_box()),
        Some(BoundingBox::new(2.0, 2.0, 3.0, 3.0))
    );

    reader.set_spatial_filter(Some(BoundingBox::new(1.0, 1.0, 2.0, 2.0)));
    assert_eq!(read_all(&mut reader).unwrap().len(), 2);

    reader.set_spatial_filter(Some(BoundingBox::new(4.0, 4.0, 9.0, 9.0)));
    assert!(read_all(&mut reader).unwrap().is_empty());
}

#[test]
fn test_three_points_found_by_identity() {
    let points = [(0.0, 0.0), (10.0, 10.0), (5.0, 5.0)];
    for indexed in [true, false] {
        let options = point_options("three", indexed)
            .node_size(2)
            .temp_store(TempStoreKind::Memory);
        let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
        for column in sample_columns() {
            writer.add_column(column).unwrap();
        }
        for (i, (x, y)) in points.iter().enumerate() {
            writer.add_feature(&sample_point(i as u64, *x, *y)).unwrap();
        }
        let bytes = writer.close().unwrap().0.into_inner();
        let mut reader = LayerReader::open(Cursor::new(bytes), ReaderOptions::new()).unwrap();

        let mut ids_in = |query: BoundingBox| -> Vec<u64> {
            reader.set_spatial_filter(Some(query));
            let mut ids: Vec<u64> = read_all(&mut reader).unwrap().iter().map(id_of).collect();
            ids.sort();
            ids
        };
        assert_eq!(ids_in(BoundingBox::new(4.0, 4.0, 6.0, 6.0)), vec![2], "indexed: {}", indexed);
        assert_eq!(ids_in(BoundingBox::new(-1.0, -1.0, 11.0, 11.0)), vec![0, 1, 2]);
        assert!(ids_in(BoundingBox::new(100.0, 100.0, 200.0, 200.0)).is_empty());
    }
}

#[test]
fn test_random_access_by_fid() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(500, 3);
            for indexed in [false, true] {
                let path = ctx.file(&format!("fid-{}.gbn", indexed));
                write_points(&path, point_options("fid", indexed), &points)?;
                let mut reader = open(&path)?;
                let all = read_all(&mut reader)?;
                for fid in [0u64, 1, 250, 499] {
                    let feature = reader.get_feature(fid)?;
                    assert_eq!(feature.as_ref(), all.get(fid as usize));
                }
                assert!(reader.get_feature(500)?.is_none());
                assert!(reader.capabilities().random_read);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_filter_counts_and_reset() {
    run_test(
        || create_test_context(),
        |ctx| {
            let points = random_points(2_000, 11);
            let path = ctx.file("count.gbn");
            write_points(&path, point_options("count", true), &points)?;
            let mut reader = open(&path)?;
            assert!(reader.capabilities().fast_feature_count);
            assert_eq!(reader.feature_count()?, 2_000);

            let query = BoundingBox::new(250.0, 250.0, 500.0, 500.0);
            reader.set_spatial_filter(Some(query));
            assert!(!reader.capabilities().fast_feature_count);
            let expected = brute_force(&points, &query).len() as u64;

            // counting leaves the iteration position alone
            let first = reader.next_feature()?;
            assert!(first.is_some());
            assert_eq!(reader.feature_count()?, expected);
            let rest = read_all(&mut reader)?;
            assert_eq!(rest.len() as u64 + 1, expected);

            reader.reset_reading();
            assert_eq!(read_all(&mut reader)?.len() as u64, expected);
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}
