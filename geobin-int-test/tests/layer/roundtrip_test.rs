//! Write/read symmetry for indexed and sequential layers.

use geobin::{
    BoundingBox, Column, ColumnType, ColumnValue, Coord, Crs, Dimensions, Feature, GeometryKind,
    GeometryValue, LayerReader, LayerWriter, ReaderOptions, TempStoreKind, WriterOptions,
};
use geobin_int_test::test_util::{
    cleanup, create_test_context, id_of, open, point_options, random_points, read_all, run_test,
    sample_columns, sample_point, write_points,
};
use std::io::Cursor;

fn check_round_trip(count: usize, indexed: bool) {
    run_test(
        || create_test_context(),
        |ctx| {
            let path = ctx.file("roundtrip.gbn");
            let points = random_points(count, count as u64);
            let summary = write_points(&path, point_options("roundtrip", indexed), &points)?;
            assert_eq!(summary.features_written, count as u64);
            assert_eq!(summary.indexed, indexed);
            assert_eq!(
                summary.bytes_written,
                std::fs::metadata(&path)?.len()
            );

            let mut reader = open(&path)?;
            assert_eq!(reader.header().features_count, count as u64);
            assert_eq!(reader.header().columns, sample_columns());
            assert_eq!(reader.feature_count()?, count as u64);

            let features = read_all(&mut reader)?;
            assert_eq!(features.len(), count);
            let mut seen = vec![false; count];
            for (position, feature) in features.iter().enumerate() {
                assert_eq!(feature.fid, Some(position as u64));
                let id = id_of(feature);
                let (x, y) = points[id as usize];
                let expected = Feature {
                    fid: Some(position as u64),
                    ..sample_point(id, x, y)
                };
                assert_eq!(feature, &expected);
                assert!(!seen[id as usize], "feature {} read twice", id);
                seen[id as usize] = true;
            }

            if count > 0 {
                let mut extent = BoundingBox::empty();
                points.iter().for_each(|(x, y)| extent.expand_to_point(*x, *y));
                assert_eq!(reader.extent()?, Some(extent));
                assert_eq!(summary.extent, Some(extent));
            } else {
                assert_eq!(reader.extent()?, None);
            }
            Ok(())
        },
        |ctx| cleanup(ctx),
    )
}

#[test]
fn test_round_trip_empty() {
    check_round_trip(0, false);
    check_round_trip(0, true);
}

#[test]
fn test_round_trip_single() {
    check_round_trip(1, false);
    check_round_trip(1, true);
}

#[test]
fn test_round_trip_ten() {
    check_round_trip(10, false);
    check_round_trip(10, true);
}

#[test]
fn test_round_trip_large() {
    check_round_trip(100_000, false);
    check_round_trip(100_000, true);
}

#[test]
fn test_header_metadata_round_trip() {
    let crs = Crs {
        description: "WGS 84".to_string(),
        wkt: "GEOGCS[\"WGS 84\"]".to_string(),
        ..Crs::from_code("EPSG", 4326)
    };
    let options = WriterOptions::new("meta")
        .geometry_kind(GeometryKind::Polygon)
        .dimensions(Dimensions::XYZM)
        .crs(crs.clone())
        .title("Parcels")
        .description("Cadastral parcels")
        .metadata_entry("source", "survey")
        .metadata_entry("year", 2024)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    writer
        .add_column(
            Column::new("parcel", ColumnType::String)
                .with_title("Parcel number")
                .with_description("Official identifier")
                .unique(),
        )
        .unwrap();

    let ring = vec![
        Coord::xyzm(0.0, 0.0, 1.0, 10.0),
        Coord::xyzm(4.0, 0.0, 2.0, 11.0),
        Coord::xyzm(4.0, 3.0, 3.0, 12.0),
        Coord::xyzm(0.0, 0.0, 1.0, 13.0),
    ];
    let polygon = GeometryValue::Polygon(vec![ring]);
    let feature = Feature::new(1)
        .with_geometry(polygon.clone())
        .with_property(0, ColumnValue::String("17/4".into()));
    writer.add_feature(&feature).unwrap();
    let (target, _) = writer.close().unwrap();

    let mut reader = LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new()).unwrap();
    let header = reader.header().clone();
    assert_eq!(header.name, "meta");
    assert_eq!(header.title, "Parcels");
    assert_eq!(header.description, "Cadastral parcels");
    assert_eq!(header.crs, Some(crs));
    assert_eq!(header.dimensions(), Dimensions::XYZM);
    assert_eq!(header.columns[0].title, "Parcel number");
    assert!(header.columns[0].unique);
    let metadata = header.metadata_map().unwrap();
    assert_eq!(metadata["source"], "survey");
    assert_eq!(metadata["year"], 2024);

    let read = reader.next_feature().unwrap().unwrap();
    assert_eq!(read.geometry, Some(polygon));
    assert_eq!(read.property(0), Some(&ColumnValue::String("17/4".into())));
}

#[test]
fn test_mixed_geometry_layer() {
    let geometries = vec![
        GeometryValue::point(1.0, 1.0),
        GeometryValue::line_string(&[(0.0, 0.0), (5.0, 5.0)]),
        GeometryValue::polygon(&[&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 0.0)]]),
        GeometryValue::MultiPoint(vec![Coord::new(7.0, 7.0), Coord::new(8.0, 8.0)]),
        GeometryValue::GeometryCollection(vec![
            GeometryValue::point(9.0, 9.0),
            GeometryValue::line_string(&[(9.0, 9.0), (10.0, 10.0)]),
        ]),
    ];
    for indexed in [false, true] {
        let options = WriterOptions::new("mixed")
            .spatial_index(indexed)
            .temp_store(TempStoreKind::Memory);
        let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
        for geometry in &geometries {
            writer
                .add_feature(&Feature::new(0).with_geometry(geometry.clone()))
                .unwrap();
        }
        let (target, summary) = writer.close().unwrap();
        assert_eq!(summary.extent, Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));

        let mut reader =
            LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new()).unwrap();
        let mut read: Vec<GeometryValue> = read_all(&mut reader)
            .unwrap()
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect();
        assert_eq!(read.len(), geometries.len());
        if !indexed {
            assert_eq!(read, geometries);
        } else {
            for geometry in &geometries {
                let at = read.iter().position(|g| g == geometry).unwrap();
                read.remove(at);
            }
        }
    }
}

#[test]
fn test_unset_middle_property_is_skipped() {
    let options = WriterOptions::new("sparse")
        .spatial_index(false)
        .temp_store(TempStoreKind::Memory);
    let mut writer = LayerWriter::create(Cursor::new(Vec::new()), options).unwrap();
    writer.add_column(Column::new("a", ColumnType::Int)).unwrap();
    writer.add_column(Column::new("b", ColumnType::String)).unwrap();
    writer.add_column(Column::new("c", ColumnType::Double)).unwrap();
    let feature = Feature::new(3)
        .with_property(0, ColumnValue::Int(1))
        .with_property(2, ColumnValue::Double(2.5));
    writer.add_feature(&feature).unwrap();
    let (target, _) = writer.close().unwrap();

    let mut reader = LayerReader::open(Cursor::new(target.into_inner()), ReaderOptions::new()).unwrap();
    let read = reader.next_feature().unwrap().unwrap();
    assert_eq!(
        read.properties,
        vec![Some(ColumnValue::Int(1)), None, Some(ColumnValue::Double(2.5))]
    );
    assert!(read.geometry.is_none());
}
