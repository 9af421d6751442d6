use geobin::errors::GeobinResult;
use geobin::{BoundingBox, ReaderOptions};
use geobin_int_test::test_util::{
    create_test_context, open, point_options, random_points, write_points,
};

fn main() -> GeobinResult<()> {
    println!("Starting stress test...");
    let ctx = create_test_context()?;
    let path = ctx.file("stress.gbn");

    let count = 1_000_000;
    let points = random_points(count, 42);

    let start = std::time::Instant::now();
    let summary = write_points(&path, point_options("stress", true), &points)?;
    println!(
        "Wrote {} features ({} bytes) in {:?}",
        summary.features_written,
        summary.bytes_written,
        start.elapsed()
    );

    let start = std::time::Instant::now();
    let mut reader = open(&path)?;
    let mut read = 0u64;
    while reader.next_feature()?.is_some() {
        read += 1;
    }
    println!("Read {} features in {:?}", read, start.elapsed());

    let start = std::time::Instant::now();
    reader.set_spatial_filter(Some(BoundingBox::new(100.0, 100.0, 200.0, 200.0)));
    let hits = reader.feature_count()?;
    println!("Spatial query matched {} features in {:?}", hits, start.elapsed());

    let start = std::time::Instant::now();
    let mut reader = geobin::LayerReader::open_path(
        &path,
        ReaderOptions::new().max_batch_features(10_000),
    )?;
    let mut batches = 0;
    while reader.next_batch()?.is_some() {
        batches += 1;
    }
    println!("Read {} batches in {:?}", batches, start.elapsed());

    Ok(())
}
