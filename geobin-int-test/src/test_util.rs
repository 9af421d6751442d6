use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use geobin::{
    BoundingBox, Column, ColumnType, ColumnValue, Dimensions, Feature, GeobinResult,
    GeometryKind, GeometryValue, LayerReader, LayerWriter, ReaderOptions, WriteSummary,
    WriterOptions,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::backtrace::Backtrace;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;

/// Runs `test` between `before` and `after`. `after` runs even when the
/// test fails; a failure or panic is reported with its backtrace.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> GeobinResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> GeobinResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> GeobinResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    let start_time = Instant::now();
    let result = std::panic::catch_unwind(|| {
        let backtrace = Backtrace::capture();
        match before() {
            Ok(ctx) => match test(ctx.clone()) {
                Ok(_) => after(ctx).map_err(|e| {
                    (format!("After run failed: {:?}", e), backtrace.to_string())
                }),
                Err(e) => {
                    let _ = after(ctx);
                    Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                }
            },
            Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
        }
    });

    let (error, backtrace) = match result {
        Ok(Ok(_)) => return,
        Ok(Err((e, bt))) => (e, bt),
        Err(panic_err) => {
            let msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_err.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            (format!("Panic: {}", msg), Backtrace::capture().to_string())
        }
    };

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {:?}", start_time.elapsed());
    eprintln!("Error: {}", error);
    if !backtrace.is_empty() && !backtrace.contains("disabled") {
        eprintln!("\nBacktrace:\n{}", backtrace);
    }
    eprintln!("=====================================================\n");
    panic!("{}", error);
}

/// Scratch directory shared by one test.
#[derive(Clone)]
pub struct TestContext {
    dir: Arc<TempDir>,
}

impl TestContext {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the scratch directory.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn create_test_context() -> GeobinResult<TestContext> {
    Ok(TestContext {
        dir: Arc::new(tempfile::tempdir()?),
    })
}

/// The scratch directory is removed when the last context clone drops.
pub fn cleanup(_ctx: TestContext) -> GeobinResult<()> {
    Ok(())
}

/// Schema used by the generated layers: one column of most types.
pub fn sample_columns() -> Vec<Column> {
    vec![
        Column::new("id", ColumnType::ULong).primary_key().not_null(),
        Column::new("name", ColumnType::String).with_width(32),
        Column::new("score", ColumnType::Double).with_precision(10, 3),
        Column::new("flag", ColumnType::Bool),
        Column::new("small", ColumnType::Short),
        Column::new("seen", ColumnType::DateTime),
        Column::new("blob", ColumnType::Binary),
        Column::new("attrs", ColumnType::Json),
    ]
}

fn sample_time(seconds: i64) -> DateTime<FixedOffset> {
    Utc.timestamp_opt(1_600_000_000 + seconds, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

/// A point feature for [`sample_columns`] with some values left unset.
pub fn sample_point(i: u64, x: f64, y: f64) -> Feature {
    let mut feature = Feature::new(sample_columns().len()).with_geometry(GeometryValue::point(x, y));
    feature.set_property(0, Some(ColumnValue::ULong(i)));
    feature.set_property(1, Some(ColumnValue::String(format!("feature-{}", i))));
    if i % 3 != 0 {
        feature.set_property(2, Some(ColumnValue::Double(i as f64 * 0.5)));
    }
    feature.set_property(3, Some(ColumnValue::Bool(i % 2 == 0)));
    feature.set_property(4, Some(ColumnValue::Short((i % 1000) as i16)));
    if i % 5 != 0 {
        feature.set_property(5, Some(ColumnValue::DateTime(sample_time(i as i64))));
    }
    if i % 7 == 0 {
        feature.set_property(6, Some(ColumnValue::Binary(vec![i as u8; (i % 13) as usize])));
    }
    feature.set_property(7, Some(ColumnValue::Json(format!("{{\"i\":{}}}", i))));
    feature
}

/// `count` random points inside `[0, 1000) x [0, 1000)`.
pub fn random_points(count: usize, seed: u64) -> Vec<(f64, f64)> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0)))
        .collect()
}

pub fn point_options(name: &str, indexed: bool) -> WriterOptions {
    WriterOptions::new(name)
        .geometry_kind(GeometryKind::Point)
        .dimensions(Dimensions::XY)
        .spatial_index(indexed)
}

/// Writes `points` as [`sample_point`] features to `path`.
pub fn write_points(
    path: &Path,
    options: WriterOptions,
    points: &[(f64, f64)],
) -> GeobinResult<WriteSummary> {
    let mut writer = LayerWriter::create_path(path, options)?;
    for column in sample_columns() {
        writer.add_column(column)?;
    }
    for (i, (x, y)) in points.iter().enumerate() {
        writer.add_feature(&sample_point(i as u64, *x, *y))?;
    }
    let (_, summary) = writer.close()?;
    Ok(summary)
}

pub fn open(path: &Path) -> GeobinResult<LayerReader<BufReader<File>>> {
    LayerReader::open_path(path, ReaderOptions::new())
}

/// Drains the reader.
pub fn read_all<R: std::io::Read + std::io::Seek>(
    reader: &mut LayerReader<R>,
) -> GeobinResult<Vec<Feature>> {
    let mut features = Vec::new();
    while let Some(feature) = reader.next_feature()? {
        features.push(feature);
    }
    Ok(features)
}

/// The `id` property of a [`sample_point`] feature.
pub fn id_of(feature: &Feature) -> u64 {
    match feature.property(0) {
        Some(ColumnValue::ULong(id)) => *id,
        other => panic!("feature without id: {:?}", other),
    }
}

/// Indices of the points inside `query`, edges included.
pub fn brute_force(points: &[(f64, f64)], query: &BoundingBox) -> Vec<u64> {
    points
        .iter()
        .enumerate()
        .filter(|(_, (x, y))| query.contains_point(*x, *y))
        .map(|(i, _)| i as u64)
        .collect()
}
