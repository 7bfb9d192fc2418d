//! Regional aggregation benchmarks.
//!
//! Measures:
//! - Grid partitioning cost per resolution
//! - Land-cover aggregation of one region over growing cover layers
//! - Building aggregation (union pass plus attribution pass)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geosift_spatial::{
    AggregationTarget, AttrValue, EmbeddedFeatureStore, Envelope, FeatureId, FeatureStore,
    GridPartitioner, GridSpec, LandCoverClassifier, LayerBuilder, Region, RegionalAggregator,
};
use std::collections::BTreeMap;
use std::sync::Arc;

// ============================================================================
// Test Data Generation
// ============================================================================

const CODES: [&str; 5] = ["ms0", "hd1", "pu0", "ms4", "zz9"];

fn square(x: f64, y: f64, size: f64) -> String {
    format!(
        "POLYGON(({x} {y}, {} {y}, {} {}, {x} {}, {x} {y}))",
        x + size,
        x + size,
        y + size,
        y + size
    )
}

/// A `side × side` checkerboard of cover squares over `[0, extent]²`.
fn cover_store(side: usize, extent: f64) -> (Arc<EmbeddedFeatureStore>, AggregationTarget) {
    let store = Arc::new(EmbeddedFeatureStore::new());
    let step = extent / side as f64;
    let mut builder = LayerBuilder::new("plotai#PLO_P");
    for row in 0..side {
        for col in 0..side {
            let mut attrs = BTreeMap::new();
            attrs.insert(
                "GKODAS".to_string(),
                AttrValue::from(CODES[(row + col) % CODES.len()]),
            );
            let wkt = square(col as f64 * step, row as f64 * step, step);
            let _ = builder.add_wkt(format!("c{row}_{col}"), &wkt, attrs);
        }
    }
    let info = store.add_layer(builder.build().layer);
    (
        store,
        AggregationTarget::LandCover {
            cover: info.id,
            grid: GridSpec::new(4, 4),
        },
    )
}

fn region(extent: f64) -> Region {
    Region::new(
        FeatureId::from("bench"),
        "bench",
        Envelope::new(0.0, 0.0, extent, extent).to_multi_polygon(),
    )
    .unwrap()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_partition");
    let partitioner = GridPartitioner::default();
    let env = Envelope::new(0.0, 0.0, 10_000.0, 10_000.0);

    for side in [4u32, 10, 32] {
        group.throughput(Throughput::Elements(u64::from(side * side)));
        group.bench_with_input(BenchmarkId::new("cells", side), &side, |b, side| {
            b.iter(|| {
                let cells = partitioner
                    .partition(black_box(&env), GridSpec::new(*side, *side))
                    .unwrap();
                black_box(cells.len())
            });
        });
    }

    group.finish();
}

fn bench_land_cover(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("land_cover_aggregation");
    let extent = 10_000.0;
    let region = region(extent);

    for side in [10usize, 30, 60] {
        let (store, target) = cover_store(side, extent);
        let store: Arc<dyn FeatureStore> = store;
        let aggregator = RegionalAggregator::new(store, LandCoverClassifier::default());

        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::new("features", side * side), &target, |b, target| {
            b.iter(|| {
                let result = rt.block_on(aggregator.aggregate(&region, target)).unwrap();
                black_box(result.region_area)
            });
        });
    }

    group.finish();
}

fn bench_buildings(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("building_aggregation");
    let extent = 2_000.0;
    let region = region(extent);

    let (store, cover) = cover_store(10, extent);
    let AggregationTarget::LandCover { cover, .. } = cover else {
        unreachable!()
    };
    let mut builder = LayerBuilder::new("pastatai#PAS_P");
    for i in 0..400 {
        let x = (i % 20) as f64 * 100.0 + 10.0;
        let y = (i / 20) as f64 * 100.0 + 10.0;
        let _ = builder.add_wkt(format!("b{i}"), &square(x, y, 60.0), BTreeMap::new());
    }
    let buildings = store.add_layer(builder.build().layer);
    let target = AggregationTarget::Buildings {
        buildings: buildings.id,
        cover,
        grid: GridSpec::new(10, 10),
    };
    let store: Arc<dyn FeatureStore> = store;
    let aggregator = RegionalAggregator::new(store, LandCoverClassifier::default());

    group.bench_function("400_buildings_10x10", |b| {
        b.iter(|| {
            let result = rt.block_on(aggregator.aggregate(&region, &target)).unwrap();
            black_box(result.region_area)
        });
    });

    group.finish();
}

criterion_group!(benches, bench_partition, bench_land_cover, bench_buildings);
criterion_main!(benches);
