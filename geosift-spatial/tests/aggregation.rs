//! End-to-end regional statistics through the public API.

use async_trait::async_trait;
use geo::{Area, BooleanOps};
use geosift_spatial::{
    run_statistics, AggregationKind, AggregationTarget, AnalysisConfig, AttrValue, CancelFlag,
    Category, ConcurrencyScheduler, EmbeddedFeatureStore, Envelope, FeatureCollection, FeatureId, FeatureQuery,
    FeatureStore, GridPartitioner, GridSpec, LandCoverClassifier, LayerBuilder, LayerId,
    LayerInfo, Region, RegionMeasures, RegionalAggregator, SpatialError, SpatialPredicate,
};
use geo_types::{polygon, MultiPolygon};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, AttrValue> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), AttrValue::from(*v)))
        .collect()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-3
}

/// Region "R" (1000 × 1000), forest on the NW quadrant, hydro on the SE one.
fn quadrant_store() -> Arc<EmbeddedFeatureStore> {
    let store = Arc::new(EmbeddedFeatureStore::new());

    let mut regions = LayerBuilder::new("savivaldybes#SAV_P");
    regions
        .add_wkt(
            "r1",
            "POLYGON((0 0, 1000 0, 1000 1000, 0 1000, 0 0))",
            attrs(&[("SAV", "R")]),
        )
        .unwrap();
    store.add_layer(regions.build().layer);

    let mut cover = LayerBuilder::new("plotai#PLO_P");
    cover
        .add_wkt(
            "nw",
            "POLYGON((0 500, 500 500, 500 1000, 0 1000, 0 500))",
            attrs(&[("GKODAS", "ms0")]),
        )
        .unwrap();
    cover
        .add_wkt(
            "se",
            "POLYGON((500 0, 1000 0, 1000 500, 500 500, 500 0))",
            attrs(&[("GKODAS", "hd3")]),
        )
        .unwrap();
    store.add_layer(cover.build().layer);

    store
}

fn two_by_two() -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.grid.land_cover = GridSpec::new(2, 2);
    config
}

#[tokio::test]
async fn quadrant_scenario_land_cover() {
    let store = quadrant_store();
    let results = run_statistics(
        store,
        &two_by_two(),
        AggregationKind::LandCover,
        CancelFlag::new(),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 1);
    let r = &results[0];
    assert_eq!(r.region_name, "R");
    assert!(close(r.region_area, 1_000_000.0));
    assert!(!r.degraded);
    assert_eq!(r.degraded_units, 0);

    let RegionMeasures::LandCover { areas } = &r.measures else {
        panic!("unexpected measures {:?}", r.measures);
    };
    assert!(close(areas.forest, 250_000.0));
    assert!(close(areas.hydro, 250_000.0));
    assert_eq!(areas.building, 0.0);
    assert_eq!(areas.garden, 0.0);

    assert!((r.percentage(Category::Forest).unwrap() - 25.0).abs() < 1e-6);
    assert!((r.percentage(Category::Hydro).unwrap() - 25.0).abs() < 1e-6);
    assert_eq!(r.percentage(Category::Building), Some(0.0));
    assert_eq!(r.percentage(Category::Garden), Some(0.0));
}

#[tokio::test]
async fn missing_layers_fail_before_any_region() {
    let store = Arc::new(EmbeddedFeatureStore::new());
    let err = run_statistics(
        store,
        &AnalysisConfig::default(),
        AggregationKind::Buildings,
        CancelFlag::new(),
    )
    .await
    .unwrap_err();

    // regions, buildings and land cover are all missing
    assert_eq!(err.preconditions().len(), 3);
}

#[tokio::test]
async fn results_sorted_by_name_ignoring_case() {
    let store = Arc::new(EmbeddedFeatureStore::new());
    let mut regions = LayerBuilder::new("SAV_P");
    for (i, name) in ["vilnius", "Alytus", "kaunas"].iter().enumerate() {
        let x = i as f64 * 100.0;
        let wkt = format!("POLYGON(({x} 0, {} 0, {} 50, {x} 50, {x} 0))", x + 50.0, x + 50.0);
        regions
            .add_wkt(format!("r{i}"), &wkt, attrs(&[("SAV", name)]))
            .unwrap();
    }
    store.add_layer(regions.build().layer);
    let mut roads = LayerBuilder::new("KEL_L");
    roads
        .add_wkt("k1", "LINESTRING(-10 25, 400 25)", BTreeMap::new())
        .unwrap();
    store.add_layer(roads.build().layer);

    let results = run_statistics(
        store,
        &AnalysisConfig::default(),
        AggregationKind::Roads,
        CancelFlag::new(),
    )
    .await
    .unwrap();

    let names: Vec<&str> = results.iter().map(|r| r.region_name.as_str()).collect();
    assert_eq!(names, vec!["Alytus", "kaunas", "vilnius"]);
    for r in &results {
        assert!(close(r.density().unwrap() * r.region_area, 50.0));
    }
}

/// Store whose cover queries fail for cells containing a given point.
struct FailingStore {
    inner: EmbeddedFeatureStore,
    poison: (f64, f64),
}

#[async_trait]
impl FeatureStore for FailingStore {
    fn layers(&self) -> Vec<LayerInfo> {
        self.inner.layers()
    }

    async fn query(&self, layer: LayerId, query: &FeatureQuery) -> geosift_spatial::Result<FeatureCollection> {
        if let SpatialPredicate::IntersectsEnvelope(env) = &query.predicate {
            if env.contains_point(self.poison.0, self.poison.1) {
                return Err(SpatialError::Query("connection reset".into()));
            }
        }
        self.inner.query(layer, query).await
    }

    async fn features_by_ids(
        &self,
        layer: LayerId,
        ids: &BTreeSet<FeatureId>,
    ) -> geosift_spatial::Result<FeatureCollection> {
        self.inner.features_by_ids(layer, ids).await
    }
}

#[tokio::test]
async fn failed_cell_counts_as_zero_and_is_reported() {
    let inner = EmbeddedFeatureStore::new();
    let mut cover = LayerBuilder::new("PLO_P");
    cover
        .add_wkt(
            "all",
            "POLYGON((0 0, 1000 0, 1000 1000, 0 1000, 0 0))",
            attrs(&[("GKODAS", "ms0")]),
        )
        .unwrap();
    let cover = inner.add_layer(cover.build().layer);
    let store: Arc<dyn FeatureStore> = Arc::new(FailingStore {
        inner,
        poison: (100.0, 100.0),
    });

    let region = Region::new(
        FeatureId::from("r"),
        "R",
        Envelope::new(0.0, 0.0, 1000.0, 1000.0).to_multi_polygon(),
    )
    .unwrap();
    let aggregator = RegionalAggregator::new(store, LandCoverClassifier::default());
    let result = aggregator
        .aggregate(
            &region,
            &AggregationTarget::LandCover {
                cover: cover.id,
                grid: GridSpec::new(2, 2),
            },
        )
        .await
        .unwrap();

    assert_eq!(result.degraded_units, 1);
    assert!(!result.degraded);
    let RegionMeasures::LandCover { areas } = &result.measures else {
        panic!("unexpected measures {:?}", result.measures);
    };
    // cell (0, 0) spans 0..505 on both axes
    assert!(close(areas.forest, 1_000_000.0 - 505.0 * 505.0));
}

#[tokio::test]
async fn cancelled_region_is_degraded_but_present() {
    let store = quadrant_store();
    let cancel = CancelFlag::new();
    cancel.cancel();
    let results = run_statistics(store, &two_by_two(), AggregationKind::LandCover, cancel)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].degraded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn region_deadline_interrupts_cell_geometry() {
    // 1600 cover squares under a 20 x 20 grid: far more work than 1ms.
    let store = Arc::new(EmbeddedFeatureStore::new());
    let mut cover = LayerBuilder::new("PLO_P");
    for row in 0..40 {
        for col in 0..40 {
            let (x, y) = (f64::from(col) * 25.0, f64::from(row) * 25.0);
            cover
                .add_wkt(
                    format!("c{row}_{col}"),
                    &format!(
                        "POLYGON(({x} {y}, {x2} {y}, {x2} {y2}, {x} {y2}, {x} {y}))",
                        x2 = x + 25.0,
                        y2 = y + 25.0
                    ),
                    attrs(&[("GKODAS", "ms0")]),
                )
                .unwrap();
        }
    }
    let cover = store.add_layer(cover.build().layer);

    let region = Region::new(
        FeatureId::from("r"),
        "R",
        Envelope::new(0.0, 0.0, 1000.0, 1000.0).to_multi_polygon(),
    )
    .unwrap();
    let target = AggregationTarget::LandCover {
        cover: cover.id,
        grid: GridSpec::new(20, 20),
    };
    let aggregator = Arc::new(RegionalAggregator::new(
        store,
        LandCoverClassifier::default(),
    ));

    let results = ConcurrencyScheduler::new(1)
        .with_timeout(Some(Duration::from_millis(1)))
        .run_all(vec![region], AggregationKind::LandCover, move |region| {
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.aggregate(&region, &target).await }
        })
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].region_name, "R");
    assert!(results[0].degraded);
    let RegionMeasures::LandCover { areas } = &results[0].measures else {
        panic!("unexpected measures {:?}", results[0].measures);
    };
    assert_eq!(areas.forest, 0.0);
}

fn quadrant_cells() -> Vec<geosift_spatial::GridCell> {
    GridPartitioner::default()
        .partition(&Envelope::new(0.0, 0.0, 1000.0, 1000.0), GridSpec::new(4, 4))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_cell_order_does_not_change_totals(cells in Just(quadrant_cells()).prop_shuffle()) {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let store = quadrant_store();
        let cover = store.find_layer_by_name("PLO_P").unwrap().id;
        let region = Region::new(
            FeatureId::from("r1"),
            "R",
            Envelope::new(0.0, 0.0, 1000.0, 1000.0).to_multi_polygon(),
        )
        .unwrap();
        let target = AggregationTarget::LandCover { cover, grid: GridSpec::new(4, 4) };
        let aggregator = RegionalAggregator::new(store, LandCoverClassifier::default());

        let result = rt.block_on(aggregator.aggregate_cells(&region, &cells, &target));
        let RegionMeasures::LandCover { areas } = result.measures else {
            panic!("unexpected measures");
        };
        prop_assert!(close(areas.forest, 250_000.0));
        prop_assert!(close(areas.hydro, 250_000.0));
        prop_assert!(close(areas.total(), 500_000.0));
    }

    #[test]
    fn prop_cell_regions_conserve_region_area(
        ax in 0.0f64..1000.0, ay in 0.0f64..1000.0,
        bx in 0.0f64..1000.0, by in 0.0f64..1000.0,
        cx in 0.0f64..1000.0, cy in 0.0f64..1000.0,
        cols in 1u32..8, rows in 1u32..8,
    ) {
        let triangle = polygon![(x: ax, y: ay), (x: bx, y: by), (x: cx, y: cy), (x: ax, y: ay)];
        let region_geom = MultiPolygon::new(vec![triangle]);
        let region_area = region_geom.unsigned_area();
        prop_assume!(region_area > 1.0);

        let region = Region::new(FeatureId::from("t"), "T", region_geom.clone()).unwrap();
        let cells = GridPartitioner::default()
            .partition(&region.envelope, GridSpec::new(cols, rows))
            .unwrap();
        let total: f64 = cells
            .iter()
            .map(|c| region_geom.intersection(&c.envelope.to_multi_polygon()).unsigned_area())
            .sum();

        prop_assert!((total - region_area).abs() <= region_area * 1e-6 + 1e-6);
    }
}
