//! Grid-partitioned regional aggregation.
//!
//! A region's envelope is split into grid cells; each cell clips the region
//! to the cell box, queries the cover layer for candidates near the cell and
//! measures `cellRegion ∩ candidate` per land-cover category. Cells are
//! evaluated with bounded concurrency and merged by a single-threaded fold,
//! so totals do not depend on visiting order beyond floating-point rounding.
//!
//! Three kinds of aggregation share this machinery:
//! - land cover: intersected area per category, percentages of region area
//! - roads: intersected road length, density per region area
//! - buildings: building footprints unioned per cell, then attributed to
//!   categories by the cover they sit on; percentages of footprint area

use crate::classify::{Category, LandCoverClassifier};
use crate::config::{AnalysisConfig, GridConfig, GridSpec};
use crate::error::{Result, SpatialError};
use crate::feature::{Feature, FeatureId, LayerId};
use crate::geometry::{lineal, polygonal, Envelope};
use crate::grid::{GridCell, GridPartitioner};
use crate::preflight::{LayerRole, RoleResolver};
use crate::provider::{FeatureQuery, FeatureStore};
use crate::scheduler::{CancelFlag, ConcurrencyScheduler};
use futures::stream::{self, StreamExt};
use geo::{Area, BooleanOps, BoundingRect, Euclidean, Length};
use geo_types::MultiPolygon;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Square metres per square kilometre.
const M2_PER_KM2: f64 = 1_000_000.0;

/// Per-category accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub hydro: f64,
    pub forest: f64,
    pub building: f64,
    pub garden: f64,
    pub unknown: f64,
}

impl CategoryTotals {
    pub fn add(&mut self, category: Category, value: f64) {
        *self.slot(category) += value;
    }

    pub fn get(&self, category: Category) -> f64 {
        match category {
            Category::Hydro => self.hydro,
            Category::Forest => self.forest,
            Category::Building => self.building,
            Category::Garden => self.garden,
            Category::Unknown => self.unknown,
        }
    }

    pub fn merge(&mut self, other: &CategoryTotals) {
        for category in Category::ALL {
            self.add(category, other.get(category));
        }
    }

    pub fn total(&self) -> f64 {
        Category::ALL.iter().map(|c| self.get(*c)).sum()
    }

    fn slot(&mut self, category: Category) -> &mut f64 {
        match category {
            Category::Hydro => &mut self.hydro,
            Category::Forest => &mut self.forest,
            Category::Building => &mut self.building,
            Category::Garden => &mut self.garden,
            Category::Unknown => &mut self.unknown,
        }
    }
}

/// Unit of aggregation: a named polygonal region.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: FeatureId,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
    pub envelope: Envelope,
}

impl Region {
    pub fn new(
        id: FeatureId,
        name: impl Into<String>,
        geometry: MultiPolygon<f64>,
    ) -> Result<Self> {
        let name = name.into();
        let envelope = geometry
            .bounding_rect()
            .map(|rect| Envelope::from_rect(&rect))
            .ok_or_else(|| SpatialError::InvalidGeometry(format!("region '{name}' is empty")))?;
        Ok(Self {
            id,
            name,
            geometry,
            envelope,
        })
    }

    /// Region from a polygon feature; the name comes from `name_attribute`,
    /// falling back to the feature id.
    pub fn from_feature(feature: &Feature, name_attribute: &str) -> Result<Self> {
        let geometry = polygonal(&feature.geometry).ok_or_else(|| {
            SpatialError::InvalidGeometry(format!("region '{}' is not polygonal", feature.id))
        })?;
        let name = feature
            .attribute(name_attribute)
            .map(|v| v.to_string())
            .unwrap_or_else(|| feature.id.to_string());
        Self::new(feature.id.clone(), name, geometry)
    }

    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

/// Kind of regional statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    LandCover,
    Roads,
    Buildings,
}

impl AggregationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::LandCover => "land_cover",
            AggregationKind::Roads => "roads",
            AggregationKind::Buildings => "buildings",
        }
    }

    pub fn grid(&self, config: &GridConfig) -> GridSpec {
        match self {
            AggregationKind::LandCover => config.land_cover,
            AggregationKind::Roads => config.roads,
            AggregationKind::Buildings => config.buildings,
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bound layers and grid for one aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationTarget {
    LandCover {
        cover: LayerId,
        grid: GridSpec,
    },
    Roads {
        roads: LayerId,
        grid: GridSpec,
    },
    Buildings {
        buildings: LayerId,
        cover: LayerId,
        grid: GridSpec,
    },
}

impl AggregationTarget {
    pub fn kind(&self) -> AggregationKind {
        match self {
            AggregationTarget::LandCover { .. } => AggregationKind::LandCover,
            AggregationTarget::Roads { .. } => AggregationKind::Roads,
            AggregationTarget::Buildings { .. } => AggregationKind::Buildings,
        }
    }

    pub fn grid(&self) -> GridSpec {
        match self {
            AggregationTarget::LandCover { grid, .. }
            | AggregationTarget::Roads { grid, .. }
            | AggregationTarget::Buildings { grid, .. } => *grid,
        }
    }
}

/// Measures accumulated for one region.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegionMeasures {
    LandCover { areas: CategoryTotals },
    Roads { length: f64 },
    Buildings { footprint_area: f64, areas: CategoryTotals },
}

impl RegionMeasures {
    pub fn empty(kind: AggregationKind) -> Self {
        match kind {
            AggregationKind::LandCover => RegionMeasures::LandCover {
                areas: CategoryTotals::default(),
            },
            AggregationKind::Roads => RegionMeasures::Roads { length: 0.0 },
            AggregationKind::Buildings => RegionMeasures::Buildings {
                footprint_area: 0.0,
                areas: CategoryTotals::default(),
            },
        }
    }

    /// Fold another cell's measures into this one. Mismatched kinds are
    /// ignored.
    pub fn merge(&mut self, other: &RegionMeasures) {
        match (self, other) {
            (RegionMeasures::LandCover { areas }, RegionMeasures::LandCover { areas: more }) => {
                areas.merge(more)
            }
            (RegionMeasures::Roads { length }, RegionMeasures::Roads { length: more }) => {
                *length += more
            }
            (
                RegionMeasures::Buildings {
                    footprint_area,
                    areas,
                },
                RegionMeasures::Buildings {
                    footprint_area: more_footprint,
                    areas: more,
                },
            ) => {
                *footprint_area += more_footprint;
                areas.merge(more);
            }
            _ => {}
        }
    }

    /// Per-category totals, `None` for road statistics.
    pub fn areas(&self) -> Option<&CategoryTotals> {
        match self {
            RegionMeasures::LandCover { areas } | RegionMeasures::Buildings { areas, .. } => {
                Some(areas)
            }
            RegionMeasures::Roads { .. } => None,
        }
    }
}

/// Statistics for one region.
///
/// Percentages and densities divide by region or footprint area as is; a
/// zero base yields NaN or infinity rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub region_name: String,
    pub region_area: f64,
    pub measures: RegionMeasures,
    /// Cells whose query failed and were counted as zero.
    pub degraded_units: usize,
    /// The whole region failed, timed out or was cancelled.
    pub degraded: bool,
}

impl AggregationResult {
    /// Empty-but-present result for a region that could not be aggregated.
    pub fn empty(region_name: impl Into<String>, region_area: f64, kind: AggregationKind) -> Self {
        Self {
            region_name: region_name.into(),
            region_area,
            measures: RegionMeasures::empty(kind),
            degraded_units: 0,
            degraded: true,
        }
    }

    pub fn kind(&self) -> AggregationKind {
        match self.measures {
            RegionMeasures::LandCover { .. } => AggregationKind::LandCover,
            RegionMeasures::Roads { .. } => AggregationKind::Roads,
            RegionMeasures::Buildings { .. } => AggregationKind::Buildings,
        }
    }

    /// Base used for percentages: region area, or footprint area for
    /// building statistics.
    pub fn percentage_base(&self) -> f64 {
        match &self.measures {
            RegionMeasures::Buildings { footprint_area, .. } => *footprint_area,
            _ => self.region_area,
        }
    }

    /// Category share of the percentage base, in percent.
    pub fn percentage(&self, category: Category) -> Option<f64> {
        self.measures
            .areas()
            .map(|areas| areas.get(category) / self.percentage_base() * 100.0)
    }

    /// Road length per unit of region area.
    pub fn density(&self) -> Option<f64> {
        match self.measures {
            RegionMeasures::Roads { length } => Some(length / self.region_area),
            _ => None,
        }
    }

    /// Road length per square kilometre, with map units in metres.
    pub fn density_per_km2(&self) -> Option<f64> {
        self.density().map(|d| d * M2_PER_KM2)
    }
}

/// Outcome of one cell.
struct CellOutcome {
    measures: RegionMeasures,
    failed: bool,
    skipped: bool,
}

type CellResult = std::result::Result<RegionMeasures, (RegionMeasures, SpatialError)>;

/// Run CPU-bound geometry on the blocking pool so the async workers stay
/// free and region deadlines can fire between cells.
async fn off_runtime<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SpatialError::Task(format!("geometry task failed: {e}")))
}

/// Aggregates one region at a time against a feature store.
#[derive(Clone)]
pub struct RegionalAggregator {
    store: Arc<dyn FeatureStore>,
    classifier: Arc<LandCoverClassifier>,
    partitioner: GridPartitioner,
    cell_concurrency: usize,
    cancel: CancelFlag,
}

impl RegionalAggregator {
    pub fn new(store: Arc<dyn FeatureStore>, classifier: LandCoverClassifier) -> Self {
        Self {
            store,
            classifier: Arc::new(classifier),
            partitioner: GridPartitioner::default(),
            cell_concurrency: 4,
            cancel: CancelFlag::new(),
        }
    }

    pub fn from_config(store: Arc<dyn FeatureStore>, config: &AnalysisConfig) -> Self {
        let classifier =
            LandCoverClassifier::new(&config.attributes.classification, &config.classification);
        Self::new(store, classifier)
            .with_partitioner(GridPartitioner::new(config.grid.edge_margin))
            .with_cell_concurrency(config.concurrency.cell_concurrency)
    }

    pub fn with_partitioner(mut self, partitioner: GridPartitioner) -> Self {
        self.partitioner = partitioner;
        self
    }

    pub fn with_cell_concurrency(mut self, n: usize) -> Self {
        self.cell_concurrency = n.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Aggregate one region over its grid.
    pub async fn aggregate(
        &self,
        region: &Region,
        target: &AggregationTarget,
    ) -> Result<AggregationResult> {
        let cells = self.partitioner.partition(&region.envelope, target.grid())?;
        Ok(self.aggregate_cells(region, &cells, target).await)
    }

    /// Aggregate an explicit set of cells. Visiting order does not affect
    /// the totals.
    #[tracing::instrument(skip_all, fields(region = %region.name, kind = %target.kind(), cells = cells.len()))]
    pub async fn aggregate_cells(
        &self,
        region: &Region,
        cells: &[GridCell],
        target: &AggregationTarget,
    ) -> AggregationResult {
        let kind = target.kind();
        let initial = (RegionMeasures::empty(kind), 0usize, false);
        let shape = Arc::new(region.geometry.clone());

        let (measures, failed_units, cancelled) = stream::iter(0..cells.len())
            .map(|index| self.evaluate_cell(region, &shape, index, &cells[index], target))
            .buffer_unordered(self.cell_concurrency)
            .fold(initial, |(mut measures, failed, cancelled), outcome| async move {
                measures.merge(&outcome.measures);
                (
                    measures,
                    failed + usize::from(outcome.failed),
                    cancelled || outcome.skipped,
                )
            })
            .await;

        if failed_units > 0 {
            tracing::warn!(failed_units, "region aggregated with degraded cells");
        }
        tracing::debug!("region aggregated");

        AggregationResult {
            region_name: region.name.clone(),
            region_area: region.area(),
            measures,
            degraded_units: failed_units,
            degraded: cancelled,
        }
    }

    async fn evaluate_cell(
        &self,
        region: &Region,
        shape: &Arc<MultiPolygon<f64>>,
        index: usize,
        cell: &GridCell,
        target: &AggregationTarget,
    ) -> CellOutcome {
        let kind = target.kind();
        if self.cancel.is_cancelled() {
            return CellOutcome {
                measures: RegionMeasures::empty(kind),
                failed: false,
                skipped: true,
            };
        }

        let result = self.measure_cell(shape, cell, target).await;
        match result {
            Ok(measures) => CellOutcome {
                measures,
                failed: false,
                skipped: false,
            },
            Err((partial, e)) => {
                tracing::warn!(
                    region = %region.name,
                    cell = index,
                    row = cell.row,
                    col = cell.col,
                    error = %e,
                    "cell query failed, counted as zero"
                );
                CellOutcome {
                    measures: partial,
                    failed: true,
                    skipped: false,
                }
            }
        }
    }

    async fn measure_cell(
        &self,
        shape: &Arc<MultiPolygon<f64>>,
        cell: &GridCell,
        target: &AggregationTarget,
    ) -> CellResult {
        let kind = target.kind();
        let shape = Arc::clone(shape);
        let cell_box = cell.envelope.to_multi_polygon();
        let cell_region = off_runtime(move || shape.intersection(&cell_box))
            .await
            .map_err(|e| (RegionMeasures::empty(kind), e))?;
        if cell_region.0.is_empty() {
            return Ok(RegionMeasures::empty(kind));
        }

        match target {
            AggregationTarget::LandCover { cover, .. } => {
                self.land_cover_cell(cell, cell_region, *cover).await
            }
            AggregationTarget::Roads { roads, .. } => self.roads_cell(cell_region, *roads).await,
            AggregationTarget::Buildings {
                buildings, cover, ..
            } => self.buildings_cell(cell_region, *buildings, *cover).await,
        }
    }

    /// Area of `cellRegion ∩ cover` per category. Candidates come from the
    /// cheaper cell-box query.
    async fn land_cover_cell(
        &self,
        cell: &GridCell,
        cell_region: MultiPolygon<f64>,
        cover: LayerId,
    ) -> CellResult {
        let empty = || RegionMeasures::empty(AggregationKind::LandCover);
        let candidates = self
            .store
            .query(cover, &FeatureQuery::intersecting_envelope(cell.envelope))
            .await
            .map_err(|e| (empty(), e))?;
        tracing::debug!(candidates = candidates.len(), "land cover cell");

        let classifier = Arc::clone(&self.classifier);
        let areas = off_runtime(move || {
            let mut areas = CategoryTotals::default();
            for feature in &candidates {
                let Some(shape) = polygonal(&feature.geometry) else {
                    continue;
                };
                let area = cell_region.intersection(&shape).unsigned_area();
                areas.add(classifier.classify(feature), area);
            }
            areas
        })
        .await
        .map_err(|e| (empty(), e))?;
        Ok(RegionMeasures::LandCover { areas })
    }

    /// Length of `cellRegion ∩ road`.
    async fn roads_cell(&self, cell_region: MultiPolygon<f64>, roads: LayerId) -> CellResult {
        let empty = || RegionMeasures::empty(AggregationKind::Roads);
        let candidates = self
            .store
            .query(roads, &FeatureQuery::intersecting(cell_region.clone()))
            .await
            .map_err(|e| (empty(), e))?;

        let length = off_runtime(move || {
            candidates
                .iter()
                .filter_map(|road| lineal(&road.geometry))
                .map(|lines| Euclidean.length(&cell_region.clip(&lines, false)))
                .sum::<f64>()
        })
        .await
        .map_err(|e| (empty(), e))?;
        Ok(RegionMeasures::Roads { length })
    }

    /// Pass 1 unions the building footprints clipped to the cell region;
    /// pass 2 attributes the unioned footprint to cover categories.
    async fn buildings_cell(
        &self,
        cell_region: MultiPolygon<f64>,
        buildings: LayerId,
        cover: LayerId,
    ) -> CellResult {
        let empty = || RegionMeasures::empty(AggregationKind::Buildings);
        let candidates = self
            .store
            .query(buildings, &FeatureQuery::intersecting(cell_region.clone()))
            .await
            .map_err(|e| (empty(), e))?;

        let footprint = off_runtime(move || {
            candidates
                .iter()
                .filter_map(|b| polygonal(&b.geometry))
                .map(|shape| cell_region.intersection(&shape))
                .filter(|piece| !piece.0.is_empty())
                .fold(MultiPolygon::new(Vec::new()), |acc, piece| acc.union(&piece))
        })
        .await
        .map_err(|e| (empty(), e))?;

        let footprint_area = footprint.unsigned_area();
        if footprint.0.is_empty() {
            return Ok(empty());
        }
        let partial = || RegionMeasures::Buildings {
            footprint_area,
            areas: CategoryTotals::default(),
        };

        let covers = self
            .store
            .query(cover, &FeatureQuery::intersecting(footprint.clone()))
            .await
            .map_err(|e| (partial(), e))?;

        let classifier = Arc::clone(&self.classifier);
        let areas = off_runtime(move || {
            let mut areas = CategoryTotals::default();
            for feature in &covers {
                let Some(shape) = polygonal(&feature.geometry) else {
                    continue;
                };
                let area = footprint.intersection(&shape).unsigned_area();
                areas.add(classifier.classify(feature), area);
            }
            areas
        })
        .await
        .map_err(|e| (partial(), e))?;
        Ok(RegionMeasures::Buildings {
            footprint_area,
            areas,
        })
    }
}

/// Run one kind of regional statistics over every region in the store.
///
/// Layer roles are validated before any region is touched; every missing or
/// mismatched layer is reported in one error.
#[tracing::instrument(skip(store, config, cancel))]
pub async fn run_statistics(
    store: Arc<dyn FeatureStore>,
    config: &AnalysisConfig,
    kind: AggregationKind,
    cancel: CancelFlag,
) -> Result<Vec<AggregationResult>> {
    config.validate()?;
    let grid = kind.grid(&config.grid);

    let mut resolver = RoleResolver::new(store.as_ref(), &config.roles);
    let regions_layer = resolver.resolve(LayerRole::Regions);
    let target = match kind {
        AggregationKind::LandCover => resolver
            .resolve(LayerRole::LandCover)
            .map(|cover| AggregationTarget::LandCover {
                cover: cover.id,
                grid,
            }),
        AggregationKind::Roads => resolver
            .resolve(LayerRole::Roads)
            .map(|roads| AggregationTarget::Roads {
                roads: roads.id,
                grid,
            }),
        AggregationKind::Buildings => {
            let buildings = resolver.resolve(LayerRole::Buildings);
            let cover = resolver.resolve(LayerRole::LandCover);
            buildings
                .zip(cover)
                .map(|(b, c)| AggregationTarget::Buildings {
                    buildings: b.id,
                    cover: c.id,
                    grid,
                })
        }
    };
    resolver.finish()?;
    let (Some(regions_layer), Some(target)) = (regions_layer, target) else {
        return Err(SpatialError::Internal("role binding incomplete".into()));
    };

    let features = store.query(regions_layer.id, &FeatureQuery::all()).await?;
    let regions: Vec<Region> = features
        .iter()
        .filter_map(
            |f| match Region::from_feature(f, &config.attributes.region_name) {
                Ok(region) => Some(region),
                Err(e) => {
                    tracing::warn!(id = %f.id, error = %e, "skipping region");
                    None
                }
            },
        )
        .collect();

    tracing::info!(regions = regions.len(), grid = ?grid, "starting regional statistics");

    let aggregator = Arc::new(
        RegionalAggregator::from_config(store, config).with_cancel(cancel.clone()),
    );
    let scheduler = ConcurrencyScheduler::from_config(&config.concurrency).with_cancel(cancel);

    Ok(scheduler
        .run_all(regions, kind, move |region| {
            let aggregator = Arc::clone(&aggregator);
            async move { aggregator.aggregate(&region, &target).await }
        })
        .await)
}
