//! Site-suitability search pipeline.
//!
//! Seven stages, each consuming the previous stage's output:
//!
//! 1. road buffer: roads clipped to the search area, buffered, unioned
//! 2. forest extraction: forest cover ∩ road buffer, large enough clearings
//! 3. river filter: clearings crossed by a wide enough river
//! 4. height filter: clearings spanning a large enough elevation difference
//! 5. peak detection: elevation polygons with no higher touching neighbour
//! 6. peak correlation: number of peaks on each clearing
//! 7. ranking: most peaks first
//!
//! Every layer role and the search area are validated before stage 1 runs.
//! Each stage's output is kept as a named [`PipelineArtifact`].

mod clearings;
mod filters;
mod peaks;
mod road_buffer;

pub use peaks::{correlate_peaks, rank_sites};

use crate::classify::LandCoverClassifier;
use crate::config::{AnalysisConfig, AttributeNames, LayerRoles};
use crate::error::{PreconditionFailure, Result, SpatialError};
use crate::feature::{Feature, FeatureCollection, FeatureId, LayerId};
use crate::geometry::Envelope;
use crate::preflight::{LayerRole, RoleResolver};
use crate::provider::FeatureStore;
use crate::scheduler::CancelFlag;
use geo_types::Geometry;
use serde::Serialize;
use std::sync::Arc;

/// Elevation difference across a clearing (real).
pub const HEIGHT_DIFF_ATTR: &str = "HeightDiff";

/// Number of peaks on a clearing (integer).
pub const PEAKS_QTY_ATTR: &str = "PeaksQty";

/// Identity of the land-cover feature a clearing was cut from.
pub const SOURCE_ID_ATTR: &str = "SourceId";

/// Identity of the single road-buffer feature.
pub const ROAD_BUFFER_ID: &str = "RB";

pub const ROAD_BUFFER: &str = "road buffer";
pub const FOREST_INTERSECTION: &str = "forest intersection";
pub const FORESTS_WITH_RIVER: &str = "forests with river";
pub const FORESTS_WITH_HEIGHT_DIFF: &str = "forests with height diff";
pub const PEAKS: &str = "peaks";
pub const FORESTS_WITH_PEAKS: &str = "forests with peaks";

/// User-supplied search thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SearchParams {
    pub min_clearing_area: f64,
    pub max_road_distance: f64,
    pub min_river_width: f64,
    pub min_height_diff: f64,
}

impl SearchParams {
    /// Parse the four raw values. Each must be a finite, non-negative real;
    /// every bad value is reported.
    pub fn parse(
        min_clearing_area: &str,
        max_road_distance: &str,
        min_river_width: &str,
        min_height_diff: &str,
    ) -> Result<Self> {
        let mut failures = Vec::new();
        let mut field = |name: &str, raw: &str| -> f64 {
            match raw.trim().parse::<f64>() {
                Ok(v) if v.is_finite() && v >= 0.0 => v,
                _ => {
                    failures.push(PreconditionFailure::InvalidParameter {
                        name: name.to_string(),
                        value: raw.to_string(),
                    });
                    0.0
                }
            }
        };

        let params = SearchParams {
            min_clearing_area: field("min_clearing_area", min_clearing_area),
            max_road_distance: field("max_road_distance", max_road_distance),
            min_river_width: field("min_river_width", min_river_width),
            min_height_diff: field("min_height_diff", min_height_diff),
        };

        if failures.is_empty() {
            Ok(params)
        } else {
            Err(SpatialError::Preconditions(failures))
        }
    }
}

/// Named intermediate feature collection produced by one stage.
#[derive(Debug, Clone)]
pub struct PipelineArtifact {
    pub name: &'static str,
    pub features: FeatureCollection,
}

/// Candidate counts after each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub clearings: usize,
    pub with_river: usize,
    pub with_height_diff: usize,
    /// Clearings dropped because no elevation polygon intersects them.
    pub no_height_data: usize,
    pub peaks: usize,
    pub ranked: usize,
}

/// Final, ranked candidate site.
#[derive(Debug, Clone, Serialize)]
pub struct RankedSite {
    pub id: FeatureId,
    #[serde(skip)]
    pub geometry: Geometry<f64>,
    pub height_diff: f64,
    pub peaks_qty: i64,
}

/// Everything a search produced.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub artifacts: Vec<PipelineArtifact>,
    pub sites: Vec<RankedSite>,
    pub counts: StageCounts,
}

impl SearchOutcome {
    pub fn artifact(&self, name: &str) -> Option<&PipelineArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }
}

/// Layers bound to the pipeline's roles.
#[derive(Debug, Clone, Copy)]
struct BoundLayers {
    roads: LayerId,
    hydrography: LayerId,
    land_cover: LayerId,
    elevation: LayerId,
}

/// Site-suitability search over a feature store.
pub struct SearchPipeline {
    store: Arc<dyn FeatureStore>,
    classifier: LandCoverClassifier,
    attributes: AttributeNames,
    roles: LayerRoles,
    cancel: CancelFlag,
}

impl SearchPipeline {
    pub fn new(store: Arc<dyn FeatureStore>, config: &AnalysisConfig) -> Self {
        Self {
            store,
            classifier: LandCoverClassifier::new(
                &config.attributes.classification,
                &config.classification,
            ),
            attributes: config.attributes.clone(),
            roles: config.roles.clone(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Bind every role and check the search area; all failures at once.
    fn preflight(&self, search_area: Option<Envelope>) -> Result<(BoundLayers, Envelope)> {
        let mut resolver = RoleResolver::new(self.store.as_ref(), &self.roles);
        let roads = resolver.resolve(LayerRole::Roads);
        let hydrography = resolver.resolve(LayerRole::Hydrography);
        let land_cover = resolver.resolve(LayerRole::LandCover);
        let elevation = resolver.resolve(LayerRole::Elevation);

        let area = search_area.filter(|a| a.is_finite());
        if area.is_none() {
            resolver.push(PreconditionFailure::MissingSearchArea);
        }
        resolver.finish()?;

        match (roads, hydrography, land_cover, elevation, area) {
            (Some(r), Some(h), Some(c), Some(e), Some(area)) => Ok((
                BoundLayers {
                    roads: r.id,
                    hydrography: h.id,
                    land_cover: c.id,
                    elevation: e.id,
                },
                area,
            )),
            _ => Err(SpatialError::Internal("role binding incomplete".into())),
        }
    }

    /// Run all seven stages over the search area.
    #[tracing::instrument(skip(self))]
    pub async fn run(
        &self,
        params: &SearchParams,
        search_area: Option<Envelope>,
    ) -> Result<SearchOutcome> {
        let (layers, area) = self.preflight(search_area)?;
        let search_polygon = area.to_polygon();
        let mut counts = StageCounts::default();
        let mut artifacts = Vec::with_capacity(6);

        let buffer = road_buffer::buffer_roads(
            self.store.as_ref(),
            layers.roads,
            &search_polygon,
            params.max_road_distance,
        )
        .await?;
        tracing::info!(stage = "road_buffer", polygons = buffer.0.len(), "stage complete");
        artifacts.push(PipelineArtifact {
            name: ROAD_BUFFER,
            features: FeatureCollection::new(vec![Feature::new(
                ROAD_BUFFER_ID,
                Geometry::MultiPolygon(buffer.clone()),
            )]),
        });
        self.cancel.check("search")?;

        let clearings = clearings::extract_clearings(
            self.store.as_ref(),
            layers.land_cover,
            &self.classifier,
            &search_polygon,
            &buffer,
            params.min_clearing_area,
        )
        .await?;
        counts.clearings = clearings.len();
        tracing::info!(stage = "forest_extraction", candidates = counts.clearings, "stage complete");
        artifacts.push(artifact(FOREST_INTERSECTION, &clearings));
        self.cancel.check("search")?;

        let with_river = filters::river_filter(
            self.store.as_ref(),
            layers.hydrography,
            &self.attributes.river_width,
            clearings,
            params.min_river_width,
        )
        .await;
        counts.with_river = with_river.len();
        tracing::info!(stage = "river_filter", candidates = counts.with_river, "stage complete");
        artifacts.push(artifact(FORESTS_WITH_RIVER, &with_river));
        self.cancel.check("search")?;

        let height = filters::height_filter(
            self.store.as_ref(),
            layers.elevation,
            &self.attributes.height,
            with_river,
            params.min_height_diff,
        )
        .await;
        counts.with_height_diff = height.kept.len();
        counts.no_height_data = height.no_height_data;
        tracing::info!(
            stage = "height_filter",
            candidates = counts.with_height_diff,
            no_height_data = counts.no_height_data,
            "stage complete"
        );
        artifacts.push(artifact(FORESTS_WITH_HEIGHT_DIFF, &height.kept));
        self.cancel.check("search")?;

        let peaks = peaks::detect_peaks(
            self.store.as_ref(),
            layers.elevation,
            &self.attributes.height,
            &search_polygon,
        )
        .await?;
        counts.peaks = peaks.len();
        tracing::info!(stage = "peak_detection", peaks = counts.peaks, "stage complete");
        artifacts.push(artifact(PEAKS, &peaks));
        self.cancel.check("search")?;

        let correlated = correlate_peaks(height.kept, &peaks);
        artifacts.push(artifact(FORESTS_WITH_PEAKS, &correlated));

        let sites = rank_sites(correlated);
        counts.ranked = sites.len();
        tracing::info!(stage = "ranking", sites = counts.ranked, "search complete");

        Ok(SearchOutcome {
            artifacts,
            sites,
            counts,
        })
    }
}

fn artifact(name: &'static str, features: &[Feature]) -> PipelineArtifact {
    PipelineArtifact {
        name,
        features: features.iter().cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LayerBuilder;
    use crate::geometry::LayerKind;
    use crate::provider::EmbeddedFeatureStore;

    #[test]
    fn test_parse_reports_each_bad_parameter() {
        let err = SearchParams::parse("100", "-5", "abc", "NaN").unwrap_err();
        let failures = err.preconditions();
        assert_eq!(failures.len(), 3);
        assert_eq!(
            failures[0],
            PreconditionFailure::InvalidParameter {
                name: "max_road_distance".into(),
                value: "-5".into(),
            }
        );
    }

    #[test]
    fn test_parse_accepts_trimmed_reals() {
        let params = SearchParams::parse(" 1000 ", "50", "2.5", "0").unwrap();
        assert_eq!(params.min_clearing_area, 1000.0);
        assert_eq!(params.min_river_width, 2.5);
        assert_eq!(params.min_height_diff, 0.0);
    }

    #[tokio::test]
    async fn test_preflight_fails_before_any_stage() {
        let store = Arc::new(EmbeddedFeatureStore::new());
        store.add_layer(
            LayerBuilder::new("KEL_L")
                .with_kind(LayerKind::Polygon)
                .build()
                .layer,
        );
        let pipeline = SearchPipeline::new(store, &AnalysisConfig::default());
        let params = SearchParams::parse("0", "10", "0", "0").unwrap();

        let err = pipeline.run(&params, None).await.unwrap_err();
        let failures = err.preconditions();
        // wrong-kind roads, three missing layers, no search area
        assert_eq!(failures.len(), 5);
        assert!(failures.contains(&PreconditionFailure::MissingSearchArea));
        assert!(matches!(failures[0], PreconditionFailure::WrongKind { .. }));
    }
}
