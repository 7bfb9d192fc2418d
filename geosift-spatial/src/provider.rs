//! Feature store trait.
//!
//! Abstracts over where layers live. Analyses, the search pipeline and
//! selection all go through [`FeatureStore`], so they work the same against
//! the in-process [`EmbeddedFeatureStore`] or any other backend.
//!
//! # Query model
//!
//! A [`FeatureQuery`] is one spatial predicate plus zero or more attribute
//! filters. Evaluation is two-phase: the query envelope is compared with the
//! feature's precomputed envelope first, and only survivors run the exact
//! `geo` predicate. Results keep layer order.
//!
//! # Interior mutability
//!
//! The embedded store registers layers behind a `RwLock`, so an
//! `Arc<dyn FeatureStore>` can be shared by every worker while new layers are
//! still being added.

use crate::error::{Result, SpatialError};
use crate::feature::{
    AttrValue, Feature, FeatureCollection, FeatureId, Layer, LayerId, LayerInfo, PaletteColor,
};
use crate::geometry::Envelope;
use async_trait::async_trait;
use geo::{Intersects, Relate};
use geo_types::Geometry;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Spatial predicate of a query.
#[derive(Debug, Clone)]
pub enum SpatialPredicate {
    /// Every feature.
    All,

    /// Feature envelope intersects the box (shared edges count).
    IntersectsEnvelope(Envelope),

    /// Feature geometry intersects the query geometry.
    Intersects(Geometry<f64>),

    /// Feature geometry touches the query geometry: boundaries meet,
    /// interiors do not.
    Touches(Geometry<f64>),
}

impl SpatialPredicate {
    /// Envelope used for the prefilter; `None` means no prefilter.
    fn envelope(&self) -> Option<Envelope> {
        match self {
            SpatialPredicate::All => None,
            SpatialPredicate::IntersectsEnvelope(env) => Some(*env),
            SpatialPredicate::Intersects(g) | SpatialPredicate::Touches(g) => {
                Envelope::from_geometry(g)
            }
        }
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        if matches!(self, SpatialPredicate::All) {
            return true;
        }

        // Bbox prefilter. An empty geometry on either side matches nothing.
        match (self.envelope(), feature.envelope) {
            (Some(query_env), Some(feature_env)) => {
                if !query_env.intersects(&feature_env) {
                    return false;
                }
            }
            _ => return false,
        }

        match self {
            SpatialPredicate::All => true,
            SpatialPredicate::IntersectsEnvelope(env) => {
                feature.geometry.intersects(&env.to_polygon())
            }
            SpatialPredicate::Intersects(g) => feature.geometry.intersects(g),
            SpatialPredicate::Touches(g) => feature.geometry.relate(g).is_touches(),
        }
    }
}

/// Attribute condition of a query.
#[derive(Debug, Clone)]
pub enum AttributeFilter {
    /// Attribute equals the value (numbers compare across int / real).
    Equals { attribute: String, value: AttrValue },

    /// Attribute is numeric and strictly greater than the threshold.
    GreaterThan { attribute: String, threshold: f64 },
}

impl AttributeFilter {
    pub fn equals(attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        AttributeFilter::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    pub fn greater_than(attribute: impl Into<String>, threshold: f64) -> Self {
        AttributeFilter::GreaterThan {
            attribute: attribute.into(),
            threshold,
        }
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        match self {
            AttributeFilter::Equals { attribute, value } => feature
                .attribute(attribute)
                .is_some_and(|v| v.matches(value)),
            AttributeFilter::GreaterThan {
                attribute,
                threshold,
            } => feature.number(attribute).is_some_and(|v| v > *threshold),
        }
    }
}

/// Conjunction of a spatial predicate and attribute filters.
#[derive(Debug, Clone)]
pub struct FeatureQuery {
    pub predicate: SpatialPredicate,
    pub attributes: Vec<AttributeFilter>,
    pub limit: Option<usize>,
}

impl FeatureQuery {
    pub fn all() -> Self {
        Self::with_predicate(SpatialPredicate::All)
    }

    pub fn intersecting_envelope(envelope: Envelope) -> Self {
        Self::with_predicate(SpatialPredicate::IntersectsEnvelope(envelope))
    }

    pub fn intersecting(geometry: impl Into<Geometry<f64>>) -> Self {
        Self::with_predicate(SpatialPredicate::Intersects(geometry.into()))
    }

    pub fn touching(geometry: impl Into<Geometry<f64>>) -> Self {
        Self::with_predicate(SpatialPredicate::Touches(geometry.into()))
    }

    fn with_predicate(predicate: SpatialPredicate) -> Self {
        Self {
            predicate,
            attributes: Vec::new(),
            limit: None,
        }
    }

    pub fn with_attribute(mut self, filter: AttributeFilter) -> Self {
        self.attributes.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Attribute filters run first; they are cheaper than geometry.
    pub fn matches(&self, feature: &Feature) -> bool {
        self.attributes.iter().all(|f| f.matches(feature)) && self.predicate.matches(feature)
    }
}

/// Feature store trait.
///
/// Layer ids are assigned at registration and stay valid for the lifetime
/// of the store.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Registered layers, in registration order.
    fn layers(&self) -> Vec<LayerInfo>;

    /// First layer whose title contains `pattern`, ignoring case.
    fn find_layer_by_name(&self, pattern: &str) -> Option<LayerInfo> {
        let needle = pattern.to_lowercase();
        self.layers()
            .into_iter()
            .find(|info| info.title.to_lowercase().contains(&needle))
    }

    /// Features of a layer matching the query, in layer order.
    async fn query(&self, layer: LayerId, query: &FeatureQuery) -> Result<FeatureCollection>;

    /// Features of a layer with the given identities, in layer order.
    /// Unknown ids are ignored.
    async fn features_by_ids(
        &self,
        layer: LayerId,
        ids: &BTreeSet<FeatureId>,
    ) -> Result<FeatureCollection>;
}

struct StoredLayer {
    info: LayerInfo,
    features: Vec<Feature>,
    by_id: FxHashMap<FeatureId, usize>,
}

/// In-process feature store.
#[derive(Default)]
pub struct EmbeddedFeatureStore {
    layers: RwLock<Vec<Arc<StoredLayer>>>,
}

impl EmbeddedFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a layer and return its catalog entry.
    pub fn add_layer(&self, layer: Layer) -> LayerInfo {
        let mut layers = self.layers.write().unwrap_or_else(PoisonError::into_inner);
        let info = LayerInfo {
            id: LayerId(layers.len() as u32),
            color: PaletteColor::for_title(&layer.title),
            title: layer.title,
            kind: layer.kind,
            feature_count: layer.features.len(),
        };
        let by_id = layer
            .features
            .iter()
            .enumerate()
            .map(|(i, f)| (f.id.clone(), i))
            .collect();

        tracing::debug!(
            layer = %info.title,
            id = %info.id,
            kind = %info.kind,
            features = info.feature_count,
            "registered layer"
        );

        layers.push(Arc::new(StoredLayer {
            info: info.clone(),
            features: layer.features,
            by_id,
        }));
        info
    }

    /// Snapshot one layer without holding the lock during evaluation.
    fn layer(&self, id: LayerId) -> Result<Arc<StoredLayer>> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers
            .get(id.0 as usize)
            .cloned()
            .ok_or(SpatialError::UnknownLayer(id.0))
    }
}

#[async_trait]
impl FeatureStore for EmbeddedFeatureStore {
    fn layers(&self) -> Vec<LayerInfo> {
        let layers = self.layers.read().unwrap_or_else(PoisonError::into_inner);
        layers.iter().map(|l| l.info.clone()).collect()
    }

    async fn query(&self, layer: LayerId, query: &FeatureQuery) -> Result<FeatureCollection> {
        let stored = self.layer(layer)?;
        let limit = query.limit.unwrap_or(usize::MAX);

        let results: FeatureCollection = stored
            .features
            .iter()
            .filter(|f| query.matches(f))
            .take(limit)
            .cloned()
            .collect();

        tracing::trace!(layer = %stored.info.title, hits = results.len(), "query");
        Ok(results)
    }

    async fn features_by_ids(
        &self,
        layer: LayerId,
        ids: &BTreeSet<FeatureId>,
    ) -> Result<FeatureCollection> {
        let stored = self.layer(layer)?;
        let mut positions: Vec<usize> = ids
            .iter()
            .filter_map(|id| stored.by_id.get(id).copied())
            .collect();
        positions.sort_unstable();
        Ok(positions
            .into_iter()
            .map(|i| stored.features[i].clone())
            .collect())
    }
}
