//! Per-layer selection sets.
//!
//! Each layer owns one [`LayerSelection`]: a set of feature identities that
//! pointer gestures replace or extend. The set is held as an immutable
//! `Arc<BTreeSet>` swapped under a lock, so a renderer reading concurrently
//! always sees either the state before or after a `replace`, never a
//! half-applied one.
//!
//! Membership is independent of rendering; [`SelectionFilter`] is the
//! snapshot a renderer uses to split features into selected and default.

use crate::error::Result;
use crate::feature::{Feature, FeatureCollection, FeatureId, LayerId};
use crate::geometry::Envelope;
use crate::provider::{FeatureQuery, FeatureStore};
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

/// Features of `layer` whose geometry intersects the box.
pub async fn find_intersecting(
    store: &dyn FeatureStore,
    layer: LayerId,
    envelope: Envelope,
) -> Result<FeatureCollection> {
    store
        .query(layer, &FeatureQuery::intersecting_envelope(envelope))
        .await
}

/// Selection set of one layer.
#[derive(Debug)]
pub struct LayerSelection {
    layer: LayerId,
    ids: RwLock<Arc<BTreeSet<FeatureId>>>,
}

impl LayerSelection {
    pub fn new(layer: LayerId) -> Self {
        Self {
            layer,
            ids: RwLock::new(Arc::new(BTreeSet::new())),
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    /// Clear, then add `ids`, as one step.
    pub fn replace(&self, ids: impl IntoIterator<Item = FeatureId>) {
        let next: BTreeSet<FeatureId> = ids.into_iter().collect();
        *self.ids.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Add `ids` to the current set.
    pub fn union(&self, ids: impl IntoIterator<Item = FeatureId>) {
        let mut guard = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = BTreeSet::clone(&guard);
        next.extend(ids);
        *guard = Arc::new(next);
    }

    /// Remove `ids` from the current set.
    pub fn deselect(&self, ids: impl IntoIterator<Item = FeatureId>) {
        let mut guard = self.ids.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = BTreeSet::clone(&guard);
        for id in ids {
            next.remove(&id);
        }
        *guard = Arc::new(next);
    }

    pub fn clear(&self) {
        self.replace(std::iter::empty());
    }

    /// Snapshot of the current identities.
    pub fn current(&self) -> Arc<BTreeSet<FeatureId>> {
        Arc::clone(&self.ids.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }

    pub fn rendering_filter(&self) -> SelectionFilter {
        SelectionFilter {
            selected: self.current(),
        }
    }

    /// Re-query the selected features by identity.
    pub async fn selected_features(&self, store: &dyn FeatureStore) -> Result<FeatureCollection> {
        let ids = self.current();
        if ids.is_empty() {
            return Ok(FeatureCollection::default());
        }
        store.features_by_ids(self.layer, &ids).await
    }

    /// Envelope of the selected features, `None` when nothing is selected.
    pub async fn bounds_of(&self, store: &dyn FeatureStore) -> Result<Option<Envelope>> {
        Ok(self.selected_features(store).await?.bounds())
    }
}

/// Immutable selection snapshot for renderers.
#[derive(Debug, Clone)]
pub struct SelectionFilter {
    selected: Arc<BTreeSet<FeatureId>>,
}

impl SelectionFilter {
    pub fn is_selected(&self, id: &FeatureId) -> bool {
        self.selected.contains(id)
    }

    /// Split features into `(selected, default)`, keeping their order.
    pub fn partition<'a>(&self, features: &'a [Feature]) -> (Vec<&'a Feature>, Vec<&'a Feature>) {
        features.iter().partition(|f| self.is_selected(&f.id))
    }
}

/// A pointer press-and-release over the map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerGesture {
    pub start: (f64, f64),
    pub end: (f64, f64),
    /// Modifier held: extend the selection instead of replacing it.
    pub additive: bool,
}

impl PointerGesture {
    pub fn click(x: f64, y: f64, additive: bool) -> Self {
        Self {
            start: (x, y),
            end: (x, y),
            additive,
        }
    }

    pub fn drag(start: (f64, f64), end: (f64, f64), additive: bool) -> Self {
        Self {
            start,
            end,
            additive,
        }
    }

    pub fn is_click(&self) -> bool {
        self.start == self.end
    }

    /// Box to query: the dragged box, or a square of half-size `tolerance`
    /// around a click.
    pub fn query_box(&self, tolerance: f64) -> Envelope {
        if self.is_click() {
            Envelope::around_point(self.start.0, self.start.1, tolerance)
        } else {
            Envelope::new(self.start.0, self.start.1, self.end.0, self.end.1)
        }
    }
}

/// Selection sets of every layer.
#[derive(Debug)]
pub struct SelectionRegistry {
    selections: RwLock<FxHashMap<LayerId, Arc<LayerSelection>>>,
    click_tolerance: f64,
}

impl SelectionRegistry {
    pub fn new(click_tolerance: f64) -> Self {
        Self {
            selections: RwLock::new(FxHashMap::default()),
            click_tolerance,
        }
    }

    /// The layer's selection, created empty on first use.
    pub fn for_layer(&self, layer: LayerId) -> Arc<LayerSelection> {
        if let Some(existing) = self
            .selections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&layer)
        {
            return Arc::clone(existing);
        }
        let mut selections = self
            .selections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            selections
                .entry(layer)
                .or_insert_with(|| Arc::new(LayerSelection::new(layer))),
        )
    }

    /// Apply a pointer gesture to one layer's selection. Returns the new
    /// selection size.
    pub async fn apply_gesture(
        &self,
        store: &dyn FeatureStore,
        layer: LayerId,
        gesture: &PointerGesture,
    ) -> Result<usize> {
        let query_box = gesture.query_box(self.click_tolerance);
        let hits = find_intersecting(store, layer, query_box).await?.ids();
        let selection = self.for_layer(layer);
        if gesture.additive {
            selection.union(hits);
        } else {
            selection.replace(hits);
        }
        let size = selection.len();
        tracing::debug!(layer = %layer, additive = gesture.additive, selected = size, "selection updated");
        Ok(size)
    }

    /// Union of the selection bounds of `layers`; `None` when nothing is
    /// selected in any of them.
    pub async fn zoom_extent(
        &self,
        store: &dyn FeatureStore,
        layers: &[LayerId],
    ) -> Result<Option<Envelope>> {
        let mut extent: Option<Envelope> = None;
        for layer in layers {
            if let Some(bounds) = self.for_layer(*layer).bounds_of(store).await? {
                extent = Some(match extent {
                    Some(e) => e.expand_to_include(&bounds),
                    None => bounds,
                });
            }
        }
        Ok(extent)
    }
}

impl Default for SelectionRegistry {
    fn default() -> Self {
        Self::new(crate::config::SelectionConfig::default().click_tolerance)
    }
}
