//! Layer builder.
//!
//! Builds a [`Layer`] from source records. The builder:
//! 1. Accepts `(id, wkt, attributes)` records (or ready-made features)
//! 2. Parses WKT and computes each feature's envelope once
//! 3. Decides the layer's [`LayerKind`] once, either declared up front or
//!    inferred from the records
//! 4. Skips unusable records and counts them in [`BuildStats`]
//!
//! # Usage
//!
//! ```ignore
//! let mut builder = LayerBuilder::new("plo.shp#PLO_P").with_kind(LayerKind::Polygon);
//! builder.add_wkt("1", "POLYGON((...))", attrs)?;
//! let BuildResult { layer, stats } = builder.build();
//! ```

use crate::error::{Result, SpatialError};
use crate::feature::{AttrValue, Feature, FeatureId, Layer};
use crate::geometry::{parse_wkt, LayerKind};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Statistics collected while building a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Number of records offered to the builder.
    pub records_processed: u64,

    /// Number of features kept.
    pub features_added: u64,

    /// Number of records skipped (parse errors, kind mismatch).
    pub records_skipped: u64,

    pub polygon_count: u64,
    pub line_count: u64,
    pub point_count: u64,
    pub other_count: u64,
}

/// Result of building a layer.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub layer: Layer,
    pub stats: BuildStats,
}

/// Accumulates features for one layer.
pub struct LayerBuilder {
    title: Arc<str>,

    /// Declared geometry kind; records of another kind are skipped.
    declared_kind: Option<LayerKind>,

    /// Kind inferred from the records seen so far.
    inferred_kind: Option<LayerKind>,

    features: Vec<Feature>,

    seen_ids: FxHashSet<FeatureId>,

    stats: BuildStats,
}

impl LayerBuilder {
    pub fn new(title: impl Into<Arc<str>>) -> Self {
        Self {
            title: title.into(),
            declared_kind: None,
            inferred_kind: None,
            features: Vec::new(),
            seen_ids: FxHashSet::default(),
            stats: BuildStats::default(),
        }
    }

    /// Declare the layer's geometry kind.
    pub fn with_kind(mut self, kind: LayerKind) -> Self {
        self.declared_kind = Some(kind);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn stats(&self) -> &BuildStats {
        &self.stats
    }

    /// Add a record given as WKT.
    ///
    /// Returns `Ok(true)` if the record was added, `Ok(false)` if it was
    /// skipped (unparsable WKT or kind mismatch). A duplicate identity is an
    /// error because it would break selection and lookups by id.
    pub fn add_wkt(
        &mut self,
        id: impl Into<FeatureId>,
        wkt: &str,
        attributes: BTreeMap<String, AttrValue>,
    ) -> Result<bool> {
        let id = id.into();
        let geometry = match parse_wkt(wkt) {
            Ok(g) => g,
            Err(e) => {
                self.stats.records_processed += 1;
                self.stats.records_skipped += 1;
                tracing::debug!(layer = %self.title, id = %id, error = %e, "skipping unparsable record");
                return Ok(false);
            }
        };
        let mut feature = Feature::new(id, geometry);
        feature.attributes = attributes;
        self.add_feature(feature)
    }

    /// Add a ready-made feature.
    pub fn add_feature(&mut self, feature: Feature) -> Result<bool> {
        self.stats.records_processed += 1;

        if self.seen_ids.contains(&feature.id) {
            return Err(SpatialError::DuplicateFeature {
                layer: self.title.to_string(),
                id: feature.id.to_string(),
            });
        }

        let kind = feature.kind();
        if let Some(declared) = self.declared_kind {
            if declared != LayerKind::Unknown && kind != declared {
                self.stats.records_skipped += 1;
                tracing::debug!(
                    layer = %self.title,
                    id = %feature.id,
                    expected = %declared,
                    actual = %kind,
                    "skipping record of another geometry kind"
                );
                return Ok(false);
            }
        }

        match kind {
            LayerKind::Polygon => self.stats.polygon_count += 1,
            LayerKind::Line => self.stats.line_count += 1,
            LayerKind::Point => self.stats.point_count += 1,
            LayerKind::Unknown => self.stats.other_count += 1,
        }
        self.inferred_kind = Some(match self.inferred_kind {
            Some(prev) => prev.merge(kind),
            None => kind,
        });

        self.seen_ids.insert(feature.id.clone());
        self.features.push(feature);
        self.stats.features_added += 1;
        Ok(true)
    }

    /// Finish the layer.
    ///
    /// The kind is the declared kind if any, otherwise the common kind of all
    /// features (`Unknown` for mixed or empty layers).
    pub fn build(self) -> BuildResult {
        let kind = self
            .declared_kind
            .or(self.inferred_kind)
            .unwrap_or(LayerKind::Unknown);

        if self.stats.records_skipped > 0 {
            tracing::info!(
                layer = %self.title,
                added = self.stats.features_added,
                skipped = self.stats.records_skipped,
                "layer built with skipped records"
            );
        }

        BuildResult {
            layer: Layer {
                title: self.title,
                kind,
                features: self.features,
            },
            stats: self.stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infers_kind_from_records() {
        let mut builder = LayerBuilder::new("keliai#KEL_L");
        builder
            .add_wkt("1", "LINESTRING(0 0, 1 1)", BTreeMap::new())
            .unwrap();
        builder
            .add_wkt("2", "MULTILINESTRING((0 0, 1 1), (2 2, 3 3))", BTreeMap::new())
            .unwrap();

        let result = builder.build();
        assert_eq!(result.layer.kind, LayerKind::Line);
        assert_eq!(result.stats.line_count, 2);
        assert_eq!(result.layer.len(), 2);
    }

    #[test]
    fn test_mixed_layer_is_unknown() {
        let mut builder = LayerBuilder::new("mixed");
        builder.add_wkt("1", "POINT(0 0)", BTreeMap::new()).unwrap();
        builder
            .add_wkt("2", "POLYGON((0 0, 1 0, 1 1, 0 0))", BTreeMap::new())
            .unwrap();
        assert_eq!(builder.build().layer.kind, LayerKind::Unknown);
    }

    #[test]
    fn test_skips_bad_wkt_and_wrong_kind() {
        let mut builder = LayerBuilder::new("plotai#PLO_P").with_kind(LayerKind::Polygon);
        assert!(!builder.add_wkt("1", "POLYGON((", BTreeMap::new()).unwrap());
        assert!(!builder
            .add_wkt("2", "LINESTRING(0 0, 1 1)", BTreeMap::new())
            .unwrap());
        assert!(builder
            .add_wkt("3", "POLYGON((0 0, 1 0, 1 1, 0 0))", BTreeMap::new())
            .unwrap());

        let result = builder.build();
        assert_eq!(result.stats.records_processed, 3);
        assert_eq!(result.stats.records_skipped, 2);
        assert_eq!(result.stats.features_added, 1);
        assert_eq!(result.layer.kind, LayerKind::Polygon);
    }

    #[test]
    fn test_duplicate_id_is_an_error() {
        let mut builder = LayerBuilder::new("dups");
        builder.add_wkt("a", "POINT(0 0)", BTreeMap::new()).unwrap();
        let err = builder
            .add_wkt("a", "POINT(1 1)", BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, SpatialError::DuplicateFeature { .. }));
    }

    #[test]
    fn test_empty_layer_without_declared_kind() {
        let result = LayerBuilder::new("empty").build();
        assert_eq!(result.layer.kind, LayerKind::Unknown);
        assert!(result.layer.is_empty());
    }
}
