//! Stage 2: forest extraction.

use super::SOURCE_ID_ATTR;
use crate::classify::{Category, LandCoverClassifier};
use crate::error::Result;
use crate::feature::{Feature, FeatureId, LayerId};
use crate::geometry::polygonal;
use crate::provider::{FeatureQuery, FeatureStore};
use geo::{Area, BooleanOps};
use geo_types::{Geometry, MultiPolygon, Polygon};

/// Cut forest cover inside the search polygon by the road buffer.
///
/// Each clearing is `forest ∩ buffer`; empty intersections are dropped and
/// the rest kept when their area is at least `min_area`. A clearing's id is
/// `clearing:<forest id>` and the forest id is kept in [`SOURCE_ID_ATTR`].
pub(super) async fn extract_clearings(
    store: &dyn FeatureStore,
    land_cover: LayerId,
    classifier: &LandCoverClassifier,
    search: &Polygon<f64>,
    buffer: &MultiPolygon<f64>,
    min_area: f64,
) -> Result<Vec<Feature>> {
    if buffer.0.is_empty() {
        return Ok(Vec::new());
    }

    let cover = store
        .query(land_cover, &FeatureQuery::intersecting(search.clone()))
        .await?;

    let mut clearings = Vec::new();
    let mut forests = 0usize;
    for feature in cover
        .iter()
        .filter(|f| classifier.classify(f) == Category::Forest)
    {
        forests += 1;
        let Some(shape) = polygonal(&feature.geometry) else {
            continue;
        };
        let piece = shape.intersection(buffer);
        if piece.0.is_empty() {
            continue;
        }
        let area = piece.unsigned_area();
        if area < min_area {
            tracing::debug!(forest = %feature.id, area, "clearing too small");
            continue;
        }
        clearings.push(
            Feature::new(
                FeatureId::from(format!("clearing:{}", feature.id)),
                Geometry::MultiPolygon(piece),
            )
            .with_attribute(SOURCE_ID_ATTR, feature.id.as_str()),
        );
    }

    tracing::debug!(forests, clearings = clearings.len(), "forest extraction");
    Ok(clearings)
}
