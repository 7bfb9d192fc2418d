//! Stages 3 and 4: river and height filters.
//!
//! Both issue one query per candidate. A failed query drops that candidate
//! with a warning; the stage itself keeps going.

use super::HEIGHT_DIFF_ATTR;
use crate::feature::{Feature, LayerId};
use crate::provider::{AttributeFilter, FeatureQuery, FeatureStore};

/// Keep candidates crossed by at least one hydrography line whose width
/// attribute exceeds `min_width`.
pub(super) async fn river_filter(
    store: &dyn FeatureStore,
    hydrography: LayerId,
    width_attribute: &str,
    candidates: Vec<Feature>,
    min_width: f64,
) -> Vec<Feature> {
    let mut kept = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let query = FeatureQuery::intersecting(candidate.geometry.clone())
            .with_attribute(AttributeFilter::greater_than(width_attribute, min_width))
            .with_limit(1);
        match store.query(hydrography, &query).await {
            Ok(rivers) if !rivers.is_empty() => kept.push(candidate),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(candidate = %candidate.id, error = %e, "river query failed, dropping candidate");
            }
        }
    }
    kept
}

/// Result of the height filter.
pub(super) struct HeightFiltered {
    pub kept: Vec<Feature>,
    /// Candidates with no intersecting elevation polygon.
    pub no_height_data: usize,
}

/// Keep candidates whose intersecting elevation polygons span more than
/// `min_diff`, tagged with [`HEIGHT_DIFF_ATTR`].
///
/// A candidate with no elevation data is excluded and counted rather than
/// compared against sentinel bounds.
pub(super) async fn height_filter(
    store: &dyn FeatureStore,
    elevation: LayerId,
    height_attribute: &str,
    candidates: Vec<Feature>,
    min_diff: f64,
) -> HeightFiltered {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut no_height_data = 0usize;

    for candidate in candidates {
        let bands = match store
            .query(elevation, &FeatureQuery::intersecting(candidate.geometry.clone()))
            .await
        {
            Ok(bands) => bands,
            Err(e) => {
                tracing::warn!(candidate = %candidate.id, error = %e, "elevation query failed, dropping candidate");
                continue;
            }
        };

        let range = bands
            .iter()
            .filter_map(|band| band.number(height_attribute))
            .fold(None, |range: Option<(f64, f64)>, h| match range {
                Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
                None => Some((h, h)),
            });

        let Some((lo, hi)) = range else {
            no_height_data += 1;
            tracing::debug!(candidate = %candidate.id, "no elevation data");
            continue;
        };

        let diff = hi - lo;
        if diff > min_diff {
            kept.push(candidate.with_attribute(HEIGHT_DIFF_ATTR, diff));
        }
    }

    HeightFiltered {
        kept,
        no_height_data,
    }
}
