//! Stages 5-7: peak detection, peak correlation and ranking.

use super::{RankedSite, HEIGHT_DIFF_ATTR, PEAKS_QTY_ATTR};
use crate::error::Result;
use crate::feature::{Feature, LayerId};
use crate::provider::{FeatureQuery, FeatureStore};
use geo::Intersects;
use geo_types::Polygon;

/// Elevation polygons inside the search polygon that are local maxima.
///
/// A polygon is a peak iff none of the polygons touching it (shared
/// boundary, no shared interior) anywhere in the layer is strictly higher.
/// A polygon without a height value is never a peak. A failed neighbour
/// query leaves the polygon a peak.
pub(super) async fn detect_peaks(
    store: &dyn FeatureStore,
    elevation: LayerId,
    height_attribute: &str,
    search: &Polygon<f64>,
) -> Result<Vec<Feature>> {
    let bands = store
        .query(elevation, &FeatureQuery::intersecting(search.clone()))
        .await?;

    let mut peaks = Vec::new();
    for band in bands {
        let Some(height) = band.number(height_attribute) else {
            tracing::debug!(band = %band.id, "elevation polygon without height");
            continue;
        };

        let neighbours = match store
            .query(elevation, &FeatureQuery::touching(band.geometry.clone()))
            .await
        {
            Ok(neighbours) => neighbours,
            Err(e) => {
                tracing::warn!(band = %band.id, error = %e, "neighbour query failed");
                peaks.push(band);
                continue;
            }
        };

        let higher = neighbours
            .iter()
            .any(|n| n.number(height_attribute).is_some_and(|h| h > height));
        if !higher {
            peaks.push(band);
        }
    }
    Ok(peaks)
}

/// Tag each candidate with the number of peaks intersecting it.
pub fn correlate_peaks(candidates: Vec<Feature>, peaks: &[Feature]) -> Vec<Feature> {
    candidates
        .into_iter()
        .map(|candidate| {
            let count = peaks
                .iter()
                .filter(|peak| match (peak.envelope, candidate.envelope) {
                    (Some(a), Some(b)) => a.intersects(&b),
                    _ => false,
                })
                .filter(|peak| peak.geometry.intersects(&candidate.geometry))
                .count();
            candidate.with_attribute(PEAKS_QTY_ATTR, count as i64)
        })
        .collect()
}

/// Order candidates by peak count, most first; ties keep input order.
pub fn rank_sites(candidates: Vec<Feature>) -> Vec<RankedSite> {
    let mut sites: Vec<RankedSite> = candidates
        .into_iter()
        .map(|f| RankedSite {
            height_diff: f.number(HEIGHT_DIFF_ATTR).unwrap_or(f64::NAN),
            peaks_qty: f
                .attribute(PEAKS_QTY_ATTR)
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            id: f.id,
            geometry: f.geometry,
        })
        .collect();
    sites.sort_by(|a, b| b.peaks_qty.cmp(&a.peaks_qty));
    sites
}
