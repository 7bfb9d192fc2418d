//! Stage 1: road buffer.

use crate::error::Result;
use crate::feature::LayerId;
use crate::geometry::lineal;
use crate::provider::{FeatureQuery, FeatureStore};
use geo::{BooleanOps, Buffer};
use geo_types::{MultiLineString, MultiPolygon, Polygon};

/// Clip roads to the search polygon, buffer them by `distance` and union
/// the result into one (multi)polygon.
///
/// A zero distance gives the degenerate zero-width buffer: an empty
/// polygon, whose area is the limit of the buffered area as the distance
/// shrinks to zero.
pub(super) async fn buffer_roads(
    store: &dyn FeatureStore,
    roads: LayerId,
    search: &Polygon<f64>,
    distance: f64,
) -> Result<MultiPolygon<f64>> {
    let candidates = store
        .query(roads, &FeatureQuery::intersecting(search.clone()))
        .await?;

    let clipped: Vec<_> = candidates
        .iter()
        .filter_map(|road| lineal(&road.geometry))
        .flat_map(|lines| search.clip(&lines, false).0)
        .collect();
    tracing::debug!(roads = candidates.len(), pieces = clipped.len(), "clipped roads");

    Ok(buffer_lines(&MultiLineString::new(clipped), distance))
}

/// Buffer and union a set of lines; non-positive distances give an empty
/// polygon.
fn buffer_lines(lines: &MultiLineString<f64>, distance: f64) -> MultiPolygon<f64> {
    if distance <= 0.0 || lines.0.is_empty() {
        return MultiPolygon::new(Vec::new());
    }
    lines.buffer(distance)
}
