//! Geometry primitives shared by the store, the grid and the analyses.
//!
//! This module provides:
//! - [`LayerKind`], the closed geometry tag decided once per layer
//! - [`Envelope`], the planar bounding box used for prefilters, grid cells
//!   and search areas
//! - WKT parsing
//! - conversions into the polygonal / lineal forms the `geo` boolean
//!   operations work on, plus planar area and length measures
//!
//! # Design
//!
//! All intersection, union, buffer and touches math is delegated to the
//! `geo` crate. Nothing here re-implements topology; the helpers only adapt
//! between the heterogeneous [`Geometry`] enum stored on features and the
//! concrete `MultiPolygon` / `MultiLineString` types the boolean ops take.

use crate::error::{Result, SpatialError};
use geo::{Area, BoundingRect};
use geo_types::{coord, Geometry, LineString, MultiLineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Geometry kind carried by a layer.
///
/// Determined once when the layer is built and carried as data afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Polygon,
    Line,
    Point,
    Unknown,
}

impl LayerKind {
    /// Classify a single geometry.
    pub fn of(geom: &Geometry<f64>) -> Self {
        match geom {
            Geometry::Polygon(_)
            | Geometry::MultiPolygon(_)
            | Geometry::Rect(_)
            | Geometry::Triangle(_) => LayerKind::Polygon,
            Geometry::LineString(_) | Geometry::MultiLineString(_) | Geometry::Line(_) => {
                LayerKind::Line
            }
            Geometry::Point(_) | Geometry::MultiPoint(_) => LayerKind::Point,
            _ => LayerKind::Unknown,
        }
    }

    /// Combine the kinds of two features of the same layer.
    ///
    /// A layer mixing kinds is `Unknown`.
    pub fn merge(self, other: LayerKind) -> LayerKind {
        if self == other {
            self
        } else {
            LayerKind::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::Polygon => "polygon",
            LayerKind::Line => "line",
            LayerKind::Point => "point",
            LayerKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Axis-aligned planar bounding box (map units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    /// Create an envelope; corners are normalized so min <= max.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Square envelope of half-size `half` centred on a point.
    pub fn around_point(x: f64, y: f64, half: f64) -> Self {
        let half = half.abs();
        Self::new(x - half, y - half, x + half, y + half)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// All four bounds are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.min_x.is_finite()
            && self.min_y.is_finite()
            && self.max_x.is_finite()
            && self.max_y.is_finite()
    }

    /// Check if this envelope intersects another (shared edges count).
    pub fn intersects(&self, other: &Envelope) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Check if this envelope contains a point.
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    /// Smallest envelope covering both.
    pub fn expand_to_include(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Push the max edges out by `margin`; min edges stay put.
    pub fn inflate_max(&self, margin: f64) -> Envelope {
        Envelope {
            min_x: self.min_x,
            min_y: self.min_y,
            max_x: self.max_x + margin,
            max_y: self.max_y + margin,
        }
    }

    /// Union of an iterator of envelopes, `None` when empty.
    pub fn union_all(envelopes: impl IntoIterator<Item = Envelope>) -> Option<Envelope> {
        envelopes
            .into_iter()
            .reduce(|acc, env| acc.expand_to_include(&env))
    }

    /// Compute from a geo-types Geometry.
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        Some(Self::from_rect(&rect))
    }

    pub fn from_rect(rect: &Rect<f64>) -> Self {
        Self {
            min_x: rect.min().x,
            min_y: rect.min().y,
            max_x: rect.max().x,
            max_y: rect.max().y,
        }
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            coord! { x: self.min_x, y: self.min_y },
            coord! { x: self.max_x, y: self.max_y },
        )
    }

    /// Closed rectangular polygon with the envelope's corners.
    pub fn to_polygon(&self) -> Polygon<f64> {
        self.to_rect().to_polygon()
    }

    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        MultiPolygon::new(vec![self.to_polygon()])
    }
}

/// Polygonal view of a geometry, `None` for lines and points.
///
/// Collections keep only their polygonal members.
pub fn polygonal(geom: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geom {
        Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        Geometry::Rect(r) => Some(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon::new(vec![t.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let polygons: Vec<Polygon<f64>> = gc
                .iter()
                .filter_map(polygonal)
                .flat_map(|mp| mp.0)
                .collect();
            if polygons.is_empty() {
                None
            } else {
                Some(MultiPolygon::new(polygons))
            }
        }
        _ => None,
    }
}

/// Lineal view of a geometry, `None` for polygons and points.
pub fn lineal(geom: &Geometry<f64>) -> Option<MultiLineString<f64>> {
    match geom {
        Geometry::LineString(ls) => Some(MultiLineString::new(vec![ls.clone()])),
        Geometry::MultiLineString(mls) => Some(mls.clone()),
        Geometry::Line(l) => Some(MultiLineString::new(vec![LineString::new(vec![
            l.start, l.end,
        ])])),
        Geometry::GeometryCollection(gc) => {
            let lines: Vec<LineString<f64>> =
                gc.iter().filter_map(lineal).flat_map(|mls| mls.0).collect();
            if lines.is_empty() {
                None
            } else {
                Some(MultiLineString::new(lines))
            }
        }
        _ => None,
    }
}

/// Unsigned planar area of a geometry; zero for lines and points.
pub fn area_of(geom: &Geometry<f64>) -> f64 {
    geom.unsigned_area()
}

/// Parse WKT string to geo-types Geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(wkt)
        .map_err(|e| SpatialError::WktParse(format!("{:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| SpatialError::WktParse(format!("{:?}", e)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_polygon() {
        let geom = parse_wkt("POLYGON((0 0, 1 0, 1 1, 0 1, 0 0))").unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
        assert_eq!(LayerKind::of(&geom), LayerKind::Polygon);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_wkt("POLYGON((0 0, 1"),
            Err(SpatialError::WktParse(_))
        ));
    }

    #[test]
    fn test_envelope_from_geometry() {
        let geom = parse_wkt("POLYGON((0 0, 10 0, 10 20, 0 20, 0 0))").unwrap();
        let env = Envelope::from_geometry(&geom).unwrap();
        assert_eq!(env.min_x, 0.0);
        assert_eq!(env.max_x, 10.0);
        assert_eq!(env.min_y, 0.0);
        assert_eq!(env.max_y, 20.0);
    }

    #[test]
    fn test_envelope_normalizes_corners() {
        let env = Envelope::new(10.0, 5.0, 0.0, -5.0);
        assert_eq!(env, Envelope::new(0.0, -5.0, 10.0, 5.0));
        assert_eq!(env.area(), 100.0);
    }

    #[test]
    fn test_envelope_touching_edges_intersect() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new(1.0, 0.0, 2.0, 1.0);
        let c = Envelope::new(1.5, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_inflate_max_keeps_min_edges() {
        let env = Envelope::new(0.0, 0.0, 100.0, 50.0).inflate_max(10.0);
        assert_eq!(env, Envelope::new(0.0, 0.0, 110.0, 60.0));
    }

    #[test]
    fn test_kind_merge() {
        assert_eq!(LayerKind::Line.merge(LayerKind::Line), LayerKind::Line);
        assert_eq!(LayerKind::Line.merge(LayerKind::Polygon), LayerKind::Unknown);
    }

    #[test]
    fn test_polygonal_view_of_collection() {
        let geom = parse_wkt(
            "GEOMETRYCOLLECTION(POLYGON((0 0, 1 0, 1 1, 0 1, 0 0)), LINESTRING(0 0, 5 5))",
        )
        .unwrap();
        let mp = polygonal(&geom).unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!((mp.unsigned_area() - 1.0).abs() < 1e-12);
        assert_eq!(lineal(&geom).unwrap().0.len(), 1);
    }
}
