//! Role → layer binding with up-front validation.
//!
//! Operations bind each input role (roads, hydrography, ...) to a registered
//! layer before doing any work. Every missing or mismatched layer is
//! collected, so a single error lists every cause once.

use crate::config::LayerRoles;
use crate::error::{PreconditionFailure, Result, SpatialError};
use crate::feature::LayerInfo;
use crate::geometry::LayerKind;
use crate::provider::FeatureStore;
use std::fmt;

/// Input role an operation needs a layer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerRole {
    Regions,
    LandCover,
    Roads,
    Hydrography,
    Buildings,
    Elevation,
}

impl LayerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerRole::Regions => "regions",
            LayerRole::LandCover => "land cover",
            LayerRole::Roads => "roads",
            LayerRole::Hydrography => "hydrography",
            LayerRole::Buildings => "buildings",
            LayerRole::Elevation => "elevation",
        }
    }

    /// Geometry kind the role's layer must carry.
    pub fn expected_kind(&self) -> LayerKind {
        match self {
            LayerRole::Roads | LayerRole::Hydrography => LayerKind::Line,
            LayerRole::Regions
            | LayerRole::LandCover
            | LayerRole::Buildings
            | LayerRole::Elevation => LayerKind::Polygon,
        }
    }

    /// Title pattern configured for the role.
    pub fn pattern<'a>(&self, roles: &'a LayerRoles) -> &'a str {
        match self {
            LayerRole::Regions => &roles.regions,
            LayerRole::LandCover => &roles.land_cover,
            LayerRole::Roads => &roles.roads,
            LayerRole::Hydrography => &roles.hydrography,
            LayerRole::Buildings => &roles.buildings,
            LayerRole::Elevation => &roles.elevation,
        }
    }
}

impl fmt::Display for LayerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Collects role bindings and precondition failures.
pub struct RoleResolver<'a> {
    store: &'a dyn FeatureStore,
    roles: &'a LayerRoles,
    failures: Vec<PreconditionFailure>,
}

impl<'a> RoleResolver<'a> {
    pub fn new(store: &'a dyn FeatureStore, roles: &'a LayerRoles) -> Self {
        Self {
            store,
            roles,
            failures: Vec::new(),
        }
    }

    /// Bind a role; `None` when the layer is missing or has the wrong kind
    /// (the failure is recorded).
    pub fn resolve(&mut self, role: LayerRole) -> Option<LayerInfo> {
        let pattern = role.pattern(self.roles);
        let Some(info) = self.store.find_layer_by_name(pattern) else {
            self.failures.push(PreconditionFailure::MissingLayer {
                role: role.to_string(),
                pattern: pattern.to_string(),
            });
            return None;
        };

        let expected = role.expected_kind();
        if info.kind != expected {
            self.failures.push(PreconditionFailure::WrongKind {
                role: role.to_string(),
                title: info.title.to_string(),
                expected,
                actual: info.kind,
            });
            return None;
        }

        tracing::debug!(role = %role, layer = %info.title, "bound layer role");
        Some(info)
    }

    /// Record a failure found outside role binding.
    pub fn push(&mut self, failure: PreconditionFailure) {
        self.failures.push(failure);
    }

    /// `Err(Preconditions)` if anything failed.
    pub fn finish(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(SpatialError::Preconditions(self.failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::LayerBuilder;
    use crate::provider::EmbeddedFeatureStore;
    use std::collections::BTreeMap;

    #[test]
    fn test_reports_every_missing_and_mismatched_layer() {
        let store = EmbeddedFeatureStore::new();
        let mut hydro = LayerBuilder::new("hidro.shp#HID_L");
        hydro
            .add_wkt("1", "POLYGON((0 0, 1 0, 1 1, 0 0))", BTreeMap::new())
            .unwrap();
        store.add_layer(hydro.build().layer);

        let roles = LayerRoles::default();
        let mut resolver = RoleResolver::new(&store, &roles);
        assert!(resolver.resolve(LayerRole::Roads).is_none());
        assert!(resolver.resolve(LayerRole::Hydrography).is_none());

        let err = resolver.finish().unwrap_err();
        let failures = err.preconditions();
        assert_eq!(failures.len(), 2);
        assert!(matches!(failures[0], PreconditionFailure::MissingLayer { .. }));
        assert!(matches!(
            failures[1],
            PreconditionFailure::WrongKind {
                actual: LayerKind::Polygon,
                expected: LayerKind::Line,
                ..
            }
        ));
    }

    #[test]
    fn test_binds_by_case_insensitive_substring() {
        let store = EmbeddedFeatureStore::new();
        let roads = LayerBuilder::new("Keliai#kel_l")
            .with_kind(LayerKind::Line)
            .build()
            .layer;
        store.add_layer(roads);

        let roles = LayerRoles::default();
        let mut resolver = RoleResolver::new(&store, &roles);
        let info = resolver.resolve(LayerRole::Roads).unwrap();
        assert_eq!(&*info.title, "Keliai#kel_l");
        assert!(resolver.finish().is_ok());
    }
}
