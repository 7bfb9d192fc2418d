//! Analysis configuration types.
//!
//! Every section has a `Default` matching the established layer and
//! attribute naming conventions, and every struct is `#[serde(default)]` so a
//! configuration file only needs to list what it overrides.

use crate::classify::ClassificationTable;
use crate::error::{Result, SpatialError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Extra map units added to the max edges of a region envelope before it is
/// split into grid cells.
pub const DEFAULT_EDGE_MARGIN: f64 = 10.0;

/// Grid resolution (columns × rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSpec {
    pub width: u32,
    pub height: u32,
}

impl GridSpec {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(SpatialError::Config(format!(
                "grid must have at least one cell per axis, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

/// Grid resolution per aggregation kind.
///
/// Denser cover drives finer grids: building footprints use 10×10 while
/// land-cover areas and roads use 4×4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub land_cover: GridSpec,
    pub roads: GridSpec,
    pub buildings: GridSpec,
    /// Margin added to the envelope max edges before partitioning.
    pub edge_margin: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            land_cover: GridSpec::new(4, 4),
            roads: GridSpec::new(4, 4),
            buildings: GridSpec::new(10, 10),
            edge_margin: DEFAULT_EDGE_MARGIN,
        }
    }
}

/// Attribute names read from source layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    /// Land-cover classification code.
    pub classification: String,
    /// Region display name.
    pub region_name: String,
    /// River width on hydrography lines.
    pub river_width: String,
    /// Elevation band height.
    pub height: String,
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            classification: "GKODAS".to_string(),
            region_name: "SAV".to_string(),
            river_width: "PLOTIS".to_string(),
            height: "Aukstis".to_string(),
        }
    }
}

/// Role → layer title pattern bindings.
///
/// Each pattern is matched as a case-insensitive substring of the layer
/// title; the first registered layer that matches is bound to the role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerRoles {
    pub regions: String,
    pub land_cover: String,
    pub roads: String,
    pub hydrography: String,
    pub buildings: String,
    pub elevation: String,
}

impl Default for LayerRoles {
    fn default() -> Self {
        Self {
            regions: "SAV_P".to_string(),
            land_cover: "PLO_P".to_string(),
            roads: "KEL_L".to_string(),
            hydrography: "HID_L".to_string(),
            buildings: "PAS_P".to_string(),
            elevation: "R100PS".to_string(),
        }
    }
}

/// Worker pool sizing and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Regions aggregated at the same time.
    pub max_regions_in_flight: usize,
    /// Grid cells evaluated at the same time within one region.
    pub cell_concurrency: usize,
    /// Per-region time limit; a region over the limit reports an empty,
    /// degraded result.
    pub region_timeout_secs: Option<u64>,
}

impl ConcurrencyConfig {
    pub fn region_timeout(&self) -> Option<Duration> {
        self.region_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_regions_in_flight: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            cell_concurrency: 4,
            region_timeout_secs: None,
        }
    }
}

/// Pointer selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Half-size, in map units, of the box used for a click without drag.
    pub click_tolerance: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            click_tolerance: 2.5,
        }
    }
}

/// Complete analysis configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub grid: GridConfig,
    pub attributes: AttributeNames,
    pub roles: LayerRoles,
    pub concurrency: ConcurrencyConfig,
    pub classification: ClassificationTable,
    pub selection: SelectionConfig,
}

impl AnalysisConfig {
    /// Check values serde cannot reject on its own.
    pub fn validate(&self) -> Result<()> {
        self.grid.land_cover.validate()?;
        self.grid.roads.validate()?;
        self.grid.buildings.validate()?;
        if !self.grid.edge_margin.is_finite() || self.grid.edge_margin < 0.0 {
            return Err(SpatialError::Config(format!(
                "edge_margin must be a non-negative number, got {}",
                self.grid.edge_margin
            )));
        }
        if self.concurrency.max_regions_in_flight == 0 {
            return Err(SpatialError::Config(
                "max_regions_in_flight must be at least 1".into(),
            ));
        }
        if self.concurrency.cell_concurrency == 0 {
            return Err(SpatialError::Config(
                "cell_concurrency must be at least 1".into(),
            ));
        }
        if !self.selection.click_tolerance.is_finite() || self.selection.click_tolerance < 0.0 {
            return Err(SpatialError::Config(format!(
                "click_tolerance must be a non-negative number, got {}",
                self.selection.click_tolerance
            )));
        }
        Ok(())
    }
}
