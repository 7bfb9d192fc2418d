//! Spatial analytics over layered vector data.
//!
//! This crate provides two analyses over a shared set of spatial primitives:
//!
//! - **Regional statistics**: land-cover area, road length and building
//!   footprint shares per administrative region, computed cell by cell over
//!   a grid laid across each region
//! - **Site search**: a seven-stage pipeline narrowing forest clearings near
//!   roads down to those crossed by rivers, spanning enough elevation and
//!   carrying the most peaks
//!
//! plus per-layer **selection sets** driven by pointer gestures.
//!
//! # Architecture
//!
//! ```text
//!   regions ──► ConcurrencyScheduler (one task per region, bounded)
//!                        │
//!                        ▼
//!               RegionalAggregator ──► GridPartitioner (W×H cells)
//!                        │
//!                        ▼  per cell
//!               FeatureStore query ──► bbox prefilter ──► geo predicate
//!                        │
//!                        ▼
//!               cellRegion ∩ feature ──► LandCoverClassifier ──► fold
//!
//!   search area ──► preflight ──► road buffer ──► clearings ──► river
//!                 ──► height ──► peaks ──► correlation ──► ranking
//! ```
//!
//! # Modules
//!
//! - [`config`]: Analysis configuration types
//! - [`geometry`]: Envelopes, layer kinds, WKT parsing, measures
//! - [`feature`]: Features, layers and collections
//! - [`builder`]: Layer builder with build statistics
//! - [`provider`]: Feature store trait and the embedded store
//! - [`classify`]: Table-driven land-cover classification
//! - [`grid`]: Grid partitioning of region envelopes
//! - [`aggregate`]: Per-region aggregation and statistics runs
//! - [`scheduler`]: Bounded concurrent fan-out over regions
//! - [`pipeline`]: Site-suitability search
//! - [`selection`]: Per-layer selection sets
//! - [`error`]: Error types

pub mod aggregate;
pub mod builder;
pub mod classify;
pub mod config;
pub mod error;
pub mod feature;
pub mod geometry;
pub mod grid;
pub mod pipeline;
mod preflight;
pub mod provider;
pub mod scheduler;
pub mod selection;

// Re-export key types
pub use aggregate::{
    run_statistics, AggregationKind, AggregationResult, AggregationTarget, CategoryTotals,
    Region, RegionMeasures, RegionalAggregator,
};
pub use builder::{BuildResult, BuildStats, LayerBuilder};
pub use classify::{Category, ClassificationTable, CodeMapping, LandCoverClassifier};
pub use config::{
    AnalysisConfig, AttributeNames, ConcurrencyConfig, GridConfig, GridSpec, LayerRoles,
    SelectionConfig,
};
pub use error::{PreconditionFailure, Result, SpatialError};
pub use feature::{
    AttrValue, Feature, FeatureCollection, FeatureId, Layer, LayerId, LayerInfo, PaletteColor,
};
pub use geometry::{parse_wkt, Envelope, LayerKind};
pub use grid::{GridCell, GridPartitioner};
pub use pipeline::{
    PipelineArtifact, RankedSite, SearchOutcome, SearchParams, SearchPipeline, StageCounts,
};
pub use preflight::LayerRole;
pub use provider::{
    AttributeFilter, EmbeddedFeatureStore, FeatureQuery, FeatureStore, SpatialPredicate,
};
pub use scheduler::{CancelFlag, ConcurrencyScheduler};
pub use selection::{
    find_intersecting, LayerSelection, PointerGesture, SelectionFilter, SelectionRegistry,
};
