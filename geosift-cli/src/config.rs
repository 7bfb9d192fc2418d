//! Config file loading and command-line overrides.

use crate::cli::RunArgs;
use crate::error::{CliError, CliResult};
use geosift_spatial::{AggregationKind, AnalysisConfig};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG_FILE: &str = "geosift.toml";

/// Config file to read: the explicit path, else `./geosift.toml` when it
/// exists.
fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let local = PathBuf::from(DEFAULT_CONFIG_FILE);
            local.is_file().then_some(local)
        }
    }
}

/// Parse a config document. Missing sections take their defaults.
pub fn parse(text: &str) -> CliResult<AnalysisConfig> {
    Ok(toml::from_str(text)?)
}

/// Load the analysis config and apply overrides for a statistics run.
pub fn load(
    explicit: Option<&Path>,
    overrides: Option<(AggregationKind, &RunArgs)>,
) -> CliResult<AnalysisConfig> {
    let mut config = match resolve_path(explicit) {
        Some(path) => {
            let text =
                std::fs::read_to_string(&path).map_err(|e| CliError::config_file(&path, e))?;
            let config = parse(&text).map_err(|e| match e {
                CliError::Config(msg) => CliError::config_file(&path, msg),
                other => other,
            })?;
            tracing::info!(path = %path.display(), "loaded config");
            config
        }
        None => AnalysisConfig::default(),
    };

    if let Some((kind, args)) = overrides {
        apply_overrides(&mut config, kind, args);
    }
    config.validate()?;
    Ok(config)
}

fn apply_overrides(config: &mut AnalysisConfig, kind: AggregationKind, args: &RunArgs) {
    if let Some(n) = args.max_regions {
        config.concurrency.max_regions_in_flight = n;
    }
    if let Some(n) = args.cell_concurrency {
        config.concurrency.cell_concurrency = n;
    }
    if let Some(secs) = args.region_timeout {
        config.concurrency.region_timeout_secs = Some(secs);
    }
    if let Some(grid) = args.grid {
        match kind {
            AggregationKind::LandCover => config.grid.land_cover = grid,
            AggregationKind::Roads => config.grid.roads = grid,
            AggregationKind::Buildings => config.grid.buildings = grid,
        }
    }
}
