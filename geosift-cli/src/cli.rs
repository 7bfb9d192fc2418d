use clap::{Args, Parser, Subcommand, ValueEnum};
use geosift_spatial::{Envelope, GridSpec, PointerGesture};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "geosift",
    about = "Regional statistics and site search over layered vector data",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Path to config file (defaults to ./geosift.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the layers found in the input bundles
    Layers {
        #[command(flatten)]
        input: InputArgs,
    },

    /// Land-cover area shares per region
    Areas {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Road length and density per region
    Roads {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Building footprint shares by land-cover category per region
    Buildings {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Search for suitable forest clearings
    Search {
        #[command(flatten)]
        input: InputArgs,

        /// Minimum clearing area (map units squared)
        #[arg(long, allow_hyphen_values = true)]
        min_area: String,

        /// Maximum distance from a road
        #[arg(long, allow_hyphen_values = true)]
        max_road_distance: String,

        /// Minimum width of a crossing river
        #[arg(long, allow_hyphen_values = true)]
        min_river_width: String,

        /// Minimum elevation difference across the clearing
        #[arg(long, allow_hyphen_values = true)]
        min_height_diff: String,

        /// Search area as MIN_X,MIN_Y,MAX_X,MAX_Y
        #[arg(long, value_parser = parse_envelope, allow_hyphen_values = true)]
        area: Option<Envelope>,
    },

    /// Apply pointer gestures to a layer's selection
    Select {
        #[command(flatten)]
        input: InputArgs,

        /// Layer title pattern (case-insensitive substring)
        #[arg(long)]
        layer: String,

        /// Gesture, applied in order: click:X,Y or drag:X1,Y1,X2,Y2;
        /// prefix with '+' to add to the selection instead of replacing it
        #[arg(
            long = "gesture",
            required = true,
            value_parser = parse_gesture,
            allow_hyphen_values = true
        )]
        gestures: Vec<PointerGesture>,
    },
}

/// Inputs shared by every command.
#[derive(Args)]
pub struct InputArgs {
    /// Layer bundle (JSON); may be given more than once
    #[arg(long = "layers", required = true)]
    pub layers: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

/// Overrides for the regional statistics runs.
#[derive(Args, Default)]
pub struct RunArgs {
    /// Regions aggregated at the same time
    #[arg(long, env = "GEOSIFT_MAX_REGIONS")]
    pub max_regions: Option<usize>,

    /// Grid cells evaluated at the same time within a region
    #[arg(long, env = "GEOSIFT_CELL_CONCURRENCY")]
    pub cell_concurrency: Option<usize>,

    /// Per-region time limit in seconds
    #[arg(long, env = "GEOSIFT_REGION_TIMEOUT")]
    pub region_timeout: Option<u64>,

    /// Grid resolution as COLSxROWS (e.g. 4x4)
    #[arg(long, value_parser = parse_grid)]
    pub grid: Option<GridSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

fn parse_numbers(s: &str, expected: usize) -> Result<Vec<f64>, String> {
    let values: Vec<f64> = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("'{part}' is not a number"))
        })
        .collect::<Result<_, _>>()?;
    if values.len() != expected {
        return Err(format!(
            "expected {expected} comma-separated numbers, got {}",
            values.len()
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err("coordinates must be finite".to_string());
    }
    Ok(values)
}

fn parse_envelope(s: &str) -> Result<Envelope, String> {
    let v = parse_numbers(s, 4)?;
    Ok(Envelope::new(v[0], v[1], v[2], v[3]))
}

fn parse_gesture(s: &str) -> Result<PointerGesture, String> {
    let (additive, rest) = match s.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (kind, coords) = rest
        .split_once(':')
        .ok_or_else(|| format!("'{s}': expected click:X,Y or drag:X1,Y1,X2,Y2"))?;
    match kind {
        "click" => {
            let v = parse_numbers(coords, 2)?;
            Ok(PointerGesture::click(v[0], v[1], additive))
        }
        "drag" => {
            let v = parse_numbers(coords, 4)?;
            Ok(PointerGesture::drag((v[0], v[1]), (v[2], v[3]), additive))
        }
        other => Err(format!("unknown gesture '{other}'")),
    }
}

fn parse_grid(s: &str) -> Result<GridSpec, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{s}': expected COLSxROWS"))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("'{w}' is not a count"))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("'{h}' is not a count"))?;
    let spec = GridSpec::new(w, h);
    spec.validate().map_err(|e| e.to_string())?;
    Ok(spec)
}
