mod cli;
mod commands;
mod config;
mod error;
mod input;
mod output;

use clap::Parser;
use cli::{Cli, Commands};
use error::exit_with_error;
use geosift_spatial::AggregationKind;

fn init_tracing(cli: &Cli) {
    // --quiet  → "off"
    // --verbose → RUST_LOG if set, else "info"
    // default  → "warn", so absorbed per-cell failures still show up
    let filter = if cli.quiet {
        tracing_subscriber::EnvFilter::new("off")
    } else if cli.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };

    let ansi = !(cli.no_color || std::env::var_os("NO_COLOR").is_some());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Errors go to stderr; piping stdout should not strip their color.
    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        colored::control::set_override(false);
    }

    init_tracing(&cli);

    if let Err(e) = run(cli).await {
        exit_with_error(e);
    }
}

async fn run(cli: Cli) -> error::CliResult<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Layers { input } => commands::layers::run(&input),

        Commands::Areas { input, run } => {
            let config = config::load(config_path, Some((AggregationKind::LandCover, &run)))?;
            commands::stats::run(&input, &config, AggregationKind::LandCover).await
        }

        Commands::Roads { input, run } => {
            let config = config::load(config_path, Some((AggregationKind::Roads, &run)))?;
            commands::stats::run(&input, &config, AggregationKind::Roads).await
        }

        Commands::Buildings { input, run } => {
            let config = config::load(config_path, Some((AggregationKind::Buildings, &run)))?;
            commands::stats::run(&input, &config, AggregationKind::Buildings).await
        }

        Commands::Search {
            input,
            min_area,
            max_road_distance,
            min_river_width,
            min_height_diff,
            area,
        } => {
            let config = config::load(config_path, None)?;
            let raw = commands::search::RawParams {
                min_area: &min_area,
                max_road_distance: &max_road_distance,
                min_river_width: &min_river_width,
                min_height_diff: &min_height_diff,
            };
            commands::search::run(&input, &config, raw, area).await
        }

        Commands::Select {
            input,
            layer,
            gestures,
        } => {
            let config = config::load(config_path, None)?;
            commands::select::run(&input, &config, &layer, &gestures).await
        }
    }
}
