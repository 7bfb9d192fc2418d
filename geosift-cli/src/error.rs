use colored::Colorize;
use geosift_spatial::SpatialError;
use std::fmt;
use std::path::Path;
use std::process;

/// Exit codes for the CLI.
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Error from the analysis engine.
    Spatial(SpatialError),
    /// Config file missing or malformed.
    Config(String),
    /// Unreadable or malformed layer bundle.
    Input(String),
    /// Layer not found by title pattern.
    NotFound(String),
    /// Argument / usage errors.
    Usage(String),
}

impl CliError {
    pub fn config_file(path: &Path, err: impl fmt::Display) -> Self {
        CliError::Config(format!("{}: {err}", path.display()))
    }

    pub fn input_file(path: &Path, err: impl fmt::Display) -> Self {
        CliError::Input(format!("{}: {err}", path.display()))
    }

    fn exit_code(&self) -> i32 {
        match self {
            CliError::Usage(_) => EXIT_USAGE,
            CliError::Spatial(SpatialError::Preconditions(_)) => EXIT_USAGE,
            _ => EXIT_ERROR,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Spatial(SpatialError::Preconditions(failures)) => {
                write!(f, "{} cannot start: preconditions failed", "error:".red().bold())?;
                for failure in failures {
                    write!(f, "\n  - {failure}")?;
                }
                write!(
                    f,
                    "\n  {} check the --layers bundles and the [roles] section of the config",
                    "help:".cyan().bold()
                )
            }
            CliError::Spatial(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Config(msg) => write!(f, "{} invalid config: {msg}", "error:".red().bold()),
            CliError::Input(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::NotFound(msg) => write!(
                f,
                "{} {msg}\n  {} run 'geosift layers' to list the loaded layers",
                "error:".red().bold(),
                "help:".cyan().bold(),
            ),
            CliError::Usage(msg) => write!(f, "{} {msg}", "error:".red().bold()),
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<SpatialError> for CliError {
    fn from(e: SpatialError) -> Self {
        match e {
            SpatialError::Config(msg) => CliError::Config(msg),
            other => CliError::Spatial(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(e: std::io::Error) -> Self {
        CliError::Input(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Input(format!("JSON parse error: {e}"))
    }
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    process::exit(err.exit_code())
}

pub type CliResult<T> = std::result::Result<T, CliError>;
