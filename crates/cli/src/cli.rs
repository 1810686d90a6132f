use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::path::{Path, PathBuf};

/// Settings document used when neither the command line nor the config file
/// names one.
pub const DEFAULT_SETTINGS_FILE: &str = "nozzle-life.json";

/// nozzle-life: per-tool nozzle wear tracking
///
/// Accumulates printing time per extruder tool from a host's print events
/// and outgoing G-code, and reports how close each nozzle is to its
/// replacement interval.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// JSON settings document holding profiles, tool state and logs.
    ///
    /// Overrides `persistence.settings_path` from the config file.
    #[arg(short, long)]
    pub settings: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum Command {
    /// Track a host session fed as JSON lines on stdin (default).
    Run,
    /// Print the wear summary as JSON.
    Status,
    /// Zero a tool's counter after its nozzle was replaced.
    Reset {
        /// Tool id, e.g. `T0`.
        tool: String,
    },
    /// Assign a wear profile to a tool.
    Assign { tool: String, profile: String },
    /// Print the nozzle print log as CSV.
    ExportCsv,
    /// Print the effective configuration as TOML.
    PrintConfig,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Settings file from the command line, then the config, then the
    /// default.
    pub fn settings_path(&self, configured: Option<&Path>) -> PathBuf {
        self.settings
            .as_deref()
            .or(configured)
            .map_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE), Path::to_path_buf)
    }
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}
