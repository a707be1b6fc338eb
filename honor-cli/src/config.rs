//! Command-line arguments for the honors tool.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use honor_registry::HonorConfig;

/// Honors - qualification, approval and certificate core of the school records platform
#[derive(Parser, Debug, Clone)]
#[command(name = "honors")]
#[command(about = "Recompute honor candidates and inspect the criteria catalog")]
pub struct Args {
    /// YAML configuration file; built-in defaults when absent
    #[arg(long, env = "HONORS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Recompute honor candidates for one level and school year
    Recompute {
        /// JSON dataset with `students` and `grades`
        #[arg(long, env = "HONORS_DATASET")]
        dataset: PathBuf,

        /// Academic level key (elementary, junior_highschool, senior_highschool, college)
        #[arg(long)]
        level: String,

        /// School year, e.g. 2024-2025
        #[arg(long)]
        school_year: String,

        /// Restrict to one grading period of a subdivided level
        #[arg(long)]
        grading_period: Option<String>,
    },

    /// Print the criteria ladder for a level
    Criteria {
        /// Academic level key
        #[arg(long)]
        level: String,
    },

    /// Print the effective configuration as YAML
    ShowConfig,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Load the configuration file, or the defaults.
    pub fn load_config(&self) -> anyhow::Result<HonorConfig> {
        match &self.config {
            Some(path) => {
                let yaml = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("cannot read config {}: {}", path.display(), e)
                })?;
                Ok(HonorConfig::from_yaml(&yaml)?)
            }
            None => Ok(HonorConfig::default()),
        }
    }

    /// Validate arguments.
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Recompute {
                level, school_year, ..
            } => {
                if level.trim().is_empty() {
                    return Err("--level must not be empty".to_string());
                }
                if school_year.trim().is_empty() {
                    return Err("--school-year must not be empty".to_string());
                }
            }
            Command::Criteria { level } if level.trim().is_empty() => {
                return Err("--level must not be empty".to_string());
            }
            _ => {}
        }
        Ok(())
    }
}
