//! # featurestage CLI Module
//!
//! ## Available Commands
//!
//! - `run` - Execute the stage (default when no subcommand is given)
//! - `register` - Register a CSV file as a new dataset version
//! - `mark-validation` - Record a completed validation run
//! - `runs` - List tracked runs
//! - `artifacts` - List artifact versions
//! - `inspect` - Show the parameters of a published transform
//! - `apply` - Apply a published transform to a CSV file

mod commands;

use crate::config::StageConfig;
use clap::{Parser, Subcommand};
use featurestage_core::StageError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// featurestage - gated feature-engineering stage
///
/// Derives temporal features from a validated transaction dataset,
/// standardizes numeric columns, and publishes the result and the fitted
/// transform as versioned artifacts.
#[derive(Parser, Debug)]
#[command(name = "featurestage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the tracking database and the artifact store
    #[arg(short = 'H', long, global = true)]
    pub home: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute the feature-engineering stage
    Run {
        /// Validation run to read the gate verdict from
        #[arg(short, long)]
        upstream_run: Option<u64>,

        /// Input dataset version (latest, vN or N)
        #[arg(short, long)]
        dataset_version: Option<String>,
    },

    /// Register a CSV file as a new version of a dataset artifact
    Register {
        /// Path to the CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Artifact name (defaults to the configured input artifact)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Record a completed validation run in the gate project
    MarkValidation {
        /// All validation checks passed
        #[arg(long, conflicts_with = "failed", required_unless_present = "failed")]
        passed: bool,

        /// At least one validation check failed
        #[arg(long)]
        failed: bool,
    },

    /// List tracked runs with status and summary
    Runs {
        /// Only runs of this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List artifact versions
    Artifacts {
        /// Only versions of this artifact
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Show the parameters of a published transform
    Inspect {
        /// Transform version (latest, vN or N)
        #[arg(long, default_value = "latest")]
        version: String,
    },

    /// Apply a published transform to a CSV file
    Apply {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Output CSV file
        #[arg(short, long)]
        output: PathBuf,

        /// Transform version (latest, vN or N)
        #[arg(long, default_value = "latest")]
        version: String,

        /// Map standardized columns back to their original scale
        #[arg(long)]
        inverse: bool,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Resolve configuration: file, then environment, then global flags.
pub fn resolve_config(cli: &Cli) -> Result<StageConfig, StageError> {
    let mut config = StageConfig::load(cli.config.as_deref())?;
    config.apply_env()?;
    if let Some(home) = &cli.home {
        config.store.home = home.clone();
    }
    Ok(config)
}

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), StageError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Run {
            upstream_run,
            dataset_version,
        }) => {
            if let Some(run) = upstream_run {
                config.gate.upstream_run = Some(run);
            }
            if let Some(version) = dataset_version {
                config.input.version = version;
            }
            config.validate()?;
            cmd_run(&config, json_mode)
        }
        Some(Commands::Register { file, name }) => {
            config.validate()?;
            let name = name.unwrap_or_else(|| config.input.artifact.clone());
            cmd_register(&config, json_mode, &file, &name)
        }
        Some(Commands::MarkValidation { passed, failed }) => {
            config.validate()?;
            cmd_mark_validation(&config, json_mode, passed && !failed)
        }
        Some(Commands::Runs { project }) => cmd_runs(&config, json_mode, project.as_deref()),
        Some(Commands::Artifacts { name }) => cmd_artifacts(&config, json_mode, name.as_deref()),
        Some(Commands::Inspect { version }) => {
            config.validate()?;
            cmd_inspect(&config, json_mode, &version)
        }
        Some(Commands::Apply {
            input,
            output,
            version,
            inverse,
        }) => {
            config.validate()?;
            cmd_apply(&config, json_mode, &input, &output, &version, inverse)
        }
        None => {
            // No subcommand - run the stage by default
            config.validate()?;
            cmd_run(&config, json_mode)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::try_parse_from(["featurestage", "--home", "/tmp/x"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn mark_validation_requires_a_verdict() {
        assert!(Cli::try_parse_from(["featurestage", "mark-validation"]).is_err());
        assert!(
            Cli::try_parse_from(["featurestage", "mark-validation", "--passed", "--failed"])
                .is_err()
        );
        let cli = Cli::try_parse_from(["featurestage", "mark-validation", "--failed"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::MarkValidation {
                passed: false,
                failed: true
            })
        ));
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "featurestage",
            "run",
            "--upstream-run",
            "4",
            "--dataset-version",
            "v2",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Run {
                upstream_run: Some(4),
                dataset_version: Some(ref v),
            }) if v == "v2"
        ));
    }
}
