//! # featurestage - Gated Feature-Engineering Stage
//!
//! The main binary for one stage of a linear data pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 apps/featurestage (THE BINARY)               │
//! │                                                              │
//! │  ┌────────────┐    ┌─────────────────┐    ┌──────────────┐   │
//! │  │    CLI     │───▶│  Orchestrator   │───▶│   Services   │   │
//! │  │   (clap)   │    │ gate → publish  │    │ redb + fs    │   │
//! │  └────────────┘    └────────┬────────┘    └──────────────┘   │
//! │                             ▼                                │
//! │                   ┌───────────────────┐                      │
//! │                   │ featurestage-core │                      │
//! │                   │    (THE LOGIC)    │                      │
//! │                   └───────────────────┘                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! featurestage register -f processed_data.csv
//! featurestage mark-validation --passed
//! featurestage                      # run the stage
//! featurestage runs
//! featurestage apply -i new.csv -o scored.csv
//! ```

use clap::Parser;
use featurestage::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing. FEATURESTAGE_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("FEATURESTAGE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "featurestage=debug"
    } else {
        "featurestage=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the startup banner.
fn print_banner() {
    println!(
        "featurestage v{} - gated feature engineering\n",
        env!("CARGO_PKG_VERSION")
    );
}
