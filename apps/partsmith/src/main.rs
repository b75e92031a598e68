//! # Partsmith - Component Assembly Tool
//!
//! The main binary for the Partsmith component-assembly engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           apps/partsmith (THE BINARY)        │
//! │                                              │
//! │  ┌──────────────┐      ┌─────────────────┐   │
//! │  │     CLI      │─────▶│   ModelStore    │   │
//! │  │    (clap)    │      │     (redb)      │   │
//! │  └──────┬───────┘      └────────┬────────┘   │
//! │         │                       │            │
//! │         ▼                       ▼            │
//! │        ┌─────────────────────────┐           │
//! │        │     partsmith-core      │           │
//! │        │   (THE ENGINE: build)   │           │
//! │        └─────────────────────────┘           │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! partsmith init
//! partsmith import -i controller.json
//! partsmith find --domain SOFTWARE
//! partsmith build --uri drock://component_model/SOFTWARE/Cascade/v1 --select Vehicle=Opel
//! ```

use clap::Parser;
use partsmith::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    let cli = cli::Cli::parse();

    // PARTSMITH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("PARTSMITH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "partsmith=debug,partsmith_core=debug"
    } else {
        "partsmith=info,partsmith_core=warn"
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

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Partsmith startup banner.
fn print_banner() {
    println!("partsmith v{} - component assembly", env!("CARGO_PKG_VERSION"));
    println!();
}
