//! # Partsmith CLI Module
//!
//! This module implements the command-line interface for Partsmith.
//!
//! ## Available Commands
//!
//! - `status` - Show catalogue status
//! - `init` - Initialize a new catalogue
//! - `import` - Import a basic-model document
//! - `export` - Export a stored model as a basic-model document
//! - `find` - List stored models
//! - `show` - Show one stored model
//! - `build` - Elaborate a stored model into a module tree
//! - `fetch` - Fetch the external references of a stored model
//! - `remove` - Remove a stored model
//! - `hash` - Compute the BLAKE3 digest of a stored model

mod commands;

use clap::{Parser, Subcommand};
use partsmith_core::PartsmithError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Partsmith - component assembly tool
///
/// Stores component models, resolves abstract parts to implementations and
/// elaborates models into fully wired module trees.
#[derive(Parser, Debug)]
#[command(name = "partsmith")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the model catalogue
    #[arg(short = 'D', long, global = true, default_value = "partsmith.db")]
    pub database: PathBuf,

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
    /// Show catalogue status
    Status,

    /// Initialize a new empty catalogue
    Init {
        /// Force initialization even if the catalogue exists
        #[arg(short, long)]
        force: bool,
    },

    /// Import every version of a basic-model document
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Export a stored model as a basic-model document
    Export {
        /// URI of the model
        #[arg(short, long)]
        uri: String,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List stored models
    Find {
        /// Only models with this name
        #[arg(short, long)]
        name: Option<String>,

        /// Only models of this domain (SOFTWARE, MECHANICS, ...)
        #[arg(long)]
        domain: Option<String>,
    },

    /// Show a stored model with its parts and ports
    Show {
        /// URI of the model
        #[arg(short, long)]
        uri: String,
    },

    /// Elaborate a stored model into a module tree
    Build {
        /// URI of the model
        #[arg(short, long)]
        uri: String,

        /// Name of the root module
        #[arg(short, long, default_value = "top")]
        name: String,

        /// Implementation choice for an abstract model, as ABSTRACT=IMPLEMENTATION
        /// (names or URIs; repeatable)
        #[arg(short, long = "select")]
        select: Vec<String>,

        /// JSON file of template variables applied to every configuration
        #[arg(short, long)]
        globals: Option<PathBuf>,

        /// JSON file of configuration overrides keyed by module alias
        #[arg(short, long)]
        configure: Option<PathBuf>,
    },

    /// Fetch the external references of a stored model
    Fetch {
        /// URI of the model
        #[arg(short, long)]
        uri: String,

        /// Directory receiving the local copies
        #[arg(short, long, default_value = "references")]
        dir: PathBuf,
    },

    /// Remove a stored model
    Remove {
        /// URI of the model
        #[arg(short, long)]
        uri: String,
    },

    /// Compute the BLAKE3 digest of a stored model
    Hash {
        /// URI of the model
        #[arg(short, long)]
        uri: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PartsmithError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Status) | None => cmd_status(&cli.database, json_mode),
        Some(Commands::Init { force }) => cmd_init(&cli.database, force),
        Some(Commands::Import { input }) => cmd_import(&cli.database, json_mode, &input),
        Some(Commands::Export { uri, output }) => cmd_export(&cli.database, &uri, &output),
        Some(Commands::Find { name, domain }) => {
            cmd_find(&cli.database, json_mode, name.as_deref(), domain.as_deref())
        }
        Some(Commands::Show { uri }) => cmd_show(&cli.database, json_mode, &uri),
        Some(Commands::Build {
            uri,
            name,
            select,
            globals,
            configure,
        }) => cmd_build(
            &cli.database,
            json_mode,
            &BuildRequest {
                uri,
                name,
                select,
                globals,
                configure,
            },
        ),
        Some(Commands::Fetch { uri, dir }) => cmd_fetch(&cli.database, json_mode, &uri, &dir),
        Some(Commands::Remove { uri }) => cmd_remove(&cli.database, &uri),
        Some(Commands::Hash { uri }) => cmd_hash(&cli.database, json_mode, &uri),
    }
}
