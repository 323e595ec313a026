//! Command-line interface module.
//!
//! This module defines the CLI structure using Clap, including
//! all commands, arguments, and options.
//!
//! # Commands
//!
//! - `build`: Compile every configured API into versioned output documents
//! - `resolve`: Print the aggregate document effective at a version
//! - `versions`: List the effective versions of the configured APIs
//! - `init`: Create an example project configuration file
//!
//! # Example Usage
//!
//! ```bash
//! # Compile all APIs in .vervet.yaml
//! vervet build
//!
//! # Print the aggregate effective at a version
//! vervet resolve 2021-07-01~beta
//!
//! # List effective versions as a table
//! vervet versions
//!
//! # Initialize configuration
//! vervet init
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Vervet - versioned OpenAPI management.
#[derive(Parser, Debug)]
#[command(
    name = "vervet",
    author,
    version,
    about = "Aggregate dated OpenAPI resource specs into effective API documents",
    long_about = "Vervet loads individually authored OpenAPI 3 resource documents pinned to \
                  calendar dates and stability levels, and compiles the aggregated document \
                  effective at any requested version."
)]
pub struct Cli {
    /// Path to the project configuration file
    #[arg(short, long, global = true, env = "VERVET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile configured APIs into versioned output documents
    #[command(visible_alias = "b")]
    Build(BuildArgs),

    /// Print the aggregate document effective at a version
    #[command(visible_alias = "r")]
    Resolve(ResolveArgs),

    /// List the effective versions of the configured APIs
    Versions(VersionsArgs),

    /// Create an example project configuration file
    Init,
}

/// Arguments for the build command.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Build only this API (default: all configured APIs)
    #[arg(long, value_name = "NAME")]
    pub api: Option<String>,
}

/// Arguments for the resolve command.
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Version to resolve: YYYY-MM-DD[~stability] or a bare stability token
    #[arg(value_name = "VERSION")]
    pub version: String,

    /// API to resolve (required when the project configures more than one)
    #[arg(long, value_name = "NAME")]
    pub api: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "yaml", value_enum)]
    pub format: OutputFormat,
}

/// Arguments for the versions command.
#[derive(Args, Debug)]
pub struct VersionsArgs {
    /// List only this API (default: all configured APIs)
    #[arg(long, value_name = "NAME")]
    pub api: Option<String>,
}

/// Output formats for resolved documents.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// YAML output
    Yaml,
    /// Pretty-printed JSON output
    Json,
}
