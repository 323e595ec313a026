//! Vervet CLI entry point.
//!
//! This binary provides the command-line interface for Vervet.

use std::error::Error as StdError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use comfy_table::{presets, ContentArrangement, Table};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vervet::cli::{Cli, Commands, OutputFormat};
use vervet::compiler::Compiler;
use vervet::config::{Project, DEFAULT_PROJECT_FILE};
use vervet::version::Version;
use vervet::Error;

fn main() -> ExitCode {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("Error: {e}");

            // Print error chain (cause chain)
            let mut source = e.source();
            if source.is_some() {
                eprintln!("\nCaused by:");
                let mut i = 0;
                while let Some(cause) = source {
                    eprintln!("  {i}: {cause}");
                    source = cause.source();
                    i += 1;
                }
            }

            let code = e
                .downcast_ref::<Error>()
                .map_or(1, Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        // Prefer RUST_LOG from the environment, otherwise use the verbose flag
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let base_level = match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            };
            // vervet at the requested level, everything else at warn
            EnvFilter::new(format!("warn,vervet={base_level}"))
        })
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    if matches!(cli.command, Commands::Init) {
        return init_project(cli.config.as_deref());
    }

    let (project, root) = load_project(cli.config.as_deref())?;
    let compiler = Compiler::new(project, root);

    match cli.command {
        Commands::Build(args) => {
            let compiled = match &args.api {
                Some(api) => compiler.build_api(api)?,
                None => compiler.build_all()?,
            };
            for version in &compiled {
                match &version.path {
                    Some(path) => println!(
                        "{} {} {} -> {}",
                        "compiled".green(),
                        version.api.bold(),
                        version.version,
                        path.display()
                    ),
                    None => println!(
                        "{} {} {}",
                        "checked".green(),
                        version.api.bold(),
                        version.version
                    ),
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Resolve(args) => {
            let api = single_api(compiler.project(), args.api.as_deref())?;
            let query = Version::parse_query(&args.version, Utc::now().date_naive())?;
            let document = compiler.resolve(&api, query)?;
            match args.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&document)?),
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&document)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Versions(args) => {
            let mut table = Table::new();
            table
                .load_preset(presets::UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["API", "VERSION", "STABILITY", "LIFECYCLE"]);

            let apis: Vec<String> = match &args.api {
                Some(api) => vec![api.clone()],
                None => compiler.project().apis.keys().cloned().collect(),
            };
            for api in apis {
                let specs = compiler.load_api(&api)?;
                let versions = specs.versions();
                for version in &versions {
                    let deprecated_by = version.deprecated_by(&versions);
                    let lifecycle = version.lifecycle_at(compiler.now(), deprecated_by.as_ref());
                    table.add_row(vec![
                        api.clone(),
                        version.to_string(),
                        version.stability.to_string(),
                        lifecycle.to_string(),
                    ]);
                }
            }
            println!("{table}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init => unreachable!("handled above"),
    }
}

fn load_project(config: Option<&Path>) -> anyhow::Result<(Project, PathBuf)> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_FILE));
    tracing::debug!(path = %path.display(), "Loading project configuration");
    let project = Project::from_file(&path)?;
    let root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    Ok((project, root))
}

fn single_api(project: &Project, requested: Option<&str>) -> anyhow::Result<String> {
    if let Some(api) = requested {
        return Ok(api.to_string());
    }
    let mut names = project.apis.keys();
    match (names.next(), names.next()) {
        (Some(only), None) => Ok(only.clone()),
        _ => anyhow::bail!("project configures multiple APIs, pass --api NAME"),
    }
}

fn init_project(config: Option<&Path>) -> anyhow::Result<ExitCode> {
    let path = config
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_FILE));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    std::fs::write(&path, Project::example())?;
    println!("{} {}", "created".green(), path.display());
    Ok(ExitCode::SUCCESS)
}
