//! orm-check CLI
//!
//! Builds and validates NORMA `.orm` documents, one schema graph per file.
//!
//! Usage:
//!   orm-check models/paper.orm models/employee.orm
//!   orm-check --format json --readings models/paper.orm
//!   RUST_LOG=orm_check=debug orm-check --parallel models/*.orm
//!
//! Exit status: 0 when every document is clean, 1 when any defect was
//! found, 2 when a document could not be read.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use orm_check::{check_file, Analysis, CheckConfig, LoadError};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Check ORM schema documents for internal consistency
#[derive(Parser, Debug)]
#[command(name = "orm-check")]
#[command(about = "Build and validate NORMA .orm schema graphs")]
struct Args {
    /// Documents to check
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// YAML configuration file (overrides ORM_CHECK_CONFIG)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "text")]
    format: Format,

    /// Print expanded fact type readings
    #[arg(long, short = 'r')]
    readings: bool,

    /// Run validator checks in parallel
    #[arg(long, short = 'p')]
    parallel: bool,

    /// Debug logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Serialize)]
struct FileResult<'a> {
    file: String,
    clean: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis: Option<&'a Analysis>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(2)
        }
    }
}

fn run(args: &Args) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => CheckConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => CheckConfig::from_env().context("loading config from environment")?,
    };
    if args.parallel {
        config.parallel_checks = true;
    }

    let mut any_defects = false;
    let mut any_load_errors = false;
    let mut results: Vec<(PathBuf, Result<Analysis, LoadError>)> = Vec::new();

    for file in &args.files {
        let result = check_file(file, &config);
        match &result {
            Ok(analysis) => any_defects |= !analysis.defects().is_empty(),
            Err(_) => any_load_errors = true,
        }
        results.push((file.clone(), result));
    }

    match args.format {
        Format::Text => print_text(&results, args.readings),
        Format::Json => print_json(&results, args.readings)?,
    }

    let code = if any_load_errors {
        2
    } else if any_defects {
        1
    } else {
        0
    };
    Ok(ExitCode::from(code))
}

fn print_text(results: &[(PathBuf, Result<Analysis, LoadError>)], readings: bool) {
    for (file, result) in results {
        let analysis = match result {
            Ok(analysis) => analysis,
            Err(err) => {
                println!("{}: error: {}", file.display(), err);
                continue;
            }
        };

        let defects = analysis.defects();
        if defects.is_empty() {
            println!("{}: ok", file.display());
        } else {
            println!("{}: {} defect(s)", file.display(), defects.len());
            for defect in &defects {
                println!("  {}", defect);
            }
        }
        for note in &analysis.omissions {
            println!("  note: omitted {}", note);
        }
        if readings {
            for reading in &analysis.readings {
                println!("  reading {}", reading);
            }
        }
    }
}

fn print_json(results: &[(PathBuf, Result<Analysis, LoadError>)], readings: bool) -> Result<()> {
    let rows: Vec<FileResult<'_>> = results
        .iter()
        .map(|(file, result)| match result {
            Ok(analysis) => FileResult {
                file: file.display().to_string(),
                clean: analysis.defects().is_empty(),
                error: None,
                analysis: Some(analysis),
            },
            Err(err) => FileResult {
                file: file.display().to_string(),
                clean: false,
                error: Some(err.to_string()),
                analysis: None,
            },
        })
        .collect();

    let mut value = serde_json::to_value(&rows).context("serializing results")?;
    if !readings {
        if let Some(rows) = value.as_array_mut() {
            for row in rows {
                if let Some(analysis) = row.get_mut("analysis").and_then(|a| a.as_object_mut()) {
                    analysis.remove("readings");
                }
            }
        }
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&value).context("rendering JSON")?
    );
    Ok(())
}
