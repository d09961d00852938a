//! `dep-checkr` command line.
//!
//! Loads the policy and the input bundle, runs [`dep_checkr::analyze`], renders
//! the report and exits `1` when any package is rejected.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use cli::{Cli, ReportFormat};
use dep_checkr::config::load_config;
use dep_checkr::input::AnalysisInput;
use dep_checkr::report::{self, ReportTree};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let input_path = cli
        .input
        .canonicalize()
        .unwrap_or_else(|_| cli.input.clone());
    let input_dir = input_path.parent().unwrap_or_else(|| Path::new("."));

    let config = load_config(input_dir, cli.config.as_deref())?;
    let input = AnalysisInput::load(&input_path)?;
    let tree = dep_checkr::analyze(&input, &config, Utc::now())?;

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&tree, &input_path, cli.verbose, cli.quiet);
        }
        ReportFormat::Json => {
            let json = serde_json::to_string_pretty(&tree)?;
            match &cli.output {
                Some(path) => {
                    std::fs::write(path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    if !cli.quiet {
                        print_summary(&tree);
                        eprintln!("  {} report written to {}", "→".cyan(), path.display());
                    }
                }
                None => println!("{json}"),
            }
        }
    }

    if tree.has_rejections() {
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: bool, quiet: bool) {
    let default = if verbose {
        "info"
    } else if quiet {
        "error"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn print_summary(tree: &ReportTree) {
    let summary = tree.summary;
    eprintln!(
        "  {} {} packages: {} approved, {} pending, {} rejected",
        "→".cyan(),
        summary.total,
        summary.approved.to_string().green(),
        summary.pending.to_string().yellow(),
        summary.rejected.to_string().red(),
    );
}
