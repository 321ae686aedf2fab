//! hash-walker - Incremental Content-Hash Indexer
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use hash_walker::config::{CliArgs, IndexConfig};
use hash_walker::content::Blake3Hasher;
use hash_walker::progress::{print_header, print_summary, ProgressReporter};
use hash_walker::run_index;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = IndexConfig::from_args(args).context("Invalid configuration")?;

    if config.root.is_none() && !config.livecheck {
        info!("No --root or --livecheck given, resolving hierarchy only");
    }

    let db_path = config.store_path.display().to_string();
    let root = config.root.as_ref().map(|r| r.display().to_string());

    // Print header
    if config.show_progress {
        print_header(root.as_deref(), config.worker_count, &db_path);
    }

    // Create progress reporter
    let progress = if config.show_progress {
        Some(ProgressReporter::new())
    } else {
        None
    };

    if let Some(ref p) = progress {
        p.set_status("Opening index...");
    }

    let report = run_index(&config, Arc::new(Blake3Hasher), progress.as_ref());

    // Finish progress
    if let Some(ref p) = progress {
        match report {
            Ok(_) => p.finish("Index updated"),
            Err(_) => p.finish_and_clear(),
        }
    }
    let report = report.context("Indexing failed")?;

    // Print summary
    if config.show_progress {
        let db_size = std::fs::metadata(&config.store_path).ok().map(|m| m.len());
        print_summary(&report, &db_path, db_size);
    }

    if let Some(crawl) = &report.crawl {
        if crawl.errors() > 0 {
            info!(errors = crawl.errors(), "Crawl completed with errors");
        }
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(env.as_deref(), verbose);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

/// `RUST_LOG` when set and valid, otherwise the level picked by `-v`
fn log_filter(env: Option<&str>, verbose: bool) -> EnvFilter {
    if let Some(filter) = env
        .filter(|s| !s.trim().is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
    {
        return filter;
    }

    if verbose {
        EnvFilter::new("hash_walker=debug,warn")
    } else {
        EnvFilter::new("hash_walker=info,warn")
    }
}
