//! volume-walker - sorted object listing of local disk volumes
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver};
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use volume_walker::config::{CliArgs, WalkConfig};
use volume_walker::error::{StorageError, WalkerError};
use volume_walker::progress::{print_header, print_summary, ProgressReporter};
use volume_walker::walker::WalkCoordinator;

/// Names between progress refreshes
const PROGRESS_INTERVAL: u64 = 1024;

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
    let config = WalkConfig::from_args(args)
        .map_err(WalkerError::Config)
        .context("Invalid configuration")?;

    if config.show_progress {
        let labels: Vec<String> = config.volumes.iter().map(|v| v.display_name()).collect();
        print_header(&labels, &config.base_dir, config.recursive);
    }

    let mut coordinator = WalkCoordinator::new(config.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = coordinator.shutdown_flag();
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let shutdown_flag = Arc::clone(&shutdown_flag);
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, shutting down...");
            interrupted.store(true, Ordering::SeqCst);
            shutdown_flag.store(true, Ordering::SeqCst);
        })
        .context("Failed to set signal handler")?;
    }

    let (tx, rx) = bounded::<String>(config.queue_size);
    coordinator.start(tx).context("Failed to start walkers")?;

    let progress = if config.show_progress && config.count_only {
        Some(ProgressReporter::new())
    } else {
        None
    };

    let names = if config.count_only {
        count_names(rx, progress.as_ref())
    } else {
        print_names(rx, &shutdown_flag).context("Failed to write output")?
    };

    let result = coordinator.join().context("Walk failed")?;

    if let Some(ref p) = progress {
        if result.completed {
            p.finish("Walk completed");
        } else {
            p.finish("Walk interrupted");
        }
    }

    if config.count_only {
        println!("{}", names);
    }

    if config.show_progress {
        print_summary(&result);
    }

    if interrupted.load(Ordering::SeqCst) {
        info!("Walk was interrupted before completion");
        return Err(WalkerError::Interrupted.into());
    }

    if result.stats.skipped > 0 {
        info!(skipped = result.stats.skipped, "Walk completed with skipped entries");
    }

    let failed = result.failures().count();
    let total = result.volumes.len();
    let first_failure = result.volumes.into_iter().find_map(|v| match v.outcome {
        Err(StorageError::Cancelled) | Ok(_) => None,
        Err(e) => Some((v.volume, e)),
    });
    if let Some((volume, e)) = first_failure {
        return Err(WalkerError::Storage(e))
            .with_context(|| format!("{} of {} volumes failed, first: {}", failed, total, volume));
    }

    Ok(())
}

/// Write every received name to stdout.
///
/// A closed pipe (`| head`) stops the walkers instead of failing.
fn print_names(rx: Receiver<String>, shutdown: &AtomicBool) -> Result<u64, WalkerError> {
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut names = 0u64;

    for name in rx.iter() {
        if let Err(e) = writeln!(out, "{}", name) {
            shutdown.store(true, Ordering::SeqCst);
            if e.kind() == io::ErrorKind::BrokenPipe {
                return Ok(names);
            }
            return Err(WalkerError::Io(e));
        }
        names += 1;
    }

    match out.flush() {
        Err(e) if e.kind() != io::ErrorKind::BrokenPipe => Err(WalkerError::Io(e)),
        _ => Ok(names),
    }
}

/// Count received names, refreshing the spinner as they arrive
fn count_names(rx: Receiver<String>, progress: Option<&ProgressReporter>) -> u64 {
    let mut names = 0u64;
    if let Some(p) = progress {
        p.set_status("Walking...");
    }

    for _ in rx.iter() {
        names += 1;
        if names % PROGRESS_INTERVAL == 0 {
            if let Some(p) = progress {
                p.update(names);
            }
        }
    }

    names
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("volume_walker=debug,warn")
    } else {
        EnvFilter::new("volume_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
