//! Progress reporting for the volume walker
//!
//! Provides a live spinner while names are counted and the end-of-walk
//! summary. Everything here writes to stderr so stdout carries only names.

use crate::walker::WalkResult;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

/// Progress reporter that displays walk status
pub struct ProgressReporter {
    bar: ProgressBar,
    start: Instant,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            bar,
            start: Instant::now(),
        }
    }

    /// Update the progress display with the number of names seen
    pub fn update(&self, names: u64) {
        let secs = self.start.elapsed().as_secs_f64();
        let rate = if secs > 0.0 { names as f64 / secs } else { 0.0 };

        self.bar.set_message(format!(
            "Names: {} | Rate: {:.0}/s",
            format_number(names),
            rate
        ));
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| {
            chunk
                .iter()
                .rev()
                .map(|&b| b as char)
                .collect::<String>()
        })
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the walk results
pub fn print_summary(result: &WalkResult) {
    let stats = &result.stats;
    let duration_secs = result.duration.as_secs_f64();
    let rate = stats.entries_per_second();

    let title = if result.completed {
        style("Walk Complete").green().bold()
    } else {
        style("Walk Incomplete").yellow().bold()
    };

    eprintln!();
    eprintln!("{}", title);
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Objects:").bold(), format_number(stats.objects));
    eprintln!("  {} {}", style("Prefixes:").bold(), format_number(stats.prefixes));
    eprintln!(
        "  {} {}",
        style("Dirs listed:").bold(),
        format_number(stats.dirs_listed)
    );
    eprintln!(
        "  {} {}",
        style("Metadata read:").bold(),
        format_size(stats.meta_bytes, BINARY)
    );
    eprintln!(
        "  {} {:.1}s ({:.0} names/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.skipped > 0 {
        eprintln!(
            "  {} {}",
            style("Skipped:").yellow().bold(),
            format_number(stats.skipped)
        );
    }
    for (volume, err) in result.failures() {
        eprintln!("  {} {}: {}", style("Failed:").red().bold(), volume, err);
    }
    eprintln!();
}

/// Print a header at the start of the walk
pub fn print_header(volumes: &[String], base_dir: &str, recursive: bool) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("volume-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    for volume in volumes {
        eprintln!("  {} {}", style("Volume:").bold(), volume);
    }
    if !base_dir.is_empty() {
        eprintln!("  {} {}", style("Base dir:").bold(), base_dir);
    }
    eprintln!(
        "  {} {}",
        style("Mode:").bold(),
        if recursive { "recursive" } else { "flat" }
    );
    eprintln!();
}
