//! Progress reporting for the indexer
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::run::RunReport;
use crate::walker::CrawlProgress;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays crawl and live-check status
///
/// Cloning shares the same spinner, so the walker thread can update it.
#[derive(Clone)]
pub struct ProgressReporter {
    /// Progress bar
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the display from a crawl snapshot
    pub fn update(&self, progress: &CrawlProgress) {
        let bytes_str = format_size(progress.bytes, BINARY);
        let rate = progress.files_per_second();

        let msg = format!(
            "Files: {} | Size: {} | Unchanged: {} | Hashing: {} | Rate: {:.0}/s",
            format_number(progress.files),
            bytes_str,
            format_number(progress.unchanged),
            format_number(progress.queued),
            rate,
        );

        self.bar.set_message(msg);
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

/// Print a summary of the run
pub fn print_summary(report: &RunReport, db_path: &str, db_size: Option<u64>) {
    println!();
    println!("{}", style("Index Updated").green().bold());
    println!("{}", style("─".repeat(50)).dim());

    if let Some(crawl) = &report.crawl {
        let secs = crawl.duration.as_secs_f64();
        let rate = if secs > 0.0 {
            crawl.walk.files as f64 / secs
        } else {
            0.0
        };

        println!(
            "  {} {} ({})",
            style("Files:").bold(),
            format_number(crawl.walk.files),
            format_size(crawl.walk.bytes, BINARY)
        );
        println!(
            "  {} {}",
            style("Unchanged:").bold(),
            format_number(crawl.detector.unchanged)
        );
        println!(
            "  {} {} ({})",
            style("Hashed:").bold(),
            format_number(crawl.hasher.hashed),
            format_size(crawl.hasher.bytes, BINARY)
        );
        println!(
            "  {} {} new, {} updated",
            style("Written:").bold(),
            format_number(crawl.saver.inserted),
            format_number(crawl.saver.updated)
        );
        println!(
            "  {} {:.1}s ({:.0} files/sec)",
            style("Crawl:").bold(),
            secs,
            rate
        );
        if crawl.errors() > 0 {
            println!(
                "  {} {}",
                style("Errors:").yellow().bold(),
                format_number(crawl.errors())
            );
        }
    }

    if report.hierarchy.created > 0 || report.hierarchy.linked > 0 {
        println!(
            "  {} {} linked, {} created",
            style("Directories:").bold(),
            format_number(report.hierarchy.linked),
            format_number(report.hierarchy.created)
        );
    }

    if let Some(live) = &report.livecheck {
        println!(
            "  {} {} files, {} directories removed",
            style("Live-check:").bold(),
            format_number(live.files_deleted),
            format_number(live.dirs_deleted)
        );
    }

    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        report.duration.as_secs_f64()
    );
    // Show database path with size if available
    if let Some(size) = db_size {
        let db_size_str = format_size(size, BINARY);
        println!("  {} {} ({})", style("Database:").bold(), db_path, db_size_str);
    } else {
        println!("  {} {}", style("Database:").bold(), db_path);
    }
    println!();
}

/// Print a header at the start of the run
pub fn print_header(root: Option<&str>, workers: usize, db: &str) {
    println!();
    println!(
        "{} {}",
        style("hash-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    if let Some(root) = root {
        println!("  {} {}", style("Root:").bold(), root);
        println!("  {} {}", style("Workers:").bold(), workers);
    }
    println!("  {} {}", style("Database:").bold(), db);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }
}
