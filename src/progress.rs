//! Progress reporting for the catalog crawl
//!
//! Provides a live status line using indicatif and the end-of-run summary.

use crate::config::CrawlConfig;
use crate::crawler::{CrawlProgress, CrawlStats};
use crate::tree::CatalogNode;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress reporter that displays crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let spinner = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(spinner);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Reporter that draws nothing (quiet mode)
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Callback suitable for [`CatalogTreeBuilder::with_progress`](crate::CatalogTreeBuilder::with_progress)
    pub fn callback(&self) -> impl Fn(&CrawlProgress) + Send + Sync + 'static {
        let bar = self.bar.clone();
        move |progress: &CrawlProgress| bar.set_message(status_line(progress))
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

fn status_line(progress: &CrawlProgress) -> String {
    let stats = &progress.stats;
    let mut line = format!(
        "Downloaded: {} ({}) | Found: {} | Large: {} | Rate: {:.0}/s",
        format_number(stats.catalogs_downloaded),
        format_size(stats.bytes_downloaded, BINARY),
        format_number(stats.catalogs_found),
        format_number(stats.large_catalogs_found),
        progress.catalogs_per_second(),
    );
    if stats.cache_hits > 0 {
        line.push_str(&format!(" | Cached: {}", format_number(stats.cache_hits)));
    }
    if stats.reused_nodes > 0 {
        line.push_str(&format!(" | Reused: {}", format_number(stats.reused_nodes)));
    }
    line.push_str(&format!(" | {}", truncate_path(&progress.path, 40)));
    line
}

/// Keep the tail of long paths, where the distinguishing part is
fn truncate_path(path: &str, max: usize) -> String {
    let count = path.chars().count();
    if count <= max {
        return path.to_string();
    }
    let tail: String = path.chars().skip(count - (max - 3)).collect();
    format!("...{}", tail)
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the crawl results
pub fn print_summary(tree: &CatalogNode, stats: &CrawlStats, duration: Duration) {
    let duration_secs = duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.catalogs_downloaded as f64 / duration_secs
    } else {
        0.0
    };

    eprintln!();
    eprintln!("{}", style("Crawl Complete").green().bold());
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!(
        "  {} {} ({} large)",
        style("Catalogs found:").bold(),
        format_number(stats.catalogs_found),
        format_number(stats.large_catalogs_found)
    );
    eprintln!(
        "  {} {} ({})",
        style("Downloaded:").bold(),
        format_number(stats.catalogs_downloaded),
        format_size(stats.bytes_downloaded, BINARY)
    );
    eprintln!(
        "    {} {} ({})",
        style("network:").dim(),
        format_number(stats.network_catalogs()),
        format_size(stats.network_bytes(), BINARY)
    );
    eprintln!(
        "    {} {} ({})",
        style("cache:").dim(),
        format_number(stats.cache_hits),
        format_size(stats.bytes_from_cache, BINARY)
    );
    if stats.bytes_skipped > 0 {
        eprintln!(
            "  {} {}",
            style("Skipped (large):").bold(),
            format_size(stats.bytes_skipped, BINARY)
        );
    }
    if stats.reused_nodes > 0 {
        eprintln!(
            "  {} {}",
            style("Reused:").bold(),
            format_number(stats.reused_nodes)
        );
    }
    if stats.ignored > 0 {
        eprintln!(
            "  {} {}",
            style("Ignored:").bold(),
            format_number(stats.ignored)
        );
    }
    eprintln!(
        "  {} {}{}",
        style("Tree size:").bold(),
        format_size(tree.total_size(), BINARY),
        if tree.is_incomplete() {
            " (incomplete: large catalogs not explored)"
        } else {
            ""
        }
    );
    eprintln!(
        "  {} {:.1}s ({:.0} catalogs/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.errors > 0 {
        eprintln!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(stats.errors)
        );
    }
    eprintln!();
}

/// Print a header at the start of the crawl
pub fn print_header(repository: &str, config: &CrawlConfig) {
    eprintln!();
    eprintln!(
        "{} {}",
        style("catalog-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("{}", style("─".repeat(50)).dim());
    eprintln!("  {} {}", style("Repository:").bold(), repository);
    eprintln!("  {} {}", style("Workers:").bold(), config.worker_count);
    eprintln!(
        "  {} {}",
        style("Stop threshold:").bold(),
        format_size(config.stop_threshold, BINARY)
    );
    if let Some(depth) = config.max_depth {
        eprintln!("  {} {}", style("Max depth:").bold(), depth);
    }
    if let Some(max) = config.max_catalogs {
        eprintln!("  {} {}", style("Max catalogs:").bold(), format_number(max));
    }
    if !config.ignore_paths.is_empty() {
        eprintln!(
            "  {} {}",
            style("Ignoring:").bold(),
            config.ignore_paths.join(", ")
        );
    }
    eprintln!();
}
