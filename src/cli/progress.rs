//! Terminal progress bars, notices and the session summary.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::catalog::Item;
use crate::error::Error;
use crate::format::{format_bytes, format_duration, format_rate};
use crate::progress::{Bar, DownloadProgress, trim_label};
use crate::stats::{FileStats, SessionStats};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates a byte progress bar labelled `label`.
pub fn make_progress_bar(total: u64, label: &str) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} @ {bytes_per_sec} - {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar.set_message(label.to_string());
    bar
}

/// An indicatif bar driven by the pipeline.
struct IndicatifBar(ProgressBar);

impl Bar for IndicatifBar {
    fn inc(&self, delta: u64) {
        self.0.inc(delta);
    }

    fn set_total(&self, total: u64, complete: bool) {
        self.0.set_length(total);
        if complete {
            self.0.set_position(total);
            self.0.finish_and_clear();
        }
    }

    fn abandon(&self) {
        self.0.abandon();
    }
}

/// Renders pipeline progress to the terminal.
///
/// Bars are stacked in a [`MultiProgress`]; notices are printed above them so
/// they do not tear the prompt.
#[derive(Clone, Default)]
pub struct TerminalProgress {
    multi: MultiProgress,
}

impl TerminalProgress {
    /// Creates a renderer drawing to stderr.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notice(&self, line: String) {
        if self.multi.println(&line).is_err() {
            eprintln!("{line}");
        }
    }
}

impl DownloadProgress for TerminalProgress {
    fn new_bar(&self, label: &str, total: u64) -> Arc<dyn Bar> {
        let bar = self.multi.add(make_progress_bar(total, label));
        bar.enable_steady_tick(Duration::from_millis(250));
        Arc::new(IndicatifBar(bar))
    }

    fn on_queued(&self, item: &Item) {
        log::info!("Queued {}", item.title);
    }

    fn on_skipped(&self, item: &Item, reason: &str) {
        self.notice(format!(
            "  {} {} ({reason})",
            style("skip").yellow(),
            trim_label(&item.title)
        ));
    }

    fn on_resume(&self, item: &Item, offset: u64) {
        self.notice(format!(
            "  {} {} from {}",
            style("resume").cyan(),
            trim_label(&item.title),
            format_bytes(offset)
        ));
    }

    fn on_complete(&self, item: &Item, stats: &FileStats) {
        let detail = if stats.transferred == 0 {
            "extracted".to_string()
        } else {
            format!(
                "{} in {} ({})",
                format_bytes(stats.transferred),
                format_duration(stats.elapsed),
                format_rate(stats.average_speed())
            )
        };
        self.notice(format!(
            "  {} {} - {detail}",
            style("done").green().bold(),
            trim_label(&item.title)
        ));
    }

    fn on_error(&self, item: &Item, error: &Error) {
        self.notice(format!(
            "  {} [{}] {}: {error}",
            style("error").red().bold(),
            error.kind(),
            item.title
        ));
    }
}

/// Prints the end-of-session summary.
pub fn print_summary(stats: &SessionStats) {
    if stats.is_empty() {
        return;
    }

    println!("\n{SEPARATOR}");
    println!("Session Summary");
    println!("{SEPARATOR}");

    if stats.files_downloaded > 0 {
        println!("  Games downloaded:  {}", stats.files_downloaded);
        println!("  Transferred:       {}", format_bytes(stats.total_bytes));
        println!("  Average speed:     {}", format_rate(stats.average_speed()));
    }
    if stats.files_skipped > 0 {
        println!("  Games skipped:     {}", stats.files_skipped);
    }
    if stats.files_failed > 0 {
        println!("  Games failed:      {}", stats.files_failed);
    }
    println!("  Session time:      {}", format_duration(stats.elapsed));

    println!("{SEPARATOR}");
}
