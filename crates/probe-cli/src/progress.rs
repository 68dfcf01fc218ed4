//! Indexing progress display

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use passage_probe_core::{IndexEvent, IndexReport};
use tokio::sync::mpsc::UnboundedReceiver;

/// How progress events are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    /// Full progress bar on stderr
    Bar,
    /// Keep the terminal free for the query prompt; only log events
    Quiet,
}

fn new_bar(total: usize) -> ProgressBar {
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Drain `rx` until the indexing worker drops its sender.
///
/// Returns the final report if a [`IndexEvent::Finished`] arrived.
pub async fn report(mut rx: UnboundedReceiver<IndexEvent>, mode: ProgressMode) -> Option<IndexReport> {
    let mut bar: Option<ProgressBar> = None;
    let mut finished = None;

    while let Some(event) = rx.recv().await {
        match event {
            IndexEvent::Started { total } => {
                tracing::info!("Indexing {} new documents", total);
                if mode == ProgressMode::Bar && total > 0 {
                    bar = Some(new_bar(total));
                }
            }
            IndexEvent::DocumentIndexed { path, passages } => {
                tracing::debug!("Indexed {} ({} passages)", path, passages);
                if let Some(pb) = &bar {
                    pb.set_message(file_name(&path).to_string());
                    pb.inc(1);
                }
            }
            IndexEvent::DocumentFailed { path, error } => {
                tracing::debug!("Failed to index {}: {}", path, error);
                if let Some(pb) = &bar {
                    pb.println(format!("{} {}: {}", "skipped".yellow(), path, error));
                    pb.inc(1);
                }
            }
            IndexEvent::Finished(report) => {
                if let Some(pb) = bar.take() {
                    pb.finish_with_message("done");
                }
                if mode == ProgressMode::Quiet {
                    eprintln!("\n{}", summary(&report).dimmed());
                }
                finished = Some(report);
            }
        }
    }

    finished
}

/// One-line description of a finished run
pub fn summary(report: &IndexReport) -> String {
    let mut line = format!(
        "Indexed {} of {} files ({} passages, {} already indexed",
        report.indexed, report.discovered, report.passages, report.skipped_existing
    );
    if report.failed > 0 {
        line.push_str(&format!(", {} failed", report.failed));
    }
    line.push(')');
    line
}
