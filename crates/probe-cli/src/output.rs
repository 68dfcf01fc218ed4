//! Result rendering for the terminal and for `--json`

use colored::Colorize;
use passage_probe_core::{FusedHit, SemanticHit, StoreStats};
use serde::Serialize;

/// Machine-readable response for one query
#[derive(Debug, Serialize)]
pub struct JsonResponse<'a, T: Serialize> {
    pub query: &'a str,
    pub mode: &'static str,
    pub results: &'a [T],
}

pub fn render_json<T: Serialize>(query: &str, mode: &'static str, results: &[T]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&JsonResponse {
        query,
        mode,
        results,
    })?)
}

fn indent(snippet: &str) -> String {
    if snippet.trim().is_empty() {
        "    (empty passage)".dimmed().to_string()
    } else {
        format!("    {snippet}")
    }
}

pub fn render_hybrid(hits: &[FusedHit]) -> String {
    if hits.is_empty() {
        return "No results.".dimmed().to_string();
    }

    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{} {} {}\n{}\n",
            format!("[{}]", i + 1).cyan().bold(),
            hit.reference().green(),
            format!("(rrf={:.4})", hit.score).dimmed(),
            indent(&hit.snippet)
        ));
    }
    out
}

pub fn render_semantic(hits: &[SemanticHit]) -> String {
    if hits.is_empty() {
        return "No results.".dimmed().to_string();
    }

    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "{} {} {}\n{}\n",
            format!("[{}]", i + 1).cyan().bold(),
            hit.reference().green(),
            format!("(dist={:.4})", hit.distance).dimmed(),
            indent(&hit.snippet)
        ));
    }
    out
}

pub fn render_stats(stats: &StoreStats) -> String {
    format!(
        "{}: {}  {}: {}  {}: {}",
        "Documents".white().bold(),
        stats.documents,
        "Passages".white().bold(),
        stats.passages,
        "Embeddings".white().bold(),
        stats.embeddings
    )
}
