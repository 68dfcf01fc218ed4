//! Passage Segmentation
//!
//! Splits raw file text into the passages that get embedded and stored.
//!
//! Two strategies, picked by file extension:
//! - **Lines**: one passage per non-blank line (CSV and other configured
//!   line-oriented formats)
//! - **Chunks**: fixed-size character windows with overlap
//!
//! Offsets are measured in characters, never bytes, so multi-byte text is
//! always cut on the same boundaries.

use std::collections::HashSet;
use std::path::Path;

use crate::config::{normalize_extension, ConfigError, Settings};

/// Segmentation strategy for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    /// One passage per non-blank line
    Lines,
    /// Overlapping fixed-size character windows
    Chunks,
}

/// Turns file content into an ordered, non-empty list of passages
#[derive(Debug, Clone)]
pub struct Segmenter {
    chunk_len: usize,
    chunk_overlap: usize,
    line_oriented: HashSet<String>,
}

impl Segmenter {
    /// Create a segmenter.
    ///
    /// Extensions are compared lowercase with a leading dot; `"CSV"` and
    /// `".csv"` are equivalent. Fails if `chunk_len == 0` or
    /// `chunk_overlap >= chunk_len`, since the window would never advance.
    pub fn new<I, S>(chunk_len: usize, chunk_overlap: usize, line_oriented: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if chunk_len == 0 {
            return Err(ConfigError::Invalid("chunk_len must be positive".into()));
        }
        if chunk_overlap >= chunk_len {
            return Err(ConfigError::Invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_len ({})",
                chunk_overlap, chunk_len
            )));
        }

        Ok(Self {
            chunk_len,
            chunk_overlap,
            line_oriented: line_oriented
                .into_iter()
                .map(|e| normalize_extension(e.as_ref()))
                .collect(),
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        Self::new(
            settings.index.chunk_len,
            settings.index.chunk_overlap,
            settings.line_oriented_extensions(),
        )
    }

    /// Strategy used for `path`
    pub fn mode_for(&self, path: &str) -> SegmentMode {
        let ext = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension);

        match ext {
            Some(ext) if self.line_oriented.contains(&ext) => SegmentMode::Lines,
            _ => SegmentMode::Chunks,
        }
    }

    /// Segment `content` into passages. Never returns an empty list.
    pub fn segment(&self, path: &str, content: &str) -> Vec<String> {
        match self.mode_for(path) {
            SegmentMode::Lines => {
                let lines = split_lines(content);
                if lines.is_empty() {
                    // A blank line-oriented file still gets its single passage
                    vec![content.to_string()]
                } else {
                    lines
                }
            }
            SegmentMode::Chunks => chunk_text(content, self.chunk_len, self.chunk_overlap),
        }
    }
}

/// Non-blank lines of `content`, in order, without their line terminators.
///
/// Breaks on `\n`, `\r\n`, a lone `\r` and the other Unicode line
/// boundaries (`\x0b`, `\x0c`, `\x1c`..`\x1e`, `\u{85}`, `\u{2028}`,
/// `\u{2029}`).
pub fn split_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let line = match rest.char_indices().find(|&(_, c)| is_line_break(c)) {
            Some((i, c)) => {
                let width = if rest[i..].starts_with("\r\n") { 2 } else { c.len_utf8() };
                let line = &rest[..i];
                rest = &rest[i + width..];
                line
            }
            None => std::mem::take(&mut rest),
        };
        if !line.trim().is_empty() {
            lines.push(line.to_string());
        }
    }
    lines
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

/// Overlapping character windows of `chunk_len`, advancing by
/// `chunk_len - overlap`.
///
/// Text no longer than `chunk_len` comes back whole. Otherwise a window
/// starts at every step offset below the text length, so the last window
/// may be shorter than `chunk_len`.
pub fn chunk_text(text: &str, chunk_len: usize, overlap: usize) -> Vec<String> {
    // Byte offset of every char start, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    if char_count <= chunk_len {
        return vec![text.to_string()];
    }

    let step = chunk_len.saturating_sub(overlap).max(1);
    (0..char_count)
        .step_by(step)
        .map(|start| {
            let end = (start + chunk_len).min(char_count);
            text[boundaries[start]..boundaries[end]].to_string()
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
