//! Page-aware paragraph chunker.
//!
//! Splits each page into chunks that respect a `max_tokens` limit. Chunks
//! never cross a page boundary, and each records its 1-based page number
//! plus the char range it covers within that page, so a search hit can be
//! traced back to the exact place in the source document.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split each page on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs until adding the next would exceed `max_chars`,
//!    then flush the accumulated span as a chunk.
//! 4. A single paragraph longer than `max_chars` is hard-split at the
//!    nearest newline or space boundary.
//! 5. Blank pages produce no chunks.
//!
//! # Example
//!
//! ```rust
//! use tome_core::chunk::chunk_pages;
//!
//! let set = chunk_pages(&["Hello world.\n\nSecond paragraph.", "Page two."], 200);
//! assert_eq!(set.len(), 2);
//! assert_eq!(set.pages, vec![1, 2]);
//! ```

use std::collections::BTreeMap;

use serde_json::Value;

use crate::embedding::EmbeddingMatrix;
use crate::error::{CoreError, Result};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk texts with their page side arrays and optional embeddings.
///
/// All vectors are the same length; `embeddings`, when present, has one
/// row per chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkSet {
    pub texts: Vec<String>,
    /// 1-based page for each chunk.
    pub pages: Vec<u32>,
    /// Char offset within the page where each chunk starts.
    pub char_starts: Vec<u32>,
    /// Char offset within the page just past each chunk.
    pub char_ends: Vec<u32>,
    pub embeddings: Option<EmbeddingMatrix>,
}

impl ChunkSet {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    /// Attach one embedding row per chunk.
    pub fn with_embeddings(mut self, matrix: EmbeddingMatrix) -> Result<Self> {
        if matrix.rows() != self.len() {
            return Err(CoreError::EmbeddingShape(format!(
                "{} embedding rows for {} chunks",
                matrix.rows(),
                self.len()
            )));
        }
        self.embeddings = Some(matrix);
        Ok(self)
    }

    /// Side arrays must match the text count.
    pub fn check_shape(&self) -> Result<()> {
        let n = self.len();
        if self.pages.len() != n || self.char_starts.len() != n || self.char_ends.len() != n {
            return Err(CoreError::Malformed(format!(
                "chunk side arrays disagree: {} texts, {} pages, {} starts, {} ends",
                n,
                self.pages.len(),
                self.char_starts.len(),
                self.char_ends.len()
            )));
        }
        if let Some(matrix) = &self.embeddings {
            if matrix.rows() != n {
                return Err(CoreError::EmbeddingShape(format!(
                    "{} embedding rows for {} chunks",
                    matrix.rows(),
                    n
                )));
            }
        }
        Ok(())
    }
}

/// Parameters recorded in `DocumentMeta::chunk_params`.
pub fn chunk_params(max_tokens: usize) -> BTreeMap<String, Value> {
    let mut params = BTreeMap::new();
    params.insert("strategy".to_string(), Value::from("paragraph"));
    params.insert("max_tokens".to_string(), Value::from(max_tokens));
    params.insert("chars_per_token".to_string(), Value::from(CHARS_PER_TOKEN));
    params
}

/// Chunk every page; see the module docs for the rules.
pub fn chunk_pages<S: AsRef<str>>(pages: &[S], max_tokens: usize) -> ChunkSet {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut set = ChunkSet::default();

    for (index, page) in pages.iter().enumerate() {
        let page = page.as_ref();
        for (start, end) in chunk_spans(page, max_chars) {
            set.texts.push(page[start..end].to_string());
            set.pages.push(index as u32 + 1);
            set.char_starts.push(char_offset(page, start));
            set.char_ends.push(char_offset(page, end));
        }
    }
    set
}

fn char_offset(text: &str, byte: usize) -> u32 {
    text[..byte].chars().count() as u32
}

/// Byte span of `text[start..end]` with surrounding whitespace removed.
/// `None` when the span is blank.
fn trimmed_span(text: &str, start: usize, end: usize) -> Option<(usize, usize)> {
    let slice = &text[start..end];
    let lead = slice.len() - slice.trim_start().len();
    let trail = slice.len() - slice.trim_end().len();
    if lead == slice.len() {
        return None;
    }
    Some((start + lead, end - trail))
}

/// Trimmed byte spans of the `\n\n`-separated paragraphs.
fn paragraphs(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    for para in text.split("\n\n") {
        if let Some(span) = trimmed_span(text, offset, offset + para.len()) {
            spans.push(span);
        }
        offset += para.len() + 2;
    }
    spans
}

fn chunk_spans(text: &str, max_chars: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for (ps, pe) in paragraphs(text) {
        if let Some((cs, ce)) = current {
            if pe - cs > max_chars {
                spans.push((cs, ce));
                current = None;
            }
        }

        if pe - ps > max_chars {
            if let Some(span) = current.take() {
                spans.push(span);
            }
            hard_split(text, ps, pe, max_chars, &mut spans);
        } else {
            current = Some(match current {
                Some((cs, _)) => (cs, pe),
                None => (ps, pe),
            });
        }
    }

    if let Some(span) = current {
        spans.push(span);
    }
    spans
}

/// Split an oversized paragraph at newline or space boundaries.
fn hard_split(text: &str, start: usize, end: usize, max_chars: usize, spans: &mut Vec<(usize, usize)>) {
    let mut pos = start;
    while pos < end {
        let remaining = &text[pos..end];
        let split_at = at_least_one_char(remaining, snap_to_char_boundary(remaining, max_chars));
        let actual = if split_at < remaining.len() {
            remaining[..split_at]
                .rfind('\n')
                .or_else(|| remaining[..split_at].rfind(' '))
                .map(|p| p + 1)
                .unwrap_or(split_at)
        } else {
            split_at
        };
        let actual = at_least_one_char(remaining, snap_to_char_boundary(remaining, actual));
        if let Some(span) = trimmed_span(text, pos, pos + actual) {
            spans.push(span);
        }
        pos += actual;
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Guarantees forward progress when a boundary snapped to zero.
fn at_least_one_char(s: &str, index: usize) -> usize {
    if index > 0 || s.is_empty() {
        return index;
    }
    s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len())
}
