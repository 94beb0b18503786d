//! Default PDF extractor.
//!
//! Uses `pdf-extract` page by page and derives a few cheap facts from the
//! text: a title guess from the first substantial line of page 1 and the
//! first DOI-shaped token in the first pages. Anything smarter (XMP,
//! layout analysis, font sizes) belongs in a richer [`Extractor`].

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::LazyLock;

use anyhow::{bail, Result};
use regex::Regex;
use serde_json::Value;

use crate::traits::{ExtractedDocument, Extractor};

const PDF_MAGIC: &[u8] = b"%PDF-";
/// Pages searched for a DOI.
const DOI_SEARCH_PAGES: usize = 2;
const MIN_TITLE_CHARS: usize = 12;
const MAX_TITLE_CHARS: usize = 300;

static DOI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b10\.\d{4,9}/\S+").expect("static pattern"));

#[derive(Debug, Default, Clone)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf-extract"
    }

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument> {
        if !bytes.starts_with(PDF_MAGIC) {
            bail!("not a PDF (missing %PDF- header)");
        }

        // pdf-extract panics on some malformed inputs instead of erroring.
        let pages = panic::catch_unwind(AssertUnwindSafe(|| {
            pdf_extract::extract_text_from_mem_by_pages(bytes)
        }))
        .map_err(|_| anyhow::anyhow!("PDF parser panicked"))?
        .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?;

        if pages.is_empty() {
            bail!("PDF has no pages");
        }

        let mut pdf_metadata = BTreeMap::new();
        pdf_metadata.insert("extractor".to_string(), Value::from(self.name()));
        pdf_metadata.insert("byte_size".to_string(), Value::from(bytes.len()));

        Ok(ExtractedDocument {
            title: pages.first().and_then(|p| guess_title(p)),
            doi: pages.iter().take(DOI_SEARCH_PAGES).find_map(|p| find_doi(p)),
            pages,
            pdf_metadata,
            ..Default::default()
        })
    }
}

/// First line of the page that looks like prose rather than a running
/// header, page number or journal banner.
pub fn guess_title(page: &str) -> Option<String> {
    page.lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|line| {
            let chars = line.chars().count();
            let letters = line.chars().filter(|c| c.is_alphabetic()).count();
            (MIN_TITLE_CHARS..=MAX_TITLE_CHARS).contains(&chars)
                && letters * 2 > chars
                && !line.to_lowercase().starts_with("doi")
                && !line.contains("http")
        })
}

/// First DOI in `text`, with trailing punctuation trimmed and lowercased.
pub fn find_doi(text: &str) -> Option<String> {
    DOI_RE.find(text).map(|m| {
        m.as_str()
            .trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | ')' | ']' | '}' | '"' | '\''))
            .to_lowercase()
    })
}
