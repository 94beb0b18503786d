//! Collaborator traits.
//!
//! The vault does not parse PDFs, call reference APIs, or run classifiers
//! itself. It talks to three collaborators through these traits:
//!
//! ```text
//!  bytes ──▶ Extractor ──▶ pages + facts ─┐
//!  DOI ────▶ ReferenceResolver ──▶ ref ───┼──▶ gates ──▶ accept / stage
//!  pages ──▶ ContentScanner ──▶ verdict ──┘
//! ```
//!
//! Collaborator failures are reported with `anyhow` and never abort an
//! ingest on their own: a failed extraction fails the integrity gate, a
//! failed resolution leaves the cross-reference gates not applicable, and
//! a failed scan lets the document through with a warning.
//!
//! Defaults: [`crate::extract::PdfExtractor`] and
//! [`crate::scanner::PhraseScanner`]. No network resolver ships with the
//! crate; pre-resolved data can be passed as ingest hints instead.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What an [`Extractor`] learned from the raw bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    /// Page texts in order, page 1 first.
    pub pages: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub doi: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    /// Raw document-info fields (producer, creator, dates ...).
    #[serde(default)]
    pub pdf_metadata: BTreeMap<String, Value>,
}

/// Turns raw document bytes into page text plus basic facts.
///
/// Implementations must return `Err` rather than panic on unreadable
/// input; the caller records the failure in the integrity gate.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    fn extract(&self, bytes: &[u8]) -> Result<ExtractedDocument>;
}

/// Bibliographic data resolved from an external identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedReference {
    /// Label recorded in the title-source audit trail (`"crossref"`, ...).
    pub source: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
}

/// Resolves a DOI (or other identifier) to bibliographic data.
///
/// `Ok(None)` means the identifier is unknown to the service. `Err` means
/// the service could not be reached; both leave the dependent gates not
/// applicable.
#[async_trait]
pub trait ReferenceResolver: Send + Sync {
    fn name(&self) -> &str;

    async fn resolve(&self, doi: &str) -> Result<Option<ResolvedReference>>;
}

/// Classifier verdict for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageVerdict {
    /// 1-based page number.
    pub page: u32,
    /// Probability-like score in `[0, 1]`.
    pub score: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Per-page verdicts. Pages the scanner skipped are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanVerdict {
    pub pages: Vec<PageVerdict>,
}

impl ScanVerdict {
    /// Pages scoring at or above `threshold`.
    pub fn flagged(&self, threshold: f64) -> Vec<&PageVerdict> {
        self.pages.iter().filter(|p| p.score >= threshold).collect()
    }

    pub fn max_score(&self) -> f64 {
        self.pages.iter().map(|p| p.score).fold(0.0, f64::max)
    }
}

/// Scans page text for adversarial content (prompt injection and the
/// like). `Err` means the scanner is unavailable.
pub trait ContentScanner: Send + Sync {
    fn name(&self) -> &str;

    fn scan(&self, pages: &[String]) -> Result<ScanVerdict>;
}
