//! Ingest orchestration.
//!
//! Coordinates one document through the pipeline:
//!
//! ```text
//! bytes → hash → extract → resolve → gates ─┬─ duplicate → return
//!                                           ├─ auto-accept → commit (verified)
//!                                           └─ otherwise → stage in purgatory
//! ```
//!
//! Collaborator failures never abort an ingest; they surface as gate
//! outcomes. Only storage failures return `Err`.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tome_core::gate::{GateName, ValidationReport};
use tome_core::metrics::{compute_text_metrics, TextMetrics};
use tome_core::models::{DocType, DocumentMeta, Recommendation, Status, TriageResult};
use tome_core::slug::{make_key, surname_from_author, validate_key};
use tome_core::ContentHash;

use crate::error::Result;
use crate::traits::{ExtractedDocument, ResolvedReference};
use crate::validate::{validate_for_vault, Evidence};
use crate::vault::Vault;

const UNKNOWN_TITLE: &str = "Unknown Title";
const UNKNOWN_AUTHOR: &str = "Unknown";
/// Issues quoted in a staged outcome's message.
const MESSAGE_ISSUES: usize = 3;

/// Caller-supplied facts that take precedence over extraction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestHints {
    #[serde(default)]
    pub key: Option<String>,
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
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub doc_type: Option<DocType>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_id_type: Option<String>,
    /// Pre-resolved reference data; skips the resolver when present.
    #[serde(default)]
    pub reference: Option<ResolvedReference>,
    #[serde(default)]
    pub parent_hash: Option<ContentHash>,
    #[serde(default)]
    pub supplement_index: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Accepted,
    Staged,
    Duplicate,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Accepted => "accepted",
            IngestStatus::Staged => "staged",
            IngestStatus::Duplicate => "duplicate",
        }
    }
}

/// Result record for one ingest call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    /// Final key when accepted, temporary key when staged, the existing
    /// document's key when duplicate.
    pub key: String,
    pub content_hash: ContentHash,
    pub message: String,
    pub report: ValidationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageResult>,
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn normalize_doi(doi: &str) -> Option<String> {
    let doi = doi.trim();
    let doi = ["https://doi.org/", "http://doi.org/", "https://dx.doi.org/", "doi:"]
        .iter()
        .find_map(|prefix| doi.strip_prefix(prefix))
        .unwrap_or(doi)
        .trim();
    (!doi.is_empty()).then(|| doi.to_lowercase())
}

impl Vault {
    /// Run one document through the pipeline.
    pub async fn ingest(&self, bytes: &[u8], hints: IngestHints) -> Result<IngestOutcome> {
        let content_hash = ContentHash::of_bytes(bytes);

        let (extracted, extraction_error) = match self.extractor.extract(bytes) {
            Ok(doc) => (doc, None),
            Err(e) => {
                tracing::warn!(
                    content_hash = %content_hash,
                    extractor = self.extractor.name(),
                    error = %e,
                    "extraction failed"
                );
                (ExtractedDocument::default(), Some(format!("{:#}", e)))
            }
        };
        let pages = &extracted.pages;

        let doi = hints
            .doi
            .as_deref()
            .or(extracted.doi.as_deref())
            .and_then(normalize_doi);
        let local_title = non_empty(hints.title.as_deref()).or(non_empty(extracted.title.as_deref()));
        let reference = self.resolve_reference(&hints, doi.as_deref()).await;
        let metrics = compute_text_metrics(pages);
        let doc_type = hints.doc_type.unwrap_or(metrics.doc_type);

        let evidence = Evidence {
            content_hash: &content_hash,
            pages,
            extraction_error: extraction_error.as_deref(),
            metrics: &metrics,
            title: local_title.as_deref(),
            doi: doi.as_deref(),
            reference: reference.as_ref(),
            doc_type,
        };
        let report = validate_for_vault(
            self.catalog(),
            &self.config().validation,
            &self.config().scanner,
            self.scanner.as_deref(),
            &evidence,
        )
        .await?;

        if report.is_duplicate() {
            let existing = report.duplicate_of().unwrap_or_default().to_string();
            let message = report
                .gate(GateName::Dedup)
                .map(|g| g.message.clone())
                .unwrap_or_default();
            tracing::info!(content_hash = %content_hash, existing_key = %existing, "duplicate content");
            return Ok(IngestOutcome {
                status: IngestStatus::Duplicate,
                key: existing,
                content_hash,
                message,
                report,
                triage: None,
            });
        }

        let mut meta = build_meta(
            content_hash.clone(),
            &hints,
            &extracted,
            local_title.as_deref(),
            doi,
            reference.as_ref(),
            &metrics,
            &report,
        );
        meta.key = match non_empty(hints.key.as_deref()) {
            Some(key) => {
                validate_key(&key)?;
                key
            }
            None => default_key(&meta),
        };

        if report.auto_accept() {
            meta.key = self.free_key(&meta.key, &content_hash).await?;
            meta.status = Status::Verified;
            meta.verified_at = Some(Utc::now());
            self.commit(&mut meta, bytes, pages).await?;
            tracing::info!(key = %meta.key, content_hash = %content_hash, "accepted");
            return Ok(IngestOutcome {
                status: IngestStatus::Accepted,
                key: meta.key.clone(),
                content_hash,
                message: format!("Accepted as '{}' ({})", meta.key, report.summary()),
                report,
                triage: None,
            });
        }

        let issues = report.issues();
        let triage = TriageResult {
            key_suggested: meta.key.clone(),
            confidence: report.confidence(),
            recommendation: if report.blocking_passed() {
                Recommendation::Accept
            } else {
                Recommendation::Review
            },
            issues: issues.clone(),
            title_sources: meta.title_sources.clone(),
        };
        let temp_key = self.purgatory().stage(bytes, &meta, &triage, pages)?;
        let message = format!(
            "Needs review: {}",
            issues
                .iter()
                .take(MESSAGE_ISSUES)
                .cloned()
                .collect::<Vec<_>>()
                .join("; ")
        );

        Ok(IngestOutcome {
            status: IngestStatus::Staged,
            key: temp_key,
            content_hash,
            message,
            report,
            triage: Some(triage),
        })
    }

    async fn resolve_reference(
        &self,
        hints: &IngestHints,
        doi: Option<&str>,
    ) -> Option<ResolvedReference> {
        if let Some(reference) = &hints.reference {
            return Some(reference.clone());
        }
        let (resolver, doi) = (self.resolver.as_deref()?, doi?);
        match resolver.resolve(doi).await {
            Ok(found) => {
                if found.is_none() {
                    tracing::debug!(doi, resolver = resolver.name(), "DOI not known to resolver");
                }
                found
            }
            Err(e) => {
                tracing::warn!(doi, resolver = resolver.name(), error = %e, "reference resolution failed");
                None
            }
        }
    }
}

/// Key from first author, year and title.
fn default_key(meta: &DocumentMeta) -> String {
    let key = make_key(&meta.first_author, meta.year, &meta.title);
    if validate_key(&key).is_ok() {
        key
    } else {
        format!("doc{}", meta.content_hash.short(12))
    }
}

#[allow(clippy::too_many_arguments)]
fn build_meta(
    content_hash: ContentHash,
    hints: &IngestHints,
    extracted: &ExtractedDocument,
    local_title: Option<&str>,
    doi: Option<String>,
    reference: Option<&ResolvedReference>,
    metrics: &TextMetrics,
    report: &ValidationReport,
) -> DocumentMeta {
    let mut meta = DocumentMeta::new(content_hash, "");

    let mut title_sources = BTreeMap::new();
    if let Some(t) = non_empty(extracted.title.as_deref()) {
        title_sources.insert("text_heuristic".to_string(), t);
    }
    if let Some(t) = non_empty(hints.title.as_deref()) {
        title_sources.insert("hint".to_string(), t);
    }
    let reference_title = reference.and_then(|r| non_empty(r.title.as_deref()));
    if let (Some(r), Some(t)) = (reference, &reference_title) {
        let source = if r.source.is_empty() { "reference" } else { r.source.as_str() };
        title_sources.insert(source.to_string(), t.clone());
    }

    meta.title = reference_title
        .or(local_title.map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    meta.title_sources = title_sources;

    let authors = [
        reference.map(|r| r.authors.clone()).unwrap_or_default(),
        hints.authors.clone(),
        extracted.authors.clone(),
    ]
    .into_iter()
    .find(|a| !a.is_empty())
    .unwrap_or_else(|| vec![UNKNOWN_AUTHOR.to_string()]);
    meta.first_author = surname_from_author(&authors[0]);
    meta.authors = authors;

    meta.year = reference
        .and_then(|r| r.year)
        .or(hints.year)
        .or(extracted.year);
    meta.journal = reference
        .and_then(|r| non_empty(r.journal.as_deref()))
        .or(non_empty(hints.journal.as_deref()))
        .or(non_empty(extracted.journal.as_deref()));
    if let Some(entry_type) = non_empty(hints.entry_type.as_deref()) {
        meta.entry_type = entry_type;
    }

    meta.doi_verified = doi.is_some() && report.title_verified();
    meta.doi = doi;
    meta.external_id = hints.external_id.clone();
    meta.external_id_type = hints.external_id_type.clone();
    meta.title_match_score = report
        .gate(GateName::DoiTitleMatch)
        .and_then(|g| g.data.get("score"))
        .and_then(|s| s.as_f64());

    meta.page_count = metrics.page_count;
    meta.word_count = metrics.word_count;
    meta.ref_count = metrics.ref_count;
    meta.figure_count = metrics.figure_count;
    meta.table_count = metrics.table_count;
    meta.language = metrics.language.clone();
    meta.text_quality = metrics.text_quality;
    meta.has_abstract = metrics.has_abstract;
    meta.abstract_text = metrics.abstract_text.clone();
    meta.doc_type = report.doc_type;
    meta.pdf_metadata = extracted.pdf_metadata.clone();
    meta.parent_hash = hints.parent_hash.clone();
    meta.supplement_index = hints.supplement_index;
    meta.ingested_at = Some(Utc::now());
    meta
}
