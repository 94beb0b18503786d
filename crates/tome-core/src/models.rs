//! Document and triage records.
//!
//! [`DocumentMeta`] is the canonical record for one physical document. It is
//! stored whole inside each archive, snapshotted into purgatory, and
//! projected column by column into the catalog. [`TriageResult`] travels
//! with a staged document until a human promotes or discards it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::hash::ContentHash;
use crate::schema::{rename_field, Versioned};

/// Verification state. Only ever advances `Review` → `Manual` | `Verified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Review,
    Manual,
    Verified,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Review => "review",
            Status::Manual => "manual",
            Status::Verified => "verified",
        }
    }

    /// Status after a human confirms the document. `Verified` is kept.
    pub fn after_review(self) -> Status {
        match self {
            Status::Verified => Status::Verified,
            _ => Status::Manual,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "review" => Ok(Status::Review),
            "manual" => Ok(Status::Manual),
            "verified" => Ok(Status::Verified),
            other => Err(CoreError::Malformed(format!("unknown status '{}'", other))),
        }
    }
}

/// Kind of document held in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    #[default]
    Article,
    Review,
    Letter,
    Preprint,
    Patent,
    Datasheet,
    Book,
    Thesis,
    Standard,
    Report,
}

impl DocType {
    pub const ALL: [DocType; 10] = [
        DocType::Article,
        DocType::Review,
        DocType::Letter,
        DocType::Preprint,
        DocType::Patent,
        DocType::Datasheet,
        DocType::Book,
        DocType::Thesis,
        DocType::Standard,
        DocType::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Article => "article",
            DocType::Review => "review",
            DocType::Letter => "letter",
            DocType::Preprint => "preprint",
            DocType::Patent => "patent",
            DocType::Datasheet => "datasheet",
            DocType::Book => "book",
            DocType::Thesis => "thesis",
            DocType::Standard => "standard",
            DocType::Report => "report",
        }
    }

    /// Types that normally carry no DOI and auto-accept without one.
    pub fn default_doi_exempt() -> Vec<DocType> {
        vec![
            DocType::Patent,
            DocType::Datasheet,
            DocType::Book,
            DocType::Thesis,
            DocType::Standard,
            DocType::Report,
        ]
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        DocType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| {
                CoreError::Malformed(format!(
                    "invalid doc_type '{}'; valid types: {}",
                    s,
                    DocType::ALL.map(|t| t.as_str()).join(", ")
                ))
            })
    }
}

fn default_entry_type() -> String {
    "article".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

/// Canonical metadata for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentMeta {
    // Identity
    pub content_hash: ContentHash,
    pub key: String,
    #[serde(default)]
    pub doi: Option<String>,
    /// Patent number, ISBN, part number, standard number.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub external_id_type: Option<String>,

    // Bibliographic
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub first_author: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default = "default_entry_type")]
    pub entry_type: String,

    // Verification
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub doi_verified: bool,
    #[serde(default)]
    pub title_match_score: Option<f64>,

    // Physical facts
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub ref_count: u32,
    #[serde(default)]
    pub figure_count: u32,
    #[serde(default)]
    pub table_count: u32,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub text_quality: f64,
    #[serde(default)]
    pub has_abstract: bool,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,

    // Classification
    #[serde(default)]
    pub doc_type: DocType,
    #[serde(default)]
    pub type_metadata: BTreeMap<String, Value>,
    #[serde(default)]
    pub pdf_metadata: BTreeMap<String, Value>,

    /// Where each candidate title came from (source → title).
    #[serde(default)]
    pub title_sources: BTreeMap<String, String>,

    // Supplement linkage
    #[serde(default)]
    pub parent_hash: Option<ContentHash>,
    #[serde(default)]
    pub supplement_index: Option<u32>,

    #[serde(default)]
    pub ingested_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub chunk_params: BTreeMap<String, Value>,
}

impl DocumentMeta {
    pub fn new(content_hash: ContentHash, key: impl Into<String>) -> Self {
        Self {
            content_hash,
            key: key.into(),
            doi: None,
            external_id: None,
            external_id_type: None,
            title: String::new(),
            authors: Vec::new(),
            first_author: String::new(),
            year: None,
            journal: None,
            entry_type: default_entry_type(),
            status: Status::Review,
            doi_verified: false,
            title_match_score: None,
            page_count: 0,
            word_count: 0,
            ref_count: 0,
            figure_count: 0,
            table_count: 0,
            language: default_language(),
            text_quality: 0.0,
            has_abstract: false,
            abstract_text: None,
            doc_type: DocType::Article,
            type_metadata: BTreeMap::new(),
            pdf_metadata: BTreeMap::new(),
            title_sources: BTreeMap::new(),
            parent_hash: None,
            supplement_index: None,
            ingested_at: None,
            verified_at: None,
            chunk_params: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        self.to_versioned_json()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_versioned_json(raw)
    }
}

impl Versioned for DocumentMeta {
    const SCHEMA_VERSION: u32 = 1;

    fn upgrade(from: u32, document: Value) -> Result<Value> {
        match from {
            0 => upgrade_meta_v0(document),
            other => Err(CoreError::UnsupportedSchema {
                found: other,
                supported: Self::SCHEMA_VERSION,
            }),
        }
    }
}

/// v0 records are bare objects: `paper_type` instead of `doc_type`, empty
/// strings for unset timestamps, XMP kept beside the PDF info dict, and a
/// per-record `format_version` that now lives in the archive manifest.
fn upgrade_meta_v0(document: Value) -> Result<Value> {
    let Value::Object(mut doc) = document else {
        return Err(CoreError::Malformed("v0 metadata is not an object".into()));
    };

    rename_field(&mut doc, "paper_type", "doc_type");
    doc.remove("format_version");

    for ts in ["ingested_at", "verified_at"] {
        if doc.get(ts).and_then(Value::as_str) == Some("") {
            doc.insert(ts.to_string(), Value::Null);
        }
    }

    if let Some(xmp) = doc.remove("xmp_metadata") {
        let pdf = doc
            .entry("pdf_metadata".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let (Value::Object(pdf), false) = (pdf, xmp.is_null()) {
            pdf.insert("xmp".to_string(), xmp);
        }
    }

    Ok(Value::Object(doc))
}

/// Automated recommendation attached to a staged document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Accept,
    #[default]
    Review,
}

/// Confidence summary for a document waiting in purgatory.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TriageResult {
    #[serde(default)]
    pub key_suggested: String,
    /// Fraction of applicable gates that passed.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub recommendation: Recommendation,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub title_sources: BTreeMap<String, String>,
}

impl TriageResult {
    pub fn to_json(&self) -> Result<String> {
        self.to_versioned_json()
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::from_versioned_json(raw)
    }
}

impl Versioned for TriageResult {
    const SCHEMA_VERSION: u32 = 1;

    fn upgrade(from: u32, document: Value) -> Result<Value> {
        match from {
            0 => {
                let Value::Object(mut doc) = document else {
                    return Err(CoreError::Malformed("v0 triage is not an object".into()));
                };
                // Free-text fields from the LLM triage era have no home now.
                doc.remove("summary");
                doc.remove("relevance_hint");
                Ok(Value::Object(doc))
            }
            other => Err(CoreError::UnsupportedSchema {
                found: other,
                supported: Self::SCHEMA_VERSION,
            }),
        }
    }
}
