//! Gate results and the auto-accept decision.
//!
//! Gates are plain data: a failing gate is recorded, never raised. The
//! [`ValidationReport`] collects every gate that ran so a reviewer sees all
//! contributing reasons at once, and [`ValidationReport::auto_accept`]
//! turns the collection into a single accept/stage decision.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::DocType;

/// Identifies one validation gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateName {
    PdfIntegrity,
    Dedup,
    TextExtractable,
    TextQuality,
    DoiDuplicate,
    DoiTitleMatch,
    DoiAuthorMatch,
    TitleDedup,
    ContentScan,
}

impl GateName {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateName::PdfIntegrity => "pdf_integrity",
            GateName::Dedup => "dedup",
            GateName::TextExtractable => "text_extractable",
            GateName::TextQuality => "text_quality",
            GateName::DoiDuplicate => "doi_duplicate",
            GateName::DoiTitleMatch => "doi_title_match",
            GateName::DoiAuthorMatch => "doi_author_match",
            GateName::TitleDedup => "title_dedup",
            GateName::ContentScan => "content_scan",
        }
    }

    /// Advisory gates inform confidence but never block auto-accept.
    pub fn is_advisory(&self) -> bool {
        matches!(self, GateName::DoiAuthorMatch)
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateOutcome {
    Passed,
    Failed,
    /// An optional input was missing, so the check could not run.
    NotApplicable,
}

/// Outcome of a single gate with its diagnostic payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub gate: GateName,
    pub outcome: GateOutcome,
    pub message: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl GateResult {
    fn new(gate: GateName, outcome: GateOutcome, message: impl Into<String>) -> Self {
        Self {
            gate,
            outcome,
            message: message.into(),
            data: Map::new(),
        }
    }

    pub fn passed(gate: GateName, message: impl Into<String>) -> Self {
        Self::new(gate, GateOutcome::Passed, message)
    }

    pub fn failed(gate: GateName, message: impl Into<String>) -> Self {
        Self::new(gate, GateOutcome::Failed, message)
    }

    pub fn not_applicable(gate: GateName, message: impl Into<String>) -> Self {
        Self::new(gate, GateOutcome::NotApplicable, message)
    }

    /// Attach one diagnostic field.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn is_passed(&self) -> bool {
        self.outcome == GateOutcome::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.outcome == GateOutcome::Failed
    }
}

/// Every gate result from one ingest attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub results: Vec<GateResult>,
    pub doc_type: DocType,
    /// Types that auto-accept without a passing title match.
    pub doi_exempt: Vec<DocType>,
}

impl ValidationReport {
    pub fn new(doc_type: DocType, doi_exempt: Vec<DocType>) -> Self {
        Self {
            results: Vec::new(),
            doc_type,
            doi_exempt,
        }
    }

    pub fn push(&mut self, result: GateResult) {
        self.results.push(result);
    }

    pub fn gate(&self, name: GateName) -> Option<&GateResult> {
        self.results.iter().find(|r| r.gate == name)
    }

    pub fn is_doi_exempt(&self) -> bool {
        self.doi_exempt.contains(&self.doc_type)
    }

    /// No blocking gate failed.
    pub fn blocking_passed(&self) -> bool {
        !self
            .results
            .iter()
            .any(|r| r.is_failed() && !r.gate.is_advisory())
    }

    /// The title-match gate ran and passed.
    pub fn title_verified(&self) -> bool {
        self.gate(GateName::DoiTitleMatch)
            .map(GateResult::is_passed)
            .unwrap_or(false)
    }

    /// Whether the document can skip human review.
    ///
    /// All blocking gates must pass. Types outside `doi_exempt` must also
    /// have a title match that actually ran and passed.
    pub fn auto_accept(&self) -> bool {
        if !self.blocking_passed() {
            return false;
        }
        self.is_doi_exempt() || self.title_verified()
    }

    /// Content hash already cataloged. Terminal: no staging follows.
    pub fn is_duplicate(&self) -> bool {
        self.gate(GateName::Dedup)
            .map(GateResult::is_failed)
            .unwrap_or(false)
    }

    /// Key of the cataloged document sharing this content hash.
    pub fn duplicate_of(&self) -> Option<&str> {
        self.gate(GateName::Dedup)
            .filter(|r| r.is_failed())
            .and_then(|r| r.data.get("existing_key"))
            .and_then(Value::as_str)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_passed()).count()
    }

    /// Gates that produced a verdict; not-applicable ones are excluded.
    pub fn evaluated_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.outcome != GateOutcome::NotApplicable)
            .count()
    }

    /// Fraction of evaluated gates that passed, rounded to two decimals.
    pub fn confidence(&self) -> f64 {
        let total = self.evaluated_count();
        if total == 0 {
            return 0.0;
        }
        let raw = self.passed_count() as f64 / total as f64;
        (raw * 100.0).round() / 100.0
    }

    /// Messages of every failing gate, advisory ones included. A missing
    /// title verification is listed when it alone keeps the document out.
    pub fn issues(&self) -> Vec<String> {
        let mut issues: Vec<String> = self
            .results
            .iter()
            .filter(|r| r.is_failed())
            .map(|r| r.message.clone())
            .collect();
        if !self.is_doi_exempt() && !self.title_verified() {
            let missing = self
                .gate(GateName::DoiTitleMatch)
                .map(|r| !r.is_failed())
                .unwrap_or(true);
            if missing {
                issues.push("Title not verified against a resolved reference".to_string());
            }
        }
        issues
    }

    pub fn summary(&self) -> String {
        format!(
            "{}/{} gates passed",
            self.passed_count(),
            self.evaluated_count()
        )
    }
}
