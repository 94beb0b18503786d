//! Validation gate suite.
//!
//! Each `check_*` function is one gate: pure, given its inputs, and never
//! raising for a business failure. [`validate_for_vault`] gathers the
//! catalog lookups the gates need and runs them in order:
//!
//! 1. `pdf_integrity`, short-circuits everything on failure
//! 2. `dedup`, short-circuits on failure (the document is already in)
//! 3. `text_extractable`
//! 4. `text_quality`
//! 5. `doi_duplicate`
//! 6. `doi_title_match`
//! 7. `doi_author_match` (advisory)
//! 8. `title_dedup`
//! 9. `content_scan` (fails open)
//!
//! Gates whose optional inputs are missing (no DOI, no resolved reference,
//! no title, scanner disabled) are recorded as not applicable. Only
//! catalog I/O can make this module return `Err`.

use tome_core::fuzzy::{find_in_pages, token_set_ratio, FindOptions};
use tome_core::gate::{GateName, GateResult, ValidationReport};
use tome_core::metrics::TextMetrics;
use tome_core::models::DocType;
use tome_core::ContentHash;

use crate::catalog::{Catalog, CatalogEntry};
use crate::config::{ScannerConfig, ValidationConfig};
use crate::error::Result;
use crate::traits::{ContentScanner, ResolvedReference};

/// Everything known about one candidate document at validation time.
#[derive(Debug, Clone, Copy)]
pub struct Evidence<'a> {
    pub content_hash: &'a ContentHash,
    /// Extracted page texts. Empty when extraction failed.
    pub pages: &'a [String],
    /// Why extraction failed, if it did.
    pub extraction_error: Option<&'a str>,
    pub metrics: &'a TextMetrics,
    /// Title found locally (extractor or caller hint).
    pub title: Option<&'a str>,
    pub doi: Option<&'a str>,
    pub reference: Option<&'a ResolvedReference>,
    pub doc_type: DocType,
}

impl<'a> Evidence<'a> {
    fn reference_title(&self) -> Option<&'a str> {
        self.reference
            .and_then(|r| r.title.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// Resolved title when available, else the local one.
    pub fn best_title(&self) -> Option<&'a str> {
        self.reference_title()
            .or(self.title.filter(|t| !t.trim().is_empty()))
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

pub fn check_integrity(pages: &[String], extraction_error: Option<&str>) -> GateResult {
    if let Some(err) = extraction_error {
        return GateResult::failed(GateName::PdfIntegrity, format!("Cannot open PDF: {}", err));
    }
    if pages.is_empty() {
        return GateResult::failed(GateName::PdfIntegrity, "PDF has 0 pages");
    }
    GateResult::passed(GateName::PdfIntegrity, format!("{} pages", pages.len()))
        .with("page_count", pages.len())
}

pub fn check_dedup(hash: &ContentHash, existing: Option<&CatalogEntry>) -> GateResult {
    match existing {
        Some(entry) => GateResult::failed(
            GateName::Dedup,
            format!("Duplicate: already in vault as '{}'", entry.key),
        )
        .with("existing_key", entry.key.as_str())
        .with("content_hash", hash.as_str()),
        None => GateResult::passed(GateName::Dedup, "No duplicate found"),
    }
}

pub fn check_text_extractable(metrics: &TextMetrics, min_chars: usize) -> GateResult {
    let chars = metrics.first_page_chars;
    if chars < min_chars {
        return GateResult::failed(
            GateName::TextExtractable,
            format!(
                "First page has only {} chars (need {}+). Scanned PDF?",
                chars, min_chars
            ),
        )
        .with("first_page_chars", chars);
    }
    GateResult::passed(GateName::TextExtractable, format!("First page: {} chars", chars))
        .with("first_page_chars", chars)
}

pub fn check_text_quality(metrics: &TextMetrics, min_quality: f64) -> GateResult {
    if metrics.word_count == 0 {
        return GateResult::failed(GateName::TextQuality, "Empty text");
    }
    let quality = metrics.text_quality;
    if quality < min_quality {
        return GateResult::failed(
            GateName::TextQuality,
            format!(
                "Text quality {:.2} below threshold {}",
                quality, min_quality
            ),
        )
        .with("quality", round3(quality));
    }
    GateResult::passed(GateName::TextQuality, format!("Text quality: {:.2}", quality))
        .with("quality", round3(quality))
}

/// `existing` is the catalog row currently holding `doi`, if any.
pub fn check_doi_duplicate(
    doi: Option<&str>,
    hash: &ContentHash,
    existing: Option<&CatalogEntry>,
) -> GateResult {
    let Some(doi) = doi else {
        return GateResult::not_applicable(GateName::DoiDuplicate, "No DOI to check");
    };
    match existing {
        Some(entry) if entry.content_hash != hash.as_str() => GateResult::failed(
            GateName::DoiDuplicate,
            format!("DOI already in vault as '{}'", entry.key),
        )
        .with("doi", doi)
        .with("existing_key", entry.key.as_str()),
        _ => GateResult::passed(GateName::DoiDuplicate, "DOI not in vault").with("doi", doi),
    }
}

/// Cross-check the resolved title against the document.
///
/// The resolved title is searched for in the page text first. If that
/// misses and a local title exists, the two titles are compared directly.
/// Either path passing passes the gate.
pub fn check_title_match(
    reference_title: Option<&str>,
    local_title: Option<&str>,
    pages: &[String],
    config: &ValidationConfig,
) -> GateResult {
    let Some(resolved) = reference_title else {
        return GateResult::not_applicable(GateName::DoiTitleMatch, "No resolved title to compare");
    };
    let threshold = config.title_match_threshold;

    let in_text = find_in_pages(
        resolved,
        pages,
        FindOptions {
            threshold,
            max_pages: config.max_pages_searched,
            transpose_names: false,
        },
    );
    if in_text.is_match() {
        return GateResult::passed(
            GateName::DoiTitleMatch,
            format!("Title found in page text (score {:.2})", in_text.score),
        )
        .with("score", round3(in_text.score))
        .with("method", "page_text")
        .with("snippet", truncate(&in_text.snippet, 200));
    }

    let local = local_title.filter(|t| !t.trim().is_empty());
    let title_score = local.map(|t| token_set_ratio(t, resolved)).unwrap_or(0.0);
    if title_score > 0.0 && title_score >= threshold {
        return GateResult::passed(
            GateName::DoiTitleMatch,
            format!("Title match score: {:.2}", title_score),
        )
        .with("score", round3(title_score))
        .with("method", "extracted_title");
    }

    let score = in_text.score.max(title_score);
    let message = match local {
        Some(local) => format!(
            "Title mismatch (score {:.2}): PDF='{}' vs reference='{}'",
            score,
            truncate(local, 80),
            truncate(resolved, 80)
        ),
        None => format!(
            "Resolved title not found in first {} pages (score {:.2}): '{}'",
            config.max_pages_searched,
            score,
            truncate(resolved, 80)
        ),
    };
    let mut result = GateResult::failed(GateName::DoiTitleMatch, message)
        .with("score", round3(score))
        .with("resolved_title", resolved);
    if let Some(local) = local {
        result = result.with("extracted_title", local);
    }
    result
}

/// Look for the first resolved author in the page text. Advisory.
pub fn check_author_match(
    reference_authors: &[String],
    pages: &[String],
    config: &ValidationConfig,
) -> GateResult {
    let Some(author) = reference_authors.iter().find(|a| !a.trim().is_empty()) else {
        return GateResult::not_applicable(GateName::DoiAuthorMatch, "No resolved authors to compare");
    };
    let found = find_in_pages(
        author,
        pages,
        FindOptions {
            threshold: config.author_match_threshold,
            max_pages: config.max_pages_searched,
            transpose_names: true,
        },
    );
    let result = if found.is_match() {
        GateResult::passed(
            GateName::DoiAuthorMatch,
            format!("First author '{}' found (score {:.2})", author, found.score),
        )
    } else {
        GateResult::failed(
            GateName::DoiAuthorMatch,
            format!(
                "First author '{}' not found in first {} pages (score {:.2})",
                author, config.max_pages_searched, found.score
            ),
        )
    };
    result
        .with("author", author.as_str())
        .with("score", round3(found.score))
}

/// Compare against every cataloged title; the best match decides.
pub fn check_title_dedup(
    title: Option<&str>,
    catalog_titles: &[(String, String)],
    threshold: f64,
) -> GateResult {
    let Some(title) = title.filter(|t| !t.trim().is_empty()) else {
        return GateResult::not_applicable(GateName::TitleDedup, "No title to check");
    };

    let best = catalog_titles
        .iter()
        .map(|(key, existing)| (key, existing, token_set_ratio(title, existing)))
        .fold(None, |best: Option<(&String, &String, f64)>, cand| match best {
            Some(b) if b.2 >= cand.2 => Some(b),
            _ => Some(cand),
        });

    match best {
        Some((key, existing, score)) if score >= threshold => GateResult::failed(
            GateName::TitleDedup,
            format!("Similar title in vault: '{}' (score {:.2})", key, score),
        )
        .with("existing_key", key.as_str())
        .with("existing_title", existing.as_str())
        .with("score", round3(score)),
        _ => GateResult::passed(GateName::TitleDedup, "No similar titles found"),
    }
}

/// Run the scanner over the page text. Scanner errors pass the gate.
pub fn check_content_scan(
    scanner: Option<&dyn ContentScanner>,
    pages: &[String],
    config: &ScannerConfig,
) -> GateResult {
    let Some(scanner) = scanner.filter(|_| config.enabled) else {
        return GateResult::not_applicable(GateName::ContentScan, "Content scanner disabled");
    };
    match scanner.scan(pages) {
        Err(e) => {
            tracing::warn!(scanner = scanner.name(), error = %e, "content scanner unavailable, failing open");
            GateResult::passed(GateName::ContentScan, format!("Scanner unavailable: {}", e))
                .with("scanner", scanner.name())
                .with("unavailable", true)
        }
        Ok(verdict) => {
            let flagged: Vec<u32> = verdict
                .flagged(config.threshold)
                .iter()
                .map(|p| p.page)
                .collect();
            let max_score = round3(verdict.max_score());
            if flagged.is_empty() {
                GateResult::passed(GateName::ContentScan, "No adversarial content detected")
                    .with("scanner", scanner.name())
                    .with("max_score", max_score)
            } else {
                let listed = flagged
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                GateResult::failed(
                    GateName::ContentScan,
                    format!(
                        "Possible prompt injection on page(s) {} (max score {:.2})",
                        listed, max_score
                    ),
                )
                .with("scanner", scanner.name())
                .with("flagged_pages", flagged)
                .with("max_score", max_score)
            }
        }
    }
}

/// Run every gate for one candidate.
pub async fn validate_for_vault(
    catalog: &Catalog,
    validation: &ValidationConfig,
    scanner_config: &ScannerConfig,
    scanner: Option<&dyn ContentScanner>,
    evidence: &Evidence<'_>,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::new(evidence.doc_type, validation.doi_exempt_types.clone());

    report.push(check_integrity(evidence.pages, evidence.extraction_error));
    if report.results[0].is_failed() {
        return Ok(report);
    }

    let existing = catalog.get(evidence.content_hash).await?;
    report.push(check_dedup(evidence.content_hash, existing.as_ref()));
    if report.is_duplicate() {
        return Ok(report);
    }

    report.push(check_text_extractable(evidence.metrics, validation.min_first_page_chars));
    report.push(check_text_quality(evidence.metrics, validation.min_text_quality));

    let doi_owner = match evidence.doi {
        Some(doi) => catalog.get_by_doi(doi).await?,
        None => None,
    };
    report.push(check_doi_duplicate(evidence.doi, evidence.content_hash, doi_owner.as_ref()));

    report.push(check_title_match(
        evidence.reference_title(),
        evidence.title,
        evidence.pages,
        validation,
    ));
    report.push(check_author_match(
        evidence.reference.map(|r| r.authors.as_slice()).unwrap_or_default(),
        evidence.pages,
        validation,
    ));

    let titles = catalog.titles().await?;
    report.push(check_title_dedup(
        evidence.best_title(),
        &titles,
        validation.title_dedup_threshold,
    ));

    report.push(check_content_scan(scanner, evidence.pages, scanner_config));

    tracing::debug!(
        content_hash = %evidence.content_hash,
        summary = %report.summary(),
        auto_accept = report.auto_accept(),
        "validation complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{PageVerdict, ScanVerdict};
    use tome_core::metrics::compute_text_metrics;

    struct BrokenScanner;

    impl ContentScanner for BrokenScanner {
        fn name(&self) -> &str {
            "broken"
        }
        fn scan(&self, _pages: &[String]) -> anyhow::Result<ScanVerdict> {
            anyhow::bail!("model weights missing")
        }
    }

    struct FlagPageTwo;

    impl ContentScanner for FlagPageTwo {
        fn name(&self) -> &str {
            "flag-two"
        }
        fn scan(&self, pages: &[String]) -> anyhow::Result<ScanVerdict> {
            Ok(ScanVerdict {
                pages: (1..=pages.len() as u32)
                    .map(|page| PageVerdict {
                        page,
                        score: if page == 2 { 0.97 } else { 0.02 },
                        reason: None,
                    })
                    .collect(),
            })
        }
    }

    fn pages() -> Vec<String> {
        vec![
            "Spin Wave Dispersion in Layered Antiferromagnets\n\
             Jane Q. Smith and Wei Zhang\n\
             Abstract. We measure the magnon spectrum of a layered compound."
                .to_string(),
            "Results and discussion of the measured spectra follow here.".to_string(),
        ]
    }

    fn config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn test_integrity_failures() {
        let r = check_integrity(&[], Some("bad xref table"));
        assert!(r.is_failed());
        assert!(r.message.contains("bad xref table"));
        assert_eq!(check_integrity(&[], None).message, "PDF has 0 pages");
        assert!(check_integrity(&pages(), None).is_passed());
    }

    #[test]
    fn test_text_extractable_threshold() {
        let thin = compute_text_metrics(&["tiny"]);
        let r = check_text_extractable(&thin, 50);
        assert!(r.is_failed());
        assert_eq!(r.message, "First page has only 4 chars (need 50+). Scanned PDF?");
        assert!(check_text_extractable(&compute_text_metrics(&pages()), 50).is_passed());
    }

    #[test]
    fn test_text_quality_flags_garbled_text() {
        let garbled = compute_text_metrics(&["ÿþ ÷ð ñò ÐÑ ØÙ ÚÛ ÜÝ àá âã äå æç èé"]);
        let r = check_text_quality(&garbled, 0.5);
        assert!(r.is_failed());
        assert!(r.data.contains_key("quality"));
        assert!(check_text_quality(&compute_text_metrics(&pages()), 0.5).is_passed());
        let empty = compute_text_metrics::<&str>(&[]);
        assert_eq!(check_text_quality(&empty, 0.5).message, "Empty text");
    }

    #[test]
    fn test_title_match_paths() {
        let cfg = config();
        let resolved = "Spin wave dispersion in layered antiferromagnets";

        let r = check_title_match(Some(resolved), None, &pages(), &cfg);
        assert!(r.is_passed());
        assert_eq!(r.data["method"], "page_text");

        // No page text, but the local title agrees.
        let r = check_title_match(
            Some(resolved),
            Some("Spin-wave dispersion in layered antiferromagnets"),
            &[],
            &cfg,
        );
        assert!(r.is_passed());
        assert_eq!(r.data["method"], "extracted_title");

        let r = check_title_match(
            Some("Protein folding kinetics of small globular domains"),
            Some("Spin wave dispersion"),
            &pages(),
            &cfg,
        );
        assert!(r.is_failed());
        assert!(r.message.starts_with("Title mismatch"));

        let r = check_title_match(None, Some("anything"), &pages(), &cfg);
        assert_eq!(r.outcome, tome_core::gate::GateOutcome::NotApplicable);
    }

    #[test]
    fn test_author_match_tolerates_name_order() {
        let cfg = config();
        let r = check_author_match(&["Smith, Jane Q.".to_string()], &pages(), &cfg);
        assert!(r.is_passed(), "{}", r.message);
        let r = check_author_match(&["Okonkwo, Chidi".to_string()], &pages(), &cfg);
        assert!(r.is_failed());
        assert!(r.gate.is_advisory());
        assert_eq!(
            check_author_match(&[], &pages(), &cfg).outcome,
            tome_core::gate::GateOutcome::NotApplicable
        );
    }

    #[test]
    fn test_title_dedup_threshold() {
        let catalog = vec![
            ("smith2020spin".to_string(), "Spin Wave Dispersion in Layered Antiferromagnets".to_string()),
            ("lee2019protein".to_string(), "Protein Folding Kinetics".to_string()),
        ];
        let r = check_title_dedup(Some("Spin wave dispersion in layered antiferromagnets"), &catalog, 0.9);
        assert!(r.is_failed());
        assert_eq!(r.data["existing_key"], "smith2020spin");

        let r = check_title_dedup(Some("Graphene plasmonics at terahertz frequencies"), &catalog, 0.9);
        assert!(r.is_passed());
        assert!(check_title_dedup(Some("anything"), &[], 0.9).is_passed());
    }

    #[test]
    fn test_doi_duplicate_ignores_same_hash() {
        let hash = ContentHash::of_bytes(b"x");
        let mut owner = sample_entry("smith2020spin");
        owner.content_hash = hash.as_str().to_string();
        assert!(check_doi_duplicate(Some("10.1/x"), &hash, Some(&owner)).is_passed());

        owner.content_hash = "other".into();
        let r = check_doi_duplicate(Some("10.1/x"), &hash, Some(&owner));
        assert!(r.is_failed());
        assert_eq!(r.message, "DOI already in vault as 'smith2020spin'");
    }

    #[test]
    fn test_content_scan_fails_open() {
        let cfg = ScannerConfig::default();
        let r = check_content_scan(Some(&BrokenScanner), &pages(), &cfg);
        assert!(r.is_passed());
        assert_eq!(r.data["unavailable"], true);

        let r = check_content_scan(Some(&FlagPageTwo), &pages(), &cfg);
        assert!(r.is_failed());
        assert_eq!(r.data["flagged_pages"], serde_json::json!([2]));

        let disabled = ScannerConfig {
            enabled: false,
            ..cfg
        };
        let r = check_content_scan(Some(&FlagPageTwo), &pages(), &disabled);
        assert_eq!(r.outcome, tome_core::gate::GateOutcome::NotApplicable);
    }

    fn sample_entry(key: &str) -> CatalogEntry {
        CatalogEntry {
            content_hash: String::new(),
            key: key.to_string(),
            doi: None,
            external_id: None,
            external_id_type: None,
            title: String::new(),
            first_author: String::new(),
            year: None,
            journal: None,
            entry_type: "article".into(),
            status: "verified".into(),
            doi_verified: false,
            title_match_score: None,
            page_count: 0,
            word_count: 0,
            ref_count: 0,
            figure_count: 0,
            table_count: 0,
            language: "en".into(),
            text_quality: None,
            has_abstract: false,
            doc_type: "article".into(),
            parent_hash: None,
            supplement_index: None,
            vault_path: None,
            ingested_at: None,
            verified_at: None,
        }
    }
}
