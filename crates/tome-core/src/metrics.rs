//! Physical facts derived from extracted page text.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::DocType;

/// Pages with fewer trimmed chars than this count as empty.
pub const MIN_PAGE_CHARS: usize = 50;

const ABSTRACT_MAX_CHARS: usize = 3000;

static NUMBERED_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d{1,3}(?:\s*[,\u{2013}-]\s*\d{1,3})*)\]").expect("static pattern"));
static AUTHOR_YEAR_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\(([A-Z][\w'\-]+)(?:\s+et\s+al\.?)?,?\s+((?:19|20)\d{2})[a-z]?\)")
        .expect("static pattern")
});
static FIGURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfig(?:ure)?s?\.?\s*(\d+)").expect("static pattern"));
static TABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[Tt]ables?\s+(\d+)").expect("static pattern"));

/// Facts computed from page text. Extractors may override any of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextMetrics {
    pub page_count: u32,
    pub word_count: u32,
    pub ref_count: u32,
    pub figure_count: u32,
    pub table_count: u32,
    /// ASCII fraction of non-whitespace chars, `0.0` for no text.
    pub text_quality: f64,
    pub has_abstract: bool,
    pub abstract_text: Option<String>,
    pub language: String,
    pub extractable_pages: u32,
    pub first_page_chars: usize,
    pub doc_type: DocType,
}

pub fn compute_text_metrics<S: AsRef<str>>(pages: &[S]) -> TextMetrics {
    let pages: Vec<&str> = pages.iter().map(AsRef::as_ref).collect();
    let full = pages.join("\n");

    let page_count = pages.len() as u32;
    let word_count = full.split_whitespace().count() as u32;
    let ref_count = count_references(&full);
    let text_quality = ascii_ratio(&full);
    let abstract_text = find_abstract(&pages);
    let first_page = pages.first().copied().unwrap_or_default();

    let doc_type = if mentions_patent(first_page) {
        DocType::Patent
    } else {
        classify_by_size(page_count, word_count, ref_count)
    };

    TextMetrics {
        page_count,
        word_count,
        ref_count,
        figure_count: distinct_numbers(&FIGURE, &full),
        table_count: distinct_numbers(&TABLE, &full),
        text_quality,
        has_abstract: abstract_text.is_some(),
        abstract_text,
        language: if text_quality >= 0.5 { "en" } else { "unknown" }.to_string(),
        extractable_pages: pages
            .iter()
            .filter(|p| p.trim().chars().count() >= MIN_PAGE_CHARS)
            .count() as u32,
        first_page_chars: first_page.trim().chars().count(),
        doc_type,
    }
}

/// ASCII fraction of non-whitespace chars.
pub fn ascii_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut ascii = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if c.is_ascii() {
            ascii += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        ascii as f64 / total as f64
    }
}

/// Highest bracketed citation number, or distinct author-year citations
/// when the text has no numbered ones.
fn count_references(text: &str) -> u32 {
    let numbered = NUMBERED_REF
        .captures_iter(text)
        .flat_map(|cap| {
            cap[1]
                .split(|c: char| !c.is_ascii_digit())
                .filter_map(|n| n.parse::<u32>().ok())
                .collect::<Vec<_>>()
        })
        .max()
        .unwrap_or(0);
    if numbered > 0 {
        return numbered;
    }

    AUTHOR_YEAR_REF
        .captures_iter(text)
        .map(|cap| (cap[1].to_string(), cap[2].to_string()))
        .collect::<BTreeSet<_>>()
        .len() as u32
}

fn distinct_numbers(pattern: &Regex, text: &str) -> u32 {
    pattern
        .captures_iter(text)
        .filter_map(|cap| cap[1].parse::<u32>().ok())
        .collect::<BTreeSet<_>>()
        .len() as u32
}

fn is_abstract_heading(line: &str) -> Option<&str> {
    let lower = line.to_ascii_lowercase();
    if !lower.starts_with("abstract") {
        return None;
    }
    let rest = line.get("abstract".len()..).unwrap_or_default();
    match rest.chars().next() {
        None => Some(""),
        Some(c) if c == ':' || c == '.' || c == '\u{2014}' || c == '-' || c.is_whitespace() => {
            Some(rest.trim_start_matches([':', '.', '\u{2014}', '-']).trim())
        }
        _ => None,
    }
}

fn ends_abstract(line: &str) -> bool {
    let lower = line.trim().to_ascii_lowercase();
    let stripped = lower.trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ' ');
    ["introduction", "keywords", "key words", "index terms", "background"]
        .iter()
        .any(|h| stripped.starts_with(h))
}

/// Text under an "Abstract" heading on the first two pages.
fn find_abstract(pages: &[&str]) -> Option<String> {
    let head = pages.iter().take(2).copied().collect::<Vec<_>>().join("\n");
    let mut lines = head.lines();
    let mut collected = String::new();

    for line in lines.by_ref() {
        if let Some(inline) = is_abstract_heading(line.trim()) {
            collected.push_str(inline);
            break;
        }
    }
    for line in lines {
        if ends_abstract(line) || collected.len() >= ABSTRACT_MAX_CHARS {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !collected.is_empty() {
            collected.push(' ');
        }
        collected.push_str(line);
    }

    let collected = collected.trim();
    (!collected.is_empty()).then(|| collected.to_string())
}

fn mentions_patent(first_page: &str) -> bool {
    let lower = first_page.to_ascii_lowercase();
    ["united states patent", "patent no.", "patent application publication", "international publication number"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Short and light means a letter; long with a large bibliography means
/// a review.
pub fn classify_by_size(page_count: u32, word_count: u32, ref_count: u32) -> DocType {
    if page_count <= 4 && word_count < 4000 {
        DocType::Letter
    } else if ref_count >= 100 && page_count >= 15 {
        DocType::Review
    } else {
        DocType::Article
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        let m = compute_text_metrics(&["Hello world foo bar", "baz quux another word"]);
        assert_eq!(m.word_count, 8);
        assert_eq!(m.page_count, 2);
    }

    #[test]
    fn test_ref_count_numbered() {
        let m = compute_text_metrics(&["As shown [1], confirmed by [2] and [42]."]);
        assert_eq!(m.ref_count, 42);
    }

    #[test]
    fn test_ref_count_ranges() {
        let m = compute_text_metrics(&["Prior work [3-7] and [8, 12]."]);
        assert_eq!(m.ref_count, 12);
    }

    #[test]
    fn test_ref_count_author_year() {
        let m = compute_text_metrics(&["(Smith, 2020) showed that (Jones et al., 2019) agreed."]);
        assert_eq!(m.ref_count, 2);
    }

    #[test]
    fn test_figures_and_tables() {
        let m = compute_text_metrics(&[
            "See Figure 1 and Fig. 2. Also Figure 1 again. And Figure 3.",
            "Table 1 shows results. See also Table 2.",
        ]);
        assert_eq!(m.figure_count, 3);
        assert_eq!(m.table_count, 2);
    }

    #[test]
    fn test_abstract_extraction() {
        let m = compute_text_metrics(&[
            "Some header\n\nAbstract\n\nThis paper describes a new method.\n\nIntroduction\n\nWe begin by...",
        ]);
        assert!(m.has_abstract);
        assert_eq!(m.abstract_text.as_deref(), Some("This paper describes a new method."));
    }

    #[test]
    fn test_inline_abstract() {
        let m = compute_text_metrics(&["Title\nAbstract: We report X.\n1. Introduction\nBody"]);
        assert_eq!(m.abstract_text.as_deref(), Some("We report X."));
    }

    #[test]
    fn test_no_abstract() {
        let m = compute_text_metrics(&["Just body text with no abstract heading."]);
        assert!(!m.has_abstract);
        assert_eq!(m.abstract_text, None);
    }

    #[test]
    fn test_text_quality() {
        assert!(compute_text_metrics(&["Pure ASCII text here."]).text_quality > 0.9);
        let garbled = "日本語のテキスト".repeat(100);
        let m = compute_text_metrics(&[garbled.as_str()]);
        assert!(m.text_quality < 0.5);
        assert_eq!(m.language, "unknown");
    }

    #[test]
    fn test_extractable_pages() {
        let good = "This is a page with enough content to be considered extractable text. ".repeat(2);
        let m = compute_text_metrics(&[good.as_str(), "", "   ", good.as_str()]);
        assert_eq!(m.extractable_pages, 2);
    }

    #[test]
    fn test_empty_pages() {
        let empty: [&str; 0] = [];
        let m = compute_text_metrics(&empty);
        assert_eq!(m.word_count, 0);
        assert_eq!(m.ref_count, 0);
        assert_eq!(m.text_quality, 0.0);
        assert_eq!(m.first_page_chars, 0);
    }

    #[test]
    fn test_classify_by_size() {
        assert_eq!(classify_by_size(3, 2000, 15), DocType::Letter);
        assert_eq!(classify_by_size(30, 15000, 150), DocType::Review);
        assert_eq!(classify_by_size(10, 6000, 40), DocType::Article);
        assert_eq!(classify_by_size(4, 3999, 20), DocType::Letter);
        assert_eq!(classify_by_size(5, 4000, 20), DocType::Article);
    }

    #[test]
    fn test_patent_detection() {
        let m = compute_text_metrics(&["United States Patent 7,123,456\nWidget assembly"]);
        assert_eq!(m.doc_type, DocType::Patent);
    }
}
