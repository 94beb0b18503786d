//! Order-tolerant approximate string matching.
//!
//! The gates compare titles and author names that come from sources which
//! disagree on punctuation, casing, word order, and how much surrounding
//! text they include. [`token_set_ratio`] scores two strings by their
//! shared token set, so a title embedded in a longer line still scores
//! `1.0`. [`find_in_pages`] slides that measure across page text.
//!
//! # Algorithm
//!
//! 1. Normalize both strings: lowercase, every non-alphanumeric char
//!    becomes a space, split on whitespace.
//! 2. Build the sorted intersection and the two sorted differences.
//! 3. If the tokens of one side are a subset of the other, score `1.0`.
//! 4. Otherwise take the best indel similarity among
//!    `(sect, sect+ab)`, `(sect, sect+ba)`, and `(sect+ab, sect+ba)`.
//!
//! Pure functions only; no I/O.

use std::collections::BTreeSet;

/// A match this good ends the window scan early.
pub const NEAR_PERFECT: f64 = 0.95;

/// Knobs for [`find_in_pages`].
#[derive(Debug, Clone, Copy)]
pub struct FindOptions {
    /// Score at or above which [`FuzzyMatch::is_match`] reports success.
    pub threshold: f64,
    /// Only the first `max_pages` pages are searched.
    pub max_pages: usize,
    /// Also try "Family, Given" / "Given Family" orderings of the needle.
    pub transpose_names: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            max_pages: 2,
            transpose_names: false,
        }
    }
}

/// Best window found by [`find_in_pages`].
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatch {
    pub score: f64,
    pub snippet: String,
    pub threshold: f64,
}

impl FuzzyMatch {
    fn none(threshold: f64) -> Self {
        Self {
            score: 0.0,
            snippet: String::new(),
            threshold,
        }
    }

    pub fn is_match(&self) -> bool {
        self.score > 0.0 && self.score >= self.threshold
    }
}

fn tokens(s: &str) -> Vec<String> {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_lowercase().next().unwrap_or(c)
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            cur[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Normalized indel similarity in `[0, 1]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

fn join_with(sect: &str, rest: &str) -> String {
    match (sect.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => sect.to_string(),
        (false, false) => format!("{} {}", sect, rest),
    }
}

/// Token-set similarity in `[0, 1]`. Empty input on either side scores `0`.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let ta: BTreeSet<String> = tokens(a).into_iter().collect();
    let tb: BTreeSet<String> = tokens(b).into_iter().collect();
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let sect: Vec<&str> = ta.intersection(&tb).map(String::as_str).collect();
    let diff_ab: Vec<&str> = ta.difference(&tb).map(String::as_str).collect();
    let diff_ba: Vec<&str> = tb.difference(&ta).map(String::as_str).collect();

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 1.0;
    }

    let sect = sect.join(" ");
    let combined_ab = join_with(&sect, &diff_ab.join(" "));
    let combined_ba = join_with(&sect, &diff_ba.join(" "));

    let mut best = ratio(&combined_ab, &combined_ba);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_ab))
            .max(ratio(&sect, &combined_ba));
    }
    best
}

/// Alternative orderings of a personal name.
///
/// `"Mehta, Girish"` also yields `"Girish Mehta"`; `"Girish Mehta"` also
/// yields `"Mehta, Girish"` and `"Mehta Girish"`. Single tokens and empty
/// strings come back unchanged.
pub fn name_variants(name: &str) -> Vec<String> {
    let trimmed = name.trim();
    let mut out = vec![name.to_string()];
    if trimmed.is_empty() {
        return out;
    }

    if let Some((family, given)) = trimmed.split_once(',') {
        let (family, given) = (family.trim(), given.trim());
        if !family.is_empty() && !given.is_empty() {
            out.push(format!("{} {}", given, family));
        }
        return out;
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 2 {
        return out;
    }
    let family = parts[parts.len() - 1];
    let given = parts[..parts.len() - 1].join(" ");
    out.push(format!("{}, {}", family, given));
    out.push(format!("{} {}", family, given));
    out
}

/// Best-scoring window for one needle across the searched pages.
fn scan_pages(needle: &str, pages: &[&str]) -> (f64, String) {
    let needle_words = needle.split_whitespace().count();
    if needle_words == 0 {
        return (0.0, String::new());
    }
    // Window twice the needle with a step of one needle length (50% overlap):
    // any needle-sized span lies wholly inside some window.
    let window = needle_words * 2;
    let step = needle_words;

    let mut best = (0.0, String::new());
    for page in pages {
        let words: Vec<&str> = page.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }
        let mut start = 0;
        loop {
            let end = (start + window).min(words.len());
            let candidate = words[start..end].join(" ");
            let score = token_set_ratio(needle, &candidate);
            if score > best.0 {
                best = (score, candidate);
                if score >= NEAR_PERFECT {
                    return best;
                }
            }
            if end == words.len() {
                break;
            }
            start += step;
        }
    }
    best
}

/// Locate `needle` in the first `opts.max_pages` pages.
///
/// Returns a zero-score match for an empty needle or page set.
pub fn find_in_pages<S: AsRef<str>>(needle: &str, pages: &[S], opts: FindOptions) -> FuzzyMatch {
    if needle.trim().is_empty() || pages.is_empty() {
        return FuzzyMatch::none(opts.threshold);
    }

    let searched: Vec<&str> = pages
        .iter()
        .take(opts.max_pages.max(1))
        .map(|p| p.as_ref())
        .collect();

    let variants = if opts.transpose_names {
        name_variants(needle)
    } else {
        vec![needle.to_string()]
    };

    let mut best = FuzzyMatch::none(opts.threshold);
    for variant in &variants {
        let (score, snippet) = scan_pages(variant, &searched);
        if score > best.score {
            best.score = score;
            best.snippet = snippet;
            if score >= NEAR_PERFECT {
                break;
            }
        }
    }
    best
}
