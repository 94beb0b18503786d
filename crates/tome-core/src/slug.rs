//! Key construction and validation.
//!
//! Keys look like `surnameYYYYslug` (`desilva2007molecularlogic`). They name
//! archive files and staging directories, so anything reaching the
//! filesystem goes through [`sanitize_key`] or [`validate_key`] first.

use crate::error::{CoreError, Result};

const MAX_KEY_LEN: usize = 100;

/// Characters that never survive into a path component.
const UNSAFE_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

const ENGLISH_STOPS: &[&str] = &[
    "about", "above", "across", "after", "again", "against", "all", "almost", "along",
    "also", "although", "among", "and", "another", "any", "are", "around", "because",
    "been", "before", "being", "below", "between", "both", "but", "can", "cannot",
    "could", "did", "does", "doing", "down", "during", "each", "either", "else", "even",
    "ever", "every", "few", "for", "from", "further", "had", "has", "have", "having",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "however", "into",
    "its", "itself", "just", "least", "less", "like", "made", "make", "many", "may",
    "more", "most", "much", "must", "near", "neither", "new", "nor", "not", "now", "off",
    "often", "once", "one", "only", "onto", "other", "others", "our", "ours", "out",
    "over", "own", "per", "rather", "same", "several", "she", "should", "since", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "then", "there", "these",
    "they", "this", "those", "though", "three", "through", "thus", "too", "toward",
    "towards", "two", "under", "until", "upon", "use", "used", "using", "very", "via",
    "was", "way", "well", "were", "what", "when", "where", "whether", "which", "while",
    "who", "whom", "whose", "why", "will", "with", "within", "without", "would", "yet",
    "you", "your",
];

const ACADEMIC_FILLER: &[&str] = &[
    "advances", "analysis", "based", "efficient", "highly", "improved", "investigation",
    "review", "study", "comprehensive", "overview", "approach", "method", "methods",
    "preliminary", "experimental", "theoretical", "computational", "proposed",
    "systematic", "comparative", "general", "applied",
];

fn is_stopword(word: &str) -> bool {
    ENGLISH_STOPS.contains(&word) || ACADEMIC_FILLER.contains(&word)
}

/// Fold common Latin diacritics to ASCII and drop everything else non-ASCII.
pub fn fold_ascii(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii() {
            out.push(c);
            continue;
        }
        let folded = match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
            'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => "A",
            'æ' => "ae",
            'Æ' => "AE",
            'ç' | 'ć' | 'č' => "c",
            'Ç' | 'Ć' | 'Č' => "C",
            'ď' | 'đ' => "d",
            'Ď' | 'Đ' => "D",
            'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
            'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => "E",
            'ğ' => "g",
            'Ğ' => "G",
            'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
            'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => "I",
            'ł' | 'ľ' | 'ĺ' => "l",
            'Ł' | 'Ľ' | 'Ĺ' => "L",
            'ñ' | 'ń' | 'ň' => "n",
            'Ñ' | 'Ń' | 'Ň' => "N",
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
            'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => "O",
            'œ' => "oe",
            'Œ' => "OE",
            'ř' | 'ŕ' => "r",
            'Ř' | 'Ŕ' => "R",
            'ś' | 'š' | 'ş' | 'ș' => "s",
            'Ś' | 'Š' | 'Ş' | 'Ș' => "S",
            'ß' => "ss",
            'ť' | 'ţ' | 'ț' => "t",
            'Ť' | 'Ţ' | 'Ț' => "T",
            'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
            'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => "U",
            'ý' | 'ÿ' => "y",
            'Ý' | 'Ÿ' => "Y",
            'ź' | 'ż' | 'ž' => "z",
            'Ź' | 'Ż' | 'Ž' => "Z",
            _ => "",
        };
        out.push_str(folded);
    }
    out
}

/// One or two distinctive words from a title.
///
/// The first meaningful word of 8+ letters stands alone; otherwise the
/// first two meaningful words are joined. Returns `""` when nothing
/// qualifies.
pub fn slug_from_title(title: &str) -> String {
    let text = fold_ascii(title).to_lowercase();
    let meaningful: Vec<&str> = text
        .split(|c: char| !c.is_ascii_lowercase())
        .filter(|w| w.len() >= 3 && !is_stopword(w))
        .collect();

    match meaningful.first() {
        None => String::new(),
        Some(first) if first.len() >= 8 => first.to_string(),
        Some(_) => meaningful.iter().take(2).copied().collect(),
    }
}

/// `surnameYYYYslug`. A missing year renders as `XXXX`.
pub fn make_key(surname: &str, year: Option<i32>, title: &str) -> String {
    let surname: String = fold_ascii(surname)
        .chars()
        .filter(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_lowercase();
    let year = year.map(|y| y.to_string()).unwrap_or_else(|| "XXXX".into());
    format!("{}{}{}", surname, year, slug_from_title(title))
}

/// First author's surname from a raw author string.
///
/// Handles `"Xu, Yang"`, `"Yang Xu"`, `"Xu, Yang and Guo, Xuefeng"` and
/// `"Xu, Y.; Guo, X."`.
pub fn surname_from_author(authors: &str) -> String {
    let first = authors
        .split(" and ")
        .next()
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim();

    if let Some((surname, _)) = first.split_once(',') {
        return surname.trim().to_string();
    }
    match first.split_whitespace().last() {
        Some(last) => last.to_string(),
        None => authors.trim().to_string(),
    }
}

/// Strip path-unsafe characters and trim dots and whitespace.
pub fn sanitize_key(key: &str) -> String {
    let cleaned: String = key.chars().filter(|c| !UNSAFE_CHARS.contains(c)).collect();
    cleaned
        .replace("..", "")
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

/// Shard directory for a key: its first ASCII alphanumeric char, lowercased.
pub fn shard(key: &str) -> String {
    key.chars()
        .find(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase().to_string())
        .unwrap_or_else(|| "_".to_string())
}

/// Reject keys that are unsafe as filenames or catalog identifiers.
pub fn validate_key(key: &str) -> Result<()> {
    let unsafe_key = |reason: &str| CoreError::UnsafeKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(unsafe_key("key is empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(unsafe_key("key exceeds 100 characters"));
    }
    if key.contains("..") {
        return Err(unsafe_key("key contains '..'"));
    }
    if key.chars().any(|c| UNSAFE_CHARS.contains(&c)) {
        return Err(unsafe_key("key contains a path separator or reserved character"));
    }
    let mut chars = key.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !leading_ok || !rest_ok {
        return Err(unsafe_key(
            "key must start with a letter or digit and use only letters, digits, '_', '-', '.'",
        ));
    }
    Ok(())
}

/// First of `key`, `keya` .. `keyz` for which `taken` is false.
pub fn disambiguate_key(key: &str, mut taken: impl FnMut(&str) -> bool) -> Result<String> {
    if !taken(key) {
        return Ok(key.to_string());
    }
    for suffix in 'a'..='z' {
        let candidate = format!("{}{}", key, suffix);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(CoreError::KeysExhausted(key.to_string()))
}
