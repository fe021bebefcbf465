//! Label normalization
//!
//! Extracted labels arrive with inconsistent case, accents, punctuation and
//! abbreviations ("SERV. LUZ", "Servicio de luz", "´5 FEB"). Everything that
//! compares labels (correction memory, keyword taxonomy, store matching) goes
//! through these helpers so the comparisons agree with each other.

/// Words that carry no meaning for matching
const STOPWORDS: &[&str] = &[
    "de", "del", "la", "las", "el", "los", "y", "e", "por", "para", "en", "a", "al",
];

/// Abbreviations seen in extracted statements and their expansion
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("serv", "servicio"),
    ("servs", "servicios"),
    ("mtto", "mantenimiento"),
    ("mant", "mantenimiento"),
    ("elec", "electricidad"),
    ("vta", "ventas"),
    ("vtas", "ventas"),
    ("imp", "impuesto"),
    ("sdo", "sueldo"),
    ("sdos", "sueldos"),
    ("pub", "publicidad"),
    ("arr", "arrendamiento"),
];

/// Strip accents and diacritics from Latin characters
pub fn fold_accents(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ç' => 'c',
        'Ç' => 'C',
        other => other,
    }
}

/// Combining diacritical marks (U+0300..U+036F), as left by decomposed
/// (NFD) text such as `"n\u{303}"` for `"ñ"`
pub fn is_combining_mark(c: char) -> bool {
    ('\u{0300}'..='\u{036F}').contains(&c)
}

/// Lowercase, accent-free text with punctuation collapsed to single spaces
///
/// `"  SERV. LUZ (CFE)"` becomes `"serv luz cfe"`. Combining marks are
/// dropped so decomposed and precomposed accents fold the same way.
pub fn collapse(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text
        .chars()
        .filter(|c| !is_combining_mark(*c))
        .map(fold_accents)
    {
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

/// Expand a single abbreviation token
fn expand(token: &str) -> &str {
    ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, full)| *full)
        .unwrap_or(token)
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Meaningful tokens in order: collapsed, abbreviations expanded, stopwords dropped
pub fn tokens(text: &str) -> Vec<String> {
    collapse(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(expand)
        .filter(|t| !is_stopword(t))
        .map(str::to_string)
        .collect()
}

/// Ordered phrase used for containment checks (`"servicio luz"`)
pub fn phrase(text: &str) -> String {
    tokens(text).join(" ")
}

/// Order-insensitive key used by the correction memory
///
/// Tokens are sorted and deduplicated so "LUZ SERVICIO" and "Servicio de luz"
/// share a key. Labels made only of stopwords fall back to the collapsed text.
pub fn token_key(text: &str) -> String {
    let mut toks = tokens(text);
    if toks.is_empty() {
        return collapse(text);
    }
    toks.sort();
    toks.dedup();
    toks.join(" ")
}

/// True if `needle` appears in `haystack` as a run of whole tokens.
/// Both arguments must already be normalized phrases.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack == needle
        || haystack.starts_with(&format!("{needle} "))
        || haystack.ends_with(&format!(" {needle}"))
        || haystack.contains(&format!(" {needle} "))
}

/// Plural endings a keyword may carry in its last token
const PLURAL_SUFFIXES: &[&str] = &["s", "es"];

/// True if `keyword` starts at a token boundary of `haystack` and its last
/// token is either whole or followed only by a plural ending ("nomina" in
/// "nominas", not "venta" in "ventanas"). Keywords of `whole_token_max`
/// characters or fewer must match whole tokens exactly.
/// Both arguments must already be normalized phrases.
pub fn contains_keyword(haystack: &str, keyword: &str, whole_token_max: usize) -> bool {
    if keyword.is_empty() {
        return false;
    }
    let whole_token = keyword.chars().count() <= whole_token_max;
    let bytes = haystack.as_bytes();
    haystack.match_indices(keyword).any(|(start, _)| {
        let starts_token = start == 0 || bytes[start - 1] == b' ';
        let end = start + keyword.len();
        let tail = haystack[end..].split(' ').next().unwrap_or("");
        let ends_token = tail.is_empty() || (!whole_token && PLURAL_SUFFIXES.contains(&tail));
        starts_token && ends_token
    })
}
