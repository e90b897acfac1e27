//! String normalization and similarity measures for correlation
//!
//! Name matching uses Jaro-Winkler (good on short, prefix-heavy strings such
//! as person names) and normalized Levenshtein, taking the better of the two
//! on both the direct and the token-sorted form so that "Doe Jane" and
//! "Jane Doe" compare equal.

use std::collections::BTreeSet;

/// Tokens dropped from names before comparison
const NAME_AFFIXES: &[&str] = &[
    "dr", "mr", "mrs", "ms", "mx", "prof", "sir", "jr", "sr", "phd", "md", "ii", "iii",
];

/// Lowercase, replace punctuation with spaces, collapse whitespace
pub fn normalize_text(s: &str) -> String {
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
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical person name: "Dr. Doe, Jane" → "jane doe"
///
/// Returns an empty string for names without alphanumeric content.
pub fn normalize_name(s: &str) -> String {
    let reordered = match s.split_once(',') {
        Some((last, first)) if !first.contains(',') && !first.trim().is_empty() => {
            format!("{} {}", first, last)
        }
        _ => s.to_string(),
    };

    let normalized = normalize_text(&reordered);
    let tokens: Vec<&str> = normalized.split(' ').filter(|t| !t.is_empty()).collect();
    let kept: Vec<&str> = tokens
        .iter()
        .copied()
        .filter(|t| !NAME_AFFIXES.contains(t))
        .collect();

    // A name made only of affixes ("Dr") is kept as-is
    if kept.is_empty() {
        tokens.join(" ")
    } else {
        kept.join(" ")
    }
}

/// Similarity of two person names in [0, 1]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_name(a);
    let b = normalize_name(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let direct = string_similarity(&a, &b);
    let sorted = string_similarity(&sorted_tokens(&a), &sorted_tokens(&b));
    direct.max(sorted)
}

/// Similarity of two free-text attribute values in [0, 1]
///
/// Identical normalized values score 1.0; a value whose tokens are all
/// contained in the other ("Acme" vs "Acme Corp") scores 0.9; otherwise the
/// token Jaccard overlap.
pub fn attribute_similarity(a: &str, b: &str) -> f64 {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let ta = token_set(&a);
    let tb = token_set(&b);
    if ta.is_subset(&tb) || tb.is_subset(&ta) {
        return 0.9;
    }
    jaccard_similarity(&ta, &tb)
}

/// J(A, B) = |A ∩ B| / |A ∪ B|; 0.0 when both sets are empty
pub fn jaccard_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Set of normalized tokens in `s`
pub fn token_set(s: &str) -> BTreeSet<String> {
    normalize_text(s)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Canonical URL for cross-reference matching
///
/// Drops scheme, `www.`, query, fragment and trailing slashes; lowercases.
/// Returns `None` for values that do not look like URLs.
pub fn normalize_url(url: &str) -> Option<String> {
    let lower = url.trim().to_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))?;
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let end = rest.find(['?', '#']).unwrap_or(rest.len());
    let canonical = rest[..end].trim_end_matches('/');

    if canonical.is_empty() || !canonical.contains('.') {
        None
    } else {
        Some(canonical.to_string())
    }
}

fn string_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b).max(strsim::normalized_levenshtein(a, b))
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}
