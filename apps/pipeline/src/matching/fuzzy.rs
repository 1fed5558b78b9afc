//! Fuzzy technology-name matching.
//!
//! Two mentions match when, after normalization, they are equal, one contains the other,
//! or their similarity ratio reaches `SIMILARITY_THRESHOLD`. Every test is symmetric.
//!
//! Very short strings can false-positive through containment ("go" in "django");
//! the rule is kept as-is and callers should keep criteria items specific.

/// Vendor prefixes dropped before comparison ("AWS Lambda" == "Lambda").
const VENDOR_PREFIXES: &[&str] = &["apache ", "aws ", "azure ", "google "];

/// Minimum similarity ratio (0–1) for two distinct strings to count as a match.
pub const SIMILARITY_THRESHOLD: f64 = 0.85;

/// Lowercases, trims, and strips a single leading vendor prefix.
pub fn normalize(term: &str) -> String {
    let lowered = term.trim().to_lowercase();
    for prefix in VENDOR_PREFIXES {
        if let Some(rest) = lowered.strip_prefix(prefix) {
            return rest.trim().to_string();
        }
    }
    lowered
}

/// Similarity ratio in [0, 1] between two already-normalized strings:
/// `1 - levenshtein / max_len`, so a dropped character costs as much as a substitution.
pub fn similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

pub fn is_fuzzy_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);

    if a.is_empty() || b.is_empty() {
        return false;
    }

    a == b || a.contains(&b) || b.contains(&a) || similarity(&a, &b) >= SIMILARITY_THRESHOLD
}
