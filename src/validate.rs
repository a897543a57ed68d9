//! Syntax-only email validation.

use std::collections::BTreeSet;
use validator::ValidateEmail;

/// File extensions that show up in `name@2x.png`-style asset names.
const ASSET_SUFFIXES: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "avif", "ico", "css", "js",
];

/// True when `email` is RFC-shaped and its domain is a dotted name ending
/// in an alphabetic label of at least two characters that is not an image or
/// asset extension. No DNS lookups.
pub(crate) fn is_valid_email(email: &str) -> bool {
    if !email.validate_email() {
        return false;
    }
    let Some((_local, domain_part)) = email.rsplit_once('@') else {
        return false;
    };
    let Some((_, tld)) = domain_part.rsplit_once('.') else {
        return false;
    };
    tld.len() >= 2 && tld.chars().all(|c| c.is_alphabetic()) && !ASSET_SUFFIXES.contains(&tld)
}

/// Keeps only syntactically valid candidates. Rejections are expected noise
/// from extraction and are dropped silently.
pub(crate) fn filter_valid(candidates: BTreeSet<String>) -> BTreeSet<String> {
    candidates
        .into_iter()
        .filter(|email| {
            let valid = is_valid_email(email);
            if !valid {
                tracing::debug!(target: "domain_task", "Discarding invalid candidate: {}", email);
            }
            valid
        })
        .collect()
}
