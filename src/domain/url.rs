//! Canonical URL rules: cleaning, trailing-slash normalization, the
//! deterministic existence key, and version tagging.

use sha2::{Digest, Sha256};
use url::Url;

/// Strip query string and fragment, keeping scheme, host, and path.
/// Idempotent: cleaning a clean URL yields the same string. Returns
/// `None` for strings that do not parse as absolute URLs.
pub fn clean_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw).ok()?;
    parsed.set_query(None);
    parsed.set_fragment(None);
    Some(parsed.to_string())
}

/// Canonical form with a guaranteed trailing slash, as hashed by
/// [`key_name`] and stored on cache points.
pub fn canonicalize(raw: &str) -> Option<String> {
    let cleaned = clean_url(raw)?;
    if cleaned.ends_with('/') {
        Some(cleaned)
    } else {
        Some(format!("{cleaned}/"))
    }
}

/// Deterministic existence/uniqueness key: SHA-256 of the
/// trailing-slash-normalized canonical URL, hex encoded. The sole
/// key for both cache points and cache items.
pub fn key_name(raw: &str) -> Option<String> {
    let canonical = canonicalize(raw)?;
    let digest = Sha256::digest(canonical.as_bytes());
    Some(hex::encode(digest))
}

/// Append the owning point's content version as a `ver` query
/// parameter, preserving any existing query string. A version bump
/// therefore changes every variant key without touching stored
/// records.
pub fn with_version_tag(raw: &str, version: &str) -> Option<String> {
    if version.is_empty() {
        return Some(raw.to_string());
    }
    let mut parsed = Url::parse(raw).ok()?;
    parsed.query_pairs_mut().append_pair("ver", version);
    Some(parsed.to_string())
}

/// True when `url`'s canonical base sits under `prefix` (itself a
/// canonical, trailing-slash URL). Plain prefix comparison; precedence
/// among multiple matching prefixes is the caller's concern.
pub fn under_prefix(url: &str, prefix: &str) -> bool {
    match canonicalize(url) {
        Some(canonical) => canonical.starts_with(prefix),
        None => false,
    }
}
