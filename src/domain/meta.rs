//! Typed metadata blobs attached to cache points and cache items.
//!
//! These structs are the in-process representation of each record's
//! JSON metadata column. All access goes through named fields and the
//! methods below; JSON appears only at the repository boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Metadata blob carried by a cache point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointMeta {
    /// Opaque content version; bumped by the owning subsystem when
    /// the underlying content set changes.
    pub version: String,
    /// Canonical URLs permanently opted out of caching under this
    /// point.
    pub excluded_urls: BTreeSet<String>,
    /// Raw URL variant -> resolved value, used as a fast existence
    /// check before the per-item index is consulted.
    pub cached_urls: BTreeMap<String, String>,
    /// Share of this point's items with a completed remote mapping,
    /// recomputed by the admin listing and reset on purge.
    pub percent_complete: Option<u8>,
}

impl Default for PointMeta {
    fn default() -> Self {
        Self {
            version: String::new(),
            excluded_urls: BTreeSet::new(),
            cached_urls: BTreeMap::new(),
            percent_complete: None,
        }
    }
}

impl PointMeta {
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// Replace the stored version. Returns true when the value
    /// actually changed.
    pub fn set_version(&mut self, version: &str) -> bool {
        if self.version == version {
            return false;
        }
        self.version = version.to_string();
        true
    }

    pub fn is_excluded(&self, canonical_url: &str) -> bool {
        self.excluded_urls.contains(canonical_url)
    }

    /// Add a URL to the permanent exclusion set. Idempotent; returns
    /// true only for a new entry.
    pub fn exclude(&mut self, canonical_url: impl Into<String>) -> bool {
        self.excluded_urls.insert(canonical_url.into())
    }

    /// Remove an exclusion; no-op (false) when absent.
    pub fn remove_exclusion(&mut self, canonical_url: &str) -> bool {
        self.excluded_urls.remove(canonical_url)
    }

    pub fn cached_value(&self, raw_url: &str) -> Option<&str> {
        self.cached_urls.get(raw_url).map(String::as_str)
    }

    /// Record a resolved mapping on the point itself. Returns true
    /// when the stored value changed.
    pub fn record_cached(&mut self, raw_url: impl Into<String>, value: impl Into<String>) -> bool {
        let raw_url = raw_url.into();
        let value = value.into();
        if self.cached_urls.get(&raw_url) == Some(&value) {
            return false;
        }
        self.cached_urls.insert(raw_url, value);
        true
    }

    /// Purge support: drop all resolved mappings and reset the
    /// percent-complete bookkeeping. Exclusions are untouched.
    pub fn clear_cached(&mut self) {
        self.cached_urls.clear();
        self.percent_complete = None;
    }
}

/// Freshness verdict for one raw URL variant on a cache item.
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// A completed mapping exists; resolve to the stored value.
    Resolved(String),
    /// An attempt marker exists and is inside the TTL window; the
    /// variant maps to itself and must not be re-queued yet.
    Pending,
    /// No entry, or the attempt marker has aged past the TTL.
    Stale,
}

/// Metadata blob carried by a cache item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Raw URL variant (query string included) -> last-seen value.
    /// A value equal to its key marks an attempted-but-unresolved
    /// variant; anything else is a completed remote mapping.
    pub cached_urls: BTreeMap<String, String>,
    /// Local path backing this URL, captured at creation time.
    pub src_file: String,
    /// Timestamp of the most recent staleness check.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// Error payload reported by the remote service, if any.
    pub upload_error: Option<String>,
}

impl Default for ItemMeta {
    fn default() -> Self {
        Self {
            cached_urls: BTreeMap::new(),
            src_file: String::new(),
            last_updated: OffsetDateTime::UNIX_EPOCH,
            upload_error: None,
        }
    }
}

impl ItemMeta {
    pub fn new(src_file: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            src_file: src_file.into(),
            last_updated: now,
            ..Self::default()
        }
    }

    /// Classify one raw variant against the staleness rule: an entry
    /// is fresh iff it exists and either carries a real mapping or
    /// its attempt marker is younger than `ttl`.
    pub fn freshness(&self, raw_url: &str, now: OffsetDateTime, ttl: time::Duration) -> Freshness {
        match self.cached_urls.get(raw_url) {
            None => Freshness::Stale,
            Some(value) if value != raw_url => Freshness::Resolved(value.clone()),
            Some(_) => {
                if now - self.last_updated < ttl {
                    Freshness::Pending
                } else {
                    Freshness::Stale
                }
            }
        }
    }

    /// Record that this variant was seen and scheduled, so a second
    /// lookup within the same request treats it as attempted.
    pub fn mark_attempted(&mut self, raw_url: impl Into<String>, now: OffsetDateTime) {
        let raw_url = raw_url.into();
        self.cached_urls.insert(raw_url.clone(), raw_url);
        self.last_updated = now;
    }

    /// First resolved value across variants, for admin listings.
    pub fn resolved_url(&self) -> Option<&str> {
        self.cached_urls
            .iter()
            .find(|(raw, value)| raw != value)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_resolved(&self) -> bool {
        self.resolved_url().is_some()
    }

    /// Reset the item to a re-evaluate condition: mappings and error
    /// cleared, timestamp rewound so the next lookup is stale.
    pub fn reset(&mut self) {
        self.cached_urls.clear();
        self.upload_error = None;
        self.last_updated = OffsetDateTime::UNIX_EPOCH;
    }
}
