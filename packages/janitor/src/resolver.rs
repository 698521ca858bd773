//! Blob key resolution from stored media URLs.
//!
//! Stored URLs are inconsistent: the bucket may be in the host or in the
//! path, and some were written malformed. Resolution is best-effort and
//! total: every input maps to a [`Resolution`].

use std::sync::LazyLock;

use percent_encoding::percent_decode_str;
use regex::Regex;
use url::Url;

/// Last four path segments, the final one with an extension, at the end of
/// the string (optionally followed by a query or fragment).
static FALLBACK_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:^|/)([^/?#\s]+/[^/?#\s]+/[^/?#\s]+/[^/?#\s]+\.[A-Za-z0-9]+)(?:[?#]\S*)?\s*$",
    )
    .expect("fallback key pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolution {
    Resolved(String),
    Unresolvable,
}

impl Resolution {
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Resolved(key) => Some(key),
            Self::Unresolvable => None,
        }
    }
}

/// Maps submission media URLs to storage keys in one bucket.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    bucket_prefix: String,
}

impl KeyResolver {
    pub fn new(bucket: &str) -> Self {
        Self {
            bucket_prefix: format!("{bucket}/"),
        }
    }

    pub fn resolve(&self, raw: &str) -> Resolution {
        let raw = raw.trim();
        match Url::parse(raw) {
            Ok(url) => self.key_from_path(url.path()),
            Err(_) => Self::fallback(raw),
        }
    }

    fn key_from_path(&self, path: &str) -> Resolution {
        // Parsing escapes the path; listed keys are raw.
        let decoded = percent_decode_str(path).decode_utf8();
        let path = decoded.as_deref().unwrap_or(path);
        let key = path.strip_prefix('/').unwrap_or(path);
        // Path-style URLs carry the bucket as the first segment.
        let key = key.strip_prefix(self.bucket_prefix.as_str()).unwrap_or(key);
        if key.is_empty() {
            Resolution::Unresolvable
        } else {
            Resolution::Resolved(key.to_string())
        }
    }

    fn fallback(raw: &str) -> Resolution {
        FALLBACK_KEY
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map_or(Resolution::Unresolvable, |m| {
                Resolution::Resolved(m.as_str().to_string())
            })
    }
}
