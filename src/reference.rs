#![forbid(unsafe_code)]

//! Decides whether a user query names a specific video or is a search phrase.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::LookupError;

// Tried in order; the first hit wins so strings carrying several shapes
// resolve the same way every time.
static ID_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"youtu\.be/([A-Za-z0-9_-]{6,})").expect("short link pattern"),
        Regex::new(r"[?&]v=([A-Za-z0-9_-]{6,})").expect("watch pattern"),
        Regex::new(r"shorts/([A-Za-z0-9_-]{6,})").expect("shorts pattern"),
    ]
});

static URL_SCHEME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://").expect("scheme pattern"));

/// Outcome of [`extract`]: the trimmed query and, for links, the video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    query: String,
    id: Option<String>,
}

impl ResourceReference {
    /// Trimmed query text the reference was built from.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// `true` when the query named a specific video.
    pub fn is_direct(&self) -> bool {
        self.id.is_some()
    }
}

/// Classifies `raw` as a direct video reference or a free-text search.
///
/// Only inputs with an `http(s)://` scheme are inspected for an id. Links
/// that match none of the known shapes fall back to search mode instead of
/// failing.
pub fn extract(raw: &str) -> Result<ResourceReference, LookupError> {
    let query = raw.trim();
    if query.is_empty() {
        return Err(LookupError::InvalidInput);
    }

    let id = if looks_like_url(query) {
        find_video_id(query)
    } else {
        None
    };

    Ok(ResourceReference {
        query: query.to_string(),
        id,
    })
}

fn looks_like_url(value: &str) -> bool {
    URL_SCHEME.is_match(value)
}

fn find_video_id(url: &str) -> Option<String> {
    ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_string())
    })
}
