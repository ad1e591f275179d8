#![forbid(unsafe_code)]

//! Dispatches a [`ResourceReference`] to the remote API and normalizes the
//! answer into a single [`LookupResult`] shape.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LookupError, RemoteError};
use crate::reference::ResourceReference;

pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Normalized view of a remote video, identical for lookups and searches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// What the front end renders. Serialized as
/// `{ "mode": "videoId" | "search", "exists"?: bool, "items": [...] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum LookupResult {
    #[serde(rename = "videoId")]
    Direct {
        exists: bool,
        items: Vec<ResourceSummary>,
    },
    #[serde(rename = "search")]
    Search { items: Vec<ResourceSummary> },
}

impl LookupResult {
    pub fn items(&self) -> &[ResourceSummary] {
        match self {
            Self::Direct { items, .. } | Self::Search { items } => items,
        }
    }
}

/// Remote capability the dispatcher drives. Implementations own transport,
/// credentials and timeouts.
#[async_trait]
pub trait ResourceApi: Send + Sync {
    /// Returns the videos matching `id`; empty when it does not exist.
    async fn fetch_by_id(&self, id: &str) -> Result<Vec<ResourceSummary>, RemoteError>;

    /// Runs a keyword search asking for at most `limit` results.
    async fn search(&self, text: &str, limit: usize) -> Result<Vec<ResourceSummary>, RemoteError>;
}

/// Stateless apart from the page size it was built with; one instance can
/// serve any number of concurrent requests.
#[derive(Debug, Clone, Copy)]
pub struct Dispatcher {
    page_size: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Dispatcher {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Issues exactly one remote call for `reference`.
    ///
    /// Direct references always yield `Direct`, with `exists` reporting
    /// whether the remote knew the id. Searches keep the remote order and
    /// are cut to the page size. Remote failures become
    /// [`LookupError::LookupFailed`] without any partial result.
    pub async fn dispatch(
        &self,
        reference: &ResourceReference,
        api: &dyn ResourceApi,
    ) -> Result<LookupResult, LookupError> {
        match reference.id() {
            Some(id) => {
                tracing::debug!(%id, "direct video lookup");
                let items = api.fetch_by_id(id).await?;
                Ok(LookupResult::Direct {
                    exists: !items.is_empty(),
                    items,
                })
            }
            None => {
                tracing::debug!(query = reference.query(), "keyword search");
                let mut items = api.search(reference.query(), self.page_size).await?;
                items.truncate(self.page_size);
                Ok(LookupResult::Search { items })
            }
        }
    }
}
