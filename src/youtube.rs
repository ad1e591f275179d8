#![forbid(unsafe_code)]

//! YouTube Data API v3 implementation of [`ResourceApi`].
//!
//! The client is generic over its [`CredentialProvider`], which gives the two
//! flavours the backend can be started with: `YouTubeClient<ApiKey>` and
//! `YouTubeClient<OAuthRefresh>`. Requests go through a blocking `ureq` agent
//! on the blocking thread pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::credentials::CredentialProvider;
use crate::error::RemoteError;
use crate::lookup::{ResourceApi, ResourceSummary};
use crate::security::redact;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
/// Largest `maxResults` the search endpoint accepts.
pub const MAX_RESULTS_LIMIT: usize = 50;

pub struct YouTubeClient<C> {
    inner: Arc<ClientInner<C>>,
}

struct ClientInner<C> {
    agent: ureq::Agent,
    api_base: String,
    credentials: C,
}

impl<C: CredentialProvider> YouTubeClient<C> {
    pub fn new(api_base: impl Into<String>, credentials: C, timeout: Duration) -> Self {
        let api_base = api_base.into().trim_end_matches('/').to_string();
        Self {
            inner: Arc::new(ClientInner {
                agent: ureq::AgentBuilder::new().timeout(timeout).build(),
                api_base,
                credentials,
            }),
        }
    }

    pub fn auth_label(&self) -> &'static str {
        self.inner.credentials.label()
    }

    async fn list(
        &self,
        endpoint: &'static str,
        params: Vec<(&'static str, String)>,
    ) -> Result<Vec<ResourceSummary>, RemoteError> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.list(endpoint, &params))
            .await
            .map_err(|err| RemoteError::Transport(format!("request task failed: {err}")))?
    }
}

impl<C: CredentialProvider> ClientInner<C> {
    fn list(
        &self,
        endpoint: &str,
        params: &[(&'static str, String)],
    ) -> Result<Vec<ResourceSummary>, RemoteError> {
        let credential = self.credentials.credential()?;
        let secrets = [credential.secret()];

        let url = format!("{}/{endpoint}", self.api_base);
        let request = params
            .iter()
            .fold(self.agent.get(&url), |request, (key, value)| {
                request.query(key, value)
            });
        let response = credential
            .apply(request)
            .call()
            .map_err(|err| RemoteError::from_ureq(err, &secrets))?;

        let payload: ListResponse = response
            .into_json()
            .map_err(|err| RemoteError::Decode(redact(&err.to_string(), &secrets)))?;
        Ok(payload.into_summaries())
    }
}

#[async_trait]
impl<C: CredentialProvider> ResourceApi for YouTubeClient<C> {
    async fn fetch_by_id(&self, id: &str) -> Result<Vec<ResourceSummary>, RemoteError> {
        self.list(
            "videos",
            vec![
                ("part", "snippet,contentDetails,status".to_string()),
                ("id", id.to_string()),
            ],
        )
        .await
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<ResourceSummary>, RemoteError> {
        let max_results = limit.clamp(1, MAX_RESULTS_LIMIT);
        self.list(
            "search",
            vec![
                ("part", "snippet".to_string()),
                ("type", "video".to_string()),
                ("maxResults", max_results.to_string()),
                ("q", text.to_string()),
            ],
        )
        .await
    }
}

// Only the fields we surface. `videos` and `search` share the item layout
// except for `id`, which search nests as `{ kind, videoId }`.
#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Option<Vec<ApiItem>>,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    #[serde(default)]
    id: Option<ItemId>,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemId {
    Plain(String),
    Nested {
        #[serde(rename = "videoId")]
        video_id: Option<String>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    channel_title: String,
    #[serde(default)]
    published_at: Option<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    high: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl ListResponse {
    fn into_summaries(self) -> Vec<ResourceSummary> {
        self.items
            .unwrap_or_default()
            .into_iter()
            .filter_map(ApiItem::into_summary)
            .collect()
    }
}

impl ApiItem {
    fn into_summary(self) -> Option<ResourceSummary> {
        let id = match self.id? {
            ItemId::Plain(id) => id,
            ItemId::Nested { video_id } => video_id?,
        };
        if id.trim().is_empty() {
            return None;
        }
        let snippet = self.snippet.unwrap_or_default();
        let Thumbnails {
            high,
            medium,
            default,
        } = snippet.thumbnails;
        Some(ResourceSummary {
            id,
            title: snippet.title,
            channel_title: snippet.channel_title,
            published_at: snippet.published_at.as_deref().and_then(parse_timestamp),
            thumbnail_url: high.or(medium).or(default).map(|thumb| thumb.url),
        })
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}
