#![forbid(unsafe_code)]

//! Axum backend for the tubecheck form.
//!
//! `POST /check` takes `{ "query": ... }`, decides whether the query names a
//! specific video or is a keyword search, asks the YouTube Data API once and
//! answers with `{ mode, exists?, items }`. Everything else is served from
//! the static web root.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::Parser;
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tubecheck::{
    config::{AuthSettings, RuntimeConfig, RuntimeOverrides, resolve_runtime_config},
    credentials::{ApiKey, OAuthRefresh},
    error::LookupError,
    lookup::{Dispatcher, LookupResult, ResourceApi},
    reference::extract,
    security::ensure_not_root,
    youtube::YouTubeClient,
};

#[derive(Debug, Parser)]
#[command(name = "backend", about = "Serve the tubecheck form and its /check endpoint")]
struct BackendArgs {
    /// Listen address (overrides TUBECHECK_HOST)
    #[arg(long)]
    host: Option<IpAddr>,
    /// Listen port (overrides PORT)
    #[arg(long)]
    port: Option<u16>,
    /// Directory holding index.html and its assets (overrides WWW_ROOT)
    #[arg(long)]
    www_root: Option<PathBuf>,
    /// Alternate .env file
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            host: self.host.map(|host| host.to_string()),
            port: self.port,
            www_root: self.www_root,
            env_path: self.env_file,
        }
    }
}

fn parse_host(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/TUBECHECK_HOST")
}

/// Shared state injected into every handler.
///
/// `api` is `None` when no credentials were configured; the server still
/// starts so the static page loads, and `/check` reports the problem.
#[derive(Clone)]
struct AppState {
    api: Option<Arc<dyn ResourceApi>>,
    dispatcher: Dispatcher,
    www_root: Arc<PathBuf>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Upstream failure; the cause is logged, never sent to the browser.
    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, headers, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct CheckRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    credentials: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tubecheck=debug,backend=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = BackendArgs::parse();
    ensure_not_root("backend")?;

    let config = resolve_runtime_config(args.into_overrides()).context("loading configuration")?;
    let host = parse_host(&config.host)?;

    let api = build_resource_api(&config);
    if api.is_none() {
        tracing::warn!(
            "no YouTube credentials configured; set YOUTUBE_API_KEY or the YOUTUBE_CLIENT_ID, \
             YOUTUBE_CLIENT_SECRET and YOUTUBE_REFRESH_TOKEN values"
        );
    }

    let state = AppState {
        api,
        dispatcher: Dispatcher::new(config.page_size),
        www_root: Arc::new(config.www_root.clone()),
    };

    let addr = SocketAddr::new(host, config.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    tracing::info!(%addr, www_root = %config.www_root.display(), "API server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

/// Wires the configured credential flow into a YouTube client.
fn build_resource_api(config: &RuntimeConfig) -> Option<Arc<dyn ResourceApi>> {
    let timeout = config.request_timeout;
    let api: Arc<dyn ResourceApi> = match config.auth.clone()? {
        AuthSettings::ApiKey(key) => {
            let client = YouTubeClient::new(&config.api_base, ApiKey::new(key), timeout);
            tracing::info!(auth = client.auth_label(), "YouTube client ready");
            Arc::new(client)
        }
        AuthSettings::OAuth(oauth) => {
            let provider = OAuthRefresh::new(oauth.into_settings(), timeout);
            let client = YouTubeClient::new(&config.api_base, provider, timeout);
            tracing::info!(auth = client.auth_label(), "YouTube client ready");
            Arc::new(client)
        }
    };
    Some(api)
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/check", post(check))
        .route("/health", get(health))
        .fallback(static_fallback)
        .with_state(state)
}

async fn shutdown_signal() {
    // Not propagated: it only affects graceful shutdown, Ctrl+C still kills
    // the process.
    if let Err(err) = signal::ctrl_c().await {
        tracing::error!(%err, "failed to install Ctrl+C handler");
    }
}

async fn check(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> ApiResult<Json<LookupResult>> {
    let query = match payload {
        Ok(Json(request)) => request.query.unwrap_or_default(),
        Err(rejection) => {
            tracing::debug!(%rejection, "unreadable /check body");
            String::new()
        }
    };
    let reference = extract(&query).map_err(|_| ApiError::bad_request("No query provided"))?;

    let api = state
        .api
        .as_ref()
        .ok_or_else(|| ApiError::internal("Server missing YouTube credentials"))?;

    match state.dispatcher.dispatch(&reference, api.as_ref()).await {
        Ok(result) => Ok(Json(result)),
        Err(LookupError::LookupFailed(cause)) => {
            if cause.is_unauthorized() {
                tracing::error!(error = %cause, "YouTube rejected our credentials");
            } else {
                tracing::error!(error = %cause, "YouTube lookup failed");
            }
            Err(ApiError::bad_gateway("Failed to fetch from YouTube API"))
        }
        Err(LookupError::InvalidInput) => Err(ApiError::bad_request("No query provided")),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        credentials: state.api.is_some(),
    })
}

async fn static_fallback(State(state): State<AppState>, req: Request) -> Response {
    match serve_www_path(&state.www_root, req.uri().path()).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn serve_www_path(root: &Path, request_path: &str) -> ApiResult<Response> {
    let target = resolve_www_path(root, request_path)?;
    let metadata = tokio::fs::metadata(&target).await;

    match metadata {
        Ok(meta) if meta.is_dir() => stream_file(root.join("index.html")).await,
        Ok(_) => stream_file(target).await,
        Err(_) => {
            if should_fallback_to_index(request_path) {
                stream_file(root.join("index.html")).await
            } else {
                Err(ApiError::not_found("file not found"))
            }
        }
    }
}

fn resolve_www_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Ok(root.join("index.html"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

// Client-side routes have no extension; missing assets do.
fn should_fallback_to_index(request_path: &str) -> bool {
    let trimmed = request_path.trim_start_matches('/');
    trimmed.is_empty() || Path::new(trimmed).extension().is_none()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = mime.to_string().parse()
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::time::Duration;
    use tempfile::tempdir;
    use tubecheck::{error::RemoteError, lookup::ResourceSummary};

    #[derive(Default)]
    struct FakeApi {
        items: Vec<ResourceSummary>,
        fail: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ResourceApi for FakeApi {
        async fn fetch_by_id(&self, id: &str) -> Result<Vec<ResourceSummary>, RemoteError> {
            self.calls.lock().push(format!("fetch:{id}"));
            self.respond()
        }

        async fn search(
            &self,
            text: &str,
            limit: usize,
        ) -> Result<Vec<ResourceSummary>, RemoteError> {
            self.calls.lock().push(format!("search:{text}:{limit}"));
            self.respond()
        }
    }

    impl FakeApi {
        fn respond(&self) -> Result<Vec<ResourceSummary>, RemoteError> {
            if self.fail {
                return Err(RemoteError::Transport("connection reset".into()));
            }
            Ok(self.items.clone())
        }
    }

    fn demo_item() -> ResourceSummary {
        ResourceSummary {
            id: "abc123XYZ".into(),
            title: "Demo".into(),
            channel_title: "Demo Channel".into(),
            published_at: None,
            thumbnail_url: Some("https://i.ytimg.com/vi/abc123XYZ/hqdefault.jpg".into()),
        }
    }

    fn state_with(api: Option<Arc<FakeApi>>, www_root: &Path) -> AppState {
        AppState {
            api: api.map(|api| api as Arc<dyn ResourceApi>),
            dispatcher: Dispatcher::default(),
            www_root: Arc::new(www_root.to_path_buf()),
        }
    }

    fn request(query: &str) -> Result<Json<CheckRequest>, JsonRejection> {
        Ok(Json(CheckRequest {
            query: Some(query.to_string()),
        }))
    }

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn backend_args_parse_overrides() {
        let args = BackendArgs::try_parse_from([
            "backend",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "--www-root",
            "/srv/www",
        ])
        .unwrap();
        let overrides = args.into_overrides();
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.www_root, Some(PathBuf::from("/srv/www")));
        assert_eq!(overrides.env_path, None);
    }

    #[test]
    fn backend_args_reject_bad_host() {
        assert!(BackendArgs::try_parse_from(["backend", "--host", "localhost:80"]).is_err());
        assert!(parse_host("not-an-ip").is_err());
    }

    #[test]
    fn resource_api_needs_credentials() {
        let mut config = RuntimeConfig {
            host: "127.0.0.1".into(),
            port: 3000,
            www_root: PathBuf::from("frontend"),
            page_size: 10,
            request_timeout: Duration::from_secs(5),
            api_base: "http://127.0.0.1:9".into(),
            auth: None,
        };
        assert!(build_resource_api(&config).is_none());
        config.auth = Some(AuthSettings::ApiKey("AIzaKEY".into()));
        assert!(build_resource_api(&config).is_some());
    }

    #[tokio::test]
    async fn check_direct_link_reports_existing_video() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FakeApi {
            items: vec![demo_item()],
            ..FakeApi::default()
        });
        let state = state_with(Some(api.clone()), dir.path());

        let Json(result) = check(State(state), request("https://youtu.be/abc123XYZ"))
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "mode": "videoId",
                "exists": true,
                "items": [{
                    "id": "abc123XYZ",
                    "title": "Demo",
                    "channelTitle": "Demo Channel",
                    "thumbnailUrl": "https://i.ytimg.com/vi/abc123XYZ/hqdefault.jpg"
                }]
            })
        );
        assert_eq!(*api.calls.lock(), vec!["fetch:abc123XYZ".to_string()]);
    }

    #[tokio::test]
    async fn check_phrase_runs_a_search() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        let state = state_with(Some(api.clone()), dir.path());

        let Json(result) = check(State(state), request("  cute cat compilation "))
            .await
            .unwrap();
        assert_eq!(result, LookupResult::Search { items: vec![] });
        assert_eq!(
            *api.calls.lock(),
            vec!["search:cute cat compilation:10".to_string()]
        );
    }

    #[tokio::test]
    async fn check_blank_query_is_bad_request() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FakeApi::default());
        let state = state_with(Some(api.clone()), dir.path());

        let err = check(State(state.clone()), request("   ")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "No query provided");

        let err = check(State(state), Ok(Json(CheckRequest { query: None })))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(api.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn check_without_credentials_is_internal_error() {
        let dir = tempdir().unwrap();
        let state = state_with(None, dir.path());
        let err = check(State(state), request("cats")).await.unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("credentials"));
    }

    #[tokio::test]
    async fn check_remote_failure_is_bad_gateway() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FakeApi {
            fail: true,
            ..FakeApi::default()
        });
        let state = state_with(Some(api), dir.path());
        let err = check(State(state), request("https://www.youtube.com/shorts/abc123XYZ"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_GATEWAY);
        assert_eq!(err.message, "Failed to fetch from YouTube API");
    }

    #[tokio::test]
    async fn health_reports_credentials() {
        let dir = tempdir().unwrap();
        let Json(report) = health(State(state_with(None, dir.path()))).await;
        assert!(!report.credentials);
        let api = Arc::new(FakeApi::default());
        let Json(report) = health(State(state_with(Some(api), dir.path()))).await;
        assert_eq!(report.status, "ok");
        assert!(report.credentials);
    }

    #[tokio::test]
    async fn router_handles_json_and_garbage_bodies() {
        let dir = tempdir().unwrap();
        let api = Arc::new(FakeApi {
            items: vec![demo_item()],
            ..FakeApi::default()
        });
        let app = build_router(state_with(Some(api), dir.path()));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let url = format!("http://{addr}/check");
        let (ok, garbage) = tokio::task::spawn_blocking(move || {
            let ok: Value = ureq::post(&url)
                .send_json(json!({ "query": "https://www.youtube.com/watch?v=abc123XYZ" }))
                .unwrap()
                .into_json()
                .unwrap();
            let garbage = match ureq::post(&url)
                .set("Content-Type", "application/json")
                .send_string("{not json")
            {
                Err(ureq::Error::Status(status, response)) => {
                    (status, response.into_string().unwrap())
                }
                other => panic!("expected a 400, got {other:?}"),
            };
            (ok, garbage)
        })
        .await
        .unwrap();

        assert_eq!(ok["mode"], "videoId");
        assert_eq!(ok["exists"], true);
        assert_eq!(ok["items"][0]["title"], "Demo");
        assert_eq!(garbage.0, 400);
        assert!(garbage.1.contains("No query provided"));
    }

    #[tokio::test]
    async fn static_root_serves_index() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<html>form</html>").unwrap();
        let response = serve_www_path(dir.path(), "/").await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/html"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"<html>form</html>");
    }

    #[tokio::test]
    async fn static_assets_and_spa_fallback() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "index").unwrap();
        std::fs::write(dir.path().join("script.js"), "console.log(1)").unwrap();

        let script = serve_www_path(dir.path(), "/script.js").await.unwrap();
        let content_type = script.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().contains("javascript"));

        let fallback = serve_www_path(dir.path(), "/results/today").await.unwrap();
        let body = to_bytes(fallback.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.as_ref(), b"index");

        let err = serve_www_path(dir.path(), "/missing.css").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn static_paths_cannot_escape_root() {
        let dir = tempdir().unwrap();
        let err = serve_www_path(dir.path(), "/../secret.txt").await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn api_error_serializes_json() {
        let response = ApiError::bad_gateway("upstream down").into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let parsed = body_json(response).await;
        assert_eq!(parsed["error"], "upstream down");
    }
}
