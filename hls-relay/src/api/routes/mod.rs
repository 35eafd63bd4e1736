//! API route modules.
//!
//! The manifest and chunk prefixes are taken from the same [`RelayUrls`]
//! the rewriter emits, so generated links always land on a mounted route.
//!
//! [`RelayUrls`]: crate::urls::RelayUrls

pub mod chunk;
pub mod health;
pub mod manifest;
pub mod playlist;

use axum::Router;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;

/// Content type of every playlist and manifest the relay serves.
pub const MPEGURL_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let urls = state.rewriter.urls();
    let manifest_path = format!("/{}/{{stream_id}}/index.m3u8", urls.manifest_prefix());
    let chunk_path = format!("/{}/{{file}}", urls.chunk_prefix());

    Router::new()
        .route("/health", get(health::health_check))
        .route(&manifest_path, get(manifest::manifest_proxy))
        .route(&chunk_path, get(chunk::chunk_redirect))
        .route("/{mode}/{channel_id}/playlist.m3u8", get(playlist::serve_playlist))
        .with_state(state)
}

pub(crate) fn mpegurl_response(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(MPEGURL_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

/// Plain 302 pointing at `location`.
pub(crate) fn found(location: &str) -> ApiResult<Response> {
    let value = HeaderValue::from_str(location)
        .map_err(|_| ApiError::bad_request("Redirect target is not a valid header value"))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, value)]).into_response())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use axum::response::Response;
    use stream_extractor::{ExtractorError, FormatClass, ResolveRequest, ResolverBackend, Strategy};

    use crate::api::server::AppState;
    use crate::cache::TtlCache;
    use crate::channel::InMemoryChannelRepository;
    use crate::manifest::ManifestRewriter;
    use crate::playlist::{ModeAliases, PlaylistBuilder};
    use crate::resolver::{Resolver, ResolverOptions};
    use crate::urls::RelayUrls;

    pub const RELAY_BASE: &str = "http://relay.test:10000";

    /// Backend answering from a fixed `(stream id, format) -> url` table.
    #[derive(Default)]
    pub struct TableBackend {
        urls: HashMap<(String, FormatClass), String>,
        calls: AtomicUsize,
    }

    impl TableBackend {
        pub fn with(mut self, stream_id: &str, format: FormatClass, url: impl Into<String>) -> Self {
            self.urls.insert((stream_id.to_string(), format), url.into());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ResolverBackend for TableBackend {
        fn name(&self) -> &str {
            "table"
        }

        async fn invoke(&self, request: &ResolveRequest<'_>) -> Result<String, ExtractorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls
                .get(&(request.stream_id.to_string(), request.format))
                .cloned()
                .ok_or(ExtractorError::NoStreamsFound)
        }
    }

    pub fn state_with(backend: Arc<TableBackend>, channels: Arc<InMemoryChannelRepository>) -> AppState {
        crate::install_rustls_provider();

        let urls = RelayUrls::with_defaults(RELAY_BASE);
        let options = ResolverOptions {
            hls_strategies: vec![Strategy::new("hls", "best[protocol^=m3u8]", None)],
            progressive_strategies: vec![Strategy::new("mp4", "18/22", None)],
            strategy_timeout: Duration::from_secs(2),
        };
        let resolver = Resolver::new(backend, Arc::new(TtlCache::new()), options);
        let rewriter = ManifestRewriter::with_client(reqwest::Client::new(), urls.clone());
        let playlists = PlaylistBuilder::new(urls, "TestPlayer/1.0");

        AppState::new(
            Arc::new(resolver),
            Arc::new(rewriter),
            Arc::new(playlists),
            channels,
            ModeAliases::default(),
        )
    }

    pub fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}
