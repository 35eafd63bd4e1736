//! API server setup and configuration.

use axum::Router;
use axum::extract::Request;
use axum::http::{HeaderValue, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use stream_extractor::{ResolverBackend, StreamlinkBackend, YtDlpBackend};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::cache::TtlCache;
use crate::channel::{ChannelRepository, FsChannelRepository};
use crate::config::{BackendKind, RelayConfig};
use crate::error::{Error, Result};
use crate::manifest::ManifestRewriter;
use crate::playlist::{ModeAliases, PlaylistBuilder};
use crate::resolver::Resolver;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server bind address
    pub bind_address: String,
    /// Server port
    pub port: u16,
    /// Answer CORS preflight requests
    pub enable_cors: bool,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 10000,
            enable_cors: true,
        }
    }
}

impl From<&RelayConfig> for ApiServerConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            bind_address: config.bind_address.clone(),
            port: config.port,
            enable_cors: true,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Cache-backed stream resolver
    pub resolver: Arc<Resolver>,
    /// Upstream manifest rewriter
    pub rewriter: Arc<ManifestRewriter>,
    /// Top-level playlist builder
    pub playlists: Arc<PlaylistBuilder>,
    /// Channel metadata store
    pub channels: Arc<dyn ChannelRepository>,
    /// Path aliases selecting the playback mode
    pub modes: Arc<ModeAliases>,
}

impl AppState {
    pub fn new(
        resolver: Arc<Resolver>,
        rewriter: Arc<ManifestRewriter>,
        playlists: Arc<PlaylistBuilder>,
        channels: Arc<dyn ChannelRepository>,
        modes: ModeAliases,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            resolver,
            rewriter,
            playlists,
            channels,
            modes: Arc::new(modes),
        }
    }

    /// Wire every component from configuration.
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        config.validate()?;

        let backend = build_backend(config);
        let cache = Arc::new(TtlCache::with_ttl(config.cache_ttl()));
        let resolver = Resolver::new(backend, cache, config.resolver_options()?);

        let urls = config.relay_urls();
        let rewriter = ManifestRewriter::new(
            urls.clone(),
            &config.user_agent_of(&config.manifest_identity),
            config.manifest_fetch_timeout(),
            config.accept_invalid_certs,
        )
        .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        let playlists = PlaylistBuilder::new(urls, config.user_agent_of(&config.playlist_identity))
            .with_target_duration_margin(config.target_duration_margin);

        let channels = FsChannelRepository::with_extension(
            config.channels_dir.clone(),
            config.channel_file_extension.clone(),
        );

        Ok(Self::new(
            Arc::new(resolver),
            Arc::new(rewriter),
            Arc::new(playlists),
            Arc::new(channels),
            config.modes.clone(),
        ))
    }
}

fn build_backend(config: &RelayConfig) -> Arc<dyn ResolverBackend> {
    match config.backend {
        BackendKind::YtDlp => Arc::new(
            YtDlpBackend::new(config.backend_path.clone(), config.watch_url_template.clone())
                .with_extra_args(config.backend_extra_args.clone()),
        ),
        BackendKind::Streamlink => Arc::new(
            StreamlinkBackend::new(config.backend_path.clone(), config.watch_url_template.clone())
                .with_quality(config.streamlink_quality.clone()),
        ),
    }
}

/// Check that the configured extractor binary can be executed.
///
/// The check spawns the tool synchronously, so it runs on the blocking pool.
pub async fn backend_available(config: &RelayConfig) -> bool {
    let kind = config.backend;
    let path = config.backend_path.clone();
    let template = config.watch_url_template.clone();
    tokio::task::spawn_blocking(move || match kind {
        BackendKind::YtDlp => YtDlpBackend::new(path, template).is_available(),
        BackendKind::Streamlink => StreamlinkBackend::new(path, template).is_available(),
    })
    .await
    .unwrap_or(false)
}

/// Build the router with all middleware and routes.
pub fn build_router(state: AppState, enable_cors: bool) -> Router {
    let mut router = routes::create_router(state);

    // Caching happens inside the relay; players must always come back.
    router = router
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::EXPIRES,
            HeaderValue::from_static("0"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ));

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        router = router.layer(cors);
    }

    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &Request| {
                if req.uri().path() == "/health" {
                    Span::none()
                } else {
                    let mut make_span =
                        tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                    use tower_http::trace::MakeSpan;
                    make_span.make_span(req)
                }
            })
            .on_response(
                |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                    if span.is_disabled() {
                        return;
                    }
                    let on_response =
                        tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO);
                    use tower_http::trace::OnResponse;
                    on_response.on_response(res, latency, span);
                },
            ),
    )
}

/// API server.
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    /// Create with custom state.
    pub fn with_state(config: ApiServerConfig, state: AppState) -> Self {
        Self {
            config,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.bind_address, self.config.port)
            .parse()
            .map_err(|e| Error::config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state.clone(), self.config.enable_cors);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Relay listening on http://{}", addr);

        let cancel_token = self.cancel_token.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("Relay shutting down...");
            })
            .await
            .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ApiServerConfig::default();
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.port, 10000);
        assert!(config.enable_cors);
    }

    #[tokio::test]
    async fn test_state_from_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            channels_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let state = AppState::from_config(&config).unwrap();
        assert!(state.start_time.elapsed().as_secs() < 1);
        assert_eq!(state.resolver.backend_name(), "yt-dlp");
        assert_eq!(state.rewriter.urls().manifest_prefix(), "hls_proxy");
    }

    #[test]
    fn test_state_rejects_invalid_config() {
        let config = RelayConfig {
            strategy_timeout_secs: 0,
            ..Default::default()
        };
        assert!(AppState::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_missing_backend_binary_is_reported() {
        for backend in [BackendKind::YtDlp, BackendKind::Streamlink] {
            let config = RelayConfig {
                backend,
                backend_path: Some("/nonexistent/relay-extractor".into()),
                ..Default::default()
            };
            assert!(!backend_available(&config).await);
        }
    }

    #[tokio::test]
    async fn test_server_shutdown_token() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig {
            channels_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let server =
            ApiServer::with_state((&config).into(), AppState::from_config(&config).unwrap());

        let token = server.cancel_token();
        assert!(!token.is_cancelled());
        server.shutdown();
        assert!(token.is_cancelled());
    }
}
