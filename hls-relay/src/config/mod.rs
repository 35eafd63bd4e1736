//! Relay configuration.
//!
//! Values come from an optional TOML file, then environment variables
//! (a `.env` file is honoured), then command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stream_extractor::{
    DEFAULT_WATCH_URL_TEMPLATE, FormatClass, IdentityPool, Strategy, backend::ID_PLACEHOLDER,
    default_strategies, identity,
};

use crate::cache::DEFAULT_TTL;
use crate::error::{Error, Result};
use crate::playlist::{DEFAULT_TARGET_DURATION_MARGIN, ModeAliases};
use crate::resolver::{DEFAULT_STRATEGY_TIMEOUT, ResolverOptions};
use crate::urls::{DEFAULT_CHUNK_PREFIX, DEFAULT_MANIFEST_PREFIX, RelayUrls};

/// Upper bound for `cache_ttl_secs` (one day).
pub const MAX_CACHE_TTL_SECS: u64 = 86_400;
/// Upper bound for the strategy and manifest fetch timeouts.
pub const MAX_TIMEOUT_SECS: u64 = 3_600;
/// Rendition streamlink is asked for unless configured otherwise.
pub const DEFAULT_STREAMLINK_QUALITY: &str = "best";

/// Which external tool resolves stream identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    #[default]
    #[serde(rename = "yt-dlp", alias = "ytdlp")]
    YtDlp,
    #[serde(rename = "streamlink")]
    Streamlink,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yt-dlp" | "ytdlp" => Ok(BackendKind::YtDlp),
            "streamlink" => Ok(BackendKind::Streamlink),
            other => Err(Error::config(format!("unknown backend: {other}"))),
        }
    }
}

/// A strategy as written in the config file; `identity` names an entry of
/// the identity pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    pub format_selector: String,
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub bind_address: String,
    pub port: u16,
    /// `<scheme>://<host>:<port>` players use to reach this relay.
    /// Defaults to `http://127.0.0.1:<port>`.
    pub public_base_url: Option<String>,
    pub channels_dir: PathBuf,
    pub channel_file_extension: String,
    pub cache_ttl_secs: u64,
    pub strategy_timeout_secs: u64,
    pub manifest_fetch_timeout_secs: u64,
    pub accept_invalid_certs: bool,
    pub backend: BackendKind,
    pub backend_path: Option<String>,
    pub backend_extra_args: Vec<String>,
    pub watch_url_template: String,
    /// Rendition passed to streamlink; ignored by yt-dlp.
    pub streamlink_quality: String,
    /// Added to (or overriding) the built-in identity pool.
    pub identities: IdentityPool,
    pub manifest_identity: String,
    pub playlist_identity: String,
    pub target_duration_margin: u64,
    pub modes: ModeAliases,
    pub manifest_prefix: String,
    pub chunk_prefix: String,
    pub hls_strategies: Option<Vec<StrategyConfig>>,
    pub progressive_strategies: Option<Vec<StrategyConfig>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 10000,
            public_base_url: None,
            channels_dir: PathBuf::from("TXT"),
            channel_file_extension: crate::channel::DEFAULT_CHANNEL_EXTENSION.to_string(),
            cache_ttl_secs: DEFAULT_TTL.as_secs(),
            strategy_timeout_secs: DEFAULT_STRATEGY_TIMEOUT.as_secs(),
            manifest_fetch_timeout_secs: crate::manifest::DEFAULT_FETCH_TIMEOUT.as_secs(),
            accept_invalid_certs: true,
            backend: BackendKind::default(),
            backend_path: None,
            backend_extra_args: Vec::new(),
            watch_url_template: DEFAULT_WATCH_URL_TEMPLATE.to_string(),
            streamlink_quality: DEFAULT_STREAMLINK_QUALITY.to_string(),
            identities: IdentityPool::empty(),
            manifest_identity: identity::IOS.to_string(),
            playlist_identity: identity::IOS.to_string(),
            target_duration_margin: DEFAULT_TARGET_DURATION_MARGIN,
            modes: ModeAliases::default(),
            manifest_prefix: DEFAULT_MANIFEST_PREFIX.to_string(),
            chunk_prefix: DEFAULT_CHUNK_PREFIX.to_string(),
            hls_strategies: None,
            progressive_strategies: None,
        }
    }
}

impl RelayConfig {
    /// Load from `path` (if given), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse configuration: {e}")))
    }

    /// Apply `RELAY_*` environment variables.
    ///
    /// Supported env vars:
    /// - `RELAY_BIND_ADDRESS`, `RELAY_PORT`, `RELAY_PUBLIC_BASE_URL`
    /// - `RELAY_CHANNELS_DIR`, `RELAY_CACHE_TTL_SECS`, `RELAY_STRATEGY_TIMEOUT_SECS`
    /// - `RELAY_BACKEND` (`yt-dlp` | `streamlink`), `RELAY_BACKEND_PATH`
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(bind_address) = var("RELAY_BIND_ADDRESS") {
            self.bind_address = bind_address;
        }
        if let Some(port) = var("RELAY_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(base) = var("RELAY_PUBLIC_BASE_URL") {
            self.public_base_url = Some(base);
        }
        if let Some(dir) = var("RELAY_CHANNELS_DIR") {
            self.channels_dir = PathBuf::from(dir);
        }
        if let Some(ttl) = var("RELAY_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            self.cache_ttl_secs = ttl;
        }
        if let Some(timeout) = var("RELAY_STRATEGY_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.strategy_timeout_secs = timeout;
        }
        if let Some(backend) = var("RELAY_BACKEND").and_then(|v| v.parse().ok()) {
            self.backend = backend;
        }
        if let Some(path) = var("RELAY_BACKEND_PATH") {
            self.backend_path = Some(path);
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.cache_ttl_secs == 0 || self.cache_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(Error::config(format!(
                "cache_ttl_secs must be between 1 and {MAX_CACHE_TTL_SECS}"
            )));
        }
        for (name, secs) in [
            ("strategy_timeout_secs", self.strategy_timeout_secs),
            ("manifest_fetch_timeout_secs", self.manifest_fetch_timeout_secs),
        ] {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(Error::config(format!(
                    "{name} must be between 1 and {MAX_TIMEOUT_SECS}"
                )));
            }
        }
        if self.streamlink_quality.trim().is_empty() {
            return Err(Error::config("streamlink_quality must not be empty"));
        }
        if !self.watch_url_template.contains(ID_PLACEHOLDER) {
            return Err(Error::config(format!(
                "watch_url_template must contain {ID_PLACEHOLDER}"
            )));
        }

        let pool = self.identity_pool();
        for name in [&self.manifest_identity, &self.playlist_identity] {
            if !pool.contains(name) {
                return Err(Error::config(format!("unknown identity: {name}")));
            }
        }

        let base = self.public_base_url();
        match url::Url::parse(&base) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::config(format!(
                    "public_base_url must be an http(s) URL: {base}"
                )));
            }
        }

        for prefix in [&self.manifest_prefix, &self.chunk_prefix] {
            let trimmed = prefix.trim_matches('/');
            if trimmed.is_empty() || trimmed.contains('/') {
                return Err(Error::config(format!(
                    "route prefix must be a single path segment: {prefix:?}"
                )));
            }
        }
        if self.manifest_prefix.trim_matches('/') == self.chunk_prefix.trim_matches('/') {
            return Err(Error::config("manifest_prefix and chunk_prefix must differ"));
        }

        // Surfaces unknown identity names and empty tables.
        self.resolver_options()?;
        Ok(())
    }

    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port))
    }

    pub fn identity_pool(&self) -> IdentityPool {
        IdentityPool::default().merged_with(&self.identities)
    }

    pub fn relay_urls(&self) -> RelayUrls {
        RelayUrls::new(
            self.public_base_url(),
            self.manifest_prefix.clone(),
            self.chunk_prefix.clone(),
        )
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn manifest_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_fetch_timeout_secs)
    }

    /// User-Agent of a named identity, falling back to the raw name.
    pub fn user_agent_of(&self, identity_name: &str) -> String {
        self.identity_pool()
            .get(identity_name)
            .map(|i| i.user_agent)
            .unwrap_or_else(|| identity_name.to_string())
    }

    pub fn resolver_options(&self) -> Result<ResolverOptions> {
        let pool = self.identity_pool();
        Ok(ResolverOptions {
            hls_strategies: strategies_for(FormatClass::Hls, self.hls_strategies.as_deref(), &pool)?,
            progressive_strategies: strategies_for(
                FormatClass::Progressive,
                self.progressive_strategies.as_deref(),
                &pool,
            )?,
            strategy_timeout: Duration::from_secs(self.strategy_timeout_secs),
        })
    }
}

fn strategies_for(
    format: FormatClass,
    configured: Option<&[StrategyConfig]>,
    pool: &IdentityPool,
) -> Result<Vec<Strategy>> {
    let Some(configured) = configured else {
        return Ok(default_strategies(format, pool));
    };
    if configured.is_empty() {
        return Err(Error::config(format!("{format} strategy list is empty")));
    }

    configured
        .iter()
        .map(|s| {
            let identity = match s.identity.as_deref() {
                Some(name) => Some(pool.get(name).ok_or_else(|| {
                    Error::config(format!("strategy {} uses unknown identity {name}", s.name))
                })?),
                None => None,
            };
            Ok(Strategy::new(s.name.clone(), s.format_selector.clone(), identity))
        })
        .collect()
}
