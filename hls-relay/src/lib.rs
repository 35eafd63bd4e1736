//! hls-relay library crate.
//!
//! Serves channel playlists whose entries resolve to live upstream streams
//! on demand. Manifests are rewritten so every segment request comes back
//! through a redirect endpoint carrying the original reference.

pub mod api;
pub mod cache;
pub mod channel;
pub mod config;
pub mod error;
pub mod logging;
pub mod manifest;
pub mod playlist;
pub mod resolver;
pub mod urls;

use std::sync::OnceLock;

use tracing::debug;

pub use error::{Error, Result};

/// Install the process-wide rustls crypto provider once.
///
/// reqwest is built without a default provider, so this must run before the
/// first client is constructed.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}
