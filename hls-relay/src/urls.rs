//! Outward-facing URLs handed to players.
//!
//! Playlists point at the manifest proxy, rewritten manifests point at the
//! chunk redirect. Both are built from the same public base URL and route
//! prefixes the router is mounted with.

/// Default path prefix of the manifest proxy endpoint.
pub const DEFAULT_MANIFEST_PREFIX: &str = "hls_proxy";
/// Default path prefix of the segment redirect endpoint.
pub const DEFAULT_CHUNK_PREFIX: &str = "chunk";
/// Query parameter carrying the encoded upstream segment reference.
pub const REMOTE_PARAM: &str = "remote";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayUrls {
    base_url: String,
    manifest_prefix: String,
    chunk_prefix: String,
}

impl RelayUrls {
    /// `base_url` is `<scheme>://<host>:<port>`; a trailing slash is ignored.
    pub fn new(
        base_url: impl Into<String>,
        manifest_prefix: impl Into<String>,
        chunk_prefix: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            manifest_prefix: manifest_prefix.into().trim_matches('/').to_string(),
            chunk_prefix: chunk_prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn with_defaults(base_url: impl Into<String>) -> Self {
        Self::new(base_url, DEFAULT_MANIFEST_PREFIX, DEFAULT_CHUNK_PREFIX)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn manifest_prefix(&self) -> &str {
        &self.manifest_prefix
    }

    pub fn chunk_prefix(&self) -> &str {
        &self.chunk_prefix
    }

    /// URL of the manifest proxy for one episode.
    pub fn manifest_url(&self, stream_id: &str) -> String {
        format!(
            "{}/{}/{}/index.m3u8",
            self.base_url,
            self.manifest_prefix,
            urlencoding::encode(stream_id)
        )
    }

    /// URL of the chunk redirect carrying `reference` verbatim.
    ///
    /// The `.ts` suffix only exists for players that sniff extensions.
    pub fn chunk_url(&self, stream_id: &str, reference: &str) -> String {
        format!(
            "{}/{}/{}.ts?{}={}",
            self.base_url,
            self.chunk_prefix,
            urlencoding::encode(stream_id),
            REMOTE_PARAM,
            urlencoding::encode(reference)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_manifest_url() {
        let urls = RelayUrls::with_defaults("http://127.0.0.1:10000/");
        assert_eq!(
            urls.manifest_url("dQw4w9WgXcQ"),
            "http://127.0.0.1:10000/hls_proxy/dQw4w9WgXcQ/index.m3u8"
        );
    }

    #[test]
    fn chunk_url_encodes_reserved_characters() {
        let urls = RelayUrls::new("http://relay:8080", "/m/", "seg");
        assert_eq!(
            urls.chunk_url("x", "http://h/a?b=c&d=e"),
            "http://relay:8080/seg/x.ts?remote=http%3A%2F%2Fh%2Fa%3Fb%3Dc%26d%3De"
        );
    }

    #[test]
    fn chunk_url_keeps_plus_and_space_distinct() {
        let urls = RelayUrls::with_defaults("http://r");
        let url = urls.chunk_url("x", "a+b c");
        assert!(url.ends_with("remote=a%2Bb%20c"));
    }
}
