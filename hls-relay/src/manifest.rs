//! Upstream manifest download and rewriting.
//!
//! Every segment reference in an upstream manifest is replaced by a chunk
//! redirect URL on this relay, so the manifest can be served repeatedly while
//! each segment is still fetched straight from the upstream host.

use std::time::Duration;

use reqwest::header::{HeaderValue, USER_AGENT};
use thiserror::Error;
use tracing::{debug, warn};

use crate::urls::RelayUrls;

/// Default bound on an upstream manifest download.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

const TAG_MARKER: char = '#';

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream responded with status {0}")]
    Status(u16),
}

impl FetchError {
    /// Whether the upstream rejected the URL itself (expired or foreign
    /// signature) rather than failing transiently.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FetchError::Status(403 | 404 | 410))
    }
}

/// Classification of a single manifest line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestLine<'a> {
    /// A directive or comment, copied verbatim.
    Tag(&'a str),
    Blank,
    /// Anything else names a segment or sub-playlist.
    SegmentReference(&'a str),
}

impl<'a> ManifestLine<'a> {
    pub fn classify(raw: &'a str) -> Self {
        let line = raw.trim();
        if line.is_empty() {
            ManifestLine::Blank
        } else if line.starts_with(TAG_MARKER) {
            ManifestLine::Tag(line)
        } else {
            ManifestLine::SegmentReference(line)
        }
    }

    /// The output line for this input line, if any.
    pub fn rewrite(self, urls: &RelayUrls, stream_id: &str) -> Option<String> {
        match self {
            ManifestLine::Tag(tag) => Some(tag.to_string()),
            ManifestLine::Blank => None,
            ManifestLine::SegmentReference(reference) => {
                Some(urls.chunk_url(stream_id, reference))
            }
        }
    }
}

/// Rewrite a manifest body. Blank lines are dropped.
pub fn rewrite_manifest(body: &str, urls: &RelayUrls, stream_id: &str) -> String {
    body.lines()
        .map(ManifestLine::classify)
        .filter_map(|line| line.rewrite(urls, stream_id))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct ManifestRewriter {
    client: reqwest::Client,
    urls: RelayUrls,
}

impl ManifestRewriter {
    /// Build a rewriter whose upstream requests carry `user_agent`.
    ///
    /// `accept_invalid_certs` relaxes certificate validation; the upstream
    /// host is trusted by configuration rather than by its chain.
    pub fn new(
        urls: RelayUrls,
        user_agent: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> reqwest::Result<Self> {
        crate::install_rustls_provider();

        let mut headers = reqwest::header::HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(user_agent) {
            headers.insert(USER_AGENT, value);
        } else {
            warn!("Manifest identity is not a valid header value; using reqwest default");
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self::with_client(client, urls))
    }

    pub fn with_client(client: reqwest::Client, urls: RelayUrls) -> Self {
        Self { client, urls }
    }

    pub fn urls(&self) -> &RelayUrls {
        &self.urls
    }

    /// Download `manifest_url` and rewrite it for `stream_id`.
    pub async fn fetch_and_rewrite(
        &self,
        manifest_url: &str,
        stream_id: &str,
    ) -> Result<String, FetchError> {
        let response = self.client.get(manifest_url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let rewritten = rewrite_manifest(&body, &self.urls, stream_id);
        debug!(
            stream_id,
            input_lines = body.lines().count(),
            output_lines = rewritten.lines().count(),
            "Rewrote manifest"
        );
        Ok(rewritten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use rstest::rstest;
    use tokio::net::TcpListener;

    const SAMPLE: &str = "#EXTM3U\n#EXTINF:10,\nseg1.ts\n\nseg2.ts?tok=abc\n";

    fn urls() -> RelayUrls {
        RelayUrls::with_defaults("http://127.0.0.1:10000")
    }

    #[rstest]
    #[case("#EXTM3U", ManifestLine::Tag("#EXTM3U"))]
    #[case("  #EXT-X-ENDLIST \r", ManifestLine::Tag("#EXT-X-ENDLIST"))]
    #[case("", ManifestLine::Blank)]
    #[case(" \t ", ManifestLine::Blank)]
    #[case("seg1.ts", ManifestLine::SegmentReference("seg1.ts"))]
    #[case(
        " https://cdn/x/seg.aac?sig=1 ",
        ManifestLine::SegmentReference("https://cdn/x/seg.aac?sig=1")
    )]
    fn classifies_lines(#[case] raw: &str, #[case] expected: ManifestLine<'_>) {
        assert_eq!(ManifestLine::classify(raw), expected);
    }

    #[test]
    fn rewrites_sample_manifest() {
        let out = rewrite_manifest(SAMPLE, &urls(), "x");
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "#EXTM3U",
                "#EXTINF:10,",
                "http://127.0.0.1:10000/chunk/x.ts?remote=seg1.ts",
                "http://127.0.0.1:10000/chunk/x.ts?remote=seg2.ts%3Ftok%3Dabc",
            ]
        );
    }

    #[test]
    fn every_reference_yields_exactly_one_line() {
        let body = "#EXTM3U\n\n\na\nb\n#EXT-X-DISCONTINUITY\nc\n\n";
        let out = rewrite_manifest(body, &urls(), "s");
        assert_eq!(out.lines().filter(|l| l.contains("/chunk/s.ts?remote=")).count(), 3);
        assert_eq!(out.lines().count(), 5);
        assert!(!out.ends_with('\n'));
    }

    #[test]
    fn empty_body_rewrites_to_empty() {
        assert_eq!(rewrite_manifest("\n\n", &urls(), "x"), "");
    }

    #[test]
    fn rejection_statuses() {
        assert!(FetchError::Status(403).is_rejection());
        assert!(FetchError::Status(410).is_rejection());
        assert!(!FetchError::Status(500).is_rejection());
    }

    async fn spawn_upstream(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn fetches_with_identity_and_rewrites() {
        async fn playlist(headers: HeaderMap) -> (StatusCode, String) {
            let ua = headers
                .get(axum::http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if ua == "UA-IOS" {
                (StatusCode::OK, SAMPLE.to_string())
            } else {
                (StatusCode::FORBIDDEN, String::new())
            }
        }

        let base = spawn_upstream(Router::new().route("/live.m3u8", get(playlist))).await;
        let rewriter =
            ManifestRewriter::new(urls(), "UA-IOS", Duration::from_secs(5), true).unwrap();

        let out = rewriter
            .fetch_and_rewrite(&format!("{base}/live.m3u8"), "x")
            .await
            .unwrap();
        assert!(out.starts_with("#EXTM3U\n#EXTINF:10,\n"));
        assert_eq!(out.lines().count(), 4);
    }

    #[tokio::test]
    async fn non_success_status_is_a_fetch_error() {
        let base = spawn_upstream(Router::new().route(
            "/gone.m3u8",
            get(|| async { (StatusCode::GONE, "gone") }),
        ))
        .await;
        let rewriter =
            ManifestRewriter::new(urls(), "UA", Duration::from_secs(5), false).unwrap();

        let err = rewriter
            .fetch_and_rewrite(&format!("{base}/gone.m3u8"), "x")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(410)));
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_fetch_error() {
        let rewriter =
            ManifestRewriter::new(urls(), "UA", Duration::from_secs(2), false).unwrap();
        // Port 9 (discard) on loopback is almost never listening.
        let err = rewriter
            .fetch_and_rewrite("http://127.0.0.1:9/x.m3u8", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Http(_)));
    }
}
