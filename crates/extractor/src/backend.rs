use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExtractorError;
use crate::media::FormatClass;
use crate::strategy::Strategy;

/// Placeholder substituted with the stream identifier in watch-URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

/// A single invocation of a resolver backend.
#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub stream_id: &'a str,
    pub format: FormatClass,
    pub strategy: &'a Strategy,
    /// Upper bound for this invocation.
    pub timeout: Duration,
}

/// Turns an opaque stream identifier into a live, time-limited upstream URL.
///
/// Implementations must be cancellation safe: dropping the returned future
/// abandons the work without side effects.
#[async_trait]
pub trait ResolverBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &ResolveRequest<'_>) -> Result<String, ExtractorError>;
}

/// Expand a watch-URL template such as `https://www.youtube.com/watch?v={id}`.
pub fn watch_url(template: &str, stream_id: &str) -> String {
    template.replace(ID_PLACEHOLDER, stream_id)
}

/// Accept only absolute `http`/`https` URLs.
pub fn validate_stream_url(candidate: &str) -> Result<String, ExtractorError> {
    let candidate = candidate.trim();
    let parsed =
        url::Url::parse(candidate).map_err(|_| ExtractorError::InvalidUrl(candidate.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(candidate.to_string()),
        _ => Err(ExtractorError::InvalidUrl(candidate.to_string())),
    }
}

/// Extract the first non-blank line of a tool's stdout as a stream URL.
pub(crate) fn first_url_line(stdout: &[u8]) -> Result<String, ExtractorError> {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(ExtractorError::EmptyOutput)?;
    validate_stream_url(line)
}
