//! Streamlink backed resolver.
//!
//! Streamlink has no notion of yt-dlp format selectors, so the strategy's
//! selector is ignored; the format class picks the allowed stream types and
//! the configured quality picks the rendition.

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{ResolveRequest, ResolverBackend, first_url_line, watch_url};
use crate::error::ExtractorError;
use crate::media::FormatClass;

static DEFAULT_STREAMLINK_PATH: &str = "streamlink";
static DEFAULT_STREAMLINK_QUALITY: &str = "best";

static STREAMLINK_AVAILABLE: LazyLock<bool> = LazyLock::new(|| {
    let mut cmd = process_utils::std_command(DEFAULT_STREAMLINK_PATH);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.status().is_ok_and(|s| s.success())
});

#[derive(Debug, Clone)]
pub struct StreamlinkBackend {
    binary_path: String,
    quality: String,
    watch_url_template: String,
}

impl StreamlinkBackend {
    pub fn new(binary_path: Option<String>, watch_url_template: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path
                .or_else(|| std::env::var("STREAMLINK_PATH").ok())
                .unwrap_or_else(|| DEFAULT_STREAMLINK_PATH.to_string()),
            quality: DEFAULT_STREAMLINK_QUALITY.to_string(),
            watch_url_template: watch_url_template.into(),
        }
    }

    pub fn with_quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn is_available(&self) -> bool {
        if self.binary_path == DEFAULT_STREAMLINK_PATH {
            *STREAMLINK_AVAILABLE
        } else {
            crate::ytdlp::binary_responds(&self.binary_path)
        }
    }

    fn build_args(&self, request: &ResolveRequest<'_>) -> Vec<String> {
        let stream_types = match request.format {
            FormatClass::Hls => "hls",
            FormatClass::Progressive => "http",
        };

        let mut args = vec![
            "--stream-url".to_owned(),
            "--stream-types".to_owned(),
            stream_types.to_owned(),
        ];
        if let Some(ua) = request.strategy.user_agent() {
            args.push("--http-header".to_owned());
            args.push(format!("User-Agent={ua}"));
        }
        args.push("--url".to_owned());
        args.push(watch_url(&self.watch_url_template, request.stream_id));
        args.push(self.quality.clone());
        args
    }
}

#[async_trait]
impl ResolverBackend for StreamlinkBackend {
    fn name(&self) -> &str {
        "streamlink"
    }

    async fn invoke(&self, request: &ResolveRequest<'_>) -> Result<String, ExtractorError> {
        let mut cmd = process_utils::tokio_command(&self.binary_path);
        cmd.args(self.build_args(request));

        debug!(
            stream_id = request.stream_id,
            strategy = %request.strategy.name,
            "Invoking streamlink"
        );

        let out = process_utils::output_with_timeout(&mut cmd, request.timeout)
            .await
            .map_err(|e| match e {
                process_utils::ProcessError::TimedOut(d) => ExtractorError::Timeout(d),
                other => ExtractorError::Process(other),
            })?;

        if !out.status.success() {
            // Streamlink reports most failures on stdout in `--stream-url` mode.
            let mut msg = String::from_utf8_lossy(&out.stderr).trim().to_string();
            if msg.is_empty() {
                msg = String::from_utf8_lossy(&out.stdout).trim().to_string();
            }
            return Err(map_streamlink_error(&msg));
        }

        first_url_line(&out.stdout)
    }
}

fn map_streamlink_error(msg: &str) -> ExtractorError {
    let lower = msg.to_lowercase();
    if lower.contains("no plugin can handle url") {
        return ExtractorError::UnsupportedExtractor;
    }
    if lower.contains("no streams found") || lower.contains("no playable streams") {
        return ExtractorError::NoStreamsFound;
    }
    ExtractorError::Other(msg.to_string())
}
