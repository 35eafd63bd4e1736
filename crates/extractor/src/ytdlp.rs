//! yt-dlp backed resolver.
//!
//! Runs `yt-dlp -g -f <selector> [--user-agent <ua>] <watch-url>` and takes
//! the first printed URL.

use std::process::Stdio;
use std::sync::LazyLock;

use async_trait::async_trait;
use tracing::debug;

use crate::backend::{ResolveRequest, ResolverBackend, first_url_line, watch_url};
use crate::error::ExtractorError;

pub const DEFAULT_YTDLP_PATH: &str = "yt-dlp";
pub const DEFAULT_WATCH_URL_TEMPLATE: &str = "https://www.youtube.com/watch?v={id}";

static YTDLP_AVAILABLE: LazyLock<bool> = LazyLock::new(|| binary_responds(DEFAULT_YTDLP_PATH));

pub(crate) fn binary_responds(path: &str) -> bool {
    let mut cmd = process_utils::std_command(path);
    cmd.arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.status().is_ok_and(|s| s.success())
}

#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    binary_path: String,
    watch_url_template: String,
    extra_args: Vec<String>,
}

impl YtDlpBackend {
    pub fn new(binary_path: Option<String>, watch_url_template: impl Into<String>) -> Self {
        Self {
            binary_path: binary_path
                .or_else(|| std::env::var("YTDLP_PATH").ok())
                .unwrap_or_else(|| DEFAULT_YTDLP_PATH.to_string()),
            watch_url_template: watch_url_template.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Best-effort check that the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        if self.binary_path == DEFAULT_YTDLP_PATH {
            *YTDLP_AVAILABLE
        } else {
            binary_responds(&self.binary_path)
        }
    }

    fn build_args(&self, request: &ResolveRequest<'_>) -> Vec<String> {
        let mut args = vec![
            "-g".to_owned(),
            "-f".to_owned(),
            request.strategy.format_selector.clone(),
        ];
        if let Some(ua) = request.strategy.user_agent() {
            args.push("--user-agent".to_owned());
            args.push(ua.to_owned());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push(watch_url(&self.watch_url_template, request.stream_id));
        args
    }
}

#[async_trait]
impl ResolverBackend for YtDlpBackend {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn invoke(&self, request: &ResolveRequest<'_>) -> Result<String, ExtractorError> {
        let mut cmd = process_utils::tokio_command(&self.binary_path);
        cmd.args(self.build_args(request));

        debug!(
            stream_id = request.stream_id,
            strategy = %request.strategy.name,
            "Invoking yt-dlp"
        );

        let out = process_utils::output_with_timeout(&mut cmd, request.timeout)
            .await
            .map_err(|e| match e {
                process_utils::ProcessError::TimedOut(d) => ExtractorError::Timeout(d),
                other => ExtractorError::Process(other),
            })?;

        if !out.status.success() {
            return Err(ExtractorError::NonZeroExit {
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }

        first_url_line(&out.stdout)
    }
}
