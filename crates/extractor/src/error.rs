use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractorError {
    #[error("process error: {0}")]
    Process(#[from] process_utils::ProcessError),
    #[error("backend timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("backend produced no output")]
    EmptyOutput,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("unsupported extractor")]
    UnsupportedExtractor,
    #[error("no streams found")]
    NoStreamsFound,
    #[error("other: {0}")]
    Other(String),
}
