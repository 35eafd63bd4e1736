//! Segment redirect.
//!
//! Segments are never proxied. The rewritten manifest carries the upstream
//! reference in the `remote` query parameter and this handler hands it back
//! to the player as a redirect.

use axum::extract::{Path, Query};
use axum::response::Response;
use serde::Deserialize;
use tracing::debug;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::found;

#[derive(Debug, Deserialize)]
pub struct ChunkQuery {
    remote: Option<String>,
}

/// `GET /{chunk_prefix}/{stream_id}.ts?remote=...`
pub async fn chunk_redirect(
    Path(file): Path<String>,
    Query(query): Query<ChunkQuery>,
) -> ApiResult<Response> {
    let remote = query
        .remote
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'remote' parameter"))?;

    let stream_id = file.strip_suffix(".ts").unwrap_or(&file);
    debug!(stream_id, remote = %remote, "Redirecting segment");

    found(&remote)
}
