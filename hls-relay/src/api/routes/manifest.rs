//! Per-episode manifest proxy.
//!
//! Resolution falls through three tiers: a rewritten HLS manifest, a
//! redirect to the raw HLS URL when rewriting fails, and finally a redirect
//! to a progressive stream when no HLS URL could be resolved at all.

use axum::extract::{Path, State};
use axum::response::Response;
use stream_extractor::FormatClass;
use tracing::{info, warn};

use crate::api::error::ApiResult;
use crate::api::routes::{found, mpegurl_response};
use crate::api::server::AppState;
use crate::error::Error;

/// `GET /{manifest_prefix}/{stream_id}/index.m3u8`
pub async fn manifest_proxy(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> ApiResult<Response> {
    let hls_error = match state.resolver.resolve(&stream_id, FormatClass::Hls).await {
        Ok(hls_url) => {
            return match state.rewriter.fetch_and_rewrite(&hls_url, &stream_id).await {
                Ok(body) => Ok(mpegurl_response(body)),
                Err(e) => {
                    warn!(
                        stream_id = %stream_id,
                        error = %e,
                        "Manifest rewrite failed, redirecting to upstream manifest"
                    );
                    // An expired or revoked link would otherwise be served
                    // until its TTL runs out.
                    if e.is_rejection() {
                        state.resolver.invalidate(&stream_id, FormatClass::Hls);
                    }
                    found(&hls_url)
                }
            };
        }
        Err(e) => e,
    };

    info!(
        stream_id = %stream_id,
        error = %hls_error,
        "No HLS stream, falling back to progressive"
    );
    let progressive_url = state
        .resolver
        .resolve(&stream_id, FormatClass::Progressive)
        .await
        .map_err(Error::from)?;
    found(&progressive_url)
}
