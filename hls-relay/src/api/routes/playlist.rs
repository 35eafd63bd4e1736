//! Top-level channel playlists.

use axum::extract::{Path, State};
use axum::response::Response;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::mpegurl_response;
use crate::api::server::AppState;

/// `GET /{mode}/{channel_id}/playlist.m3u8`
pub async fn serve_playlist(
    State(state): State<AppState>,
    Path((mode, channel_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let playback = state
        .modes
        .resolve(&mode)
        .ok_or_else(|| ApiError::not_found(format!("Unknown playback mode '{mode}'")))?;

    let channel = state.channels.get(&channel_id).await?;
    let body = state.playlists.build(&channel_id, &channel, playback)?;

    info!(
        channel_id = %channel_id,
        channel = %channel.meta.name,
        mode = ?playback,
        episodes = channel.episodes.len(),
        "Serving playlist"
    );
    Ok(mpegurl_response(body))
}
