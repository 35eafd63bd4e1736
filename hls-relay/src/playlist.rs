//! Top-level playlist assembly.

use std::fmt::Write as _;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::channel::{ChannelRecord, Episode};
use crate::error::{Error, Result};
use crate::urls::RelayUrls;

/// Added to the longest episode when declaring the target duration.
pub const DEFAULT_TARGET_DURATION_MARGIN: u64 = 5;
/// Assumed length of an episode without a recorded duration.
const FALLBACK_EPISODE_DURATION: f64 = 10.0;
const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackMode {
    /// Every episode in stored order as a VOD playlist.
    Sequential,
    /// One random episode presented as an unbounded live feed.
    Shuffled,
}

/// URL path aliases selecting a [`PlaybackMode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeAliases {
    pub sequential: Vec<String>,
    pub shuffled: Vec<String>,
}

impl Default for ModeAliases {
    fn default() -> Self {
        Self {
            sequential: vec!["vod".to_string(), "sequential".to_string()],
            shuffled: vec!["random".to_string(), "shuffle".to_string()],
        }
    }
}

impl ModeAliases {
    pub fn resolve(&self, alias: &str) -> Option<PlaybackMode> {
        if self.sequential.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            Some(PlaybackMode::Sequential)
        } else if self.shuffled.iter().any(|a| a.eq_ignore_ascii_case(alias)) {
            Some(PlaybackMode::Shuffled)
        } else {
            None
        }
    }
}

pub struct PlaylistBuilder {
    urls: RelayUrls,
    player_user_agent: String,
    target_duration_margin: u64,
}

impl PlaylistBuilder {
    /// `player_user_agent` is announced in-band so players use it when
    /// requesting the per-episode manifests.
    pub fn new(urls: RelayUrls, player_user_agent: impl Into<String>) -> Self {
        Self {
            urls,
            player_user_agent: player_user_agent.into(),
            target_duration_margin: DEFAULT_TARGET_DURATION_MARGIN,
        }
    }

    pub fn with_target_duration_margin(mut self, margin: u64) -> Self {
        self.target_duration_margin = margin;
        self
    }

    /// Build the playlist of `channel_id` in `mode`.
    ///
    /// A channel without episodes has nothing to play and is reported as
    /// not found, never as an empty playlist.
    pub fn build(
        &self,
        channel_id: &str,
        channel: &ChannelRecord,
        mode: PlaybackMode,
    ) -> Result<String> {
        if channel.episodes.is_empty() {
            return Err(Error::not_found("Channel episodes", channel_id));
        }

        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str("#EXT-X-VERSION:3\n");
        out.push_str("#EXT-X-ALLOW-CACHE:NO\n");
        let _ = writeln!(out, "#EXTVLCOPT:http-user-agent={}", self.player_user_agent);

        match mode {
            PlaybackMode::Sequential => {
                out.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n");
                let _ = writeln!(
                    out,
                    "#EXT-X-TARGETDURATION:{}",
                    self.target_duration(&channel.episodes)
                );
                for (i, episode) in channel.episodes.iter().enumerate() {
                    if i > 0 {
                        out.push_str("#EXT-X-DISCONTINUITY\n");
                    }
                    self.push_episode(&mut out, episode);
                }
                out.push_str("#EXT-X-ENDLIST\n");
            }
            PlaybackMode::Shuffled => {
                // No VOD, target duration or end-list tags: players treat
                // the result as live and neither seek nor buffer ahead.
                if let Some(episode) = channel.episodes.choose(&mut rand::rng()) {
                    self.push_episode(&mut out, episode);
                }
            }
        }

        Ok(out)
    }

    fn target_duration(&self, episodes: &[Episode]) -> u64 {
        let longest = episodes
            .iter()
            .map(|e| e.duration.unwrap_or(FALLBACK_EPISODE_DURATION))
            .fold(0.0_f64, f64::max);
        longest.max(0.0).ceil() as u64 + self.target_duration_margin
    }

    fn push_episode(&self, out: &mut String, episode: &Episode) {
        let duration = episode.duration.unwrap_or(0.0);
        let title = episode
            .title
            .as_deref()
            .unwrap_or(UNKNOWN_TITLE)
            .replace(['\r', '\n'], " ");
        let _ = writeln!(out, "#EXTINF:{duration},{title}");
        let _ = writeln!(out, "{}", self.urls.manifest_url(&episode.id));
    }
}
