//! Channel metadata records and where they are loaded from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Default file extension of channel records on disk.
pub const DEFAULT_CHANNEL_EXTENSION: &str = "txt";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Length in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl Episode {
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            duration: Some(duration),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub meta: ChannelMeta,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

/// Read-only access to channel records.
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// Fetch the record of `channel_id`, or `None` if it does not exist.
    async fn find(&self, channel_id: &str) -> Result<Option<ChannelRecord>>;

    /// Fetch the record of `channel_id`, failing with `NotFound` on a miss.
    async fn get(&self, channel_id: &str) -> Result<ChannelRecord> {
        self.find(channel_id)
            .await?
            .ok_or_else(|| Error::not_found("Channel", channel_id))
    }
}

/// One JSON document per channel at `<dir>/<channel_id>.<ext>`, read on
/// every lookup so edits on disk are picked up immediately.
#[derive(Debug, Clone)]
pub struct FsChannelRepository {
    dir: PathBuf,
    extension: String,
}

impl FsChannelRepository {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_extension(dir, DEFAULT_CHANNEL_EXTENSION)
    }

    pub fn with_extension(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file, or `None` for ids that could escape `dir`.
    fn record_path(&self, channel_id: &str) -> Option<PathBuf> {
        let unsafe_id = channel_id.is_empty()
            || channel_id.contains(['/', '\\', '\0'])
            || channel_id.contains("..");
        if unsafe_id {
            return None;
        }
        Some(self.dir.join(format!("{channel_id}.{}", self.extension)))
    }
}

#[async_trait]
impl ChannelRepository for FsChannelRepository {
    async fn find(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        let Some(path) = self.record_path(channel_id) else {
            warn!(channel_id, "Rejected channel id");
            return Ok(None);
        };

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read channel record");
                return Ok(None);
            }
        };

        match serde_json::from_str::<ChannelRecord>(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Malformed channel record");
                Ok(None)
            }
        }
    }
}

/// Channel records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryChannelRepository {
    channels: RwLock<HashMap<String, ChannelRecord>>,
}

impl InMemoryChannelRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, channel_id: impl Into<String>, record: ChannelRecord) {
        self.channels.write().insert(channel_id.into(), record);
    }
}

#[async_trait]
impl ChannelRepository for InMemoryChannelRepository {
    async fn find(&self, channel_id: &str) -> Result<Option<ChannelRecord>> {
        Ok(self.channels.read().get(channel_id).cloned())
    }
}
