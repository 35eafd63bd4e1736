//! Spoofed client identities.
//!
//! Upstream providers hand out different renditions (or refuse outright)
//! depending on who they believe is asking. An identity is simply a named
//! `User-Agent` string; the pool is configuration, not code.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const IOS: &str = "ios";
pub const ANDROID: &str = "android";
pub const TV: &str = "tv";
pub const VLC: &str = "vlc";
pub const EXO: &str = "exo";

const IOS_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
const ANDROID_UA: &str = "Mozilla/5.0 (Linux; Android 14; SM-S918B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.193 Mobile Safari/537.36";
const TV_UA: &str = "Mozilla/5.0 (SMART-TV; Linux; Tizen 2.4.0) AppleWebkit/538.1 (KHTML, like Gecko) SamsungBrowser/1.0 TV Safari/538.1";
const VLC_UA: &str = "VLC/3.0.18 LibVLC/3.0.18";
const EXO_UA: &str = "ExoPlayerLib/2.18.1";

/// A named spoofed client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub name: String,
    pub user_agent: String,
}

impl ClientIdentity {
    pub fn new(name: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Named identities keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityPool(BTreeMap<String, String>);

impl IdentityPool {
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, name: impl Into<String>, user_agent: impl Into<String>) {
        self.0.insert(name.into(), user_agent.into());
    }

    pub fn get(&self, name: &str) -> Option<ClientIdentity> {
        self.0
            .get(name)
            .map(|ua| ClientIdentity::new(name, ua.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` on top of `self`; entries in `other` win.
    pub fn merged_with(mut self, other: &IdentityPool) -> Self {
        for (name, ua) in &other.0 {
            self.0.insert(name.clone(), ua.clone());
        }
        self
    }
}

impl Default for IdentityPool {
    fn default() -> Self {
        let mut pool = Self::empty();
        pool.insert(IOS, IOS_UA);
        pool.insert(ANDROID, ANDROID_UA);
        pool.insert(TV, TV_UA);
        pool.insert(VLC, VLC_UA);
        pool.insert(EXO, EXO_UA);
        pool
    }
}
