use crate::identity::{self, ClientIdentity, IdentityPool};
use crate::media::FormatClass;

/// One attempt at resolving a stream: a format selector for the backend,
/// optionally paired with a spoofed identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Strategy {
    pub name: String,
    pub format_selector: String,
    pub identity: Option<ClientIdentity>,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        format_selector: impl Into<String>,
        identity: Option<ClientIdentity>,
    ) -> Self {
        Self {
            name: name.into(),
            format_selector: format_selector.into(),
            identity,
        }
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.user_agent.as_str())
    }
}

/// Built-in fallback chains, most specific first.
///
/// HLS prefers an iOS identity (which is most likely to be offered an HLS
/// master) and falls back to the backend's own best pick. Progressive
/// prefers an Android mp4 and falls back to the classic muxed itags.
pub fn default_strategies(format: FormatClass, identities: &IdentityPool) -> Vec<Strategy> {
    match format {
        FormatClass::Hls => vec![
            Strategy::new(
                "hls-ios",
                "best[protocol^=m3u8]",
                identities.get(identity::IOS),
            ),
            Strategy::new("hls-generic", "b", None),
        ],
        FormatClass::Progressive => vec![
            Strategy::new(
                "progressive-android",
                "best[ext=mp4]",
                identities.get(identity::ANDROID),
            ),
            Strategy::new("progressive-generic", "18/22", None),
        ],
    }
}
