use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The kind of upstream URL a resolution should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatClass {
    /// An HLS media or master manifest.
    Hls,
    /// A single progressive file (typically mp4).
    #[serde(alias = "mp4")]
    Progressive,
}

impl FormatClass {
    pub const fn as_str(&self) -> &'static str {
        match self {
            FormatClass::Hls => "hls",
            FormatClass::Progressive => "progressive",
        }
    }
}

impl fmt::Display for FormatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hls" => Ok(FormatClass::Hls),
            "progressive" | "mp4" => Ok(FormatClass::Progressive),
            other => Err(format!("unknown format class: {other}")),
        }
    }
}
