//! Value types shared by media elements.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of media flowing between elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MediaType {
    /// Audio tracks.
    Audio,
    /// Video tracks.
    Video,
    /// Data channels.
    Data,
}

impl MediaType {
    /// Wire name of the media type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
            Self::Video => "VIDEO",
            Self::Data => "DATA",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
