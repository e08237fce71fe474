//! ICE candidates exchanged during WebRTC negotiation.

use crate::error::Result;
use kurento_rpc::Event;
use serde::{Deserialize, Serialize};

/// A single ICE candidate, in the shape both browsers and the media server
/// use on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    /// The SDP `candidate:` attribute line.
    pub candidate: String,
    /// Media stream identification tag.
    pub sdp_mid: String,
    /// Index of the media description the candidate belongs to.
    pub sdp_m_line_index: u32,
}

impl IceCandidate {
    /// Create a candidate.
    #[must_use]
    pub fn new(
        candidate: impl Into<String>,
        sdp_mid: impl Into<String>,
        sdp_m_line_index: u32,
    ) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: sdp_mid.into(),
            sdp_m_line_index,
        }
    }

    /// Extract the candidate carried by an `IceCandidateFound` event.
    ///
    /// The candidate is read from the event value itself, or from its `data`
    /// member when the server nests the payload there.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the event carries no well-formed candidate.
    pub fn from_event(event: &Event) -> Result<Self> {
        let candidate = match event.value.get("candidate") {
            Some(candidate) if !candidate.is_null() => candidate,
            _ => &event.value["data"]["candidate"],
        };
        Ok(Self::deserialize(candidate)?)
    }
}
