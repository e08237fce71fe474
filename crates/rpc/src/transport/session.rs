//! Session identifier learned from the server.

use parking_lot::RwLock;
use tracing::{debug, info};

/// Server-assigned session, attached to every request once known.
///
/// Survives reconnection so the server can resume the same logical session.
#[derive(Debug, Default)]
pub struct SessionState {
    session_id: RwLock<Option<String>>,
}

impl SessionState {
    /// Create a state with no session yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session id, if the server assigned one.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    /// Record the session id carried by an incoming frame.
    pub fn update(&self, session_id: &str) {
        let mut current = self.session_id.write();
        if current.as_deref() == Some(session_id) {
            return;
        }

        match current.replace(session_id.to_string()) {
            Some(old) => info!(old = %old, new = session_id, "Server changed session id"),
            None => debug!(session_id, "Session established"),
        }
    }
}
