use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one connection to one remote peer.
///
/// `id` is unique for the lifetime of the process, so a handle that was
/// replaced by a newer connection to the same peer never compares equal to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub id: u64,
    pub peer_id: String,
}

impl ConnectionHandle {
    pub fn new(id: u64, peer_id: impl Into<String>) -> Self {
        Self {
            id,
            peer_id: peer_id.into(),
        }
    }
}

impl fmt::Display for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.id, self.peer_id)
    }
}
