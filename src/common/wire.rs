use serde::{Deserialize, Serialize};

/// Payload exchanged with the remote peer. Serialized as JSON tagged by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WirePayload {
    Message {
        content: String,
        sender: String,
        timestamp: i64,
    },
    Typing {
        sender: String,
    },
    /// Sent by the dialer once the libp2p connection is up.
    Hello {
        sender: String,
    },
    /// Periodic traffic on an open session so the connection is not
    /// closed as idle. Never surfaced to the session.
    KeepAlive,
}

/// Reply to every [`WirePayload`] request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAck {
    pub accepted: bool,
}
