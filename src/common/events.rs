use super::types::ConnectionHandle;
use super::wire::WirePayload;

/// Events from the network task up to the session.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// The swarm is running under this transport address.
    Ready { local_id: String },
    Listening(String),
    /// Handshake with a peer we dialed succeeded.
    Opened(ConnectionHandle),
    /// A remote peer connected to us.
    Incoming(ConnectionHandle),
    Payload {
        handle: ConnectionHandle,
        payload: WirePayload,
    },
    /// The remote ended the session.
    Closed(ConnectionHandle),
    Errored {
        handle: Option<ConnectionHandle>,
        reason: String,
    },
}
