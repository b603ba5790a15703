use super::types::ConnectionHandle;
use super::wire::WirePayload;

/// Commands from the session down to the network task.
#[derive(Debug, Clone)]
pub enum NetworkCommand {
    /// Dial `target` (a PeerId or a multiaddr ending in `/p2p/<PeerId>`)
    /// and perform the hello handshake.
    Connect {
        handle: ConnectionHandle,
        target: String,
        sender: String,
    },
    Send {
        handle: ConnectionHandle,
        payload: WirePayload,
    },
    Close {
        handle: ConnectionHandle,
    },
}
