use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use libp2p::multiaddr::Protocol;
use libp2p::{Multiaddr, PeerId};
use tokio::sync::mpsc;

use crate::common::{ConnectionHandle, NetworkCommand, WirePayload};
use crate::error::{ChatError, InputError, Result};

/// Boundary to the peer-to-peer library. Calls return immediately; lifecycle
/// and inbound traffic arrive later as [`crate::common::NetworkEvent`]s.
pub trait Transport {
    /// Normalize a user-supplied target to the peer id it addresses.
    fn resolve_peer(&self, target: &str) -> Result<String> {
        Ok(target.to_string())
    }

    fn connect(&mut self, target: &str, sender: &str) -> Result<ConnectionHandle>;

    fn send(&mut self, handle: &ConnectionHandle, payload: WirePayload) -> Result<()>;

    fn close(&mut self, handle: &ConnectionHandle);
}

/// Shared source of connection ids for outbound and inbound handles.
#[derive(Debug, Clone, Default)]
pub struct HandleIds(Arc<AtomicU64>);

impl HandleIds {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// [`Transport`] backed by the libp2p swarm running in [`super::P2PClient`].
pub struct P2PTransport {
    command_sender: mpsc::Sender<NetworkCommand>,
    handle_ids: HandleIds,
}

impl P2PTransport {
    pub fn new(command_sender: mpsc::Sender<NetworkCommand>, handle_ids: HandleIds) -> Self {
        Self {
            command_sender,
            handle_ids,
        }
    }

    fn dispatch(&self, command: NetworkCommand) -> Result<()> {
        self.command_sender
            .try_send(command)
            .map_err(|err| ChatError::Transport(format!("network task unavailable: {err}")))
    }
}

impl Transport for P2PTransport {
    fn resolve_peer(&self, target: &str) -> Result<String> {
        parse_target(target)
            .map(|(peer_id, _)| peer_id.to_string())
            .ok_or_else(|| InputError::InvalidPeerId(target.to_string()).into())
    }

    fn connect(&mut self, target: &str, sender: &str) -> Result<ConnectionHandle> {
        let peer_id = self.resolve_peer(target)?;
        let handle = ConnectionHandle::new(self.handle_ids.next(), peer_id);
        self.dispatch(NetworkCommand::Connect {
            handle: handle.clone(),
            target: target.to_string(),
            sender: sender.to_string(),
        })?;
        Ok(handle)
    }

    fn send(&mut self, handle: &ConnectionHandle, payload: WirePayload) -> Result<()> {
        self.dispatch(NetworkCommand::Send {
            handle: handle.clone(),
            payload,
        })
    }

    fn close(&mut self, handle: &ConnectionHandle) {
        if let Err(err) = self.dispatch(NetworkCommand::Close {
            handle: handle.clone(),
        }) {
            log::warn!("Failed to close connection {handle}: {err}");
        }
    }
}

/// Accepts either a bare PeerId or a multiaddr ending in `/p2p/<PeerId>`.
pub fn parse_target(target: &str) -> Option<(PeerId, Option<Multiaddr>)> {
    if let Ok(peer_id) = PeerId::from_str(target) {
        return Some((peer_id, None));
    }

    let addr: Multiaddr = target.parse().ok()?;
    match addr.iter().last() {
        Some(Protocol::P2p(peer_id)) => Some((peer_id, Some(addr))),
        _ => None,
    }
}
