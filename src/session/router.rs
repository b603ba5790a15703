use crate::common::{ConnectionHandle, NetworkEvent, WirePayload};
use crate::error::{ChatError, InputError, Result};
use crate::network::Transport;
use crate::storage::Message;

use super::connection::{ActiveConnection, ConnectionState, NetworkStatus};
use super::{ChatSession, SYSTEM_SENDER};

impl<T: Transport> ChatSession<T> {
    /// Apply one event from the network task.
    pub fn handle_event(&mut self, event: NetworkEvent) -> Result<()> {
        match event {
            NetworkEvent::Ready { local_id } => {
                if local_id != self.user.user_id {
                    log::warn!("Transport address {local_id} differs from user id {}", self.user.user_id);
                }
                log::info!("My peer ID is: {local_id}");
                self.network_status = NetworkStatus::Online;
                Ok(())
            }
            NetworkEvent::Listening(addr) => {
                let full = format!("{addr}/p2p/{}", self.user.user_id);
                if !self.listen_addrs.contains(&full) {
                    self.listen_addrs.push(full);
                }
                Ok(())
            }
            NetworkEvent::Opened(handle) => self.on_opened(handle),
            NetworkEvent::Incoming(handle) => self.on_incoming(handle),
            NetworkEvent::Payload { handle, payload } => self.on_payload(handle, payload),
            NetworkEvent::Closed(handle) => {
                self.on_closed(handle);
                Ok(())
            }
            NetworkEvent::Errored { handle, reason } => {
                self.on_errored(handle, &reason);
                Ok(())
            }
        }
    }

    /// Persist, then transmit, then refresh the chat summary. A failed
    /// transmission does not undo the local write.
    pub fn send_message(&mut self, content: &str) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(InputError::EmptyMessage.into());
        }
        let handle = match &self.connection {
            Some(conn) if conn.is_open() => conn.handle.clone(),
            _ => return Err(ChatError::NotConnected),
        };
        let chat_id = self.active_chat_id.clone().ok_or(ChatError::NoActiveChat)?;

        let sender = self.user.username.clone();
        let message = self.record_message(&chat_id, content, &sender, false)?;

        let payload = WirePayload::Message {
            content: content.to_string(),
            sender,
            timestamp: message.timestamp,
        };
        if let Err(err) = self.transport.send(&handle, payload) {
            log::error!("Failed to send message {}: {err}", message.id);
            self.chat_status = "Message not delivered".to_string();
        }

        self.refresh_summary(&chat_id, content)?;
        Ok(message)
    }

    /// Tell the peer we are typing. One notice per call, no debounce.
    pub fn notify_typing(&mut self) {
        let Some(conn) = self.connection.as_ref().filter(|conn| conn.is_open()) else {
            return;
        };
        let handle = conn.handle.clone();
        let payload = WirePayload::Typing {
            sender: self.user.username.clone(),
        };
        if let Err(err) = self.transport.send(&handle, payload) {
            log::debug!("Typing notice not sent: {err}");
        }
    }

    fn is_active_handle(&self, handle: &ConnectionHandle) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| conn.handle.id == handle.id)
    }

    fn on_opened(&mut self, handle: ConnectionHandle) -> Result<()> {
        let Some(conn) = self.connection.as_mut() else {
            log::debug!("Ignoring open for stale connection {handle}");
            return Ok(());
        };
        if conn.handle.id != handle.id {
            // Both sides dialed at once and the peer's hello arrived first.
            // The network task now routes this peer's traffic on `handle`.
            if conn.is_open() && conn.handle.peer_id == handle.peer_id {
                log::debug!("Moving session with {} from {} to {handle}", handle.peer_id, conn.handle);
                conn.handle = handle;
            } else {
                log::debug!("Ignoring open for stale connection {handle}");
            }
            return Ok(());
        }
        conn.state = ConnectionState::Open;
        log::info!("Connection established with {}", handle.peer_id);
        self.chat_status = "Connected".to_string();
        self.announce_connection(&handle.peer_id)
    }

    /// Someone connected to us: accept unconditionally and make it the
    /// active connection, pre-empting whatever was active before.
    fn on_incoming(&mut self, handle: ConnectionHandle) -> Result<()> {
        log::info!("Incoming connection from {}", handle.peer_id);
        if let Some(prev) = self.connection.take() {
            if prev.state.is_live() && prev.handle.peer_id != handle.peer_id {
                self.transport.close(&prev.handle);
            }
        }
        let peer_id = handle.peer_id.clone();
        self.connection = Some(ActiveConnection::open(handle));

        let chat_id = self.ensure_peer_chat(&peer_id)?;
        self.select_chat(&chat_id)?;
        self.chat_status = "Connected".to_string();
        self.announce_connection(&peer_id)
    }

    fn on_payload(&mut self, handle: ConnectionHandle, payload: WirePayload) -> Result<()> {
        if !self.is_active_handle(&handle) {
            log::debug!("Dropping payload from inactive connection {handle}");
            return Ok(());
        }

        match payload {
            WirePayload::Message { content, sender, .. } => {
                let chat_id = match self.active_chat_id.clone() {
                    Some(chat_id) => chat_id,
                    None => {
                        let chat_id = self.ensure_peer_chat(&handle.peer_id)?;
                        self.select_chat(&chat_id)?;
                        chat_id
                    }
                };
                log::debug!("Message from {sender} in {chat_id}");
                self.record_message(&chat_id, &content, &sender, false)?;
                self.refresh_summary(&chat_id, &content)
            }
            WirePayload::Typing { sender } => {
                self.chat_status = format!("{sender} is typing...");
                Ok(())
            }
            WirePayload::Hello { sender } => {
                log::debug!("Repeated hello from {sender} on {handle}");
                Ok(())
            }
            WirePayload::KeepAlive => Ok(()),
        }
    }

    fn on_closed(&mut self, handle: ConnectionHandle) {
        log::info!("Connection closed: {handle}");
        if !self.is_active_handle(&handle) {
            return;
        }
        if let Some(conn) = self.connection.as_mut() {
            conn.state = ConnectionState::Closed;
        }
        if self.active_chat_id.is_some() {
            self.chat_status = "Connection lost".to_string();
        }
    }

    fn on_errored(&mut self, handle: Option<ConnectionHandle>, reason: &str) {
        match handle {
            Some(handle) => {
                log::error!("Connection error on {handle}: {reason}");
                if !self.is_active_handle(&handle) {
                    return;
                }
                if let Some(conn) = self.connection.as_mut() {
                    conn.state = ConnectionState::Errored;
                }
                self.chat_status = "Connection error".to_string();
            }
            None => {
                log::error!("Network error: {reason}");
                self.network_status = NetworkStatus::Error;
            }
        }
    }

    fn announce_connection(&mut self, peer_id: &str) -> Result<()> {
        let Some(chat_id) = self.active_chat_id.clone() else {
            return Ok(());
        };
        self.record_message(
            &chat_id,
            &format!("You connected to {peer_id}"),
            SYSTEM_SENDER,
            true,
        )?;
        Ok(())
    }
}
