//! Session context: the in-memory state of one running client plus the
//! handlers that act on it.
//!
//! Everything runs on the UI thread. A handler reads and writes the store
//! synchronously and returns before the next event is processed, so chat
//! summary updates for the same chat never interleave.

pub mod bootstrap;
pub mod connection;
pub mod ids;
mod router;

use crate::error::{ChatError, InputError, Result};
use crate::network::Transport;
use crate::storage::{Chat, ChatDatabase, Message, User};

pub use bootstrap::{Identity, load_or_create_identity};
pub use connection::{ActiveConnection, ConnectionState, NetworkStatus};
pub use ids::{MessageIdGenerator, derive_chat_id, now_millis};

pub const SYSTEM_SENDER: &str = "System";

pub struct ChatSession<T: Transport> {
    store: ChatDatabase,
    transport: T,
    user: User,
    active_chat_id: Option<String>,
    connection: Option<ActiveConnection>,
    network_status: NetworkStatus,
    chat_status: String,
    listen_addrs: Vec<String>,
    notice: Option<String>,
    /// Bumped on every store write or chat switch; projections are rebuilt when it changes.
    revision: u64,
    ids: MessageIdGenerator,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(store: ChatDatabase, user: User, transport: T) -> Self {
        Self {
            store,
            transport,
            user,
            active_chat_id: None,
            connection: None,
            network_status: NetworkStatus::Offline,
            chat_status: String::new(),
            listen_addrs: Vec::new(),
            notice: None,
            revision: 0,
            ids: MessageIdGenerator::new(),
        }
    }

    // ========== Accessors ==========

    pub fn user_id(&self) -> &str {
        &self.user.user_id
    }

    pub fn username(&self) -> &str {
        &self.user.username
    }

    pub fn needs_username(&self) -> bool {
        self.user.username.is_empty()
    }

    pub fn active_chat_id(&self) -> Option<&str> {
        self.active_chat_id.as_deref()
    }

    pub fn connection(&self) -> Option<&ActiveConnection> {
        self.connection.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
            .as_ref()
            .map(|conn| conn.state)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// The composer is enabled only while the connection is open.
    pub fn can_compose(&self) -> bool {
        self.connection_state() == ConnectionState::Open
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network_status
    }

    pub fn chat_status(&self) -> &str {
        &self.chat_status
    }

    pub fn listen_addrs(&self) -> &[String] {
        &self.listen_addrs
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn store(&self) -> &ChatDatabase {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Surface a failed action: user-caused errors become a blocking notice,
    /// everything else is logged as well.
    pub fn report(&mut self, err: ChatError) {
        if !err.is_user_facing() {
            log::error!("{err}");
        }
        self.notice = Some(err.to_string());
    }

    // ========== Projections ==========

    /// Every chat, most recently active first.
    pub fn chat_list(&self) -> Result<Vec<Chat>> {
        Ok(self.store.all_chats()?)
    }

    /// Messages of the open chat, oldest first.
    pub fn message_list(&self) -> Result<Vec<Message>> {
        match &self.active_chat_id {
            Some(chat_id) => Ok(self.store.messages_for_chat(chat_id)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn active_chat(&self) -> Result<Option<Chat>> {
        match &self.active_chat_id {
            Some(chat_id) => Ok(self.store.get_chat(chat_id)?),
            None => Ok(None),
        }
    }

    // ========== User actions ==========

    pub fn save_username(&mut self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(InputError::EmptyUsername.into());
        }
        let mut user = self.user.clone();
        user.username = name.to_string();
        self.store.put_user(&user)?;
        self.user = user;
        self.revision += 1;
        log::info!("Username set to {name}");
        Ok(())
    }

    /// Start (or resume) a chat with `target`, a peer id or full address.
    pub fn connect_to_friend(&mut self, target: &str) -> Result<()> {
        let target = target.trim();
        if target.is_empty() {
            return Err(InputError::EmptyPeerId.into());
        }
        if target == self.user.user_id {
            return Err(InputError::SelfConnect.into());
        }
        let peer_id = self.transport.resolve_peer(target)?;
        if peer_id == self.user.user_id {
            return Err(InputError::SelfConnect.into());
        }

        let chat_id = self.ensure_peer_chat(&peer_id)?;
        self.select_chat(&chat_id)?;
        if !self.is_connected_to(&peer_id) {
            self.connect_to_peer(target)?;
        }
        Ok(())
    }

    /// Create a chat that is not bound to any peer and open it.
    pub fn create_new_chat(&mut self) -> Result<String> {
        let now = now_millis();
        let chat_id = derive_chat_id(&self.user.user_id, &format!("new_{now}"));
        self.store.put_chat(&Chat::untitled(chat_id.clone(), now))?;
        self.revision += 1;
        self.open_chat(&chat_id)?;
        Ok(chat_id)
    }

    /// Make `chat_id` the active chat and connect to its peer unless that
    /// peer already is the live connection.
    pub fn open_chat(&mut self, chat_id: &str) -> Result<()> {
        let Some(chat) = self.select_chat(chat_id)? else {
            return Ok(());
        };

        if let Some(peer_id) = chat.peer_id {
            if peer_id != self.user.user_id && !self.is_connected_to(&peer_id) {
                self.connect_to_peer(&peer_id)?;
            }
        }
        Ok(())
    }

    // ========== Internals shared with the router ==========

    fn select_chat(&mut self, chat_id: &str) -> Result<Option<Chat>> {
        self.active_chat_id = Some(chat_id.to_string());
        self.revision += 1;

        let Some(mut chat) = self.store.get_chat(chat_id)? else {
            log::warn!("Chat {chat_id} not found");
            return Ok(None);
        };
        if chat.unread > 0 {
            chat.unread = 0;
            self.store.put_chat(&chat)?;
        }
        Ok(Some(chat))
    }

    /// Return the id of the chat with `peer_id`, creating the record on first contact.
    fn ensure_peer_chat(&mut self, peer_id: &str) -> Result<String> {
        let chat_id = derive_chat_id(&self.user.user_id, peer_id);
        if self.store.get_chat(&chat_id)?.is_none() {
            self.store
                .put_chat(&Chat::with_peer(chat_id.clone(), peer_id, now_millis()))?;
            self.revision += 1;
            log::info!("Created chat {chat_id}");
        }
        Ok(chat_id)
    }

    fn is_connected_to(&self, peer_id: &str) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| conn.state.is_live() && conn.handle.peer_id == peer_id)
    }

    /// Replace the active connection with a new outbound one. The previous
    /// connection is closed first, without draining pending sends.
    fn connect_to_peer(&mut self, target: &str) -> Result<()> {
        self.close_active_connection();
        self.chat_status = "Connecting...".to_string();

        match self.transport.connect(target, &self.user.username) {
            Ok(handle) => {
                log::info!("Connecting to {}", handle.peer_id);
                self.connection = Some(ActiveConnection::connecting(handle));
                Ok(())
            }
            Err(err) => {
                self.chat_status = "Connection error".to_string();
                Err(err)
            }
        }
    }

    fn close_active_connection(&mut self) {
        if let Some(conn) = self.connection.take() {
            if conn.state.is_live() {
                log::info!("Closing connection {}", conn.handle);
                self.transport.close(&conn.handle);
            }
        }
    }

    fn record_message(
        &mut self,
        chat_id: &str,
        content: &str,
        sender: &str,
        is_system: bool,
    ) -> Result<Message> {
        let now = now_millis();
        let message = Message {
            id: self.ids.next_id(now),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            sender: sender.to_string(),
            timestamp: now,
            is_system,
        };
        self.store.put_message(&message)?;
        self.revision += 1;
        Ok(message)
    }

    /// Re-read the chat and store the new activity time and preview.
    /// Separate from the message write; a failure here leaves the message in place.
    fn refresh_summary(&mut self, chat_id: &str, content: &str) -> Result<()> {
        if let Some(mut chat) = self.store.get_chat(chat_id)? {
            chat.touch(content, now_millis());
            self.store.put_chat(&chat)?;
            self.revision += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashSet;

    use crate::common::{ConnectionHandle, WirePayload};
    use crate::error::{ChatError, Result};
    use crate::network::Transport;

    /// Records every call; connect hands out sequential handles.
    #[derive(Default)]
    pub struct RecordingTransport {
        pub connects: Vec<(String, String)>,
        pub sent: Vec<(ConnectionHandle, WirePayload)>,
        pub closed: Vec<ConnectionHandle>,
        pub fail_sends: bool,
        pub known_peers: Option<HashSet<String>>,
        next_id: u64,
    }

    impl Transport for RecordingTransport {
        fn resolve_peer(&self, target: &str) -> Result<String> {
            match &self.known_peers {
                Some(known) if !known.contains(target) => Err(
                    crate::error::InputError::InvalidPeerId(target.to_string()).into(),
                ),
                _ => Ok(target.to_string()),
            }
        }

        fn connect(&mut self, target: &str, sender: &str) -> Result<ConnectionHandle> {
            self.next_id += 1;
            self.connects.push((target.to_string(), sender.to_string()));
            Ok(ConnectionHandle::new(self.next_id, target))
        }

        fn send(&mut self, handle: &ConnectionHandle, payload: WirePayload) -> Result<()> {
            if self.fail_sends {
                return Err(ChatError::Transport("link down".into()));
            }
            self.sent.push((handle.clone(), payload));
            Ok(())
        }

        fn close(&mut self, handle: &ConnectionHandle) {
            self.closed.push(handle.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingTransport;
    use super::*;
    use crate::common::NetworkEvent;

    fn session(user_id: &str) -> ChatSession<RecordingTransport> {
        let store = ChatDatabase::in_memory().unwrap();
        let mut user = User::new(user_id, Vec::new());
        user.username = "Alice".to_string();
        store.put_user(&user).unwrap();
        ChatSession::new(store, user, RecordingTransport::default())
    }

    #[test]
    fn empty_username_is_rejected() {
        let mut session = session("alice");
        let err = session.save_username("   ").unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(InputError::EmptyUsername)));
        assert_eq!(session.username(), "Alice");
    }

    #[test]
    fn saved_username_is_persisted() {
        let mut session = session("alice");
        session.save_username("  Alicia ").unwrap();
        assert_eq!(session.username(), "Alicia");
        assert_eq!(session.store().get_user().unwrap().unwrap().username, "Alicia");
        assert!(!session.needs_username());
    }

    #[test]
    fn connect_validates_input() {
        let mut session = session("alice");
        assert!(matches!(
            session.connect_to_friend(" ").unwrap_err(),
            ChatError::InvalidInput(InputError::EmptyPeerId)
        ));
        assert!(matches!(
            session.connect_to_friend("alice").unwrap_err(),
            ChatError::InvalidInput(InputError::SelfConnect)
        ));
        assert!(session.transport().connects.is_empty());
        assert_eq!(session.store().chat_count().unwrap(), 0);
    }

    #[test]
    fn connecting_to_bob_creates_the_shared_chat() {
        let mut session = session("alice");
        session.connect_to_friend("bob").unwrap();

        assert_eq!(session.active_chat_id(), Some("alice_bob"));
        let chat = session.store().get_chat("alice_bob").unwrap().unwrap();
        assert_eq!(chat.peer_id.as_deref(), Some("bob"));
        assert_eq!(session.connection_state(), ConnectionState::Connecting);
        assert_eq!(session.transport().connects, vec![("bob".into(), "Alice".into())]);
        assert_eq!(session.chat_status(), "Connecting...");
    }

    #[test]
    fn bob_side_derives_the_same_chat_id() {
        let mut session = session("bob");
        session.connect_to_friend("alice").unwrap();
        assert_eq!(session.active_chat_id(), Some("alice_bob"));
    }

    #[test]
    fn reopening_an_open_chat_is_idempotent() {
        let mut session = session("alice");
        session.connect_to_friend("bob").unwrap();
        let handle = session.connection().unwrap().handle.clone();
        session.handle_event(NetworkEvent::Opened(handle)).unwrap();

        session.open_chat("alice_bob").unwrap();
        session.connect_to_friend("bob").unwrap();

        assert_eq!(session.store().chat_count().unwrap(), 1);
        assert_eq!(session.transport().connects.len(), 1);
        assert!(session.transport().closed.is_empty());
        assert!(session.can_compose());
    }

    #[test]
    fn opening_a_different_chat_closes_the_prior_connection() {
        let mut session = session("alice");
        session.connect_to_friend("bob").unwrap();
        let bob = session.connection().unwrap().handle.clone();
        session.handle_event(NetworkEvent::Opened(bob.clone())).unwrap();

        session.connect_to_friend("carol").unwrap();

        assert_eq!(session.transport().closed, vec![bob]);
        assert_eq!(session.active_chat_id(), Some("alice_carol"));
        assert_eq!(session.connection().unwrap().handle.peer_id, "carol");
        assert!(!session.can_compose());
    }

    #[test]
    fn new_chat_has_no_peer_and_does_not_connect() {
        let mut session = session("alice");
        let chat_id = session.create_new_chat().unwrap();

        let chat = session.store().get_chat(&chat_id).unwrap().unwrap();
        assert!(chat.peer_id.is_none());
        assert_eq!(chat.title, "New chat");
        assert_eq!(session.active_chat_id(), Some(chat_id.as_str()));
        assert!(session.transport().connects.is_empty());
    }

    #[test]
    fn opening_unknown_chat_is_a_no_op() {
        let mut session = session("alice");
        session.open_chat("missing").unwrap();
        assert!(session.transport().connects.is_empty());
        assert!(session.active_chat().unwrap().is_none());
    }

    #[test]
    fn opening_a_chat_clears_unread() {
        let mut session = session("alice");
        let mut chat = Chat::with_peer("alice_bob", "bob", 1);
        chat.unread = 3;
        session.store().put_chat(&chat).unwrap();

        session.open_chat("alice_bob").unwrap();
        assert_eq!(session.store().get_chat("alice_bob").unwrap().unwrap().unread, 0);
    }

    #[test]
    fn unknown_peer_is_invalid_input() {
        let mut session = session("alice");
        session.transport.known_peers = Some(["bob".to_string()].into_iter().collect());
        let err = session.connect_to_friend("mallory").unwrap_err();
        assert!(matches!(
            err,
            ChatError::InvalidInput(InputError::InvalidPeerId(_))
        ));
    }

    #[test]
    fn report_sets_a_blocking_notice() {
        let mut session = session("alice");
        session.report(ChatError::NotConnected);
        assert_eq!(session.take_notice().as_deref(), Some("No active connection!"));
        assert!(session.take_notice().is_none());
    }

    #[test]
    fn chat_list_is_sorted_by_activity() {
        let session = session("alice");
        session.store().put_chat(&Chat::with_peer("old", "x", 1)).unwrap();
        session.store().put_chat(&Chat::with_peer("new", "y", 9)).unwrap();
        let ids: Vec<_> = session.chat_list().unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
