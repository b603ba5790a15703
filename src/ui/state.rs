use crate::error::Result;
use crate::network::Transport;
use crate::session::ChatSession;
use crate::storage::{Chat, Message};

/// UI-local state: text inputs, modal visibility and the last projection of
/// the store. The projection is rebuilt from scratch whenever the session
/// revision moves.
pub struct AppState {
    pub input_text: String,
    pub username_input: String,
    pub friend_input: String,
    pub show_connect_modal: bool,
    pub notice: Option<String>,
    pub chats: Vec<Chat>,
    pub messages: Vec<Message>,
    pub active_chat: Option<Chat>,
    seen_revision: Option<u64>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            input_text: String::new(),
            username_input: String::new(),
            friend_input: String::new(),
            show_connect_modal: false,
            notice: None,
            chats: Vec::new(),
            messages: Vec::new(),
            active_chat: None,
            seen_revision: None,
        }
    }

    /// Re-query chats and messages if anything changed since the last frame.
    pub fn refresh<T: Transport>(&mut self, session: &ChatSession<T>) -> Result<()> {
        if self.seen_revision == Some(session.revision()) {
            return Ok(());
        }
        self.chats = session.chat_list()?;
        self.messages = session.message_list()?;
        self.active_chat = session.active_chat()?;
        self.seen_revision = Some(session.revision());
        Ok(())
    }

    pub fn close_connect_modal(&mut self) {
        self.show_connect_modal = false;
        self.friend_input.clear();
    }
}
