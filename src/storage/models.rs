/// Primary key of the singleton user record.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Maximum number of characters kept in [`Chat::last_message`].
pub const LAST_MESSAGE_PREVIEW: usize = 30;

/// The local user. `user_id` is the libp2p PeerId derived from `keypair`
/// and is what remote peers dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub user_id: String,
    /// Protobuf-encoded libp2p keypair.
    pub keypair: Vec<u8>,
}

impl User {
    pub fn new(user_id: impl Into<String>, keypair: Vec<u8>) -> Self {
        Self {
            id: CURRENT_USER_KEY.to_string(),
            username: String::new(),
            user_id: user_id.into(),
            keypair,
        }
    }
}

/// Locally persisted summary of one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: String,
    pub peer_id: Option<String>,
    pub title: String,
    pub avatar: String,
    pub last_activity: i64,
    pub last_message: Option<String>,
    pub unread: u32,
}

impl Chat {
    /// A chat with a remote peer, titled after the first 8 characters of its id.
    pub fn with_peer(id: impl Into<String>, peer_id: &str, now: i64) -> Self {
        let short: String = peer_id.chars().take(8).collect();
        Self {
            id: id.into(),
            peer_id: Some(peer_id.to_string()),
            title: format!("Chat with {short}"),
            avatar: avatar_for(peer_id),
            last_activity: now,
            last_message: None,
            unread: 0,
        }
    }

    /// A chat not yet bound to any peer.
    pub fn untitled(id: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            peer_id: None,
            title: "New chat".to_string(),
            avatar: "N".to_string(),
            last_activity: now,
            last_message: None,
            unread: 0,
        }
    }

    /// Record activity: bumps `last_activity` and stores a truncated preview.
    pub fn touch(&mut self, content: &str, now: i64) {
        self.last_activity = now;
        self.last_message = Some(truncate_preview(content));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub content: String,
    pub sender: String,
    pub timestamp: i64,
    pub is_system: bool,
}

/// First character upper-cased, `?` for an empty string.
pub fn avatar_for(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_uppercase().collect())
        .unwrap_or_else(|| "?".to_string())
}

pub fn truncate_preview(content: &str) -> String {
    content.chars().take(LAST_MESSAGE_PREVIEW).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundaries() {
        let long = "я".repeat(40);
        let preview = truncate_preview(&long);
        assert_eq!(preview.chars().count(), LAST_MESSAGE_PREVIEW);
    }

    #[test]
    fn peer_chat_uses_short_title_and_avatar() {
        let chat = Chat::with_peer("a_b", "bob1234567890", 5);
        assert_eq!(chat.title, "Chat with bob12345");
        assert_eq!(chat.avatar, "B");
        assert_eq!(chat.unread, 0);
        assert!(chat.last_message.is_none());
    }
}
