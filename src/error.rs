use thiserror::Error;

/// Rejected user input. Surfaced to the user as a blocking notice.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Please enter a name")]
    EmptyUsername,
    #[error("Please enter your friend's ID")]
    EmptyPeerId,
    #[error("Not a valid peer id or address: {0}")]
    InvalidPeerId(String),
    #[error("You cannot connect to yourself!")]
    SelfConnect,
    #[error("Message is empty")]
    EmptyMessage,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("storage unavailable: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    InvalidInput(#[from] InputError),

    #[error("No active connection!")]
    NotConnected,

    #[error("no chat is open")]
    NoActiveChat,

    #[error("identity error: {0}")]
    Identity(String),
}

impl ChatError {
    /// Errors the user caused directly; shown as a blocking notice rather than logged.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, ChatError::InvalidInput(_) | ChatError::NotConnected)
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
