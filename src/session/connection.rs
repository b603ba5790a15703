use std::fmt;

use crate::common::ConnectionHandle;

/// Lifecycle of the single active connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closed,
    Errored,
}

impl ConnectionState {
    /// A connection that is either open or still being established.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

#[derive(Debug, Clone)]
pub struct ActiveConnection {
    pub handle: ConnectionHandle,
    pub state: ConnectionState,
}

impl ActiveConnection {
    pub fn connecting(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: ConnectionState::Connecting,
        }
    }

    pub fn open(handle: ConnectionHandle) -> Self {
        Self {
            handle,
            state: ConnectionState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

/// Status of the local node, shown next to the user's own id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Offline,
    Online,
    Error,
}

impl fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NetworkStatus::Offline => "Offline",
            NetworkStatus::Online => "Online",
            NetworkStatus::Error => "Error",
        };
        f.write_str(text)
    }
}
