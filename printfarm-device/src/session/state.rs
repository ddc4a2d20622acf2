//! Connection state machine of a device session
//!
//! Each state has its own transition function; an input a state does not
//! expect yields `None` and leaves the state untouched.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    AwaitingHandshake,
    SocketOpen,
    Authenticated,
    Streaming,
}

/// Things that happen to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionInput {
    /// A connection attempt begins
    Connect,
    /// Settings fetch, login or socket open failed
    HandshakeFailed,
    SocketOpened,
    CredentialSent,
    StatusReceived,
    Pong,
    /// Closed locally, remotely, or by a liveness timer
    SocketClosed,
}

impl ConnectionState {
    /// The state after `input`, or `None` if `input` is not valid here
    #[must_use]
    pub fn next(self, input: SessionInput) -> Option<Self> {
        match self {
            Self::Disconnected => from_disconnected(input),
            Self::AwaitingHandshake => from_awaiting_handshake(input),
            Self::SocketOpen => from_socket_open(input),
            Self::Authenticated => from_authenticated(input),
            Self::Streaming => from_streaming(input),
        }
    }

    /// A socket exists in this state
    #[must_use]
    pub const fn has_socket(self) -> bool {
        matches!(self, Self::SocketOpen | Self::Authenticated | Self::Streaming)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::AwaitingHandshake => "awaiting_handshake",
            Self::SocketOpen => "socket_open",
            Self::Authenticated => "authenticated",
            Self::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

const fn from_disconnected(input: SessionInput) -> Option<ConnectionState> {
    match input {
        SessionInput::Connect => Some(ConnectionState::AwaitingHandshake),
        _ => None,
    }
}

const fn from_awaiting_handshake(input: SessionInput) -> Option<ConnectionState> {
    match input {
        SessionInput::SocketOpened => Some(ConnectionState::SocketOpen),
        SessionInput::HandshakeFailed => Some(ConnectionState::Disconnected),
        _ => None,
    }
}

const fn from_socket_open(input: SessionInput) -> Option<ConnectionState> {
    match input {
        SessionInput::CredentialSent => Some(ConnectionState::Authenticated),
        SessionInput::Pong => Some(ConnectionState::SocketOpen),
        SessionInput::SocketClosed => Some(ConnectionState::Disconnected),
        _ => None,
    }
}

const fn from_authenticated(input: SessionInput) -> Option<ConnectionState> {
    match input {
        SessionInput::StatusReceived => Some(ConnectionState::Streaming),
        SessionInput::Pong => Some(ConnectionState::Authenticated),
        SessionInput::SocketClosed => Some(ConnectionState::Disconnected),
        _ => None,
    }
}

const fn from_streaming(input: SessionInput) -> Option<ConnectionState> {
    match input {
        SessionInput::StatusReceived | SessionInput::Pong => Some(ConnectionState::Streaming),
        SessionInput::SocketClosed => Some(ConnectionState::Disconnected),
        _ => None,
    }
}
