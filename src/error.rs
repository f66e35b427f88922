//! Error handling for the chat server

use std::fmt;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chat server error types
#[derive(Debug, Clone)]
pub enum ChatError {
    /// Network-related errors (bind, accept, socket I/O)
    Network(String),
    /// A connection's outbound queue is gone
    Connection(String),
    /// Bad command line
    Usage(String),
}

impl ChatError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            ChatError::Network(_) => 1000,
            ChatError::Connection(_) => 1004,
            ChatError::Usage(_) => 1013,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            ChatError::Network(msg) => msg,
            ChatError::Connection(msg) => msg,
            ChatError::Usage(msg) => msg,
        }
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        ChatError::Network(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        ChatError::Connection(msg.into())
    }

    /// Create a usage error
    pub fn usage<T: Into<String>>(msg: T) -> Self {
        ChatError::Usage(msg.into())
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatError::Network(msg) => write!(f, "Network error: {}", msg),
            ChatError::Connection(msg) => write!(f, "Connection error: {}", msg),
            ChatError::Usage(msg) => write!(f, "Usage error: {}", msg),
        }
    }
}

impl std::error::Error for ChatError {}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Network(format!("IO error: {}", err))
    }
}

/// Why a username could not be registered.
///
/// These are shown to the client verbatim, who is then asked for a name again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// Name was empty or whitespace only
    EmptyName,
    /// Name is bound to another active client
    NameTaken(String),
    /// Every slot is occupied
    RoomFull,
    /// The server stopped accepting clients
    ShuttingDown,
}

impl RegistrationError {
    /// Whether the client may try another name after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RegistrationError::ShuttingDown)
    }
}

impl fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationError::EmptyName => write!(f, "Username cannot be empty"),
            RegistrationError::NameTaken(name) => {
                write!(f, "Username '{}' is already taken", name)
            }
            RegistrationError::RoomFull => write!(f, "Chat room is full"),
            RegistrationError::ShuttingDown => write!(f, "Server is shutting down"),
        }
    }
}

impl std::error::Error for RegistrationError {}
