use thiserror::Error;

/// Failure details from a REST collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// HTTP status, absent when the request never got a response.
    pub status: Option<u16>,
    pub message: String,
}

impl FetchFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "server returned {status}: {}", self.message),
            None => write!(f, "request failed: {}", self.message),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("handshake rejected: {0}")]
    Protocol(String),
    #[error("channel is not connected")]
    NotConnected,
    #[error("history fetch failed: {0}")]
    HistoryFetch(FetchFailure),
    #[error("directory fetch failed: {0}")]
    DirectoryFetch(FetchFailure),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::Authentication(_) => "authentication_error",
            ChatError::Protocol(_) => "protocol_error",
            ChatError::NotConnected => "not_connected",
            ChatError::HistoryFetch(_) => "history_fetch_error",
            ChatError::DirectoryFetch(_) => "directory_fetch_error",
            ChatError::Transport(_) => "transport_error",
            ChatError::Decode(_) => "decode_error",
        }
    }

    /// True when a collaborator answered 401 and the session was dropped.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            ChatError::HistoryFetch(f) | ChatError::DirectoryFetch(f) => f.status == Some(401),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Decode(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match &e {
            WsError::Http(resp) if matches!(resp.status().as_u16(), 401 | 403) => {
                ChatError::Authentication(format!("upgrade rejected with {}", resp.status()))
            }
            _ => ChatError::Transport(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
