use thiserror::Error;

pub type Result<T> = std::result::Result<T, TorClientError>;

#[derive(Error, Debug)]
pub enum TorClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {message}")]
    Transport { message: String, timeout: bool },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Circuit control error: {0}")]
    CircuitControl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TorClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: true,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }
}

impl From<reqwest::Error> for TorClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(e.to_string())
        } else if e.is_builder() {
            Self::Config(e.to_string())
        } else {
            Self::transport(e.to_string())
        }
    }
}
