use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Backend error: {message} (status: {status})")]
    Transport { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Decoding error: {0}")]
    Decode(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cancelled")]
    Cancelled,
}

impl Error {
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Errors a user can do something about (retry, fix the backend).
    /// `InvalidState` is excluded on purpose: it indicates a logic bug.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::InvalidState(_))
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Error::InvalidState(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
