//! Provider connection and invocation errors

use thiserror::Error;

/// Failure to bring a provider connection up
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Handshake failed (network, auth, protocol-version mismatch)
    #[error("handshake with {provider} failed: {message}")]
    Handshake { provider: String, message: String },

    /// No provider registered under this identity
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// Reconnect budget exhausted; the provider stays closed until restart
    #[error("{provider} permanently closed after {attempts} failed reconnect attempts")]
    Retired { provider: String, attempts: u32 },
}

impl ConnectError {
    pub fn handshake(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handshake {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

/// Failure of a single call into a connected provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// Connection dropped or transport broke mid-call
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error
    #[error("{0}")]
    Remote(String),
}

impl InvokeError {
    /// Whether a reconnect and a second attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, InvokeError::Transport(_))
    }
}

pub type InvokeResult<T> = Result<T, InvokeError>;
