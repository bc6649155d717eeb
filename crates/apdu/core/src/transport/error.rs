//! Error types specific to card transport

/// Transport error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to card")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// The card left the field mid-exchange
    #[error("Card lost")]
    TagLost,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Cancelled operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the exchange may be retried with the same frame bytes
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transmission | Self::TagLost | Self::Timeout)
    }
}
