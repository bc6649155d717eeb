//! Core error type for frame-level operations
//!
//! Everything that can go wrong while building, transmitting or parsing a
//! single frame ends up here. Status words are deliberately *not* errors at
//! this layer; see [`crate::response::status`] for the outcome mapping.

use crate::transport::TransportError;

/// Core error type that encompasses all frame-level failures
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// The transport failed to deliver the frame
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Response related errors
    //
    /// Response is shorter than the two trailing status bytes
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// The decrypted response envelope failed its length or CRC check,
    /// or could not be decrypted at all
    #[error("Invalid response APDU")]
    InvalidResponseApdu,

    //
    // Command related errors
    //
    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Data does not fit into a single frame
    #[error("Data too long: {0} bytes (max {1})")]
    DataTooLong(usize, usize),

    //
    // Cipher related errors
    //
    /// The symmetric cipher rejected its input
    #[error("Cipher error: {0}")]
    Cipher(&'static str),
}

impl Error {
    /// Create a new cipher error
    pub const fn cipher(message: &'static str) -> Self {
        Self::Cipher(message)
    }

    /// Whether this error stems from a malformed or tampered frame
    pub const fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            Self::ResponseTooShort(_) | Self::InvalidResponseApdu | Self::InvalidCommandLength(_)
        )
    }
}

/// Result type for frame-level operations
pub type Result<T> = std::result::Result<T, Error>;
