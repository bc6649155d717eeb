//! Frame-level building blocks for secure-element wallet cards
//!
//! This crate covers everything that happens to a single command/response
//! exchange below the TLV layer:
//!
//! - Building outbound [`CommandApdu`] frames, optionally sealed in the
//!   length/CRC encryption envelope
//! - Parsing inbound [`ResponseApdu`] frames, with transparent decryption
//! - Mapping completion codes to a [`StatusOutcome`]
//! - The async [`CardTransport`] trait implemented by reader drivers
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod cipher;
pub mod command;
pub mod error;
pub mod response;
pub mod transport;

pub use cipher::{Aes256CbcCipher, EncryptionMode, SessionCipher, SessionKey, crc16};
pub use command::CommandApdu;
pub use error::{Error, Result};
pub use response::ResponseApdu;
pub use response::status::{CardError, StatusOutcome, StatusWord};
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error};

    pub use crate::CommandApdu;
    pub use crate::ResponseApdu;
    pub use crate::response::status::{CardError, StatusOutcome, StatusWord, codes};

    pub use crate::cipher::{Aes256CbcCipher, EncryptionMode, SessionCipher, SessionKey};

    pub use crate::transport::{CardTransport, TransportError};
}
