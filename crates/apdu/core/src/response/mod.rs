//! Inbound response frames
//!
//! A response is a body followed by two status bytes. When a session key is
//! active, bodies of at least one cipher block carry the encryption envelope
//! and are decrypted transparently.

pub mod status;

use bytes::Bytes;
use tracing::{debug, trace};

use crate::cipher::{BLOCK_LEN, SessionCipher, SessionKey, open};
use crate::{Error, Result};
use status::StatusWord;

/// Parsed response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    /// Response body (TLV sequence once decrypted)
    data: Bytes,
    /// Completion code
    status: StatusWord,
}

impl ResponseApdu {
    /// Create a response from its parts
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: status.into(),
        }
    }

    /// Parse a response from raw bytes (including status word)
    pub fn from_bytes(raw: &Bytes) -> Result<Self> {
        if raw.len() < 2 {
            debug!("Response too short: {} bytes", raw.len());
            return Err(Error::ResponseTooShort(raw.len()));
        }

        let len = raw.len();
        let status = StatusWord::new(raw[len - 2], raw[len - 1]);
        let data = raw.slice(..len - 2);

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = data.len(),
            "Parsed response frame"
        );

        Ok(Self { data, status })
    }

    /// Response body
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Completion code
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Decrypt the body under `key`
    ///
    /// Empty bodies and bodies shorter than one cipher block are returned
    /// unchanged: error responses and pre-negotiation replies carry no
    /// envelope. Anything else must pass the envelope's length and CRC
    /// checks or fails with [`Error::InvalidResponseApdu`].
    pub fn decrypt(self, key: &SessionKey, cipher: &dyn SessionCipher) -> Result<Self> {
        if self.data.len() < BLOCK_LEN {
            return Ok(self);
        }

        let data = open(&self.data, key, cipher)?;
        trace!(
            encrypted_len = self.data.len(),
            plain_len = data.len(),
            "Decrypted response body"
        );
        Ok(Self {
            data,
            status: self.status,
        })
    }

    /// Serialize back to raw bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut raw = Vec::with_capacity(self.data.len() + 2);
        raw.extend_from_slice(&self.data);
        raw.push(self.status.sw1);
        raw.push(self.status.sw2);
        Bytes::from(raw)
    }
}
