//! Outbound command frames
//!
//! Frames use ISO/IEC 7816-4 header layout. Short length encoding is used
//! when the body and the expected response length fit, extended encoding
//! otherwise.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::cipher::{SessionCipher, SessionKey, seal};
use crate::{Error, Result};

/// Largest body an extended-length frame can carry
pub const MAX_DATA_LEN: usize = u16::MAX as usize;

/// Outbound command frame
///
/// Built fresh for every command invocation and never mutated afterwards;
/// [`CommandApdu::encrypt`] returns a new frame.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandApdu {
    /// Command class byte
    cla: u8,
    /// Instruction byte
    ins: u8,
    /// Parameter 1
    p1: u8,
    /// Parameter 2
    p2: u8,
    /// Command body
    data: Bytes,
    /// Expected response length (0 means "as much as available")
    le: Option<u16>,
}

impl CommandApdu {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Bytes::new(),
            le: None,
        }
    }

    /// Set the body
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }

    /// Set the expected response length
    pub const fn with_le(mut self, le: u16) -> Self {
        self.le = Some(le);
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command body
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Expected response length
    pub const fn expected_length(&self) -> Option<u16> {
        self.le
    }

    /// Whether the frame needs extended length encoding
    fn is_extended(&self) -> bool {
        self.data.len() > 255 || self.le.is_some_and(|le| le > 256)
    }

    /// Return a copy of this frame whose body is sealed in the encryption
    /// envelope under `key`
    pub fn encrypt(&self, key: &SessionKey, cipher: &dyn SessionCipher) -> Result<Self> {
        let sealed = seal(&self.data, key, cipher)?;
        trace!(
            ins = format_args!("{:#04x}", self.ins),
            plain_len = self.data.len(),
            sealed_len = sealed.len(),
            "Encrypted command body"
        );
        Ok(Self {
            data: sealed,
            ..self.clone()
        })
    }

    /// Convert to raw frame bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        if self.data.len() > MAX_DATA_LEN {
            return Err(Error::DataTooLong(self.data.len(), MAX_DATA_LEN));
        }

        let mut buffer = BytesMut::with_capacity(self.data.len() + 9);

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        let extended = self.is_extended();

        if !self.data.is_empty() {
            if extended {
                buffer.put_u8(0x00);
                buffer.put_u16(self.data.len() as u16);
            } else {
                buffer.put_u8(self.data.len() as u8);
            }
            buffer.put_slice(&self.data);
        }

        if let Some(le) = self.le {
            if extended {
                if self.data.is_empty() {
                    buffer.put_u8(0x00);
                }
                buffer.put_u16(le);
            } else {
                // 256 is encoded as 0x00 in short form
                buffer.put_u8(le as u8);
            }
        }

        Ok(buffer.freeze())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidCommandLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let rest = &data[4..];

        match rest.len() {
            0 => {}
            // Short Le only
            1 => command.le = Some(rest[0] as u16),
            // Extended Le only
            3 if rest[0] == 0x00 => command.le = Some(u16::from_be_bytes([rest[1], rest[2]])),
            _ if rest[0] == 0x00 => {
                let lc = u16::from_be_bytes([rest[1], rest[2]]) as usize;
                let body = &rest[3..];
                match body.len().checked_sub(lc) {
                    Some(0) => {}
                    Some(2) => command.le = Some(u16::from_be_bytes([body[lc], body[lc + 1]])),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
                command.data = Bytes::copy_from_slice(&body[..lc]);
            }
            _ => {
                let lc = rest[0] as usize;
                let body = &rest[1..];
                match body.len().checked_sub(lc) {
                    Some(0) => {}
                    Some(1) => command.le = Some(body[lc] as u16),
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
                command.data = Bytes::copy_from_slice(&body[..lc]);
            }
        }

        Ok(command)
    }
}

impl fmt::Debug for CommandApdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandApdu")
            .field("cla", &format_args!("{:#04x}", self.cla))
            .field("ins", &format_args!("{:#04x}", self.ins))
            .field("p1", &format_args!("{:#04x}", self.p1))
            .field("p2", &format_args!("{:#04x}", self.p2))
            .field("data", &hex::encode(&self.data))
            .field("le", &self.le)
            .finish()
    }
}
