//! TLV codec
//!
//! Records are `tag (1 byte) | length (2 bytes, big-endian) | value`. A
//! sequence of records is simply their concatenation; order and repeated
//! tags are preserved in both directions.

mod decoder;
mod encoder;
mod tag;

use bytes::{BufMut, Bytes, BytesMut};

pub use decoder::{TlvDecode, TlvDecoder};
pub use encoder::{TlvBuilder, TlvEncode};
pub use tag::{Tag, TlvValueType};

/// Size of a record header
pub const HEADER_LEN: usize = 3;

/// TLV encoding and decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TlvError {
    /// The buffer ends inside a record header
    #[error("Truncated TLV header at offset {0}")]
    Truncated(usize),

    /// The declared length runs past the end of the buffer
    #[error("TLV length overrun for {tag}: declared {declared}, {remaining} bytes remaining")]
    LengthOverrun {
        /// Tag of the offending record
        tag: Tag,
        /// Declared value length
        declared: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// A value does not fit in the 2-byte length field
    #[error("TLV value for {tag} too long: {len} bytes")]
    ValueTooLong {
        /// Tag of the offending record
        tag: Tag,
        /// Value length
        len: usize,
    },

    /// A required tag is absent
    #[error("Missing field {0}")]
    MissingTag(Tag),

    /// The value width or encoding does not match the requested type
    #[error("Type mismatch for {tag}: expected {expected}, got {len} bytes")]
    TypeMismatch {
        /// Tag of the offending record
        tag: Tag,
        /// Expected value shape
        expected: &'static str,
        /// Actual value length
        len: usize,
    },

    /// The value has the right width but an invalid content
    #[error("Invalid value for {tag}: {reason}")]
    InvalidValue {
        /// Tag of the offending record
        tag: Tag,
        /// What is wrong with it
        reason: &'static str,
    },
}

impl TlvError {
    /// Create a type mismatch error
    pub const fn mismatch(tag: Tag, expected: &'static str, len: usize) -> Self {
        Self::TypeMismatch { tag, expected, len }
    }

    /// Create an invalid value error
    pub const fn invalid(tag: Tag, reason: &'static str) -> Self {
        Self::InvalidValue { tag, reason }
    }
}

/// A single tag-length-value record
#[derive(Clone, PartialEq, Eq)]
pub struct Tlv {
    tag: Tag,
    value: Bytes,
}

impl Tlv {
    /// Create a record
    pub fn new(tag: Tag, value: impl Into<Bytes>) -> Self {
        Self {
            tag,
            value: value.into(),
        }
    }

    /// Record tag
    pub const fn tag(&self) -> Tag {
        self.tag
    }

    /// Raw record value
    pub const fn value(&self) -> &Bytes {
        &self.value
    }

    /// Append the wire form of this record to `buf`
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<(), TlvError> {
        let len = u16::try_from(self.value.len()).map_err(|_| TlvError::ValueTooLong {
            tag: self.tag,
            len: self.value.len(),
        })?;
        buf.put_u8(self.tag.byte());
        buf.put_u16(len);
        buf.put_slice(&self.value);
        Ok(())
    }

    /// Encode an ordered sequence of records
    pub fn encode_all(records: &[Self]) -> Result<Bytes, TlvError> {
        let capacity = records.iter().map(|r| r.value.len() + HEADER_LEN).sum();
        let mut buf = BytesMut::with_capacity(capacity);
        for record in records {
            record.encode_into(&mut buf)?;
        }
        Ok(buf.freeze())
    }

    /// Decode an ordered sequence of records
    ///
    /// Fails if the buffer ends inside a header or a declared length runs
    /// past the end of the buffer.
    pub fn decode_all(data: &Bytes) -> Result<Vec<Self>, TlvError> {
        let mut records = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if data.len() - offset < HEADER_LEN {
                return Err(TlvError::Truncated(offset));
            }
            let tag = Tag::from(data[offset]);
            let declared = u16::from_be_bytes([data[offset + 1], data[offset + 2]]) as usize;
            let start = offset + HEADER_LEN;
            let remaining = data.len() - start;
            if declared > remaining {
                return Err(TlvError::LengthOverrun {
                    tag,
                    declared,
                    remaining,
                });
            }
            records.push(Self {
                tag,
                value: data.slice(start..start + declared),
            });
            offset = start + declared;
        }

        Ok(records)
    }
}

impl std::fmt::Debug for Tlv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = match self.tag.value_type() {
            TlvValueType::Utf8 | TlvValueType::Curve => String::from_utf8_lossy(&self.value).into_owned(),
            _ => hex::encode(&self.value),
        };
        write!(f, "{} [{}]: {}", self.tag, self.value.len(), value)
    }
}
