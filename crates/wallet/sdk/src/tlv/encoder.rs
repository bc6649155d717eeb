use bytes::Bytes;

use super::{Tag, Tlv, TlvError};

/// Types that can be written as a TLV value
pub trait TlvEncode {
    /// Encode as a raw value
    fn to_tlv_value(&self) -> Bytes;
}

impl TlvEncode for bool {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(&[u8::from(*self)])
    }
}

impl TlvEncode for u8 {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(&[*self])
    }
}

impl TlvEncode for u16 {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl TlvEncode for u32 {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(&self.to_be_bytes())
    }
}

impl TlvEncode for str {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl TlvEncode for String {
    fn to_tlv_value(&self) -> Bytes {
        self.as_str().to_tlv_value()
    }
}

impl TlvEncode for [u8] {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl TlvEncode for Bytes {
    fn to_tlv_value(&self) -> Bytes {
        self.clone()
    }
}

impl<const N: usize> TlvEncode for [u8; N] {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

/// Builder for an ordered TLV sequence
#[derive(Debug, Default, Clone)]
pub struct TlvBuilder {
    records: Vec<Tlv>,
}

impl TlvBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a typed value
    pub fn append<T: TlvEncode + ?Sized>(mut self, tag: Tag, value: &T) -> Self {
        self.records.push(Tlv::new(tag, value.to_tlv_value()));
        self
    }

    /// Append a typed value if present
    pub fn append_optional<T: TlvEncode>(self, tag: Tag, value: Option<&T>) -> Self {
        match value {
            Some(value) => self.append(tag, value),
            None => self,
        }
    }

    /// Append one record per item, in iteration order
    pub fn append_all<'a, T: TlvEncode + 'a>(
        self,
        tag: Tag,
        values: impl IntoIterator<Item = &'a T>,
    ) -> Self {
        values
            .into_iter()
            .fold(self, |builder, value| builder.append(tag, value))
    }

    /// Append a nested sequence as a single record
    pub fn append_nested(self, tag: Tag, nested: Self) -> Result<Self, TlvError> {
        let value = nested.build()?;
        Ok(self.append(tag, &value))
    }

    /// Records appended so far
    pub fn records(&self) -> &[Tlv] {
        &self.records
    }

    /// Serialize the sequence
    pub fn build(self) -> Result<Bytes, TlvError> {
        Tlv::encode_all(&self.records)
    }
}
