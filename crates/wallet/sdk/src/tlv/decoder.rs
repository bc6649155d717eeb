use bytes::Bytes;
use tracing::trace;

use super::{Tag, Tlv, TlvError, TlvValueType};

/// Types that can be read from a TLV value
///
/// Implementations check the byte width strictly; a value of the wrong size
/// is an error, never coerced.
pub trait TlvDecode: Sized {
    /// Declared tag value types this type can be read from
    const VALUE_TYPES: &'static [TlvValueType];

    /// Decode from the raw value of the record tagged `tag`
    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError>;
}

fn fixed<const N: usize>(tag: Tag, value: &Bytes, expected: &'static str) -> Result<[u8; N], TlvError> {
    <[u8; N]>::try_from(value.as_ref()).map_err(|_| TlvError::mismatch(tag, expected, value.len()))
}

impl TlvDecode for bool {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Bool];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        match fixed::<1>(tag, value, "1-byte boolean")? {
            [0x00] => Ok(false),
            [0x01] => Ok(true),
            _ => Err(TlvError::invalid(tag, "boolean must be 0 or 1")),
        }
    }
}

impl TlvDecode for u8 {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U8];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        Ok(fixed::<1>(tag, value, "1-byte integer")?[0])
    }
}

impl TlvDecode for u16 {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U16];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        fixed(tag, value, "2-byte integer").map(Self::from_be_bytes)
    }
}

impl TlvDecode for u32 {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U32];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        fixed(tag, value, "4-byte integer").map(Self::from_be_bytes)
    }
}

impl TlvDecode for String {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Utf8];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        std::str::from_utf8(value)
            .map(str::to_owned)
            .map_err(|_| TlvError::invalid(tag, "not valid UTF-8"))
    }
}

impl TlvDecode for Bytes {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Bytes, TlvValueType::HexString];

    fn from_tlv_value(_tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        Ok(value.clone())
    }
}

impl TlvDecode for TlvDecoder {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Nested];

    fn from_tlv_value(_tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        Self::new(value)
    }
}

/// Typed access to a decoded TLV sequence
///
/// Unknown tags are kept so nested structures can still be re-decoded from
/// their raw value.
#[derive(Debug, Clone, Default)]
pub struct TlvDecoder {
    records: Vec<Tlv>,
}

impl TlvDecoder {
    /// Decode `data` into records
    pub fn new(data: &Bytes) -> Result<Self, TlvError> {
        let records = Tlv::decode_all(data)?;
        trace!(?records, "Decoded TLV sequence");
        Ok(Self { records })
    }

    /// All records, in sequence order
    pub fn records(&self) -> &[Tlv] {
        &self.records
    }

    /// Whether at least one record carries `tag`
    pub fn contains(&self, tag: Tag) -> bool {
        self.raw(tag).is_some()
    }

    /// Raw value of the first record carrying `tag`
    pub fn raw(&self, tag: Tag) -> Option<&Bytes> {
        self.records.iter().find(|r| r.tag() == tag).map(Tlv::value)
    }

    /// Decode one value, checking `T` against the tag's declared type
    ///
    /// Tags missing from the table have no declared type and accept any `T`.
    fn decode_value<T: TlvDecode>(tag: Tag, value: &Bytes) -> Result<T, TlvError> {
        let declared = tag.value_type();
        if !matches!(tag, Tag::Unknown(_)) && !T::VALUE_TYPES.contains(&declared) {
            return Err(TlvError::mismatch(tag, declared.description(), value.len()));
        }
        T::from_tlv_value(tag, value)
    }

    /// Decode the first record carrying `tag`
    pub fn decode<T: TlvDecode>(&self, tag: Tag) -> Result<T, TlvError> {
        self.decode_optional(tag)?.ok_or(TlvError::MissingTag(tag))
    }

    /// Decode the first record carrying `tag`, if any
    ///
    /// A present record with a malformed value is still an error.
    pub fn decode_optional<T: TlvDecode>(&self, tag: Tag) -> Result<Option<T>, TlvError> {
        self.raw(tag)
            .map(|value| Self::decode_value(tag, value))
            .transpose()
    }

    /// Decode every record carrying `tag`, in sequence order
    pub fn decode_all<T: TlvDecode>(&self, tag: Tag) -> Result<Vec<T>, TlvError> {
        self.records
            .iter()
            .filter(|r| r.tag() == tag)
            .map(|r| Self::decode_value(tag, r.value()))
            .collect()
    }
}
