use std::{cmp::Ordering, str::FromStr};

use bytes::Bytes;
use derive_more::Display;

use crate::tlv::{Tag, TlvDecode, TlvError, TlvValueType};

/// Build flavour carried in the firmware suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FirmwareKind {
    /// Production release (`r`)
    #[display("r")]
    Release,
    /// Development build (`d SDK`)
    #[display("d SDK")]
    Sdk,
    /// Special build (anything else)
    #[display("")]
    Special,
}

/// Card firmware version, e.g. `4.52r`
///
/// Ordering only considers the numeric part.
#[derive(Debug, Clone, Copy, Eq, Display)]
#[display("{major}.{minor}{kind}")]
pub struct FirmwareVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build flavour
    pub kind: FirmwareKind,
}

impl FirmwareVersion {
    /// First version with multiple wallets per card
    pub const MULTI_WALLET: Self = Self::new(4, 0);
    /// First version with card-side HD derivation
    pub const HD_WALLET: Self = Self::new(4, 28);
    /// First version with SLIP-0010, BIP-340 and BLS curves
    pub const EXTENDED_CURVES: Self = Self::new(4, 39);

    /// Create a release version
    pub const fn new(major: u16, minor: u16) -> Self {
        Self {
            major,
            minor,
            kind: FirmwareKind::Release,
        }
    }

    /// Whether this version is at least `other`
    pub fn supports(&self, other: &Self) -> bool {
        self >= other
    }
}

impl PartialEq for FirmwareVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for FirmwareVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FirmwareVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl FromStr for FirmwareVersion {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, rest) = s.split_once('.').ok_or("missing '.' separator")?;
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (minor, suffix) = rest.split_at(digits);

        let kind = match suffix.trim() {
            "r" => FirmwareKind::Release,
            "d SDK" | "d" => FirmwareKind::Sdk,
            _ => FirmwareKind::Special,
        };

        Ok(Self {
            major: major.trim().parse().map_err(|_| "invalid major version")?,
            minor: minor.parse().map_err(|_| "invalid minor version")?,
            kind,
        })
    }
}

impl TlvDecode for FirmwareVersion {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Utf8];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        String::from_tlv_value(tag, value)?
            .parse()
            .map_err(|reason| TlvError::invalid(tag, reason))
    }
}
