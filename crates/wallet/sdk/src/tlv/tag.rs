//! Tag table
//!
//! Every tag the SDK knows about, with the logical value type the card uses
//! for it. Typed decoding through [`super::TlvDecoder`] rejects a Rust type
//! that cannot carry the declared value type; unknown tags accept any.

use std::fmt;

/// Logical value type a tag carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvValueType {
    /// Raw bytes shown as hex (identifiers)
    HexString,
    /// UTF-8 text
    Utf8,
    /// 1-byte unsigned integer
    U8,
    /// 2-byte big-endian unsigned integer
    U16,
    /// 4-byte big-endian unsigned integer
    U32,
    /// 1-byte boolean
    Bool,
    /// Opaque bytes
    Bytes,
    /// 4-byte date: year (u16), month, day
    Date,
    /// Curve name as UTF-8
    Curve,
    /// Derivation path, 4 bytes per node
    DerivationPath,
    /// Nested TLV sequence
    Nested,
}

impl TlvValueType {
    /// Expected encoding, as reported in type mismatch errors
    pub const fn description(self) -> &'static str {
        match self {
            Self::HexString => "hex identifier",
            Self::Utf8 => "UTF-8 text",
            Self::U8 => "1-byte integer",
            Self::U16 => "2-byte integer",
            Self::U32 => "4-byte integer",
            Self::Bool => "1-byte boolean",
            Self::Bytes => "opaque bytes",
            Self::Date => "4-byte date",
            Self::Curve => "curve name",
            Self::DerivationPath => "derivation path",
            Self::Nested => "nested TLV",
        }
    }
}

macro_rules! tags {
    ($($(#[$meta:meta])* $name:ident = $value:literal => $kind:ident,)+) => {
        /// TLV tag identifier
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Tag {
            $($(#[$meta])* $name,)+
            /// Tag missing from the table; retained as-is
            Unknown(u8),
        }

        impl Tag {
            /// Wire value of this tag
            pub const fn byte(&self) -> u8 {
                match self {
                    $(Self::$name => $value,)+
                    Self::Unknown(b) => *b,
                }
            }

            /// Logical type of the value carried by this tag
            pub const fn value_type(&self) -> TlvValueType {
                match self {
                    $(Self::$name => TlvValueType::$kind,)+
                    Self::Unknown(_) => TlvValueType::Bytes,
                }
            }
        }

        impl From<u8> for Tag {
            fn from(value: u8) -> Self {
                match value {
                    $($value => Self::$name,)+
                    other => Self::Unknown(other),
                }
            }
        }
    };
}

tags! {
    /// Card identifier
    CardId = 0x01 => HexString,
    /// Card or wallet status
    Status = 0x02 => U8,
    /// Card public key
    CardPublicKey = 0x03 => Bytes,
    /// Elliptic curve name
    CurveId = 0x05 => Curve,
    /// Card or wallet settings mask
    SettingsMask = 0x0A => U32,
    /// Nested personalization data
    CardData = 0x0C => Nested,
    /// Maximum number of wallets on the card
    MaxWallets = 0x0E => U8,

    /// Access code hash
    Pin = 0x10 => Bytes,
    /// Passcode hash
    Pin2 = 0x11 => Bytes,
    /// New access code hash
    NewPin = 0x12 => Bytes,
    /// New passcode hash
    NewPin2 = 0x13 => Bytes,
    /// Attestation challenge
    Challenge = 0x16 => Bytes,
    /// Attestation salt
    Salt = 0x17 => Bytes,
    /// Card signature over challenge and salt
    CardSignature = 0x18 => Bytes,
    /// Terminal half of the session key exchange
    SessionKeyA = 0x1A => Bytes,
    /// Card half of the session key exchange
    SessionKeyB = 0x1B => Bytes,
    /// Remaining security delay in centiseconds
    Pause = 0x1C => U16,

    /// Manufacturer name
    ManufacturerName = 0x20 => Utf8,
    /// Interaction mode for multi-purpose instructions
    InteractionMode = 0x23 => U8,
    /// Legacy timing workaround marker
    LegacyMode = 0x29 => U8,
    /// User settings mask
    UserSettingsMask = 0x2F => U32,

    /// Concatenated hashes to sign
    TransactionOutHash = 0x50 => Bytes,
    /// Size of each hash to sign
    TransactionOutHashSize = 0x51 => U8,
    /// Whether the terminal is linked
    TerminalIsLinked = 0x58 => Bool,
    /// Whether the passcode is still the factory default
    Pin2IsDefault = 0x59 => Bool,
    /// Terminal public key
    TerminalPublicKey = 0x5C => Bytes,

    /// Wallet public key
    WalletPublicKey = 0x60 => Bytes,
    /// Concatenated signatures
    WalletSignature = 0x61 => Bytes,
    /// Total number of hashes signed by the wallet
    WalletSignedHashes = 0x63 => U32,
    /// Wallet slot index
    WalletIndex = 0x65 => U8,
    /// Number of created wallets
    WalletsCount = 0x66 => U8,
    /// Nested wallet record
    CardWallet = 0x68 => Nested,
    /// HD derivation path
    WalletHdPath = 0x6A => DerivationPath,
    /// HD chain code
    WalletHdChain = 0x6B => Bytes,

    /// Firmware version string
    FirmwareVersion = 0x80 => Utf8,
    /// Production batch identifier
    BatchId = 0x81 => HexString,
    /// Manufacture date
    ManufactureDateTime = 0x82 => Date,
    /// Issuer name
    IssuerName = 0x83 => Utf8,
    /// Manufacturer signature over the card id
    ManufacturerSignature = 0x86 => Bytes,
}

impl From<Tag> for u8 {
    fn from(tag: Tag) -> Self {
        tag.byte()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(b) => write!(f, "Unknown({b:#04x})"),
            other => write!(f, "{other:?}({:#04x})", other.byte()),
        }
    }
}
