use std::{fmt, str::FromStr};

use bytes::{BufMut, Bytes, BytesMut};

use super::{CardSettings, EllipticCurve, FirmwareVersion, UserSettings, Wallet};
use crate::tlv::{Tag, TlvDecode, TlvDecoder, TlvEncode, TlvError, TlvValueType};

/// Card identifier, shown as upper-case hex
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardId(Bytes);

impl CardId {
    /// Wrap raw identifier bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw identifier bytes
    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl fmt::Display for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

impl fmt::Debug for CardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CardId({self})")
    }
}

impl FromStr for CardId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(compact).map(Self::new)
    }
}

impl TlvEncode for CardId {
    fn to_tlv_value(&self) -> Bytes {
        self.0.clone()
    }
}

impl TlvDecode for CardId {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::HexString];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        if value.is_empty() {
            return Err(TlvError::invalid(tag, "empty card id"));
        }
        Ok(Self(value.clone()))
    }
}

/// Personalization state of the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CardStatus {
    /// Factory state, awaiting personalization
    NotPersonalized,
    /// Personalized, no wallet created
    Empty,
    /// At least one wallet created
    Loaded,
    /// Single-wallet card whose wallet was purged
    Purged,
}

impl TlvEncode for CardStatus {
    fn to_tlv_value(&self) -> Bytes {
        let byte: u8 = match self {
            Self::NotPersonalized => 0x00,
            Self::Empty => 0x01,
            Self::Loaded => 0x02,
            Self::Purged => 0x03,
        };
        byte.to_tlv_value()
    }
}

impl TlvDecode for CardStatus {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U8];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        match u8::from_tlv_value(tag, value)? {
            0x00 => Ok(Self::NotPersonalized),
            0x01 => Ok(Self::Empty),
            0x02 => Ok(Self::Loaded),
            0x03 => Ok(Self::Purged),
            _ => Err(TlvError::invalid(tag, "unknown card status")),
        }
    }
}

/// Date the card was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
#[display("{year:04}-{month:02}-{day:02}")]
pub struct ManufactureDate {
    /// Year
    pub year: u16,
    /// Month, 1-based
    pub month: u8,
    /// Day of month, 1-based
    pub day: u8,
}

impl TlvEncode for ManufactureDate {
    fn to_tlv_value(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(4);
        buf.put_u16(self.year);
        buf.put_u8(self.month);
        buf.put_u8(self.day);
        buf.freeze()
    }
}

impl TlvDecode for ManufactureDate {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Date];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        let [y1, y2, month, day] = <[u8; 4]>::try_from(value.as_ref())
            .map_err(|_| TlvError::mismatch(tag, "4-byte date", value.len()))?;
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return Err(TlvError::invalid(tag, "date out of range"));
        }
        Ok(Self {
            year: u16::from_be_bytes([y1, y2]),
            month,
            day,
        })
    }
}

/// Everything the SDK knows about the card in the field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Card {
    /// Card identifier
    pub card_id: CardId,
    /// Personalization state
    pub status: CardStatus,
    /// Firmware version
    pub firmware_version: FirmwareVersion,
    /// Manufacturer name
    pub manufacturer_name: String,
    /// Card public key, absent before personalization
    pub card_public_key: Option<Bytes>,
    /// Card settings
    pub settings: CardSettings,
    /// User settings
    pub user_settings: UserSettings,
    /// Production batch
    pub batch_id: Option<Bytes>,
    /// Issuer name
    pub issuer_name: Option<String>,
    /// Production date
    pub manufacture_date: Option<ManufactureDate>,
    /// Curves wallets can be created on
    pub supported_curves: Vec<EllipticCurve>,
    /// Number of wallet slots
    pub max_wallets: u8,
    /// Number of created wallets as reported by the card
    pub wallets_count: u8,
    /// Wallets read so far, sorted by index
    pub wallets: Vec<Wallet>,
    /// Whether a non-default passcode is set
    pub is_passcode_set: Option<bool>,
    /// Whether the terminal key is linked to this card
    pub terminal_is_linked: bool,
}

impl Card {
    /// Decode the body of a read or personalize response
    pub(crate) fn decode(decoder: &TlvDecoder) -> Result<Self, TlvError> {
        let firmware_version: FirmwareVersion = decoder.decode(Tag::FirmwareVersion)?;
        let card_data: Option<TlvDecoder> = decoder.decode_optional(Tag::CardData)?;

        let mut supported_curves: Vec<EllipticCurve> = decoder.decode_all(Tag::CurveId)?;
        if supported_curves.is_empty() {
            supported_curves.push(EllipticCurve::Secp256k1);
        }

        // Single-wallet firmware reports its only wallet inline
        let mut wallets = Vec::new();
        if !firmware_version.supports(&FirmwareVersion::MULTI_WALLET)
            && decoder.contains(Tag::WalletPublicKey)
        {
            wallets.push(Wallet::decode(decoder, 0)?);
        }

        let card_data = card_data.as_ref();
        Ok(Self {
            card_id: decoder.decode(Tag::CardId)?,
            status: decoder.decode(Tag::Status)?,
            firmware_version,
            manufacturer_name: decoder.decode(Tag::ManufacturerName)?,
            card_public_key: decoder.decode_optional(Tag::CardPublicKey)?,
            settings: decoder
                .decode_optional(Tag::SettingsMask)?
                .unwrap_or(CardSettings::empty()),
            user_settings: decoder
                .decode_optional(Tag::UserSettingsMask)?
                .unwrap_or_default(),
            batch_id: card_data
                .map(|d| d.decode_optional(Tag::BatchId))
                .transpose()?
                .flatten(),
            issuer_name: card_data
                .map(|d| d.decode_optional(Tag::IssuerName))
                .transpose()?
                .flatten(),
            manufacture_date: card_data
                .map(|d| d.decode_optional(Tag::ManufactureDateTime))
                .transpose()?
                .flatten(),
            supported_curves,
            max_wallets: decoder.decode_optional(Tag::MaxWallets)?.unwrap_or(1),
            wallets_count: decoder
                .decode_optional(Tag::WalletsCount)?
                .unwrap_or(wallets.len() as u8),
            wallets,
            is_passcode_set: decoder
                .decode_optional::<bool>(Tag::Pin2IsDefault)?
                .map(|default| !default),
            terminal_is_linked: decoder
                .decode_optional(Tag::TerminalIsLinked)?
                .unwrap_or(false),
        })
    }

    /// Whether the firmware supports several wallets
    pub fn supports_multiple_wallets(&self) -> bool {
        self.firmware_version.supports(&FirmwareVersion::MULTI_WALLET)
    }

    /// Whether the firmware supports card-side HD derivation
    pub fn supports_hd_wallets(&self) -> bool {
        self.firmware_version.supports(&FirmwareVersion::HD_WALLET)
    }

    /// Wallet with the given public key
    pub fn wallet(&self, public_key: &[u8]) -> Option<&Wallet> {
        self.wallets.iter().find(|w| w.public_key == public_key)
    }

    /// Mutable wallet with the given public key
    pub fn wallet_mut(&mut self, public_key: &[u8]) -> Option<&mut Wallet> {
        self.wallets.iter_mut().find(|w| w.public_key == public_key)
    }

    /// Whether the card reports more wallets than have been read
    pub fn has_unread_wallets(&self) -> bool {
        self.supports_multiple_wallets() && self.wallets.len() < usize::from(self.wallets_count)
    }

    /// Lowest wallet slot not yet in use
    pub fn next_free_index(&self) -> Option<u8> {
        (0..self.max_wallets).find(|i| self.wallets.iter().all(|w| w.index != *i))
    }

    /// Insert or replace a wallet, keeping the list sorted by index
    pub(crate) fn upsert_wallet(&mut self, wallet: Wallet) {
        match self.wallets.binary_search_by_key(&wallet.index, |w| w.index) {
            Ok(pos) => self.wallets[pos] = wallet,
            Err(pos) => self.wallets.insert(pos, wallet),
        }
        self.wallets_count = self.wallets.len() as u8;
    }

    /// Remove the wallet with the given public key
    pub(crate) fn remove_wallet(&mut self, public_key: &[u8]) -> Option<Wallet> {
        let pos = self.wallets.iter().position(|w| w.public_key == public_key)?;
        let wallet = self.wallets.remove(pos);
        self.wallets_count = self.wallets.len() as u8;
        Some(wallet)
    }
}
