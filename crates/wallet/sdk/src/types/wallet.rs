use std::collections::BTreeMap;

use bytes::Bytes;

use super::{DerivationPath, EllipticCurve, WalletSettings};
use crate::tlv::{Tag, TlvDecode, TlvDecoder, TlvError, TlvValueType};

/// Lifecycle of a wallet slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletStatus {
    /// Slot has never held a key
    Empty,
    /// Slot holds a key
    Loaded,
    /// Key was purged
    Purged,
}

impl TlvDecode for WalletStatus {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U8];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        match u8::from_tlv_value(tag, value)? {
            0x01 => Ok(Self::Empty),
            0x02 => Ok(Self::Loaded),
            0x03 => Ok(Self::Purged),
            _ => Err(TlvError::invalid(tag, "unknown wallet status")),
        }
    }
}

/// Public key plus chain code of a derived child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    /// Compressed public key
    pub public_key: Bytes,
    /// Chain code
    pub chain_code: Bytes,
}

/// A key pair held by the card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    /// Slot index
    pub index: u8,
    /// Wallet public key
    pub public_key: Bytes,
    /// Chain code, present for HD wallets
    pub chain_code: Option<Bytes>,
    /// Curve the key lives on
    pub curve: EllipticCurve,
    /// Wallet settings
    pub settings: WalletSettings,
    /// Slot status
    pub status: WalletStatus,
    /// Number of hashes signed so far, if the card reports it
    pub total_signed_hashes: Option<u32>,
    /// Derived keys cached during this session
    pub derived_keys: BTreeMap<DerivationPath, ExtendedPublicKey>,
}

impl Wallet {
    /// Decode a wallet record (the value of a `CardWallet` tag, or the
    /// top level of a read response on single-wallet firmware)
    pub(crate) fn decode(decoder: &TlvDecoder, default_index: u8) -> Result<Self, TlvError> {
        Ok(Self {
            index: decoder
                .decode_optional(Tag::WalletIndex)?
                .unwrap_or(default_index),
            public_key: decoder.decode(Tag::WalletPublicKey)?,
            chain_code: decoder.decode_optional(Tag::WalletHdChain)?,
            curve: decoder.decode(Tag::CurveId)?,
            settings: decoder
                .decode_optional(Tag::SettingsMask)?
                .unwrap_or(WalletSettings::empty()),
            status: decoder
                .decode_optional(Tag::Status)?
                .unwrap_or(WalletStatus::Loaded),
            total_signed_hashes: decoder.decode_optional(Tag::WalletSignedHashes)?,
            derived_keys: BTreeMap::new(),
        })
    }

    /// Whether this wallet can derive child keys
    pub fn is_hd(&self) -> bool {
        self.chain_code.is_some()
    }
}
