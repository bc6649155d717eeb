//! Settings masks
//!
//! All masks travel as 4-byte big-endian integers. Unknown bits set by newer
//! firmware are retained on decode.

use bytes::Bytes;

use crate::tlv::{Tag, TlvDecode, TlvEncode, TlvError, TlvValueType};

bitflags::bitflags! {
    /// Card-wide settings fixed at personalization
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CardSettings: u32 {
        /// Wallets can be recreated after purge
        const IS_REUSABLE = 1 << 0;
        /// Wallets may never be purged
        const PROHIBIT_PURGE_WALLET = 1 << 2;
        /// The access code may be changed
        const ALLOW_SET_ACCESS_CODE = 1 << 4;
        /// The passcode may be changed
        const ALLOW_SET_PASSCODE = 1 << 5;
        /// The factory access code may not be used
        const PROHIBIT_DEFAULT_ACCESS_CODE = 1 << 7;
        /// Security delay shortened for linked terminals
        const SMART_SECURITY_DELAY = 1 << 11;
        /// Plain communication is accepted
        const ALLOW_UNENCRYPTED = 1 << 12;
        /// Fast encryption is accepted
        const ALLOW_FAST_ENCRYPTION = 1 << 13;
        /// HD wallets are enabled
        const ALLOW_HD_WALLETS = 1 << 21;
        /// Backup is enabled
        const ALLOW_BACKUP = 1 << 22;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// Per-wallet settings chosen at creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WalletSettings: u32 {
        /// Wallet can not be purged
        const PERMANENT = 1 << 2;

        const _ = !0;
    }
}

bitflags::bitflags! {
    /// Settings the card holder may change at any time
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct UserSettings: u32 {
        /// Forgotten codes may be reset with a backup card
        const IS_USER_CODE_RECOVERY_ALLOWED = 1 << 0;

        const _ = !0;
    }
}

macro_rules! tlv_bitflags {
    ($($t:ty),+) => {
        $(
            impl TlvEncode for $t {
                fn to_tlv_value(&self) -> Bytes {
                    self.bits().to_tlv_value()
                }
            }

            impl TlvDecode for $t {
                const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::U32];

                fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
                    u32::from_tlv_value(tag, value).map(Self::from_bits_retain)
                }
            }
        )+
    };
}

tlv_bitflags!(CardSettings, WalletSettings, UserSettings);

impl Default for UserSettings {
    fn default() -> Self {
        Self::IS_USER_CODE_RECOVERY_ALLOWED
    }
}
