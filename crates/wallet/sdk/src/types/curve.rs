use std::{fmt, str::FromStr};

use bytes::Bytes;

use crate::tlv::{Tag, TlvDecode, TlvEncode, TlvError, TlvValueType};

/// Elliptic curves a card can host wallets on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EllipticCurve {
    /// secp256k1 ECDSA
    Secp256k1,
    /// Ed25519 (card-native derivation)
    Ed25519,
    /// NIST P-256
    Secp256r1,
    /// BIP-340 Schnorr over secp256k1
    Bip0340,
    /// Ed25519 with SLIP-0010 derivation
    Ed25519Slip0010,
    /// BLS12-381 G2 with message augmentation
    Bls12381G2Aug,
}

impl EllipticCurve {
    /// Every known curve
    pub const ALL: [Self; 6] = [
        Self::Secp256k1,
        Self::Ed25519,
        Self::Secp256r1,
        Self::Bip0340,
        Self::Ed25519Slip0010,
        Self::Bls12381G2Aug,
    ];

    /// Name used on the wire
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Secp256k1 => "secp256k1",
            Self::Ed25519 => "ed25519",
            Self::Secp256r1 => "secp256r1",
            Self::Bip0340 => "bip0340",
            Self::Ed25519Slip0010 => "ed25519_slip0010",
            Self::Bls12381G2Aug => "bls12381_G2_AUG",
        }
    }

    /// Whether the card can derive child keys on this curve
    pub const fn supports_derivation(&self) -> bool {
        !matches!(self, Self::Bls12381G2Aug)
    }

    /// Whether derivation is restricted to hardened nodes
    pub const fn requires_hardened_derivation(&self) -> bool {
        matches!(self, Self::Ed25519Slip0010)
    }

    /// Whether wallets on this curve need the newer firmware line
    pub const fn is_extended(&self) -> bool {
        matches!(self, Self::Bip0340 | Self::Ed25519Slip0010 | Self::Bls12381G2Aug)
    }
}

impl fmt::Display for EllipticCurve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EllipticCurve {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.name() == s).ok_or(())
    }
}

impl TlvEncode for EllipticCurve {
    fn to_tlv_value(&self) -> Bytes {
        Bytes::from_static(self.name().as_bytes())
    }
}

impl TlvDecode for EllipticCurve {
    const VALUE_TYPES: &'static [TlvValueType] = &[TlvValueType::Curve];

    fn from_tlv_value(tag: Tag, value: &Bytes) -> Result<Self, TlvError> {
        String::from_tlv_value(tag, value)?
            .parse()
            .map_err(|_| TlvError::invalid(tag, "unknown curve"))
    }
}
