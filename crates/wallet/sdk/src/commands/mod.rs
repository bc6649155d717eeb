//! Card commands
//!
//! Each command knows how to serialize itself given the session
//! environment, how to turn a successful response into a typed result and
//! which capabilities the card must have before it is worth sending.

mod attest_card_key;
mod create_wallet;
mod depersonalize;
mod derive_wallet_public_key;
mod open_session;
mod personalize;
mod purge_wallet;
mod read;
mod read_wallets_list;
mod set_user_code;
mod set_user_settings;
mod sign;

use std::fmt;

use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};

use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder, TlvDecoder};
use crate::types::{Card, DerivationPath, EllipticCurve, FirmwareVersion, Wallet};
use crate::{Error, Result};

pub use attest_card_key::{AttestCardKeyCommand, AttestCardKeyResponse, CHALLENGE_LEN};
pub use create_wallet::{CreateWalletCommand, CreatedWallet};
pub use depersonalize::DepersonalizeCommand;
pub use derive_wallet_public_key::DeriveWalletPublicKeyCommand;
pub use open_session::{OpenSessionCommand, OpenSessionResponse};
pub use personalize::{CardConfig, PersonalizeCommand};
pub use purge_wallet::PurgeWalletCommand;
pub use read::ReadCommand;
pub use read_wallets_list::{ReadWalletsListCommand, WalletsPage};
pub use set_user_code::SetUserCodeCommand;
pub use set_user_settings::SetUserSettingsCommand;
pub use sign::SignCommand;

/// Class byte shared by every command
pub const CLA: u8 = 0x00;

/// A single protocol operation
pub trait Command: Send + Sync + fmt::Debug {
    /// Typed result of a successful exchange
    type Response: Send + fmt::Debug;

    /// Instruction byte
    const INS: u8;

    /// Whether the command must go out encrypted when a mode is configured
    fn requires_encryption(&self) -> bool {
        true
    }

    /// Whether [`Self::precondition`] looks up wallets in the card record
    ///
    /// The session reads the wallet list first when the card reports wallets
    /// that were not read yet.
    fn requires_wallet_list(&self) -> bool {
        false
    }

    /// Capability check run before anything is transmitted
    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        let _ = card;
        Ok(())
    }

    /// Build the outbound frame
    ///
    /// Fails when a required input, such as the card id, is missing.
    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu>;

    /// Decode a successful response, updating the environment as documented
    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response>;

    /// Map a card-reported error to the error surfaced to the caller
    fn map_error(&self, error: CardError) -> Error {
        default_error_mapping(error)
    }
}

/// Remapping shared by every command
pub(crate) const fn default_error_mapping(error: CardError) -> Error {
    match error {
        CardError::WalletNotFound => Error::WalletNotFound,
        other => Error::Card(other),
    }
}

/// Frame header for `ins`, with the encryption mode in P1
pub(crate) fn frame(ins: u8, environment: &SessionEnvironment, body: TlvBuilder) -> Result<CommandApdu> {
    Ok(CommandApdu::new(CLA, ins, environment.encryption_mode.byte_value(), 0x00)
        .with_data(body.build()?)
        .with_le(0))
}

/// Decode a response body and, when present, check that it comes from the
/// card read in this session
pub(crate) fn decode_body(response: &ResponseApdu, environment: &SessionEnvironment) -> Result<TlvDecoder> {
    let decoder = TlvDecoder::new(response.data())?;
    if let (Some(card), Some(raw)) = (environment.card.as_ref(), decoder.raw(Tag::CardId)) {
        if card.card_id.as_bytes() != raw {
            return Err(Error::WrongCard);
        }
    }
    Ok(decoder)
}

pub(crate) fn require_card(card: Option<&Card>) -> Result<&Card> {
    card.ok_or(Error::MissingCard)
}

pub(crate) fn require_firmware(card: &Card, required: FirmwareVersion) -> Result<()> {
    if card.firmware_version.supports(&required) {
        Ok(())
    } else {
        Err(Error::FirmwareNotSupported { required })
    }
}

pub(crate) fn require_curve(card: &Card, curve: EllipticCurve) -> Result<()> {
    if curve.is_extended() {
        require_firmware(card, FirmwareVersion::EXTENDED_CURVES)?;
    }
    if card.supported_curves.contains(&curve) {
        Ok(())
    } else {
        Err(Error::UnsupportedCurve(curve))
    }
}

pub(crate) fn require_wallet<'a>(card: &'a Card, public_key: &[u8]) -> Result<&'a Wallet> {
    card.wallet(public_key).ok_or(Error::WalletNotFound)
}

/// Checks shared by every command that derives below a wallet key
pub(crate) fn check_derivation(card: &Card, wallet: &Wallet, path: &DerivationPath) -> Result<()> {
    require_firmware(card, FirmwareVersion::HD_WALLET)?;
    if !wallet.curve.supports_derivation() {
        return Err(Error::DerivationNotSupported(wallet.curve));
    }
    if wallet.curve.requires_hardened_derivation() && !path.is_fully_hardened() {
        return Err(Error::NonHardenedDerivationNotSupported);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::*;

    #[test]
    fn test_default_error_mapping() {
        assert!(matches!(
            default_error_mapping(CardError::WalletNotFound),
            Error::WalletNotFound
        ));
        assert!(matches!(
            default_error_mapping(CardError::InvalidState),
            Error::Card(CardError::InvalidState)
        ));
    }

    #[test]
    fn test_require_curve() {
        let card = card("4.52r");
        assert!(require_curve(&card, EllipticCurve::Secp256k1).is_ok());
        assert!(require_curve(&card, EllipticCurve::Ed25519Slip0010).is_ok());
        assert!(matches!(
            require_curve(&card, EllipticCurve::Secp256r1),
            Err(Error::UnsupportedCurve(EllipticCurve::Secp256r1))
        ));

        let old = test_utils::card("4.30r");
        assert!(matches!(
            require_curve(&old, EllipticCurve::Ed25519Slip0010),
            Err(Error::FirmwareNotSupported { .. })
        ));
    }

    #[test]
    fn test_check_derivation() {
        let card = card("4.52r");
        let path: DerivationPath = "m/44'/0'/0'/0/0".parse().unwrap();
        let hardened: DerivationPath = "m/44'/501'".parse().unwrap();

        let secp = wallet(0, EllipticCurve::Secp256k1);
        assert!(check_derivation(&card, &secp, &path).is_ok());

        let slip = wallet(1, EllipticCurve::Ed25519Slip0010);
        assert!(matches!(
            check_derivation(&card, &slip, &path),
            Err(Error::NonHardenedDerivationNotSupported)
        ));
        assert!(check_derivation(&card, &slip, &hardened).is_ok());

        let bls = wallet(2, EllipticCurve::Bls12381G2Aug);
        assert!(matches!(
            check_derivation(&card, &bls, &hardened),
            Err(Error::DerivationNotSupported(_))
        ));

        let old = test_utils::card("4.12r");
        assert!(matches!(
            check_derivation(&old, &secp, &path),
            Err(Error::FirmwareNotSupported { .. })
        ));
    }
}
