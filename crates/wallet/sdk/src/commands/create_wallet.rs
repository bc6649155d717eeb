use std::collections::BTreeMap;

use bytes::Bytes;
use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::info;

use super::{Command, decode_body, default_error_mapping, frame, require_card, require_curve};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, CardStatus, EllipticCurve, Wallet, WalletSettings, WalletStatus};
use crate::{Error, Result};

/// CREATE_WALLET: generate a key pair in a wallet slot
///
/// On success the new wallet is inserted into `environment.card` and the
/// card status becomes [`CardStatus::Loaded`].
#[derive(Debug, Clone)]
pub struct CreateWalletCommand {
    curve: EllipticCurve,
    index: Option<u8>,
    settings: WalletSettings,
}

impl CreateWalletCommand {
    /// Create a wallet on `curve` in the lowest free slot
    pub const fn new(curve: EllipticCurve) -> Self {
        Self {
            curve,
            index: None,
            settings: WalletSettings::empty(),
        }
    }

    /// Use a specific slot
    pub const fn with_index(mut self, index: u8) -> Self {
        self.index = Some(index);
        self
    }

    /// Wallet settings to apply
    pub const fn with_settings(mut self, settings: WalletSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Curve of the new wallet
    pub const fn curve(&self) -> EllipticCurve {
        self.curve
    }

    fn target_index(&self, card: &Card) -> Result<u8> {
        if !card.supports_multiple_wallets() {
            return Ok(0);
        }
        match self.index {
            Some(index) if index >= card.max_wallets => Err(Error::WalletCapacityReached),
            Some(index) if card.wallets.iter().any(|w| w.index == index) => {
                Err(Error::WalletAlreadyExists)
            }
            Some(index) => Ok(index),
            None => card.next_free_index().ok_or(Error::WalletCapacityReached),
        }
    }
}

/// The wallet created by [`CreateWalletCommand`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWallet {
    /// The new wallet
    pub wallet: Wallet,
}

impl Command for CreateWalletCommand {
    type Response = CreatedWallet;

    const INS: u8 = 0xF8;

    fn requires_wallet_list(&self) -> bool {
        true
    }

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        let card = require_card(card)?;
        require_curve(card, self.curve)?;
        if !card.supports_multiple_wallets() && card.status == CardStatus::Loaded {
            return Err(Error::WalletAlreadyExists);
        }
        self.target_index(card).map(|_| ())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let card = environment.card()?;
        let index = self.target_index(card)?;
        let mut body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::Pin2, environment.passcode.hash())
            .append(Tag::CardId, &card.card_id)
            .append(Tag::CurveId, &self.curve);
        if card.supports_multiple_wallets() {
            body = body.append(Tag::WalletIndex, &index);
        }
        if !self.settings.is_empty() {
            body = body.append(Tag::SettingsMask, &self.settings);
        }
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let card = environment.card_mut()?;

        let wallet = Wallet {
            index: decoder
                .decode_optional::<u8>(Tag::WalletIndex)?
                .map_or_else(|| self.target_index(card), Ok)?,
            public_key: decoder.decode(Tag::WalletPublicKey)?,
            chain_code: decoder.decode_optional::<Bytes>(Tag::WalletHdChain)?,
            curve: self.curve,
            settings: self.settings,
            status: WalletStatus::Loaded,
            total_signed_hashes: Some(0),
            derived_keys: BTreeMap::new(),
        };

        info!(
            card_id = %card.card_id,
            index = wallet.index,
            curve = %wallet.curve,
            "Wallet created"
        );
        card.upsert_wallet(wallet.clone());
        card.status = CardStatus::Loaded;
        Ok(CreatedWallet { wallet })
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidState | CardError::WalletAlreadyExists => Error::WalletAlreadyExists,
            CardError::InvalidPasscode => Error::PasscodeRequired,
            other => default_error_mapping(other),
        }
    }
}
