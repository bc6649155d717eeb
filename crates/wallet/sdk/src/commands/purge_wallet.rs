use bytes::Bytes;
use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::info;

use super::{Command, decode_body, default_error_mapping, frame, require_card, require_wallet};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, CardSettings, CardStatus, WalletSettings};
use crate::{Error, Result};

/// PURGE_WALLET: irreversibly delete a wallet key
///
/// Removes the wallet from `environment.card`. On single-wallet firmware the
/// card status becomes [`CardStatus::Purged`].
#[derive(Debug, Clone)]
pub struct PurgeWalletCommand {
    public_key: Bytes,
}

impl PurgeWalletCommand {
    /// Purge the wallet with `public_key`
    pub fn new(public_key: impl Into<Bytes>) -> Self {
        Self {
            public_key: public_key.into(),
        }
    }
}

impl Command for PurgeWalletCommand {
    type Response = ();

    const INS: u8 = 0xFC;

    fn requires_wallet_list(&self) -> bool {
        true
    }

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        let card = require_card(card)?;
        if card.settings.contains(CardSettings::PROHIBIT_PURGE_WALLET) {
            return Err(Error::PurgeProhibited);
        }
        let wallet = require_wallet(card, &self.public_key)?;
        if wallet.settings.contains(WalletSettings::PERMANENT) {
            return Err(Error::PurgeProhibited);
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::Pin2, environment.passcode.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::WalletPublicKey, &self.public_key);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        decode_body(&response, environment)?;
        let card = environment.card_mut()?;
        let wallet = card.remove_wallet(&self.public_key).ok_or(Error::WalletNotFound)?;

        if !card.supports_multiple_wallets() {
            card.status = CardStatus::Purged;
        } else if card.wallets.is_empty() {
            card.status = CardStatus::Empty;
        }
        info!(card_id = %card.card_id, index = wallet.index, "Wallet purged");
        Ok(())
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidPasscode => Error::PasscodeRequired,
            other => default_error_mapping(other),
        }
    }
}
