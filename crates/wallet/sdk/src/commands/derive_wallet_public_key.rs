use bytes::Bytes;
use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::{Command, check_derivation, decode_body, frame, require_card, require_wallet};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, DerivationPath, ExtendedPublicKey};
use crate::{Error, Result};

/// DERIVE_WALLET_PUBLIC_KEY: ask the card for the public key of a child of
/// an HD wallet
///
/// Caches the result in the wallet's `derived_keys` in `environment.card`.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeyCommand {
    wallet_public_key: Bytes,
    path: DerivationPath,
}

impl DeriveWalletPublicKeyCommand {
    /// Derive `path` below the wallet holding `wallet_public_key`
    pub fn new(wallet_public_key: impl Into<Bytes>, path: DerivationPath) -> Self {
        Self {
            wallet_public_key: wallet_public_key.into(),
            path,
        }
    }

    /// Requested path
    pub const fn path(&self) -> &DerivationPath {
        &self.path
    }
}

impl Command for DeriveWalletPublicKeyCommand {
    type Response = ExtendedPublicKey;

    const INS: u8 = 0xD2;

    fn requires_wallet_list(&self) -> bool {
        true
    }

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        let card = require_card(card)?;
        let wallet = require_wallet(card, &self.wallet_public_key)?;
        check_derivation(card, wallet, &self.path)?;
        if !wallet.is_hd() {
            return Err(Error::DerivationNotSupported(wallet.curve));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::WalletPublicKey, &self.wallet_public_key)
            .append(Tag::WalletHdPath, &self.path);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let key = ExtendedPublicKey {
            public_key: decoder.decode(Tag::WalletPublicKey)?,
            chain_code: decoder.decode(Tag::WalletHdChain)?,
        };

        let wallet = environment
            .card_mut()?
            .wallet_mut(&self.wallet_public_key)
            .ok_or(Error::WalletNotFound)?;
        wallet.derived_keys.insert(self.path.clone(), key.clone());

        debug!(path = %self.path, index = wallet.index, "Derived wallet public key");
        Ok(key)
    }
}
