use bytes::{Bytes, BytesMut};
use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::debug;

use super::{
    Command, check_derivation, decode_body, default_error_mapping, frame, require_card,
    require_wallet,
};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, DerivationPath};
use crate::{Error, Result};

/// SIGN: sign one or more equally sized hashes with a wallet key
///
/// Updates the wallet's signed-hash counter in `environment.card` when the
/// card reports it.
#[derive(Debug, Clone)]
pub struct SignCommand {
    hashes: Vec<Bytes>,
    wallet_public_key: Bytes,
    derivation_path: Option<DerivationPath>,
}

impl SignCommand {
    /// Sign `hashes` with the wallet holding `wallet_public_key`
    pub fn new(hashes: Vec<Bytes>, wallet_public_key: impl Into<Bytes>) -> Self {
        Self {
            hashes,
            wallet_public_key: wallet_public_key.into(),
            derivation_path: None,
        }
    }

    /// Sign with the child key at `path` instead of the wallet key itself
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }

    /// Hashes to sign
    pub fn hashes(&self) -> &[Bytes] {
        &self.hashes
    }

    fn hash_size(&self) -> Result<u8> {
        let first = self.hashes.first().ok_or(Error::MissingInput("hashes"))?;
        if first.is_empty() || self.hashes.iter().any(|h| h.len() != first.len()) {
            return Err(Error::MissingInput("hashes of equal, non-zero size"));
        }
        u8::try_from(first.len()).map_err(|_| Error::MissingInput("hash size"))
    }
}

impl Command for SignCommand {
    type Response = Vec<Bytes>;

    const INS: u8 = 0xFB;

    fn requires_wallet_list(&self) -> bool {
        true
    }

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        self.hash_size()?;
        let card = require_card(card)?;
        let wallet = require_wallet(card, &self.wallet_public_key)?;
        if let Some(path) = &self.derivation_path {
            check_derivation(card, wallet, path)?;
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let hash_size = self.hash_size()?;
        let hashes: BytesMut = self.hashes.iter().flat_map(|h| h.iter().copied()).collect();

        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::Pin2, environment.passcode.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::WalletPublicKey, &self.wallet_public_key)
            .append(Tag::TransactionOutHashSize, &hash_size)
            .append(Tag::TransactionOutHash, &hashes.freeze())
            .append_optional(Tag::WalletHdPath, self.derivation_path.as_ref());
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let joined: Bytes = decoder.decode(Tag::WalletSignature)?;
        let signed_total: Option<u32> = decoder.decode_optional(Tag::WalletSignedHashes)?;

        let count = self.hashes.len();
        if joined.is_empty() || joined.len() % count != 0 {
            return Err(Error::InvalidData("signature length does not match hash count"));
        }
        let size = joined.len() / count;
        let signatures: Vec<Bytes> = (0..count)
            .map(|i| joined.slice(i * size..(i + 1) * size))
            .collect();

        if let Some(wallet) = environment
            .card
            .as_mut()
            .and_then(|card| card.wallet_mut(&self.wallet_public_key))
        {
            if signed_total.is_some() {
                wallet.total_signed_hashes = signed_total;
            }
        }

        debug!(count, signature_len = size, "Signed hashes");
        Ok(signatures)
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidPasscode => Error::PasscodeRequired,
            other => default_error_mapping(other),
        }
    }
}
