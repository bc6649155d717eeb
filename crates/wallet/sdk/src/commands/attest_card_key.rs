use bytes::Bytes;
use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::{debug, warn};

use super::{Command, decode_body, frame, require_card};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, CardId, EllipticCurve};
use crate::{Error, Result};

/// Length of a generated challenge
pub const CHALLENGE_LEN: usize = 16;

/// ATTEST_CARD_KEY: prove the card holds the private half of its card key
///
/// The card signs `challenge || salt` with its card key. The signature is
/// verified against the card public key read in this session. Writes
/// nothing.
#[derive(Debug, Clone)]
pub struct AttestCardKeyCommand {
    challenge: Bytes,
}

impl AttestCardKeyCommand {
    /// Attest with a caller-chosen challenge
    pub fn new(challenge: impl Into<Bytes>) -> Self {
        Self {
            challenge: challenge.into(),
        }
    }

    /// Attest with a fresh random challenge from the session's crypto provider
    pub fn with_random_challenge(environment: &SessionEnvironment) -> Self {
        Self::new(environment.crypto.random_bytes(CHALLENGE_LEN))
    }

    /// Challenge sent to the card
    pub const fn challenge(&self) -> &Bytes {
        &self.challenge
    }
}

/// A verified card attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestCardKeyResponse {
    /// Card that produced the signature
    pub card_id: CardId,
    /// Card-chosen salt
    pub salt: Bytes,
    /// Signature over `challenge || salt`
    pub card_signature: Bytes,
    /// Terminal challenge
    pub challenge: Bytes,
}

impl AttestCardKeyResponse {
    /// Message the card signed
    pub fn signed_message(&self) -> Vec<u8> {
        [self.challenge.as_ref(), self.salt.as_ref()].concat()
    }
}

impl Command for AttestCardKeyCommand {
    type Response = AttestCardKeyResponse;

    const INS: u8 = 0xF3;

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        if require_card(card)?.card_public_key.is_none() {
            return Err(Error::MissingInput("card public key"));
        }
        if self.challenge.is_empty() {
            return Err(Error::MissingInput("challenge"));
        }
        Ok(())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::Challenge, &self.challenge);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let card = environment.card()?;
        let card_public_key = card
            .card_public_key
            .as_ref()
            .ok_or(Error::MissingInput("card public key"))?;

        if let Some(echo) = decoder.raw(Tag::Challenge) {
            if echo != &self.challenge {
                warn!(card_id = %card.card_id, "Card echoed a different challenge");
                return Err(Error::CardVerificationFailed);
            }
        }

        let attestation = AttestCardKeyResponse {
            card_id: decoder.decode(Tag::CardId)?,
            salt: decoder.decode(Tag::Salt)?,
            card_signature: decoder.decode(Tag::CardSignature)?,
            challenge: self.challenge.clone(),
        };

        let verified = environment.crypto.verify(
            &attestation.card_signature,
            &attestation.signed_message(),
            card_public_key,
            EllipticCurve::Secp256k1,
        )?;
        if !verified {
            warn!(card_id = %card.card_id, "Card attestation signature did not verify");
            return Err(Error::CardVerificationFailed);
        }

        debug!(card_id = %card.card_id, "Card key attested");
        Ok(attestation)
    }
}
