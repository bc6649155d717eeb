use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::debug;

use super::{Command, default_error_mapping, frame};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder, TlvDecoder};
use crate::types::Card;
use crate::{Error, Result};

/// READ: fetch the card record
///
/// Writes `environment.card`. On multi-wallet firmware the wallet list is
/// not part of the response; wallets already known from an earlier read in
/// the same session are carried over.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadCommand;

impl ReadCommand {
    /// Create a read command
    pub const fn new() -> Self {
        Self
    }
}

impl Command for ReadCommand {
    type Response = Card;

    const INS: u8 = 0xF2;

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append_optional(
                Tag::TerminalPublicKey,
                environment.terminal_keys.as_ref().map(|k| &k.public_key),
            );
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.data())?;
        let mut card = Card::decode(&decoder)?;

        if let Some(previous) = environment.card.take() {
            if previous.card_id == card.card_id && card.wallets.is_empty() {
                card.wallets = previous.wallets;
            }
        }

        debug!(
            card_id = %card.card_id,
            firmware = %card.firmware_version,
            status = ?card.status,
            "Read card"
        );
        environment.card = Some(card.clone());
        Ok(card)
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidParams | CardError::InvalidAccessCode => Error::AccessCodeRequired,
            other => default_error_mapping(other),
        }
    }
}
