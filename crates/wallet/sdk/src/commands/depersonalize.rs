use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::info;

use super::{Command, decode_body, frame};
use crate::Result;
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};

/// DEPERSONALIZE: return the card to its factory state
///
/// Clears `environment.card`; the card must be read again before further
/// commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepersonalizeCommand;

impl Command for DepersonalizeCommand {
    type Response = ();

    const INS: u8 = 0xE3;

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new().append(Tag::CardId, environment.card_id()?);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        decode_body(&response, environment)?;
        if let Some(card) = environment.card.take() {
            info!(card_id = %card.card_id, "Card depersonalized");
        }
        Ok(())
    }
}
