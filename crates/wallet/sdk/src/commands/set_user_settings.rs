use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::debug;

use super::{Command, decode_body, default_error_mapping, frame, require_card};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, UserSettings};
use crate::{Error, Result};

/// SET_USER_SETTINGS: replace the user settings mask
///
/// Writes `user_settings` of `environment.card`.
#[derive(Debug, Clone, Copy)]
pub struct SetUserSettingsCommand {
    settings: UserSettings,
}

impl SetUserSettingsCommand {
    /// Replace the settings with `settings`
    pub const fn new(settings: UserSettings) -> Self {
        Self { settings }
    }
}

impl Command for SetUserSettingsCommand {
    type Response = UserSettings;

    const INS: u8 = 0xD4;

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        require_card(card).map(|_| ())
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::Pin2, environment.passcode.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::UserSettingsMask, &self.settings);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let settings = decoder
            .decode_optional(Tag::UserSettingsMask)?
            .unwrap_or(self.settings);

        let card = environment.card_mut()?;
        card.user_settings = settings;
        debug!(card_id = %card.card_id, ?settings, "Updated user settings");
        Ok(settings)
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidPasscode => Error::PasscodeRequired,
            other => default_error_mapping(other),
        }
    }
}
