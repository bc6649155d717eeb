use cardlink_apdu_core::{CardError, CommandApdu, ResponseApdu};
use tracing::info;

use super::{Command, decode_body, default_error_mapping, frame, require_card};
use crate::environment::{SessionEnvironment, UserCode};
use crate::tlv::{Tag, TlvBuilder};
use crate::types::{Card, CardSettings};
use crate::{Error, Result};

/// Which code a [`SetUserCodeCommand`] replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CodeKind {
    AccessCode,
    Passcode,
}

/// SET_PIN: replace the access code or the passcode
///
/// On success writes `environment.access_code` or `environment.passcode`,
/// and `is_passcode_set` of `environment.card` for a passcode change.
#[derive(Debug, Clone)]
pub struct SetUserCodeCommand {
    kind: CodeKind,
    code: UserCode,
}

impl SetUserCodeCommand {
    /// Replace the access code with `code`
    pub const fn change_access_code(code: UserCode) -> Self {
        Self {
            kind: CodeKind::AccessCode,
            code,
        }
    }

    /// Replace the passcode with `code`
    pub const fn change_passcode(code: UserCode) -> Self {
        Self {
            kind: CodeKind::Passcode,
            code,
        }
    }
}

impl Command for SetUserCodeCommand {
    type Response = ();

    const INS: u8 = 0xFA;

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        let required = match self.kind {
            CodeKind::AccessCode => CardSettings::ALLOW_SET_ACCESS_CODE,
            CodeKind::Passcode => CardSettings::ALLOW_SET_PASSCODE,
        };
        if require_card(card)?.settings.contains(required) {
            Ok(())
        } else {
            Err(Error::CodeChangeNotAllowed)
        }
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let (new_access_code, new_passcode) = match self.kind {
            CodeKind::AccessCode => (&self.code, &environment.passcode),
            CodeKind::Passcode => (&environment.access_code, &self.code),
        };
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::Pin2, environment.passcode.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::NewPin, new_access_code.hash())
            .append(Tag::NewPin2, new_passcode.hash());
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        decode_body(&response, environment)?;
        match self.kind {
            CodeKind::AccessCode => environment.access_code = self.code.clone(),
            CodeKind::Passcode => {
                environment.passcode = self.code.clone();
                if let Some(card) = environment.card.as_mut() {
                    card.is_passcode_set = Some(!self.code.is_default());
                }
            }
        }
        info!(kind = ?self.kind, "User code changed");
        Ok(())
    }

    fn map_error(&self, error: CardError) -> Error {
        match error {
            CardError::InvalidAccessCode => Error::AccessCodeRequired,
            CardError::InvalidPasscode => Error::PasscodeRequired,
            other => default_error_mapping(other),
        }
    }
}
