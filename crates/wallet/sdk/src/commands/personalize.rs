use bytes::Bytes;
use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::info;

use super::{CLA, Command};
use crate::environment::{SessionEnvironment, UserCode};
use crate::tlv::{Tag, TlvBuilder, TlvDecoder};
use crate::types::{Card, CardId, CardSettings, CardStatus, EllipticCurve, ManufactureDate};
use crate::{Error, Result};

/// Issuer-side description of a card to personalize
#[derive(Debug, Clone)]
pub struct CardConfig {
    /// Identifier to burn into the card
    pub card_id: CardId,
    /// Card settings
    pub settings: CardSettings,
    /// Production batch
    pub batch_id: Bytes,
    /// Issuer name
    pub issuer_name: String,
    /// Production date
    pub manufacture_date: ManufactureDate,
    /// Curves wallets can be created on. Wallets are created for each of
    /// them by [`crate::tasks::PersonalizeTask`].
    pub curves: Vec<EllipticCurve>,
    /// Number of wallet slots
    pub max_wallets: u8,
    /// Initial access code
    pub access_code: UserCode,
    /// Initial passcode
    pub passcode: UserCode,
}

/// PERSONALIZE: burn the issuer configuration into a factory-fresh card
///
/// Sent in the clear, before any card id is known. Writes
/// `environment.card`, `environment.access_code` and `environment.passcode`.
#[derive(Debug, Clone)]
pub struct PersonalizeCommand {
    config: CardConfig,
}

impl PersonalizeCommand {
    /// Personalize with `config`
    pub const fn new(config: CardConfig) -> Self {
        Self { config }
    }

    /// Configuration to apply
    pub const fn config(&self) -> &CardConfig {
        &self.config
    }
}

impl Command for PersonalizeCommand {
    type Response = Card;

    const INS: u8 = 0xF1;

    fn requires_encryption(&self) -> bool {
        false
    }

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        if card.is_some_and(|c| c.status != CardStatus::NotPersonalized) {
            return Err(Error::AlreadyPersonalized);
        }
        if self.config.curves.is_empty() {
            return Err(Error::MissingInput("curves"));
        }
        if self.config.max_wallets == 0 {
            return Err(Error::MissingInput("max wallets"));
        }
        Ok(())
    }

    fn serialize(&self, _environment: &SessionEnvironment) -> Result<CommandApdu> {
        let config = &self.config;
        let card_data = TlvBuilder::new()
            .append(Tag::BatchId, &config.batch_id)
            .append(Tag::ManufactureDateTime, &config.manufacture_date)
            .append(Tag::IssuerName, &config.issuer_name);
        let body = TlvBuilder::new()
            .append(Tag::CardId, &config.card_id)
            .append(Tag::SettingsMask, &config.settings)
            .append_nested(Tag::CardData, card_data)?
            .append_all(Tag::CurveId, &config.curves)
            .append(Tag::MaxWallets, &config.max_wallets)
            .append(Tag::NewPin, config.access_code.hash())
            .append(Tag::NewPin2, config.passcode.hash())
            .build()?;
        Ok(CommandApdu::new(CLA, Self::INS, 0x00, 0x00)
            .with_data(body)
            .with_le(0))
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let card = Card::decode(&TlvDecoder::new(response.data())?)?;
        if card.card_id != self.config.card_id {
            return Err(Error::WrongCard);
        }

        info!(card_id = %card.card_id, status = ?card.status, "Card personalized");
        environment.access_code = self.config.access_code.clone();
        environment.passcode = self.config.passcode.clone();
        environment.card = Some(card.clone());
        Ok(card)
    }
}
