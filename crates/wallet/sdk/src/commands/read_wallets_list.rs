use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::debug;

use super::{Command, decode_body, frame, require_card, require_firmware};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder, TlvDecoder};
use crate::types::{Card, FirmwareVersion, Wallet};
use crate::{Error, Result};

/// Interaction mode selecting the wallet list instead of the card record
const INTERACTION_MODE_WALLETS: u8 = 0x02;

/// READ (wallet list): one page of wallets starting at `cursor`
///
/// Writes nothing; [`crate::tasks::ReadWalletsListTask`] assembles pages
/// and stores the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWalletsListCommand {
    cursor: u8,
}

impl ReadWalletsListCommand {
    /// Request the page starting at wallet `cursor`
    pub const fn new(cursor: u8) -> Self {
        Self { cursor }
    }

    /// First wallet index requested
    pub const fn cursor(&self) -> u8 {
        self.cursor
    }
}

/// One page of the wallet list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletsPage {
    /// Total number of wallets the card holds
    pub total: u8,
    /// Wallets carried by this page
    pub wallets: Vec<Wallet>,
}

impl Command for ReadWalletsListCommand {
    type Response = WalletsPage;

    const INS: u8 = 0xF2;

    fn precondition(&self, card: Option<&Card>) -> Result<()> {
        require_firmware(require_card(card)?, FirmwareVersion::MULTI_WALLET)
    }

    fn serialize(&self, environment: &SessionEnvironment) -> Result<CommandApdu> {
        let body = TlvBuilder::new()
            .append(Tag::Pin, environment.access_code.hash())
            .append(Tag::CardId, environment.card_id()?)
            .append(Tag::InteractionMode, &INTERACTION_MODE_WALLETS)
            .append(Tag::WalletIndex, &self.cursor);
        frame(Self::INS, environment, body)
    }

    fn deserialize(
        &self,
        environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = decode_body(&response, environment)?;
        let total: u8 = decoder.decode(Tag::WalletsCount)?;

        let records: Vec<TlvDecoder> = decoder.decode_all(Tag::CardWallet)?;
        let wallets = records
            .iter()
            .enumerate()
            .map(|(offset, record)| -> Result<Wallet> {
                let default_index = self
                    .cursor
                    .checked_add(offset as u8)
                    .ok_or(Error::InvalidData("wallet index overflow"))?;
                Ok(Wallet::decode(record, default_index)?)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            cursor = self.cursor,
            received = wallets.len(),
            total,
            "Read wallets page"
        );
        Ok(WalletsPage { total, wallets })
    }
}
