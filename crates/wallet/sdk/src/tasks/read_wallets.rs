use std::collections::BTreeMap;

use async_trait::async_trait;
use cardlink_apdu_core::CardTransport;
use tracing::{debug, trace};

use super::CardTask;
use crate::commands::ReadWalletsListCommand;
use crate::session::CardSession;
use crate::types::Wallet;
use crate::{Error, Result};

/// Read every wallet, one page at a time
///
/// The cursor of each request is the number of distinct wallets received
/// so far. Pages may overlap; wallets are deduplicated by index. The sorted
/// list is stored in the card record only once complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadWalletsListTask;

#[async_trait]
impl CardTask for ReadWalletsListTask {
    type Output = Vec<Wallet>;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        let mut wallets = BTreeMap::new();

        loop {
            let cursor = u8::try_from(wallets.len())
                .map_err(|_| Error::InvalidData("too many wallets"))?;
            let page = session.send(&ReadWalletsListCommand::new(cursor)).await?;

            let before = wallets.len();
            for wallet in page.wallets {
                wallets.insert(wallet.index, wallet);
            }
            trace!(cursor, received = wallets.len(), total = page.total, "Wallet page");

            if wallets.len() >= usize::from(page.total) {
                break;
            }
            if wallets.len() == before {
                return Err(Error::InvalidData("wallet page carried no new wallets"));
            }
        }

        let mut wallets: Vec<Wallet> = wallets.into_values().collect();
        let card = session.environment_mut().card_mut()?;
        for wallet in &mut wallets {
            if let Some(known) = card.wallet(&wallet.public_key) {
                wallet.derived_keys.clone_from(&known.derived_keys);
            }
        }
        card.wallets = wallets.clone();
        card.wallets_count = card.wallets.len() as u8;
        debug!(count = wallets.len(), "Read wallet list");
        Ok(wallets)
    }
}
