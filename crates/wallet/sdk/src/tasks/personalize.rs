use async_trait::async_trait;
use cardlink_apdu_core::CardTransport;
use tracing::info;

use super::CardTask;
use crate::Result;
use crate::commands::{
    CardConfig, CreateWalletCommand, DepersonalizeCommand, PersonalizeCommand, ReadCommand,
};
use crate::session::CardSession;
use crate::types::Card;

/// Personalize a factory-fresh card and create one wallet per configured
/// curve
///
/// All-or-nothing: Personalize, Read, then CreateWallet for every curve.
/// Run it with [`crate::config::PreflightMode::None`] or on a card whose
/// preflight read reports [`crate::types::CardStatus::NotPersonalized`].
#[derive(Debug, Clone)]
pub struct PersonalizeTask {
    config: CardConfig,
}

impl PersonalizeTask {
    /// Personalize with `config`
    pub const fn new(config: CardConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CardTask for PersonalizeTask {
    type Output = Card;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        session
            .send(&PersonalizeCommand::new(self.config.clone()))
            .await?;
        session.send(&ReadCommand::new()).await?;

        for curve in &self.config.curves {
            session.send(&CreateWalletCommand::new(*curve)).await?;
        }

        let card = session.environment().card()?.clone();
        info!(card_id = %card.card_id, wallets = card.wallets.len(), "Card provisioned");
        Ok(card)
    }
}

/// Return a card to its factory state and read it again
///
/// All-or-nothing: Depersonalize, then Read.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepersonalizeTask;

#[async_trait]
impl CardTask for DepersonalizeTask {
    type Output = Card;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        session.send(&DepersonalizeCommand).await?;
        session.send(&ReadCommand::new()).await
    }
}
