use async_trait::async_trait;
use cardlink_apdu_core::CardTransport;
use tracing::debug;

use super::{CardTask, ReadWalletsListTask};
use crate::Result;
use crate::commands::{AttestCardKeyCommand, AttestCardKeyResponse, ReadCommand};
use crate::session::CardSession;
use crate::storage::AttestationCache;
use crate::types::Card;

/// Read everything the application needs to show a card
///
/// Reuses the preflight read when there was one, reads all wallets on
/// multi-wallet firmware and optionally attests the card key.
#[derive(Debug, Clone, Default)]
pub struct ScanTask {
    attest: bool,
    cache: Option<AttestationCache>,
}

impl ScanTask {
    /// Scan without attestation
    pub fn new() -> Self {
        Self::default()
    }

    /// Also attest the card key
    pub const fn with_attestation(mut self) -> Self {
        self.attest = true;
        self
    }

    /// Skip attestation of cards found in `cache`, and remember new ones
    pub fn with_attestation_cache(mut self, cache: AttestationCache) -> Self {
        self.cache = Some(cache);
        self
    }
}

/// Outcome of a [`ScanTask`]
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Card record including all wallets
    pub card: Card,
    /// Fresh attestation, if one was performed
    pub attestation: Option<AttestCardKeyResponse>,
    /// Whether the card was already attested in an earlier session
    pub attestation_cached: bool,
}

#[async_trait]
impl CardTask for ScanTask {
    type Output = ScanResult;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        if session.card().is_none() {
            session.send(&ReadCommand::new()).await?;
        }
        if session.environment().card()?.supports_multiple_wallets() {
            ReadWalletsListTask.run(session).await?;
        }

        let mut attestation = None;
        let mut attestation_cached = false;
        if self.attest {
            let card_id = session.environment().card_id()?.clone();
            let cached = match &self.cache {
                Some(cache) => cache.get(&card_id)?.is_some(),
                None => false,
            };

            if cached {
                debug!(%card_id, "Card attestation found in cache");
                attestation_cached = true;
            } else {
                let command = AttestCardKeyCommand::with_random_challenge(session.environment());
                let response = session.send(&command).await?;
                if let Some(cache) = &self.cache {
                    cache.store(&response)?;
                }
                attestation = Some(response);
            }
        }

        Ok(ScanResult {
            card: session.environment().card()?.clone(),
            attestation,
            attestation_cached,
        })
    }
}
