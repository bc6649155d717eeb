use async_trait::async_trait;
use bytes::Bytes;
use cardlink_apdu_core::CardTransport;
use tracing::debug;

use super::CardTask;
use crate::commands::SignCommand;
use crate::session::CardSession;
use crate::types::DerivationPath;
use crate::{Error, Result};

/// Sign any number of hashes, split into chunks the card accepts
///
/// All-or-nothing: the first failing chunk aborts the task and no
/// signatures are returned.
#[derive(Debug, Clone)]
pub struct SignHashesTask {
    hashes: Vec<Bytes>,
    wallet_public_key: Bytes,
    derivation_path: Option<DerivationPath>,
}

impl SignHashesTask {
    /// Sign `hashes` with the wallet holding `wallet_public_key`
    pub fn new(hashes: Vec<Bytes>, wallet_public_key: impl Into<Bytes>) -> Self {
        Self {
            hashes,
            wallet_public_key: wallet_public_key.into(),
            derivation_path: None,
        }
    }

    /// Sign with the child key at `path`
    pub fn with_derivation_path(mut self, path: DerivationPath) -> Self {
        self.derivation_path = Some(path);
        self
    }
}

#[async_trait]
impl CardTask for SignHashesTask {
    type Output = Vec<Bytes>;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        if self.hashes.is_empty() {
            return Err(Error::MissingInput("hashes"));
        }
        let chunk_size = session.config().sign_chunk_size.max(1);

        let mut signatures = Vec::with_capacity(self.hashes.len());
        for (i, chunk) in self.hashes.chunks(chunk_size).enumerate() {
            let mut command = SignCommand::new(chunk.to_vec(), self.wallet_public_key.clone());
            if let Some(path) = &self.derivation_path {
                command = command.with_derivation_path(path.clone());
            }
            debug!(chunk = i, size = chunk.len(), "Signing chunk");
            signatures.extend(session.send(&command).await?);
        }
        Ok(signatures)
    }
}
