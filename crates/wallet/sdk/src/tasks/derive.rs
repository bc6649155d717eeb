use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use cardlink_apdu_core::CardTransport;
use tracing::{debug, warn};

use super::CardTask;
use crate::commands::DeriveWalletPublicKeyCommand;
use crate::session::CardSession;
use crate::types::{DerivationPath, ExtendedPublicKey};
use crate::{Error, Result};

/// Derive public keys for many paths below one wallet
///
/// Best-effort: paths failing with a soft error (unsupported curve, missing
/// wallet, non-hardened path on a hardened-only curve) are skipped. A hard
/// error aborts the task when nothing was derived yet and otherwise ends it
/// with the keys derived so far. Session-ending errors always abort.
#[derive(Debug, Clone)]
pub struct DeriveWalletPublicKeysTask {
    wallet_public_key: Bytes,
    paths: Vec<DerivationPath>,
}

impl DeriveWalletPublicKeysTask {
    /// Derive `paths` below the wallet holding `wallet_public_key`
    pub fn new(wallet_public_key: impl Into<Bytes>, paths: Vec<DerivationPath>) -> Self {
        Self {
            wallet_public_key: wallet_public_key.into(),
            paths,
        }
    }
}

/// Outcome of a [`DeriveWalletPublicKeysTask`]
#[derive(Debug, Default)]
pub struct DerivedKeys {
    /// Successfully derived keys
    pub keys: BTreeMap<DerivationPath, ExtendedPublicKey>,
    /// Paths that were skipped or not reached, with the error that stopped them
    pub failed: Vec<(DerivationPath, Error)>,
}

#[async_trait]
impl CardTask for DeriveWalletPublicKeysTask {
    type Output = DerivedKeys;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        let mut derived = DerivedKeys::default();

        for path in &self.paths {
            let command = DeriveWalletPublicKeyCommand::new(self.wallet_public_key.clone(), path.clone());
            match session.send(&command).await {
                Ok(key) => {
                    derived.keys.insert(path.clone(), key);
                }
                Err(e) if e.is_soft() => {
                    debug!(%path, error = %e, "Skipping path");
                    derived.failed.push((path.clone(), e));
                }
                Err(e) if e.is_session_fatal() || derived.keys.is_empty() => return Err(e),
                Err(e) => {
                    warn!(%path, error = %e, derived = derived.keys.len(), "Stopping with partial result");
                    derived.failed.push((path.clone(), e));
                    break;
                }
            }
        }

        Ok(derived)
    }
}
