//! Multi-command workflows
//!
//! A task sequences commands on a running [`CardSession`] and decides how
//! command failures aggregate:
//!
//! - all-or-nothing: the first error aborts the task
//!   ([`SignHashesTask`], [`PersonalizeTask`], [`DepersonalizeTask`])
//! - best-effort: soft errors are skipped and successes accumulated
//!   ([`DeriveWalletPublicKeysTask`])
//! - pagination: a command is repeated with an advancing cursor until the
//!   declared total is reached ([`ReadWalletsListTask`])
//!
//! Tasks hold no state between runs and always restart from scratch.

mod derive;
mod personalize;
mod read_wallets;
mod scan;
mod sign;

use std::fmt;

use async_trait::async_trait;
use cardlink_apdu_core::CardTransport;

use crate::Result;
use crate::commands::Command;
use crate::session::CardSession;

pub use derive::{DeriveWalletPublicKeysTask, DerivedKeys};
pub use personalize::{DepersonalizeTask, PersonalizeTask};
pub use read_wallets::ReadWalletsListTask;
pub use scan::{ScanResult, ScanTask};
pub use sign::SignHashesTask;

/// A workflow over one session
#[async_trait]
pub trait CardTask: Send + Sync + fmt::Debug {
    /// Aggregated result
    type Output: Send + fmt::Debug;

    /// Run on a session that accepts commands
    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output>;
}

/// A single command run as a task
#[derive(Debug, Clone)]
pub struct CommandTask<C>(pub C);

#[async_trait]
impl<C: Command> CardTask for CommandTask<C> {
    type Output = C::Response;

    async fn run<T: CardTransport>(&self, session: &mut CardSession<T>) -> Result<Self::Output> {
        session.send(&self.0).await
    }
}
