//! Session engine for contactless secure-element wallet cards
//!
//! Builds on the frame layer in [`cardlink_apdu_core`] and adds:
//!
//! - The TLV body codec and tag table ([`tlv`])
//! - Typed card commands ([`commands`]) and the domain types they exchange
//!   ([`types`])
//! - [`CardSession`], which sequences commands against one card: preflight
//!   read, encryption negotiation, security-delay pauses and cancellation
//! - Multi-command workflows with partial-failure policies ([`tasks`])
//!
//! ```no_run
//! # async fn scan<T: cardlink_apdu_core::CardTransport>(transport: T) -> cardlink_wallet::Result<()> {
//! use cardlink_wallet::{CardSession, SessionConfig, tasks::ScanTask};
//!
//! let mut session = CardSession::new(transport, SessionConfig::default());
//! let scanned = session.run(&ScanTask::new()).await?;
//! println!("{} holds {} wallets", scanned.card.card_id, scanned.card.wallets.len());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod commands;
pub mod crypto;
pub mod tasks;
pub mod tlv;
pub mod types;

mod config;
mod delegate;
mod environment;
mod error;
mod frame;
mod session;
mod storage;

pub use commands::Command;
pub use config::{CardFilter, CardPredicate, PreflightMode, SessionConfig};
pub use crypto::{CryptoProvider, KeyPair, SoftwareCrypto};
pub use delegate::{NoopDelegate, SessionDelegate};
pub use environment::{DEFAULT_ACCESS_CODE, DEFAULT_PASSCODE, SessionEnvironment, UserCode};
pub use error::{Error, Result};
pub use session::{CancelHandle, CardSession, SessionState};
pub use storage::{AttestationCache, InMemoryStorage, SecureStorage};
pub use tasks::CardTask;

pub use cardlink_apdu_core::{CardTransport, EncryptionMode, TransportError};
