//! Session configuration

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use cardlink_apdu_core::EncryptionMode;

use crate::types::{Card, CardId};

/// What the session reads before handing control to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreflightMode {
    /// Skip the preflight read
    None,
    /// Read the card record only; wallets are read on first use
    #[default]
    ReadCardOnly,
    /// Read the card record and every wallet
    FullCardRead,
}

/// Predicate over the card record
pub type CardPredicate = Arc<dyn Fn(&Card) -> bool + Send + Sync>;

/// Rejects cards that are not the expected one
#[derive(Clone, Default)]
pub struct CardFilter {
    /// Expected card identifier
    pub card_id: Option<CardId>,
    /// Expected card public key
    pub card_public_key: Option<Bytes>,
    /// Additional predicate
    pub predicate: Option<CardPredicate>,
}

impl CardFilter {
    /// Accept only the card with this identifier
    pub fn with_card_id(mut self, card_id: CardId) -> Self {
        self.card_id = Some(card_id);
        self
    }

    /// Accept only the card with this public key
    pub fn with_card_public_key(mut self, public_key: impl Into<Bytes>) -> Self {
        self.card_public_key = Some(public_key.into());
        self
    }

    /// Accept only cards matching `predicate`
    pub fn with_predicate(mut self, predicate: impl Fn(&Card) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether `card` passes every configured check
    pub fn accepts(&self, card: &Card) -> bool {
        self.card_id.as_ref().is_none_or(|id| *id == card.card_id)
            && self
                .card_public_key
                .as_ref()
                .is_none_or(|key| card.card_public_key.as_ref() == Some(key))
            && self.predicate.as_ref().is_none_or(|p| p(card))
    }
}

impl fmt::Debug for CardFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardFilter")
            .field("card_id", &self.card_id)
            .field("card_public_key", &self.card_public_key.as_ref().map(hex::encode))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Configuration options for a card session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Preflight read performed right after connecting
    pub preflight: PreflightMode,

    /// Encryption mode to negotiate up front; upgraded on demand otherwise
    pub encryption_mode: EncryptionMode,

    /// Automatic retransmissions after a transient transport failure
    pub transport_retries: u8,

    /// Delay used when the card asks for a pause without saying how long
    pub security_delay_interval: Duration,

    /// Append the legacy timing marker to command bodies
    pub legacy_mode: bool,

    /// Access code prompts before a preflight read gives up
    pub access_code_attempts: u8,

    /// Maximum number of hashes per sign command
    pub sign_chunk_size: usize,

    /// Access code to start with instead of the factory default
    pub access_code: Option<String>,

    /// Passcode to start with instead of the factory default
    pub passcode: Option<String>,

    /// Card acceptance filter applied after the preflight read
    pub card_filter: Option<CardFilter>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preflight: PreflightMode::ReadCardOnly,
            encryption_mode: EncryptionMode::None,
            transport_retries: 2,
            security_delay_interval: Duration::from_secs(1),
            legacy_mode: false,
            access_code_attempts: 3,
            sign_chunk_size: 10,
            access_code: None,
            passcode: None,
            card_filter: None,
        }
    }
}

impl SessionConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preflight mode
    pub const fn with_preflight(mut self, preflight: PreflightMode) -> Self {
        self.preflight = preflight;
        self
    }

    /// Set the initial encryption mode
    pub const fn with_encryption_mode(mut self, mode: EncryptionMode) -> Self {
        self.encryption_mode = mode;
        self
    }

    /// Set the number of transport retries
    pub const fn with_transport_retries(mut self, retries: u8) -> Self {
        self.transport_retries = retries;
        self
    }

    /// Set the fallback security delay
    pub const fn with_security_delay_interval(mut self, interval: Duration) -> Self {
        self.security_delay_interval = interval;
        self
    }

    /// Enable the legacy timing workaround
    pub const fn with_legacy_mode(mut self, legacy_mode: bool) -> Self {
        self.legacy_mode = legacy_mode;
        self
    }

    /// Set how many times the access code is prompted for
    pub const fn with_access_code_attempts(mut self, attempts: u8) -> Self {
        self.access_code_attempts = attempts;
        self
    }

    /// Set the sign chunk size
    pub const fn with_sign_chunk_size(mut self, size: usize) -> Self {
        self.sign_chunk_size = size;
        self
    }

    /// Start with a known access code
    pub fn with_access_code(mut self, code: impl Into<String>) -> Self {
        self.access_code = Some(code.into());
        self
    }

    /// Start with a known passcode
    pub fn with_passcode(mut self, code: impl Into<String>) -> Self {
        self.passcode = Some(code.into());
        self
    }

    /// Reject cards that do not pass `filter`
    pub fn with_card_filter(mut self, filter: CardFilter) -> Self {
        self.card_filter = Some(filter);
        self
    }
}
