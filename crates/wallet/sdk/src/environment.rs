//! Mutable state shared by the commands of one session

use std::{fmt, sync::Arc};

use cardlink_apdu_core::{EncryptionMode, SessionKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::{CryptoProvider, KeyPair, SoftwareCrypto};
use crate::types::{Card, CardId};
use crate::{Error, Result};

/// Factory access code
pub const DEFAULT_ACCESS_CODE: &str = "000000";

/// Factory passcode
pub const DEFAULT_PASSCODE: &str = "000";

/// A user code as sent to the card (SHA-256 of the entered string)
#[derive(Clone, PartialEq, Eq)]
pub struct UserCode {
    hash: Zeroizing<[u8; 32]>,
    is_default: bool,
}

impl UserCode {
    /// Hash a user-entered code
    pub fn new(code: &str) -> Self {
        Self {
            hash: Zeroizing::new(Sha256::digest(code.as_bytes()).into()),
            is_default: false,
        }
    }

    /// Wrap an already hashed code
    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self {
            hash: Zeroizing::new(hash),
            is_default: false,
        }
    }

    /// Factory access code
    pub fn default_access_code() -> Self {
        Self {
            is_default: true,
            ..Self::new(DEFAULT_ACCESS_CODE)
        }
    }

    /// Factory passcode
    pub fn default_passcode() -> Self {
        Self {
            is_default: true,
            ..Self::new(DEFAULT_PASSCODE)
        }
    }

    /// Hash sent on the wire
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Whether this is a factory default code
    pub const fn is_default(&self) -> bool {
        self.is_default
    }
}

impl fmt::Debug for UserCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCode")
            .field("is_default", &self.is_default)
            .finish_non_exhaustive()
    }
}

/// State shared across all commands issued in one session
///
/// Owned by exactly one session. Commands get it by shared reference to
/// serialize and by exclusive reference to deserialize, and document every
/// field they write.
pub struct SessionEnvironment {
    /// Negotiated (or requested) encryption mode
    pub encryption_mode: EncryptionMode,
    /// Session key, absent until negotiated
    pub encryption_key: Option<SessionKey>,
    /// Current access code
    pub access_code: UserCode,
    /// Current passcode
    pub passcode: UserCode,
    /// Terminal key pair used for linked-terminal features
    pub terminal_keys: Option<KeyPair>,
    /// Card record, once read
    pub card: Option<Card>,
    /// Append the legacy timing marker to every command body
    pub legacy_mode: bool,
    /// Crypto collaborator
    pub crypto: Arc<dyn CryptoProvider>,
}

impl Default for SessionEnvironment {
    fn default() -> Self {
        Self {
            encryption_mode: EncryptionMode::None,
            encryption_key: None,
            access_code: UserCode::default_access_code(),
            passcode: UserCode::default_passcode(),
            terminal_keys: None,
            card: None,
            legacy_mode: false,
            crypto: Arc::new(SoftwareCrypto),
        }
    }
}

impl SessionEnvironment {
    /// Card record, or [`Error::MissingCard`]
    pub fn card(&self) -> Result<&Card> {
        self.card.as_ref().ok_or(Error::MissingCard)
    }

    /// Mutable card record, or [`Error::MissingCard`]
    pub fn card_mut(&mut self) -> Result<&mut Card> {
        self.card.as_mut().ok_or(Error::MissingCard)
    }

    /// Identifier of the card read in this session
    pub fn card_id(&self) -> Result<&CardId> {
        self.card().map(|c| &c.card_id)
    }
}

impl fmt::Debug for SessionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEnvironment")
            .field("encryption_mode", &self.encryption_mode)
            .field("has_encryption_key", &self.encryption_key.is_some())
            .field("access_code", &self.access_code)
            .field("passcode", &self.passcode)
            .field("terminal_keys", &self.terminal_keys)
            .field("card", &self.card.as_ref().map(|c| &c.card_id))
            .field("legacy_mode", &self.legacy_mode)
            .finish_non_exhaustive()
    }
}
