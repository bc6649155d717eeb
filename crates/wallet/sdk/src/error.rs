use cardlink_apdu_core::{CardError, TransportError};

use crate::session::SessionState;
use crate::tlv::TlvError;
use crate::types::{EllipticCurve, FirmwareVersion};

/// Result type for wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for wallet operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Protocol errors, never recovered
    //
    /// Frame-level failure (truncated frame, envelope length or CRC mismatch)
    #[error(transparent)]
    Apdu(cardlink_apdu_core::Error),

    /// Malformed TLV body
    #[error(transparent)]
    Tlv(#[from] TlvError),

    /// Response body is well-formed but inconsistent
    #[error("Invalid response data: {0}")]
    InvalidData(&'static str),

    //
    // Card-reported errors
    //
    /// Status error without a more specific mapping
    #[error(transparent)]
    Card(#[from] CardError),

    /// Access code missing or wrong
    #[error("Access code required")]
    AccessCodeRequired,

    /// Passcode missing or wrong
    #[error("Passcode required")]
    PasscodeRequired,

    /// A wallet already occupies the slot
    #[error("Wallet already exists")]
    WalletAlreadyExists,

    /// No such wallet on the card
    #[error("Wallet not found")]
    WalletNotFound,

    /// The card signature did not verify
    #[error("Card verification failed")]
    CardVerificationFailed,

    //
    // Transport
    //
    /// Transport failure after retries
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Capability errors, raised before transmission
    //
    /// The card does not support the curve
    #[error("Curve {0} not supported by the card")]
    UnsupportedCurve(EllipticCurve),

    /// The firmware is too old for the operation
    #[error("Firmware {required} or newer required")]
    FirmwareNotSupported {
        /// Minimum firmware version
        required: FirmwareVersion,
    },

    /// The curve only supports hardened derivation
    #[error("Non-hardened derivation not supported")]
    NonHardenedDerivationNotSupported,

    /// The curve has no key derivation
    #[error("Key derivation not supported for {0}")]
    DerivationNotSupported(EllipticCurve),

    /// No free wallet slot left
    #[error("Wallet capacity reached")]
    WalletCapacityReached,

    /// Purging is prohibited by card or wallet settings
    #[error("Purge prohibited")]
    PurgeProhibited,

    /// Changing this code is prohibited by card settings
    #[error("Code change not allowed")]
    CodeChangeNotAllowed,

    /// The card is already personalized
    #[error("Card already personalized")]
    AlreadyPersonalized,

    //
    // Session errors
    //
    /// The user or the application cancelled the session
    #[error("User cancelled")]
    UserCancelled,

    /// The card in the field does not match the expected one
    #[error("Wrong card")]
    WrongCard,

    /// The operation is not valid in the current session state
    #[error("Operation not allowed in session state {0:?}")]
    InvalidSessionState(SessionState),

    /// A command needs the card record, which has not been read yet
    #[error("Card has not been read")]
    MissingCard,

    /// A required input is missing or malformed
    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    /// Crypto provider failure
    #[error("Crypto error: {0}")]
    Crypto(&'static str),

    /// Secure storage failure
    #[error("Storage error: {0}")]
    Storage(&'static str),
}

impl Error {
    /// Errors that best-effort tasks skip over
    pub const fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedCurve(_) | Self::WalletNotFound | Self::NonHardenedDerivationNotSupported
        )
    }

    /// Errors that end the session, not just the current command
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::UserCancelled | Self::Transport(_) | Self::WrongCard)
    }
}

impl From<cardlink_apdu_core::Error> for Error {
    fn from(error: cardlink_apdu_core::Error) -> Self {
        match error {
            cardlink_apdu_core::Error::Transport(e) => Self::Transport(e),
            other => Self::Apdu(other),
        }
    }
}
