//! Status word definitions and the completion-code outcome table

use std::fmt;

use tracing::{Level, warn};

/// Status Word (SW1-SW2) trailing every response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Create from a u16 value (SW1 | SW2)
    pub const fn from_u16(status: u16) -> Self {
        Self {
            sw1: (status >> 8) as u8,
            sw2: status as u8,
        }
    }

    /// Convert to a u16 value (SW1 | SW2)
    pub const fn to_u16(&self) -> u16 {
        ((self.sw1 as u16) << 8) | (self.sw2 as u16)
    }

    /// Look up this code in the outcome table
    ///
    /// Codes missing from the table are treated as success. Firmware uses a
    /// handful of reserved codes for non-fatal quirks; those are logged so
    /// they can be added to the table once identified.
    pub fn outcome(&self) -> StatusOutcome {
        match self.classify() {
            Some(outcome) => outcome,
            None => {
                warn!(sw = %self, "Unmapped status word, treating as success");
                StatusOutcome::Success
            }
        }
    }

    /// Table lookup without the unmapped-code fallback
    pub const fn classify(&self) -> Option<StatusOutcome> {
        let outcome = match self.to_u16() {
            codes::PROCESS_COMPLETED
            | codes::PIN1_CHANGED
            | codes::PIN2_CHANGED
            | codes::PINS_12_CHANGED
            | codes::PIN3_CHANGED
            | codes::PINS_13_CHANGED
            | codes::PINS_23_CHANGED
            | codes::PINS_123_CHANGED => StatusOutcome::Success,
            codes::NEED_PAUSE => StatusOutcome::Pause,
            codes::INVALID_PARAMS => StatusOutcome::Error(CardError::InvalidParams),
            codes::NEED_ENCRYPTION => StatusOutcome::Error(CardError::NeedEncryption),
            codes::ERROR_PROCESSING_COMMAND => {
                StatusOutcome::Error(CardError::ErrorProcessingCommand)
            }
            codes::INVALID_STATE => StatusOutcome::Error(CardError::InvalidState),
            codes::INS_NOT_SUPPORTED => StatusOutcome::Error(CardError::InsNotSupported),
            codes::FILE_NOT_FOUND => StatusOutcome::Error(CardError::FileNotFound),
            codes::WALLET_NOT_FOUND => StatusOutcome::Error(CardError::WalletNotFound),
            codes::INVALID_ACCESS_CODE => StatusOutcome::Error(CardError::InvalidAccessCode),
            codes::INVALID_PASSCODE => StatusOutcome::Error(CardError::InvalidPasscode),
            codes::WALLET_ALREADY_EXISTS => StatusOutcome::Error(CardError::WalletAlreadyExists),
            _ => return None,
        };
        Some(outcome)
    }

    /// Check if this is the plain success code (90 00)
    pub const fn is_success(&self) -> bool {
        self.to_u16() == codes::PROCESS_COMPLETED
    }

    /// Check if the card asks for a security-delay pause
    pub const fn is_pause(&self) -> bool {
        self.to_u16() == codes::NEED_PAUSE
    }

    /// Get the appropriate tracing level for this status word
    pub const fn tracing_level(&self) -> Level {
        match self.classify() {
            Some(StatusOutcome::Success) => Level::DEBUG,
            Some(StatusOutcome::Pause) => Level::INFO,
            _ => Level::WARN,
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from(tuple: (u8, u8)) -> Self {
        Self::new(tuple.0, tuple.1)
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Outcome class selected by a status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusOutcome {
    /// The command completed
    Success,
    /// The card is enforcing a security delay; retransmit the same frame
    Pause,
    /// The card rejected the command
    Error(CardError),
}

/// Named card-reported failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum CardError {
    /// Parameters are missing or malformed
    #[error("Invalid parameters")]
    InvalidParams,
    /// The command must be sent encrypted
    #[error("Encryption required")]
    NeedEncryption,
    /// Generic processing failure
    #[error("Error processing command")]
    ErrorProcessingCommand,
    /// Card is in a state where the command is not allowed
    #[error("Invalid card state")]
    InvalidState,
    /// Instruction not supported
    #[error("Instruction not supported")]
    InsNotSupported,
    /// Requested file does not exist
    #[error("File not found")]
    FileNotFound,
    /// No wallet at the requested index or public key
    #[error("Wallet not found")]
    WalletNotFound,
    /// Access code did not match
    #[error("Invalid access code")]
    InvalidAccessCode,
    /// Passcode did not match
    #[error("Invalid passcode")]
    InvalidPasscode,
    /// A wallet already occupies the slot
    #[error("Wallet already exists")]
    WalletAlreadyExists,
}

impl CardError {
    /// Status word that reports this error
    pub const fn status_word(&self) -> StatusWord {
        StatusWord::from_u16(match self {
            Self::InvalidParams => codes::INVALID_PARAMS,
            Self::NeedEncryption => codes::NEED_ENCRYPTION,
            Self::ErrorProcessingCommand => codes::ERROR_PROCESSING_COMMAND,
            Self::InvalidState => codes::INVALID_STATE,
            Self::InsNotSupported => codes::INS_NOT_SUPPORTED,
            Self::FileNotFound => codes::FILE_NOT_FOUND,
            Self::WalletNotFound => codes::WALLET_NOT_FOUND,
            Self::InvalidAccessCode => codes::INVALID_ACCESS_CODE,
            Self::InvalidPasscode => codes::INVALID_PASSCODE,
            Self::WalletAlreadyExists => codes::WALLET_ALREADY_EXISTS,
        })
    }
}

/// Raw completion codes
pub mod codes {
    #![allow(missing_docs)]

    pub const PROCESS_COMPLETED: u16 = 0x9000;
    pub const PIN1_CHANGED: u16 = 0x9001;
    pub const PIN2_CHANGED: u16 = 0x9002;
    pub const PINS_12_CHANGED: u16 = 0x9003;
    pub const PIN3_CHANGED: u16 = 0x9004;
    pub const PINS_13_CHANGED: u16 = 0x9005;
    pub const PINS_23_CHANGED: u16 = 0x9006;
    pub const PINS_123_CHANGED: u16 = 0x9007;

    pub const NEED_PAUSE: u16 = 0x9789;

    pub const INVALID_PARAMS: u16 = 0x6A86;
    pub const NEED_ENCRYPTION: u16 = 0x6982;
    pub const ERROR_PROCESSING_COMMAND: u16 = 0x6286;
    pub const INVALID_STATE: u16 = 0x6985;
    pub const INS_NOT_SUPPORTED: u16 = 0x6D00;
    pub const FILE_NOT_FOUND: u16 = 0x6A82;
    pub const WALLET_NOT_FOUND: u16 = 0x6A88;
    pub const INVALID_ACCESS_CODE: u16 = 0x6AF1;
    pub const INVALID_PASSCODE: u16 = 0x6AF2;
    pub const WALLET_ALREADY_EXISTS: u16 = 0x6A89;

    /// Every code listed in the outcome table
    pub const ALL: [u16; 19] = [
        PROCESS_COMPLETED,
        PIN1_CHANGED,
        PIN2_CHANGED,
        PINS_12_CHANGED,
        PIN3_CHANGED,
        PINS_13_CHANGED,
        PINS_23_CHANGED,
        PINS_123_CHANGED,
        NEED_PAUSE,
        INVALID_PARAMS,
        NEED_ENCRYPTION,
        ERROR_PROCESSING_COMMAND,
        INVALID_STATE,
        INS_NOT_SUPPORTED,
        FILE_NOT_FOUND,
        WALLET_NOT_FOUND,
        INVALID_ACCESS_CODE,
        INVALID_PASSCODE,
        WALLET_ALREADY_EXISTS,
    ];
}
