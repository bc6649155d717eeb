//! Domain types read from and written to the card

mod card;
mod curve;
mod derivation;
mod firmware;
mod settings;
mod wallet;

pub use card::{Card, CardId, CardStatus, ManufactureDate};
pub use curve::EllipticCurve;
pub use derivation::{DerivationNode, DerivationPath, DerivationPathError, HARDENED_OFFSET};
pub use firmware::{FirmwareKind, FirmwareVersion};
pub use settings::{CardSettings, UserSettings, WalletSettings};
pub use wallet::{ExtendedPublicKey, Wallet, WalletStatus};
