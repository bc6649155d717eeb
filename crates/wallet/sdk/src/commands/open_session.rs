use bytes::Bytes;
use cardlink_apdu_core::{CommandApdu, EncryptionMode, ResponseApdu};

use super::{CLA, Command};
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, TlvBuilder, TlvDecoder};
use crate::{Error, Result};

/// OPEN_SESSION: exchange key material for the requested encryption mode
///
/// Always sent in the clear. For [`EncryptionMode::Fast`] `key_a` is a
/// terminal nonce; for [`EncryptionMode::Strong`] it is an ephemeral
/// secp256k1 public key. Writes nothing; the session derives the key.
#[derive(Debug, Clone)]
pub struct OpenSessionCommand {
    mode: EncryptionMode,
    key_a: Bytes,
}

impl OpenSessionCommand {
    /// Create a command negotiating `mode` with terminal material `key_a`
    pub fn new(mode: EncryptionMode, key_a: impl Into<Bytes>) -> Self {
        Self {
            mode,
            key_a: key_a.into(),
        }
    }
}

/// Card half of the key exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSessionResponse {
    /// Card nonce or card ephemeral public key
    pub session_key_b: Bytes,
}

impl Command for OpenSessionCommand {
    type Response = OpenSessionResponse;

    const INS: u8 = 0xFF;

    fn requires_encryption(&self) -> bool {
        false
    }

    fn serialize(&self, _environment: &SessionEnvironment) -> Result<CommandApdu> {
        if self.mode == EncryptionMode::None {
            return Err(Error::MissingInput("encryption mode"));
        }
        let body = TlvBuilder::new()
            .append(Tag::SessionKeyA, &self.key_a)
            .build()?;
        Ok(CommandApdu::new(CLA, Self::INS, self.mode.byte_value(), 0x00)
            .with_data(body)
            .with_le(0))
    }

    fn deserialize(
        &self,
        _environment: &mut SessionEnvironment,
        response: ResponseApdu,
    ) -> Result<Self::Response> {
        let decoder = TlvDecoder::new(response.data())?;
        let session_key_b: Bytes = decoder.decode(Tag::SessionKeyB)?;
        if session_key_b.is_empty() {
            return Err(Error::InvalidData("empty session key"));
        }
        Ok(OpenSessionResponse { session_key_b })
    }
}
