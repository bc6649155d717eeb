//! Glue between commands and raw frames
//!
//! Applies the session-wide concerns every command shares: the legacy
//! marker and the encryption envelope on the way out, transparent
//! decryption on the way in.

use bytes::{Bytes, BytesMut};
use cardlink_apdu_core::{CommandApdu, ResponseApdu};
use tracing::trace;

use crate::Result;
use crate::commands::Command;
use crate::environment::SessionEnvironment;
use crate::tlv::{Tag, Tlv};

/// Value of the legacy timing marker
const LEGACY_MODE_ON: u8 = 0x01;

/// Build the outbound frame for `command`
pub(crate) fn build<C: Command>(command: &C, environment: &SessionEnvironment) -> Result<CommandApdu> {
    let mut apdu = command.serialize(environment)?;

    if environment.legacy_mode {
        let mut body = BytesMut::from(apdu.data().as_ref());
        Tlv::new(Tag::LegacyMode, vec![LEGACY_MODE_ON]).encode_into(&mut body)?;
        apdu = apdu.with_data(body.freeze());
    }

    if let Some(key) = &environment.encryption_key {
        apdu = apdu.encrypt(key, environment.crypto.as_ref())?;
    }

    trace!(?apdu, "Built command frame");
    Ok(apdu)
}

/// Parse a raw response, decrypting it when a session key is active
pub(crate) fn parse(raw: &Bytes, environment: &SessionEnvironment) -> Result<ResponseApdu> {
    let response = ResponseApdu::from_bytes(raw)?;
    match &environment.encryption_key {
        Some(key) => Ok(response.decrypt(key, environment.crypto.as_ref())?),
        None => Ok(response),
    }
}
