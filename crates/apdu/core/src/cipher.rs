//! Symmetric envelope used once a session key has been negotiated
//!
//! The plaintext envelope is `length (u16 BE) | crc16 (u16 BE) | payload`.
//! It is encrypted as a whole so that the far side can validate both fields
//! after decryption.

use std::fmt;

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{Error, Result};

type Encryptor = cbc::Encryptor<aes::Aes256>;
type Decryptor = cbc::Decryptor<aes::Aes256>;

/// Size of the envelope header (length + CRC)
pub const ENVELOPE_HEADER_LEN: usize = 4;

/// Cipher block size; responses shorter than this are never encrypted
pub const BLOCK_LEN: usize = 16;

/// Encryption mode negotiated for a session
///
/// The byte value is carried in P1 of most commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionMode {
    /// Plain communication
    #[default]
    None,
    /// Symmetric key derived from nonces and the access code
    Fast,
    /// Symmetric key derived from an ephemeral ECDH exchange
    Strong,
}

impl EncryptionMode {
    /// Wire value of this mode
    pub const fn byte_value(&self) -> u8 {
        match self {
            Self::None => 0x00,
            Self::Fast => 0x01,
            Self::Strong => 0x02,
        }
    }
}

impl TryFrom<u8> for EncryptionMode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::None),
            0x01 => Ok(Self::Fast),
            0x02 => Ok(Self::Strong),
            _ => Err(Error::cipher("Unknown encryption mode")),
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Fast => write!(f, "fast"),
            Self::Strong => write!(f, "strong"),
        }
    }
}

/// Symmetric session key (AES-256)
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; 32]);

impl SessionKey {
    /// Wrap raw key bytes
    pub const fn new(key: [u8; 32]) -> Self {
        Self(key)
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(..)")
    }
}

/// Block cipher seam used for the envelope
///
/// The protocol core never implements cipher internals itself; it is handed
/// an implementation of this trait.
pub trait SessionCipher: Send + Sync + fmt::Debug {
    /// Encrypt `plaintext` under `key`
    fn encrypt(&self, plaintext: &[u8], key: &SessionKey) -> Result<Bytes>;

    /// Decrypt `ciphertext` under `key`
    fn decrypt(&self, ciphertext: &[u8], key: &SessionKey) -> Result<Bytes>;
}

/// AES-256-CBC with a fixed all-zero IV and PKCS#7 padding
///
/// Session keys are single-use, so the IV discipline is fixed per mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256CbcCipher;

impl SessionCipher for Aes256CbcCipher {
    fn encrypt(&self, plaintext: &[u8], key: &SessionKey) -> Result<Bytes> {
        let ciphertext = Encryptor::new_from_slices(key.as_bytes(), &[0u8; BLOCK_LEN])
            .map_err(|_| Error::cipher("Invalid key length"))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
        Ok(Bytes::from(ciphertext))
    }

    fn decrypt(&self, ciphertext: &[u8], key: &SessionKey) -> Result<Bytes> {
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
            return Err(Error::cipher("Ciphertext is not block aligned"));
        }
        Decryptor::new_from_slices(key.as_bytes(), &[0u8; BLOCK_LEN])
            .map_err(|_| Error::cipher("Invalid key length"))?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map(Bytes::from)
            .map_err(|_| Error::cipher("Invalid padding"))
    }
}

/// CRC-16/ISO-IEC 14443-3 Type A
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x6363;
    for &b in data {
        let mut ch = b ^ (crc as u8);
        ch ^= ch << 4;
        crc = (crc >> 8) ^ ((ch as u16) << 8) ^ ((ch as u16) << 3) ^ ((ch as u16) >> 4);
    }
    crc
}

/// Wrap `payload` in the length/CRC envelope and encrypt it
pub fn seal(payload: &[u8], key: &SessionKey, cipher: &dyn SessionCipher) -> Result<Bytes> {
    let len = u16::try_from(payload.len())
        .map_err(|_| Error::DataTooLong(payload.len(), u16::MAX as usize))?;

    let mut buf = BytesMut::with_capacity(payload.len() + ENVELOPE_HEADER_LEN);
    buf.put_u16(len);
    buf.put_u16(crc16(payload));
    buf.put_slice(payload);

    cipher.encrypt(&buf, key)
}

/// Decrypt an envelope and validate its embedded length and CRC
///
/// Any failure, including a cipher-level one, is reported as
/// [`Error::InvalidResponseApdu`].
pub fn open(ciphertext: &[u8], key: &SessionKey, cipher: &dyn SessionCipher) -> Result<Bytes> {
    let plaintext = cipher.decrypt(ciphertext, key).map_err(|e| {
        debug!(error = %e, "Failed to decrypt response envelope");
        Error::InvalidResponseApdu
    })?;

    if plaintext.len() < ENVELOPE_HEADER_LEN {
        return Err(Error::InvalidResponseApdu);
    }

    let declared_len = u16::from_be_bytes([plaintext[0], plaintext[1]]) as usize;
    let declared_crc = u16::from_be_bytes([plaintext[2], plaintext[3]]);
    let payload = plaintext.slice(ENVELOPE_HEADER_LEN..);

    if declared_len != payload.len() {
        debug!(
            declared = declared_len,
            actual = payload.len(),
            "Envelope length mismatch"
        );
        return Err(Error::InvalidResponseApdu);
    }
    if declared_crc != crc16(&payload) {
        debug!("Envelope CRC mismatch");
        return Err(Error::InvalidResponseApdu);
    }

    Ok(payload)
}
