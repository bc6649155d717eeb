//! Cryptographic primitives used by the session
//!
//! The session never implements primitives itself. It calls a
//! [`CryptoProvider`], for which [`SoftwareCrypto`] is the default.

use std::fmt;

use bytes::Bytes;
use cardlink_apdu_core::{Aes256CbcCipher, SessionCipher, SessionKey};
use ed25519_dalek::{Signer as _, Verifier as _};
use k256::ecdsa::signature::{Signer as _, Verifier as _};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::types::EllipticCurve;
use crate::{Error, Result};

/// PBKDF2 rounds used for session key derivation
pub const SESSION_KEY_ROUNDS: u32 = 50;

/// A private/public key pair
pub struct KeyPair {
    /// Private key bytes
    pub private_key: Zeroizing<Vec<u8>>,
    /// Public key bytes (SEC1 compressed for secp256k1)
    pub public_key: Bytes,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Crypto collaborator
pub trait CryptoProvider: SessionCipher {
    /// Sign `message` with `private_key`
    fn sign(&self, message: &[u8], private_key: &[u8], curve: EllipticCurve) -> Result<Bytes>;

    /// Verify `signature` over `message`
    fn verify(
        &self,
        signature: &[u8],
        message: &[u8],
        public_key: &[u8],
        curve: EllipticCurve,
    ) -> Result<bool>;

    /// SHA-256 digest
    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// `len` random bytes
    fn random_bytes(&self, len: usize) -> Vec<u8>;

    /// Fresh key pair on `curve`
    fn generate_key_pair(&self, curve: EllipticCurve) -> Result<KeyPair>;

    /// secp256k1 ECDH, returning the x coordinate of the shared point
    fn ecdh(&self, private_key: &[u8], public_key: &[u8]) -> Result<Zeroizing<[u8; 32]>>;
}

/// Pure-software provider backed by `k256`, `ed25519-dalek` and AES-256-CBC
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareCrypto;

impl SessionCipher for SoftwareCrypto {
    fn encrypt(&self, plaintext: &[u8], key: &SessionKey) -> cardlink_apdu_core::Result<Bytes> {
        Aes256CbcCipher.encrypt(plaintext, key)
    }

    fn decrypt(&self, ciphertext: &[u8], key: &SessionKey) -> cardlink_apdu_core::Result<Bytes> {
        Aes256CbcCipher.decrypt(ciphertext, key)
    }
}

fn ed25519_signing_key(private_key: &[u8]) -> Result<ed25519_dalek::SigningKey> {
    let seed: [u8; 32] = private_key
        .try_into()
        .map_err(|_| Error::Crypto("Invalid Ed25519 private key length"))?;
    Ok(ed25519_dalek::SigningKey::from_bytes(&seed))
}

impl CryptoProvider for SoftwareCrypto {
    fn sign(&self, message: &[u8], private_key: &[u8], curve: EllipticCurve) -> Result<Bytes> {
        match curve {
            EllipticCurve::Secp256k1 => {
                let key = k256::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|_| Error::Crypto("Invalid secp256k1 private key"))?;
                let signature: k256::ecdsa::Signature = key.sign(message);
                Ok(Bytes::copy_from_slice(&signature.to_bytes()))
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let signature = ed25519_signing_key(private_key)?.sign(message);
                Ok(Bytes::copy_from_slice(&signature.to_bytes()))
            }
            other => Err(Error::UnsupportedCurve(other)),
        }
    }

    fn verify(
        &self,
        signature: &[u8],
        message: &[u8],
        public_key: &[u8],
        curve: EllipticCurve,
    ) -> Result<bool> {
        match curve {
            EllipticCurve::Secp256k1 => {
                let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| Error::Crypto("Invalid secp256k1 public key"))?;
                let Ok(signature) = k256::ecdsa::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &signature).is_ok())
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let key: [u8; 32] = public_key
                    .try_into()
                    .map_err(|_| Error::Crypto("Invalid Ed25519 public key length"))?;
                let key = ed25519_dalek::VerifyingKey::from_bytes(&key)
                    .map_err(|_| Error::Crypto("Invalid Ed25519 public key"))?;
                let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
                    return Ok(false);
                };
                Ok(key.verify(message, &signature).is_ok())
            }
            other => Err(Error::UnsupportedCurve(other)),
        }
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        rand::rng().fill_bytes(&mut buf);
        buf
    }

    fn generate_key_pair(&self, curve: EllipticCurve) -> Result<KeyPair> {
        match curve {
            EllipticCurve::Secp256k1 => {
                let secret = k256::SecretKey::random(&mut rand_v8::thread_rng());
                let public_key = secret.public_key().to_encoded_point(true);
                Ok(KeyPair {
                    private_key: Zeroizing::new(secret.to_bytes().to_vec()),
                    public_key: Bytes::copy_from_slice(public_key.as_bytes()),
                })
            }
            EllipticCurve::Ed25519 | EllipticCurve::Ed25519Slip0010 => {
                let seed = Zeroizing::new(self.random_bytes(32));
                let key = ed25519_signing_key(&seed)?;
                Ok(KeyPair {
                    public_key: Bytes::copy_from_slice(key.verifying_key().as_bytes()),
                    private_key: seed,
                })
            }
            other => Err(Error::UnsupportedCurve(other)),
        }
    }

    fn ecdh(&self, private_key: &[u8], public_key: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
        let secret = k256::SecretKey::from_slice(private_key)
            .map_err(|_| Error::Crypto("Invalid secp256k1 private key"))?;
        let public = k256::PublicKey::from_sec1_bytes(public_key)
            .map_err(|_| Error::Crypto("Invalid secp256k1 public key"))?;
        let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());

        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

/// Session key for fast encryption
///
/// Derived from the access code hash, salted with both nonces.
pub fn fast_session_key(access_code_hash: &[u8], nonce_a: &[u8], nonce_b: &[u8]) -> SessionKey {
    let salt = [nonce_a, nonce_b].concat();
    derive_session_key(access_code_hash, &salt)
}

/// Session key for strong encryption
///
/// Derived from the ECDH shared secret, salted with the access code hash.
pub fn strong_session_key(shared_secret: &[u8], access_code_hash: &[u8]) -> SessionKey {
    derive_session_key(shared_secret, access_code_hash)
}

fn derive_session_key(password: &[u8], salt: &[u8]) -> SessionKey {
    let mut key = [0u8; 32];
    pbkdf2_hmac::<Sha256>(password, salt, SESSION_KEY_ROUNDS, &mut key);
    SessionKey::new(key)
}
