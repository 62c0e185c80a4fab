//! # Key Management
//!
//! Two kinds of keys feed the native backend:
//!
//! - [`SigningKeypair`]: Ed25519, used to sign payloads.
//! - [`RecipientKeypair`] / [`RecipientPublicKey`]: X25519, used to wrap the
//!   per-message content key for each recipient.
//!
//! Keys are referred to by a [`Fingerprint`]: the first 20 bytes of a
//! domain-separated BLAKE3 hash of the public key.
//!
//! Secret bytes are never logged. Keypairs don't implement `Serialize`;
//! exporting a secret is always an explicit `secret_key_bytes()` call.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, SECRET_KEY_LENGTH};
use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::config::{
    FINGERPRINT_CONTEXT, FINGERPRINT_LENGTH, SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH,
    X25519_KEY_LENGTH,
};

/// Errors from parsing key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: expected 32 bytes of hex")]
    InvalidSecretKey,

    #[error("invalid public key bytes: expected 32 bytes of hex")]
    InvalidPublicKey,
}

// ---------------------------------------------------------------------------
// Fingerprint
// ---------------------------------------------------------------------------

/// Short, stable identifier of a public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LENGTH]);

impl Fingerprint {
    /// Fingerprint of raw public key bytes.
    pub fn of(public_key: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(FINGERPRINT_CONTEXT);
        hasher.update(public_key);
        let mut out = [0u8; FINGERPRINT_LENGTH];
        hasher.finalize_xof().fill(&mut out);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

fn decode_32(hex_str: &str) -> Option<[u8; 32]> {
    hex::decode(hex_str.trim()).ok()?.try_into().ok()
}

// ---------------------------------------------------------------------------
// Signing keys
// ---------------------------------------------------------------------------

/// An Ed25519 keypair used to sign payloads.
///
/// ```
/// use qrcrypt::crypto::keys::{verify, SigningKeypair};
///
/// let kp = SigningKeypair::generate();
/// let sig = kp.sign(b"pay bob 12.50");
/// assert!(verify(&kp.public_key_bytes(), b"pay bob 12.50", &sig));
/// ```
pub struct SigningKeypair {
    signing_key: SigningKey,
}

impl SigningKeypair {
    /// Fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; SECRET_KEY_LENGTH]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Loads a hex-encoded secret key, as written by `qrcrypt keygen`.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_32(hex_str)
            .map(|seed| Self::from_seed(&seed))
            .ok_or(KeyError::InvalidSecretKey)
    }

    pub fn public_key_bytes(&self) -> [u8; VERIFYING_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.public_key_bytes())
    }

    /// Deterministic Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Raw secret key. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.signing_key.to_bytes()
    }
}

impl Clone for SigningKeypair {
    fn clone(&self) -> Self {
        Self::from_seed(&self.secret_key_bytes())
    }
}

impl fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Secret material stays out of debug output.
        f.debug_struct("SigningKeypair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Strict Ed25519 verification against raw key bytes.
pub fn verify(
    public_key: &[u8; VERIFYING_KEY_LENGTH],
    message: &[u8],
    signature: &[u8; SIGNATURE_LENGTH],
) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    key.verify_strict(message, &Signature::from_bytes(signature))
        .is_ok()
}

// ---------------------------------------------------------------------------
// Recipient keys
// ---------------------------------------------------------------------------

/// The public half of a recipient key. This is what senders configure.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecipientPublicKey {
    bytes: [u8; X25519_KEY_LENGTH],
}

impl RecipientPublicKey {
    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self { bytes }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_32(hex_str)
            .map(Self::from_bytes)
            .ok_or(KeyError::InvalidPublicKey)
    }

    pub fn as_bytes(&self) -> &[u8; X25519_KEY_LENGTH] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.bytes)
    }

    pub(crate) fn to_x25519(self) -> PublicKey {
        PublicKey::from(self.bytes)
    }
}

impl fmt::Debug for RecipientPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecipientPublicKey({})", self.fingerprint())
    }
}

/// A long-term X25519 keypair held by whoever scans and decrypts codes.
pub struct RecipientKeypair {
    secret: StaticSecret,
}

impl RecipientKeypair {
    pub fn generate() -> Self {
        Self {
            secret: StaticSecret::random_from_rng(OsRng),
        }
    }

    pub fn from_bytes(bytes: [u8; X25519_KEY_LENGTH]) -> Self {
        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        decode_32(hex_str)
            .map(Self::from_bytes)
            .ok_or(KeyError::InvalidSecretKey)
    }

    pub fn public_key(&self) -> RecipientPublicKey {
        RecipientPublicKey::from_bytes(PublicKey::from(&self.secret).to_bytes())
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.public_key().fingerprint()
    }

    /// Raw secret key. Handle with care.
    pub fn secret_key_bytes(&self) -> [u8; X25519_KEY_LENGTH] {
        self.secret.to_bytes()
    }

    pub(crate) fn diffie_hellman(&self, peer: &[u8; X25519_KEY_LENGTH]) -> [u8; 32] {
        self.secret
            .diffie_hellman(&PublicKey::from(*peer))
            .to_bytes()
    }
}

impl fmt::Debug for RecipientKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientKeypair")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}
