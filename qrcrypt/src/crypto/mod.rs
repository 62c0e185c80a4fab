//! # Cryptography for QrCrypt
//!
//! Everything between "serialized mask" and "envelope payload" flows through
//! here. The encoder only sees the [`CryptoBackend`] trait; the rest of this
//! module is what the shipped [`NativeBackend`] is built from.
//!
//! - **Ed25519** for signatures.
//! - **X25519** for per-recipient key agreement.
//! - **AES-256-GCM** for the payload and for wrapping content keys.
//! - **BLAKE3** `derive_key` for key-encryption keys and fingerprints.
//!
//! Every primitive is a thin wrapper around an audited implementation. The
//! only format we define ourselves is the packet layout in [`backend`].

pub mod armor;
pub mod backend;
pub mod encryption;
pub mod keys;

pub use armor::{decode_body, strip_armor, ArmorError};
pub use backend::{open, BackendError, CryptoBackend, NativeBackend, Opened};
pub use encryption::EncryptionError;
pub use keys::{Fingerprint, KeyError, RecipientKeypair, RecipientPublicKey, SigningKeypair};
