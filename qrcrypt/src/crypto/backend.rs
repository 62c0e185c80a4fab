//! # Crypto Backends
//!
//! The encoder never touches key material itself. It hands the serialized
//! payload to a [`CryptoBackend`] and receives (possibly armored) bytes back.
//!
//! [`NativeBackend`] is the backend shipped with the crate:
//!
//! ```text
//! signed     0x01 | n | (pubkey32 | sig64){n} | payload
//! encrypted  0x02 | n | (ephemeral32 | wrapped_key60){n} | nonce12 | ct+tag
//! both       0x03 | n | (ephemeral32 | wrapped_key60){n} | nonce12 | ct(signed packet)+tag
//! ```
//!
//! The content key is a fresh AES-256 key per message. Each recipient gets
//! its own copy, encrypted under a key derived from an ephemeral X25519
//! agreement. The packet header (tag, count, recipient entries) is bound to
//! the payload ciphertext as associated data.
//!
//! Output is armored under [`ARMOR_LABEL`]; the encoder strips the framing
//! again before the bytes go into the envelope. [`open`] accepts either form.

use rand::rngs::OsRng;
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey};

use super::armor::{self, ArmorError};
use super::encryption::{self, EncryptionError};
use super::keys::{self, Fingerprint, RecipientKeypair, RecipientPublicKey, SigningKeypair};
use crate::config::{
    AES_KEY_LENGTH, AES_NONCE_LENGTH, AES_TAG_LENGTH, ARMOR_LABEL, KEY_WRAP_CONTEXT,
    MAX_PACKET_KEYS, PACKET_ENCRYPTED, PACKET_SIGNED, PACKET_SIGNED_AND_ENCRYPTED,
    SIGNATURE_LENGTH, VERIFYING_KEY_LENGTH, X25519_KEY_LENGTH,
};

/// Content key sealed for one recipient: nonce, key, tag.
const WRAPPED_KEY_LENGTH: usize = AES_NONCE_LENGTH + AES_KEY_LENGTH + AES_TAG_LENGTH;

const SIGNER_ENTRY_LENGTH: usize = VERIFYING_KEY_LENGTH + SIGNATURE_LENGTH;
const RECIPIENT_ENTRY_LENGTH: usize = X25519_KEY_LENGTH + WRAPPED_KEY_LENGTH;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no signing key configured")]
    NoSigningKey,

    #[error("no recipient key configured")]
    NoRecipients,

    #[error("too many keys: a packet holds at most {MAX_PACKET_KEYS}")]
    TooManyKeys,

    #[error("recipient key {0} cannot be used for key agreement")]
    InvalidRecipient(Fingerprint),

    #[error("message is encrypted but no recipient key was supplied")]
    RecipientKeyRequired,

    #[error("message is not encrypted to this key")]
    NotARecipient,

    #[error("signature by {0} does not verify")]
    VerificationFailed(Fingerprint),

    #[error("malformed packet: {0}")]
    Malformed(&'static str),

    #[error("unknown packet tag {0:#04x}")]
    UnknownPacket(u8),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Armor(#[from] ArmorError),
}

/// The capability surface the encoder needs from a crypto engine.
///
/// Implementations are configured (keys added) before they are handed to an
/// encoder, and are only used through `&self` afterwards.
pub trait CryptoBackend: Send + Sync {
    /// Signs `data` with every configured signing key.
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// Encrypts `data` to every configured recipient.
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, BackendError>;

    /// Signs, then encrypts the signed message.
    fn encrypt_and_sign(&self, data: &[u8]) -> Result<Vec<u8>, BackendError>;
}

// ---------------------------------------------------------------------------
// Native backend
// ---------------------------------------------------------------------------

/// Ed25519 / X25519 / AES-256-GCM backend.
#[derive(Debug, Default)]
pub struct NativeBackend {
    sign_keys: Vec<SigningKeypair>,
    recipients: Vec<RecipientPublicKey>,
}

impl NativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a signing key. Adding the same key twice is a no-op.
    pub fn add_sign_key(&mut self, key: SigningKeypair) -> Result<Fingerprint, BackendError> {
        let fingerprint = key.fingerprint();
        if self.sign_keys.iter().any(|k| k.fingerprint() == fingerprint) {
            return Ok(fingerprint);
        }
        if self.sign_keys.len() >= MAX_PACKET_KEYS {
            return Err(BackendError::TooManyKeys);
        }
        self.sign_keys.push(key);
        tracing::debug!(%fingerprint, "signing key added");
        Ok(fingerprint)
    }

    /// Adds a recipient. Adding the same key twice is a no-op.
    pub fn add_encrypt_key(&mut self, key: RecipientPublicKey) -> Result<Fingerprint, BackendError> {
        let fingerprint = key.fingerprint();
        if self.recipients.contains(&key) {
            return Ok(fingerprint);
        }
        if self.recipients.len() >= MAX_PACKET_KEYS {
            return Err(BackendError::TooManyKeys);
        }
        self.recipients.push(key);
        tracing::debug!(%fingerprint, "recipient key added");
        Ok(fingerprint)
    }

    pub fn sign_key_fingerprints(&self) -> Vec<Fingerprint> {
        self.sign_keys.iter().map(SigningKeypair::fingerprint).collect()
    }

    pub fn recipient_fingerprints(&self) -> Vec<Fingerprint> {
        self.recipients
            .iter()
            .map(RecipientPublicKey::fingerprint)
            .collect()
    }

    fn signed_packet(&self, data: &[u8]) -> Result<Vec<u8>, BackendError> {
        if self.sign_keys.is_empty() {
            return Err(BackendError::NoSigningKey);
        }

        let mut packet =
            Vec::with_capacity(2 + self.sign_keys.len() * SIGNER_ENTRY_LENGTH + data.len());
        packet.push(PACKET_SIGNED);
        packet.push(self.sign_keys.len() as u8);
        for key in &self.sign_keys {
            packet.extend_from_slice(&key.public_key_bytes());
            packet.extend_from_slice(&key.sign(data));
        }
        packet.extend_from_slice(data);

        tracing::debug!(signers = self.sign_keys.len(), "payload signed");
        Ok(packet)
    }

    fn encrypted_packet(&self, tag: u8, data: &[u8]) -> Result<Vec<u8>, BackendError> {
        if self.recipients.is_empty() {
            return Err(BackendError::NoRecipients);
        }

        let content_key = encryption::random_key();

        let mut packet = Vec::with_capacity(
            2 + self.recipients.len() * RECIPIENT_ENTRY_LENGTH
                + AES_NONCE_LENGTH
                + data.len()
                + AES_TAG_LENGTH,
        );
        packet.push(tag);
        packet.push(self.recipients.len() as u8);

        for recipient in &self.recipients {
            let ephemeral = EphemeralSecret::random_from_rng(OsRng);
            let ephemeral_public = PublicKey::from(&ephemeral).to_bytes();
            let shared = ephemeral.diffie_hellman(&recipient.to_x25519());
            if !shared.was_contributory() {
                return Err(BackendError::InvalidRecipient(recipient.fingerprint()));
            }

            let kek = key_encryption_key(shared.as_bytes(), &ephemeral_public, recipient.as_bytes());
            let wrapped = encryption::encrypt(&kek, &content_key, recipient.as_bytes())?;

            packet.extend_from_slice(&ephemeral_public);
            packet.extend_from_slice(&wrapped);
        }

        let body = encryption::encrypt(&content_key, data, &packet)?;
        packet.extend_from_slice(&body);

        tracing::debug!(recipients = self.recipients.len(), "payload encrypted");
        Ok(packet)
    }
}

impl CryptoBackend for NativeBackend {
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, BackendError> {
        let packet = self.signed_packet(data)?;
        Ok(armor::wrap(ARMOR_LABEL, &packet).into_bytes())
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, BackendError> {
        let packet = self.encrypted_packet(PACKET_ENCRYPTED, data)?;
        Ok(armor::wrap(ARMOR_LABEL, &packet).into_bytes())
    }

    fn encrypt_and_sign(&self, data: &[u8]) -> Result<Vec<u8>, BackendError> {
        let signed = self.signed_packet(data)?;
        let packet = self.encrypted_packet(PACKET_SIGNED_AND_ENCRYPTED, &signed)?;
        Ok(armor::wrap(ARMOR_LABEL, &packet).into_bytes())
    }
}

fn key_encryption_key(
    shared: &[u8; 32],
    ephemeral: &[u8; X25519_KEY_LENGTH],
    recipient: &[u8; X25519_KEY_LENGTH],
) -> [u8; AES_KEY_LENGTH] {
    let mut hasher = blake3::Hasher::new_derive_key(KEY_WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(ephemeral);
    hasher.update(recipient);
    *hasher.finalize().as_bytes()
}

// ---------------------------------------------------------------------------
// Reader side
// ---------------------------------------------------------------------------

/// A message after decryption and signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    pub payload: Vec<u8>,
    /// Every key whose signature verified, in packet order.
    pub signers: Vec<Fingerprint>,
    pub encrypted: bool,
}

/// Opens a native backend message, armored or stripped.
///
/// Every signature in the packet must verify; one bad signature fails the
/// whole message.
pub fn open(message: &[u8], recipient: Option<&RecipientKeypair>) -> Result<Opened, BackendError> {
    let packet = armor::decode_body(message)?;
    let tag = *packet.first().ok_or(BackendError::Malformed("empty packet"))?;

    match tag {
        PACKET_SIGNED => {
            let (payload, signers) = verify_signed(&packet)?;
            Ok(Opened {
                payload,
                signers,
                encrypted: false,
            })
        }
        PACKET_ENCRYPTED => Ok(Opened {
            payload: decrypt_packet(&packet, recipient)?,
            signers: Vec::new(),
            encrypted: true,
        }),
        PACKET_SIGNED_AND_ENCRYPTED => {
            let inner = decrypt_packet(&packet, recipient)?;
            if inner.first() != Some(&PACKET_SIGNED) {
                return Err(BackendError::Malformed("encrypted content is not a signed packet"));
            }
            let (payload, signers) = verify_signed(&inner)?;
            Ok(Opened {
                payload,
                signers,
                encrypted: true,
            })
        }
        other => Err(BackendError::UnknownPacket(other)),
    }
}

fn verify_signed(packet: &[u8]) -> Result<(Vec<u8>, Vec<Fingerprint>), BackendError> {
    let mut reader = PacketReader::new(packet);
    reader.take::<1>()?;
    let count = reader.count()?;

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let public_key = reader.take::<VERIFYING_KEY_LENGTH>()?;
        let signature = reader.take::<SIGNATURE_LENGTH>()?;
        entries.push((public_key, signature));
    }
    let payload = reader.rest();

    let mut signers = Vec::with_capacity(count);
    for (public_key, signature) in entries {
        let fingerprint = Fingerprint::of(&public_key);
        if !keys::verify(&public_key, payload, &signature) {
            return Err(BackendError::VerificationFailed(fingerprint));
        }
        signers.push(fingerprint);
    }
    Ok((payload.to_vec(), signers))
}

fn decrypt_packet(
    packet: &[u8],
    recipient: Option<&RecipientKeypair>,
) -> Result<Vec<u8>, BackendError> {
    let recipient = recipient.ok_or(BackendError::RecipientKeyRequired)?;
    let own_public = recipient.public_key();

    let mut reader = PacketReader::new(packet);
    reader.take::<1>()?;
    let count = reader.count()?;

    let mut content_key = None;
    for _ in 0..count {
        let ephemeral = reader.take::<X25519_KEY_LENGTH>()?;
        let wrapped = reader.take::<WRAPPED_KEY_LENGTH>()?;
        if content_key.is_some() {
            continue;
        }
        let shared = recipient.diffie_hellman(&ephemeral);
        let kek = key_encryption_key(&shared, &ephemeral, own_public.as_bytes());
        // Entries for other recipients simply fail to authenticate.
        if let Ok(key) = encryption::decrypt(&kek, &wrapped, own_public.as_bytes()) {
            content_key = Some(key);
        }
    }

    let key: [u8; AES_KEY_LENGTH] = content_key
        .ok_or(BackendError::NotARecipient)?
        .try_into()
        .map_err(|_| BackendError::Malformed("wrapped content key has the wrong length"))?;

    let header_len = reader.position();
    Ok(encryption::decrypt(
        &key,
        &packet[header_len..],
        &packet[..header_len],
    )?)
}

struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], BackendError> {
        let end = self.pos + N;
        let bytes: [u8; N] = self
            .data
            .get(self.pos..end)
            .and_then(|s| s.try_into().ok())
            .ok_or(BackendError::Malformed("packet truncated"))?;
        self.pos = end;
        Ok(bytes)
    }

    fn count(&mut self) -> Result<usize, BackendError> {
        let [n] = self.take::<1>()?;
        if n == 0 {
            return Err(BackendError::Malformed("packet lists no keys"));
        }
        Ok(n as usize)
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    fn position(&self) -> usize {
        self.pos
    }
}
