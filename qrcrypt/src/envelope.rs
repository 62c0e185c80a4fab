//! # Envelope
//!
//! Every code carries the same header so a reader can tell what it is
//! looking at before touching the payload:
//!
//! ```text
//! QCR:<mask id> :<mode>:<payload>
//! ```
//!
//! The space before the second colon is part of the format. `mode` is `n`
//! for payloads written as the mask produced them and `s` for payloads that
//! went through a [`CryptoBackend`]. Secured payloads have their armor
//! framing stripped first; the body alone is what scanners need.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{ENVELOPE_SEPARATOR, MAGIC, MODE_NONE, MODE_SECURED};
use crate::crypto::{strip_armor, BackendError, CryptoBackend};
use crate::mask::{validate_mask_id, Mask, SerializationError};

/// What the encoder does to the payload before writing it.
///
/// Chosen once, when the encoder is built. There is no global switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protection {
    #[default]
    None,
    Signed,
    Encrypted,
    SignedAndEncrypted,
}

impl Protection {
    pub fn from_flags(signed: bool, encrypted: bool) -> Self {
        match (signed, encrypted) {
            (false, false) => Self::None,
            (true, false) => Self::Signed,
            (false, true) => Self::Encrypted,
            (true, true) => Self::SignedAndEncrypted,
        }
    }

    /// The mode flag written for this protection.
    pub fn mode(self) -> Mode {
        match self {
            Self::None => Mode::None,
            _ => Mode::Secured,
        }
    }
}

/// Envelope mode flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    None,
    Secured,
}

impl Mode {
    pub fn as_char(self) -> char {
        match self {
            Self::None => MODE_NONE,
            Self::Secured => MODE_SECURED,
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            MODE_NONE => Some(Self::None),
            MODE_SECURED => Some(Self::Secured),
            _ => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Serialization(#[from] SerializationError),

    #[error("crypto backend failed: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("not a QrCrypt code: missing {MAGIC} prefix")]
    BadMagic,

    #[error("malformed envelope header")]
    BadHeader,

    #[error("unknown envelope mode {0:?}")]
    UnknownMode(char),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// A parsed or freshly built envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub mask_id: String,
    pub mode: Mode,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Wire bytes: `QCR:<id> :<mode>:<payload>`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let header = format!(
            "{MAGIC}:{} :{}:",
            self.mask_id,
            self.mode.as_char()
        );
        let mut out = Vec::with_capacity(header.len() + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Splits wire bytes back into header and payload.
    ///
    /// ```
    /// use qrcrypt::envelope::{Envelope, Mode};
    ///
    /// let env = Envelope::parse(b"QCR:plain :n:hello").unwrap();
    /// assert_eq!(env.mask_id, "plain");
    /// assert_eq!(env.mode, Mode::None);
    /// assert_eq!(env.payload, b"hello");
    /// ```
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let rest = bytes
            .strip_prefix(MAGIC.as_bytes())
            .and_then(|r| r.strip_prefix(&[ENVELOPE_SEPARATOR]))
            .ok_or(ParseError::BadMagic)?;

        // Mask ids never contain the separator, so the first one ends the id.
        let colon = rest
            .iter()
            .position(|&b| b == ENVELOPE_SEPARATOR)
            .ok_or(ParseError::BadHeader)?;
        let id_bytes = rest[..colon]
            .strip_suffix(b" ")
            .ok_or(ParseError::BadHeader)?;
        let mask_id = std::str::from_utf8(id_bytes).map_err(|_| ParseError::BadHeader)?;
        validate_mask_id(mask_id).map_err(|_| ParseError::BadHeader)?;

        let rest = &rest[colon + 1..];
        let (&mode_byte, rest) = rest.split_first().ok_or(ParseError::BadHeader)?;
        let payload = rest
            .strip_prefix(&[ENVELOPE_SEPARATOR])
            .ok_or(ParseError::BadHeader)?;
        let mode = Mode::from_char(mode_byte as char)
            .ok_or(ParseError::UnknownMode(mode_byte as char))?;

        Ok(Self {
            mask_id: mask_id.to_string(),
            mode,
            payload: payload.to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Turns a mask into envelope bytes.
///
/// ```
/// use qrcrypt::envelope::Encoder;
/// use qrcrypt::mask::PlainMask;
///
/// let encoder = Encoder::plain(PlainMask::new("hello"));
/// assert_eq!(encoder.encode().unwrap(), b"QCR:plain :n:hello");
/// ```
pub struct Encoder<M> {
    mask: M,
    protection: Protection,
    backend: Option<Box<dyn CryptoBackend>>,
}

impl<M: Mask> Encoder<M> {
    /// Encoder that writes the mask output unchanged.
    pub fn plain(mask: M) -> Self {
        Self {
            mask,
            protection: Protection::None,
            backend: None,
        }
    }

    /// Encoder that runs the mask output through `backend`.
    ///
    /// With [`Protection::None`] the backend is dropped and this behaves like
    /// [`Encoder::plain`].
    pub fn secured(mask: M, protection: Protection, backend: Box<dyn CryptoBackend>) -> Self {
        let backend = (protection != Protection::None).then_some(backend);
        Self {
            mask,
            protection,
            backend,
        }
    }

    pub fn mask(&self) -> &M {
        &self.mask
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    /// Builds the envelope without serializing it.
    pub fn envelope(&self) -> Result<Envelope, EncodeError> {
        let mask_id = self.mask.id();
        validate_mask_id(mask_id)?;

        let payload = self.mask.to_bytes()?;
        let secured = match (self.protection, self.backend.as_deref()) {
            (Protection::SignedAndEncrypted, Some(backend)) => {
                Some(backend.encrypt_and_sign(&payload)?)
            }
            (Protection::Encrypted, Some(backend)) => Some(backend.encrypt(&payload)?),
            (Protection::Signed, Some(backend)) => Some(backend.sign(&payload)?),
            _ => None,
        };

        let (mode, payload) = match secured {
            Some(output) => (Mode::Secured, strip_armor(&output)),
            None => (Mode::None, payload),
        };

        tracing::debug!(
            mask = mask_id,
            %mode,
            payload_len = payload.len(),
            "envelope built"
        );

        Ok(Envelope {
            mask_id: mask_id.to_string(),
            mode,
            payload,
        })
    }

    /// Encodes the mask into envelope bytes, ready for rendering.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(self.envelope()?.to_bytes())
    }
}

impl<M: fmt::Debug> fmt::Debug for Encoder<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder")
            .field("mask", &self.mask)
            .field("protection", &self.protection)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}
