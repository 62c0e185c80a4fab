//! # Masks
//!
//! A mask is a payload-serialization strategy. It knows how to turn its data
//! into the bytes that end up inside the QR code, and it names itself with a
//! short identifier so readers know how to interpret those bytes.
//!
//! ```text
//! plain.rs        PlainMask, a string, passed through unchanged
//! transaction.rs  TransactionMask, a credit-transfer instruction with
//!                 validated fields and binary-packed amount/dates
//! ```
//!
//! Third-party masks implement [`Mask`] directly. The encoder checks the
//! identifier with [`validate_mask_id`] before writing an envelope, so a
//! bad identifier is caught before it can corrupt the header.

pub mod plain;
pub mod transaction;

use thiserror::Error;

use crate::config::{ENVELOPE_SEPARATOR, MAX_MASK_ID_LENGTH};

pub use plain::PlainMask;
pub use transaction::{FieldError, FieldValue, TransactionField, TransactionMask};

/// Errors a mask may raise while serializing.
///
/// This is the umbrella for everything `to_bytes` can report. The encoder
/// propagates it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializationError {
    /// A required field was never set.
    #[error("missing required information: {0}")]
    MissingInformation(&'static str),

    /// The mask reported an identifier that cannot appear in an envelope.
    #[error("invalid mask identifier {0:?}: must be 1-{MAX_MASK_ID_LENGTH} characters without ':'")]
    InvalidMaskId(String),
}

/// The contract every payload kind implements.
pub trait Mask {
    /// Serializes the mask contents into the bytes written into the code.
    ///
    /// All-or-nothing: either the full canonical representation or an error.
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError>;

    /// Short identifier of the mask kind. Depends on the kind only, never on
    /// instance data.
    fn id(&self) -> &'static str;
}

impl<M: Mask + ?Sized> Mask for &M {
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        (**self).to_bytes()
    }

    fn id(&self) -> &'static str {
        (**self).id()
    }
}

impl<M: Mask + ?Sized> Mask for Box<M> {
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        (**self).to_bytes()
    }

    fn id(&self) -> &'static str {
        (**self).id()
    }
}

/// Checks that `id` can be written into an envelope header.
pub fn validate_mask_id(id: &str) -> Result<(), SerializationError> {
    let len = id.chars().count();
    if len == 0 || len > MAX_MASK_ID_LENGTH || id.contains(ENVELOPE_SEPARATOR as char) {
        return Err(SerializationError::InvalidMaskId(id.to_string()));
    }
    Ok(())
}
