//! Identity mask: the string goes into the code exactly as given.

use super::{Mask, SerializationError};

/// Wraps a single string. Serialization never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainMask {
    string: String,
}

impl PlainMask {
    /// Envelope identifier of plain payloads.
    pub const ID: &'static str = "plain";

    pub fn new(string: impl Into<String>) -> Self {
        Self {
            string: string.into(),
        }
    }

    pub fn set_string(&mut self, string: impl Into<String>) {
        self.string = string.into();
    }

    pub fn string(&self) -> &str {
        &self.string
    }
}

impl Mask for PlainMask {
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(self.string.as_bytes().to_vec())
    }

    fn id(&self) -> &'static str {
        Self::ID
    }
}
