//! One-stop API: mask in, image out.
//!
//! ```no_run
//! use qrcrypt::{Encoder, PlainMask, QrCrypt};
//!
//! let qr = QrCrypt::new(Encoder::plain(PlainMask::new("hello"))).with_directory("/tmp/codes");
//! let filename = qr.save(None).unwrap();
//! println!("saved {filename}");
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::envelope::{EncodeError, Encoder};
use crate::mask::Mask;
use crate::qr::{self, QrOptions, RenderError};
use crate::storage::{self, StorageError};

#[derive(Debug, Error)]
pub enum QrCryptError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What [`QrCrypt::save_envelope`] wrote: the envelope that went into the
/// code and the filename of the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Saved {
    pub envelope: Vec<u8>,
    pub filename: String,
}

/// Encoder, rendering options and output directory in one place.
#[derive(Debug)]
pub struct QrCrypt<M> {
    encoder: Encoder<M>,
    qr_options: QrOptions,
    directory: Option<PathBuf>,
}

impl<M: Mask> QrCrypt<M> {
    pub fn new(encoder: Encoder<M>) -> Self {
        Self {
            encoder,
            qr_options: QrOptions::default(),
            directory: None,
        }
    }

    pub fn with_options(mut self, options: QrOptions) -> Self {
        self.qr_options = options;
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn encoder(&self) -> &Encoder<M> {
        &self.encoder
    }

    pub fn qr_options(&self) -> &QrOptions {
        &self.qr_options
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    /// The envelope bytes that go into the code.
    pub fn encode(&self) -> Result<Vec<u8>, QrCryptError> {
        Ok(self.encoder.encode()?)
    }

    /// Renders the code and returns the raw image bytes.
    pub fn display(&self) -> Result<Vec<u8>, QrCryptError> {
        let data = self.encoder.encode()?;
        Ok(qr::render(&data, &self.qr_options)?)
    }

    /// Renders the code and writes it into the configured directory.
    ///
    /// Returns the filename relative to that directory.
    pub fn save(&self, filename: Option<&str>) -> Result<String, QrCryptError> {
        self.save_envelope(filename).map(|saved| saved.filename)
    }

    /// Like [`save`](Self::save), but also hands back the envelope bytes
    /// encoded in the image. Secured envelopes differ on every encode, so
    /// this is the only way to learn what a saved code holds.
    pub fn save_envelope(&self, filename: Option<&str>) -> Result<Saved, QrCryptError> {
        // Fail on configuration before doing any crypto or rendering work.
        let directory = self
            .directory
            .as_deref()
            .ok_or(StorageError::DirectoryNotSet)?;
        if !directory.is_dir() {
            return Err(StorageError::DirectoryNotFound(directory.to_path_buf()).into());
        }

        let envelope = self.encoder.encode()?;
        let image = qr::render(&envelope, &self.qr_options)?;
        let filename = storage::save(
            Some(directory),
            &image,
            self.qr_options.filetype,
            filename,
        )?;
        Ok(Saved { envelope, filename })
    }
}
