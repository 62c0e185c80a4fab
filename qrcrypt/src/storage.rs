//! Saving rendered codes to disk.
//!
//! Files are created with `create_new`, so an existing file is never
//! overwritten, even if it appears between the check and the write.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{FILENAME_CHARSET, FILENAME_DIGEST_BYTES};
use crate::qr::ImageFormat;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("output directory is not set")]
    DirectoryNotSet,

    #[error("directory {0} does not exist")]
    DirectoryNotFound(PathBuf),

    #[error("file {0} already exists")]
    FileExists(PathBuf),

    #[error("failed to write image: {0}")]
    Io(#[from] io::Error),
}

/// Writes `image` into `directory` and returns the filename used, relative
/// to the directory.
///
/// Without an explicit `filename`, the name is derived from the image
/// digest; if that file exists, random alphanumerics are prepended until
/// the name is free.
pub fn save(
    directory: Option<&Path>,
    image: &[u8],
    filetype: ImageFormat,
    filename: Option<&str>,
) -> Result<String, StorageError> {
    let directory = directory.ok_or(StorageError::DirectoryNotSet)?;
    if !directory.is_dir() {
        return Err(StorageError::DirectoryNotFound(directory.to_path_buf()));
    }

    let filename = match filename {
        Some(name) => {
            let path = directory.join(name);
            if !write_new(&path, image)? {
                return Err(StorageError::FileExists(path));
            }
            name.to_string()
        }
        None => {
            let mut name = default_filename(image, filetype);
            let mut rng = rand::thread_rng();
            while !write_new(&directory.join(&name), image)? {
                // The charset is a non-empty constant.
                if let Some(&c) = FILENAME_CHARSET.choose(&mut rng) {
                    name.insert(0, c as char);
                }
            }
            name
        }
    };

    tracing::info!(
        %filename,
        directory = %directory.display(),
        bytes = image.len(),
        "qr code saved"
    );
    Ok(filename)
}

/// Digest-based name: 32 hex characters plus the extension.
pub fn default_filename(image: &[u8], filetype: ImageFormat) -> String {
    let digest = Sha256::digest(image);
    format!(
        "{}.{}",
        hex::encode(&digest[..FILENAME_DIGEST_BYTES]),
        filetype.extension()
    )
}

/// Creates `path` and writes `data`. `Ok(false)` if the file already exists.
fn write_new(path: &Path, data: &[u8]) -> Result<bool, StorageError> {
    write_new_with(path, |file| file.write_all(data))
}

/// Creates `path` and fills it with `write`. A failed write removes the
/// partial file again.
fn write_new_with<F>(path: &Path, write: F) -> Result<bool, StorageError>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = write(&mut file).and_then(|()| file.flush()) {
        drop(file);
        if let Err(cleanup) = fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %cleanup, "partial image left behind");
        }
        return Err(e.into());
    }
    Ok(true)
}
