// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # QrCrypt Core Library
//!
//! Payment instructions in QR codes, optionally signed and encrypted.
//!
//! A caller fills a [`Mask`] with data, an [`Encoder`] turns it into an
//! envelope (running it through a [`CryptoBackend`] if asked to), and the
//! [`qr`] module renders the envelope into an image:
//!
//! ```text
//! Mask::to_bytes ─► CryptoBackend (sign / encrypt) ─► strip armor
//!                ─► "QCR:<id> :<mode>:<payload>" ─► QR image ─► file
//! ```
//!
//! ## Modules
//!
//! - **config**: Every constant (magic, field limits, separators, QR defaults).
//! - **mask**: The Mask contract plus the plain and transaction masks.
//! - **options**: Turns loosely typed key/value input into mask options.
//! - **envelope**: Envelope format, encoder and parser.
//! - **crypto**: Backend trait and the native Ed25519/X25519/AES-GCM backend.
//! - **qr**: Symbol selection and image rendering.
//! - **storage**: Writing images without ever overwriting a file.
//! - **facade**: [`QrCrypt`], all of the above behind three calls.
//!
//! ## Example
//!
//! ```
//! use qrcrypt::{Encoder, PlainMask};
//!
//! let bytes = Encoder::plain(PlainMask::new("hello")).encode().unwrap();
//! assert_eq!(bytes, b"QCR:plain :n:hello");
//! ```

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod facade;
pub mod mask;
pub mod options;
pub mod qr;
pub mod storage;

pub use crypto::{CryptoBackend, NativeBackend};
pub use envelope::{EncodeError, Encoder, Envelope, Mode, Protection};
pub use facade::{QrCrypt, QrCryptError, Saved};
pub use mask::{Mask, PlainMask, SerializationError, TransactionMask};
pub use qr::{ErrorCorrection, ImageFormat, QrOptions};
