//! # Constants
//!
//! Every magic number in QrCrypt lives here. The envelope format and the
//! transaction record layout are read by scanners we don't control, so
//! changing anything in the first two sections breaks every code already
//! printed.

// ---------------------------------------------------------------------------
// Envelope Format
// ---------------------------------------------------------------------------

/// Prepended to every encoded payload so readers can reject foreign codes
/// without parsing further.
pub const MAGIC: &str = "QCR";

/// Separator between the envelope header fields.
pub const ENVELOPE_SEPARATOR: u8 = b':';

/// Mode flag for payloads that are neither signed nor encrypted.
pub const MODE_NONE: char = 'n';

/// Mode flag for payloads that went through the crypto backend.
pub const MODE_SECURED: char = 's';

/// Upper bound on mask identifier length, in characters.
pub const MAX_MASK_ID_LENGTH: usize = 5;

// ---------------------------------------------------------------------------
// Transaction Record
// ---------------------------------------------------------------------------

/// Separator between record segments. Not escaped inside field values.
pub const FIELD_SEPARATOR: u8 = b'\t';

/// Number of segments in a serialized transaction record.
pub const RECORD_SEGMENTS: usize = 9;

/// IBAN length bounds (character class only, no checksum).
pub const IBAN_MIN_LENGTH: usize = 4;
pub const IBAN_MAX_LENGTH: usize = 34;

/// Amount bounds in minor currency units, both inclusive.
pub const AMOUNT_MIN: u64 = 1;
pub const AMOUNT_MAX: u64 = 99_999_999_999;

/// Purpose code length limit, in bytes.
pub const PURPOSE_MAX_LENGTH: usize = 4;

/// Width of the packed amount (u64 LE).
pub const PACKED_AMOUNT_WIDTH: usize = 8;

/// Width of a packed date (u32 LE seconds since the epoch).
pub const PACKED_DATE_WIDTH: usize = 4;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// AES-256-GCM key length in bytes.
pub const AES_KEY_LENGTH: usize = 32;

/// AES-256-GCM nonce length in bytes. Twelve, always.
pub const AES_NONCE_LENGTH: usize = 12;

/// AES-256-GCM authentication tag length in bytes.
pub const AES_TAG_LENGTH: usize = 16;

/// Ed25519 public key length.
pub const VERIFYING_KEY_LENGTH: usize = 32;

/// Ed25519 signature length.
pub const SIGNATURE_LENGTH: usize = 64;

/// X25519 public key length.
pub const X25519_KEY_LENGTH: usize = 32;

/// Key fingerprint length in bytes (truncated BLAKE3).
pub const FINGERPRINT_LENGTH: usize = 20;

/// BLAKE3 context for wrapping content keys to a recipient.
pub const KEY_WRAP_CONTEXT: &str = "qrcrypt v1 recipient key wrap";

/// BLAKE3 context for key fingerprints.
pub const FINGERPRINT_CONTEXT: &str = "qrcrypt v1 key fingerprint";

/// Native backend packet tags, first byte of every packet.
pub const PACKET_SIGNED: u8 = 0x01;
pub const PACKET_ENCRYPTED: u8 = 0x02;
pub const PACKET_SIGNED_AND_ENCRYPTED: u8 = 0x03;

/// Keys (signers or recipients) per packet; the count is a single byte.
pub const MAX_PACKET_KEYS: usize = u8::MAX as usize;

/// Armor label for native backend output.
pub const ARMOR_LABEL: &str = "QRCRYPT MESSAGE";

/// Base64 line width inside an armored block.
pub const ARMOR_LINE_WIDTH: usize = 64;

// ---------------------------------------------------------------------------
// QR Rendering
// ---------------------------------------------------------------------------

/// Highest QR version defined by ISO/IEC 18004.
pub const QR_MAX_VERSION: u8 = 40;

/// Default rendered symbol size in pixels, excluding padding.
pub const DEFAULT_QR_SIZE: u32 = 300;

/// Default white border around the symbol, in pixels.
pub const DEFAULT_QR_PADDING: u32 = 16;

/// Largest rendered image side, padding included, in pixels.
pub const QR_MAX_IMAGE_SIDE: u32 = 16_384;

/// Characters used to disambiguate auto-generated filenames.
pub const FILENAME_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Number of digest bytes used for auto-generated filenames (32 hex chars).
pub const FILENAME_DIGEST_BYTES: usize = 16;

/// Crate version, stamped into armor headers.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
