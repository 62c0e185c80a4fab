//! # CLI Interface
//!
//! Defines the command-line argument structure for `qrcrypt` using `clap`
//! derive. Supports four subcommands: `encode`, `decode`, `keygen` and
//! `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use qrcrypt::config::{DEFAULT_QR_PADDING, DEFAULT_QR_SIZE};
use qrcrypt::qr::{ErrorCorrection, ImageFormat};

use crate::logging::LogFormat;

/// Payment instructions in QR codes.
///
/// Encodes plain text or credit-transfer records into QR code images,
/// optionally signed and encrypted, and reads the resulting envelopes back.
#[derive(Parser, Debug)]
#[command(
    name = "qrcrypt",
    about = "Signed and encrypted payment records in QR codes",
    version,
    propagate_version = true
)]
pub struct QrCryptCli {
    /// Log output format.
    #[arg(
        long,
        global = true,
        value_enum,
        env = "QRCRYPT_LOG_FORMAT",
        default_value = "pretty"
    )]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `qrcrypt` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode a mask into a QR code image.
    Encode(EncodeArgs),
    /// Read an envelope back: verify, decrypt and decode its payload.
    Decode(DecodeArgs),
    /// Generate a signing keypair and a recipient keypair.
    Keygen(KeygenArgs),
    /// Print version information and exit.
    Version,
}

/// Payload kinds the CLI can build.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaskKind {
    /// A string, written as is.
    Plain,
    /// A credit-transfer record read from a JSON file.
    Trans,
}

/// Arguments for the `encode` subcommand.
#[derive(Parser, Debug)]
pub struct EncodeArgs {
    /// Kind of payload to encode.
    #[arg(long, value_enum, default_value = "plain")]
    pub mask: MaskKind,

    /// Text to encode with the plain mask.
    #[arg(long, required_if_eq("mask", "plain"))]
    pub text: Option<String>,

    /// JSON file with the transaction fields, keyed by long name or code
    /// (`originator_iban` or `at01`, ...).
    #[arg(long, required_if_eq("mask", "trans"))]
    pub fields: Option<PathBuf>,

    /// File holding a hex-encoded signing key. Signs the payload when set.
    #[arg(long, env = "QRCRYPT_SIGN_KEY")]
    pub sign_key: Option<PathBuf>,

    /// Recipient public key, as hex or as a path to a `.pub` file.
    /// Repeat to encrypt to several recipients.
    #[arg(long, env = "QRCRYPT_RECIPIENTS", value_delimiter = ',')]
    pub recipient: Vec<String>,

    /// Directory the image is written into.
    #[arg(long, short = 'd', env = "QRCRYPT_DIR")]
    pub dir: Option<PathBuf>,

    /// Filename relative to `--dir`. Derived from the image when omitted.
    #[arg(long)]
    pub filename: Option<String>,

    /// Image format: png, gif, jpeg or wbmp.
    #[arg(long, env = "QRCRYPT_FILETYPE", default_value = "png")]
    pub filetype: ImageFormat,

    /// Minimum symbol width in pixels.
    #[arg(long, env = "QRCRYPT_SIZE", default_value_t = DEFAULT_QR_SIZE)]
    pub size: u32,

    /// White border in pixels.
    #[arg(long, env = "QRCRYPT_PADDING", default_value_t = DEFAULT_QR_PADDING)]
    pub padding: u32,

    /// Largest QR version to use (1-40).
    #[arg(long, env = "QRCRYPT_MAX_VERSION")]
    pub max_version: Option<u8>,

    /// Minimum error correction level: L, M, Q or H.
    #[arg(long, env = "QRCRYPT_ECC", default_value = "L")]
    pub ecc: ErrorCorrection,

    /// Also write the raw envelope bytes to this file.
    #[arg(long)]
    pub envelope_out: Option<PathBuf>,
}

/// Arguments for the `decode` subcommand.
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// File holding the raw envelope bytes (as scanned from a code).
    #[arg(long)]
    pub envelope_file: PathBuf,

    /// File holding a hex-encoded recipient secret key. Needed for
    /// encrypted payloads.
    #[arg(long, env = "QRCRYPT_RECIPIENT_KEY")]
    pub recipient_key: Option<PathBuf>,
}

/// Arguments for the `keygen` subcommand.
#[derive(Parser, Debug)]
pub struct KeygenArgs {
    /// Directory for the key files. Existing key files are never overwritten.
    #[arg(long, short = 'o', env = "QRCRYPT_KEY_DIR", default_value = ".")]
    pub out: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        // Ensures the derive macros produce a valid CLI definition.
        QrCryptCli::command().debug_assert();
    }

    #[test]
    fn parses_encode_with_defaults() {
        let cli = QrCryptCli::try_parse_from(["qrcrypt", "encode", "--text", "hello", "-d", "/tmp"])
            .unwrap();
        let Commands::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.mask, MaskKind::Plain);
        assert_eq!(args.text.as_deref(), Some("hello"));
        assert_eq!(args.filetype, ImageFormat::Png);
        assert_eq!(args.ecc, ErrorCorrection::L);
        assert_eq!(args.size, DEFAULT_QR_SIZE);
    }

    #[test]
    fn parses_repeated_recipients_and_options() {
        let cli = QrCryptCli::try_parse_from([
            "qrcrypt",
            "encode",
            "--mask",
            "trans",
            "--fields",
            "record.json",
            "--recipient",
            "aa",
            "--recipient",
            "bb",
            "--filetype",
            "wbmp",
            "--ecc",
            "q",
        ])
        .unwrap();
        let Commands::Encode(args) = cli.command else {
            panic!("expected encode");
        };
        assert_eq!(args.mask, MaskKind::Trans);
        assert_eq!(args.recipient, vec!["aa", "bb"]);
        assert_eq!(args.filetype, ImageFormat::Wbmp);
        assert_eq!(args.ecc, ErrorCorrection::Q);
    }

    #[test]
    fn rejects_unknown_filetype() {
        let result =
            QrCryptCli::try_parse_from(["qrcrypt", "encode", "--text", "x", "--filetype", "bmp"]);
        assert!(result.is_err());
    }

    #[test]
    fn trans_mask_requires_fields() {
        let result = QrCryptCli::try_parse_from(["qrcrypt", "encode", "--mask", "trans"]);
        assert!(result.is_err());
    }
}
