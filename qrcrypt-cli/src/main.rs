// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # QrCrypt Command Line
//!
//! Entry point for the `qrcrypt` binary. Parses CLI arguments, initializes
//! logging and dispatches to one of four subcommands:
//!
//! - `encode` : build a mask, secure it, render and save the code
//! - `decode` : parse an envelope, open it and print the payload as JSON
//! - `keygen` : write a signing keypair and a recipient keypair
//! - `version`: print build version information

mod cli;
mod logging;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Map, Value};

use qrcrypt::crypto::{
    self, NativeBackend, RecipientKeypair, RecipientPublicKey, SigningKeypair,
};
use qrcrypt::envelope::{Encoder, Envelope, Mode, Protection};
use qrcrypt::mask::{Mask, PlainMask, TransactionField as F, TransactionMask};
use qrcrypt::qr::QrOptions;
use qrcrypt::QrCrypt;

use cli::{Commands, DecodeArgs, EncodeArgs, KeygenArgs, MaskKind, QrCryptCli};

fn main() -> Result<()> {
    let cli = QrCryptCli::parse();
    logging::init_logging("qrcrypt=info", cli.log_format);

    match cli.command {
        Commands::Encode(args) => {
            let filename = encode(args)?;
            println!("{filename}");
            Ok(())
        }
        Commands::Decode(args) => decode(args),
        Commands::Keygen(args) => keygen(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// encode
// ---------------------------------------------------------------------------

/// Encodes, renders and saves the code. Returns the saved filename.
fn encode(args: EncodeArgs) -> Result<String> {
    let mask: Box<dyn Mask + Send + Sync> = match args.mask {
        MaskKind::Plain => {
            let text = args
                .text
                .context("--text is required for the plain mask")?;
            Box::new(PlainMask::new(text))
        }
        MaskKind::Trans => {
            let path = args
                .fields
                .context("--fields is required for the trans mask")?;
            Box::new(load_transaction(&path)?)
        }
    };

    let encoder = build_encoder(mask, args.sign_key.as_deref(), &args.recipient)?;
    let options = QrOptions {
        max_version: args.max_version,
        min_error_correction: args.ecc,
        size: args.size,
        padding: args.padding,
        filetype: args.filetype,
    };

    tracing::info!(
        mask = encoder.mask().id(),
        protection = ?encoder.protection(),
        filetype = %options.filetype,
        "encoding"
    );

    let mut qr = QrCrypt::new(encoder).with_options(options);
    if let Some(dir) = &args.dir {
        qr = qr.with_directory(dir);
    }

    let saved = qr
        .save_envelope(args.filename.as_deref())
        .context("failed to save QR code")?;

    // Written from the same encode as the image: secured envelopes differ
    // on every run.
    if let Some(path) = &args.envelope_out {
        fs::write(path, &saved.envelope)
            .with_context(|| format!("failed to write envelope to {}", path.display()))?;
    }

    Ok(saved.filename)
}

fn load_transaction(path: &Path) -> Result<TransactionMask> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read fields from {}", path.display()))?;
    let value: Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    TransactionMask::from_json(&value)
        .with_context(|| format!("invalid transaction fields in {}", path.display()))
}

fn build_encoder<M: Mask>(
    mask: M,
    sign_key: Option<&Path>,
    recipients: &[String],
) -> Result<Encoder<M>> {
    let protection = Protection::from_flags(sign_key.is_some(), !recipients.is_empty());
    if protection == Protection::None {
        return Ok(Encoder::plain(mask));
    }

    let mut backend = NativeBackend::new();
    if let Some(path) = sign_key {
        let key = SigningKeypair::from_hex(&read_key_file(path)?)
            .with_context(|| format!("invalid signing key in {}", path.display()))?;
        let fingerprint = backend.add_sign_key(key)?;
        tracing::info!(%fingerprint, "signing");
    }
    for recipient in recipients {
        let key = load_recipient(recipient)?;
        let fingerprint = backend.add_encrypt_key(key)?;
        tracing::info!(%fingerprint, "encrypting to recipient");
    }

    Ok(Encoder::secured(mask, protection, Box::new(backend)))
}

/// A recipient is given either inline as hex or as a `.pub` file.
fn load_recipient(arg: &str) -> Result<RecipientPublicKey> {
    let path = Path::new(arg);
    let hex_key = if path.is_file() {
        read_key_file(path)?
    } else {
        arg.to_string()
    };
    RecipientPublicKey::from_hex(&hex_key)
        .with_context(|| format!("invalid recipient public key {arg:?}"))
}

fn read_key_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("failed to read key file {}", path.display()))
}

// ---------------------------------------------------------------------------
// decode
// ---------------------------------------------------------------------------

fn decode(args: DecodeArgs) -> Result<()> {
    let wire = fs::read(&args.envelope_file).with_context(|| {
        format!(
            "failed to read envelope from {}",
            args.envelope_file.display()
        )
    })?;
    let envelope = Envelope::parse(&wire).context("not a QrCrypt envelope")?;

    let recipient = match &args.recipient_key {
        Some(path) => Some(
            RecipientKeypair::from_hex(&read_key_file(path)?)
                .with_context(|| format!("invalid recipient key in {}", path.display()))?,
        ),
        None => None,
    };

    let report = open_envelope(envelope, recipient.as_ref())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Opens and decodes an envelope into a JSON report.
fn open_envelope(envelope: Envelope, recipient: Option<&RecipientKeypair>) -> Result<Value> {
    let (payload, signers, encrypted) = match envelope.mode {
        Mode::None => (envelope.payload, Vec::new(), false),
        Mode::Secured => {
            let opened = crypto::open(&envelope.payload, recipient)
                .context("failed to open secured payload")?;
            (opened.payload, opened.signers, opened.encrypted)
        }
    };

    let content = match envelope.mask_id.as_str() {
        TransactionMask::ID => {
            let record = TransactionMask::decode(&payload).context("invalid transaction record")?;
            transaction_json(&record)
        }
        PlainMask::ID => match String::from_utf8(payload) {
            Ok(text) => Value::String(text),
            Err(_) => bail!("plain payload is not valid UTF-8"),
        },
        other => bail!("unknown mask {other:?}"),
    };

    tracing::info!(
        mask = %envelope.mask_id,
        mode = %envelope.mode,
        signers = signers.len(),
        "envelope opened"
    );

    Ok(json!({
        "mask": envelope.mask_id,
        "mode": envelope.mode,
        "encrypted": encrypted,
        "signers": signers.iter().map(|f| f.to_hex()).collect::<Vec<_>>(),
        "content": content,
    }))
}

/// Record as a JSON object keyed by long field names, in the shape
/// `encode --fields` accepts.
fn transaction_json(record: &TransactionMask) -> Value {
    let mut map = Map::new();
    let mut put = |field: F, value: Option<Value>| {
        if let Some(value) = value {
            map.insert(field.name().to_string(), value);
        }
    };

    put(F::OriginatorIban, record.originator_iban().map(Value::from));
    put(F::OriginatorName, record.originator_name().map(Value::from));
    put(F::Amount, record.amount().map(Value::from));
    put(
        F::RemittanceInformation,
        record.remittance_information().map(Value::from),
    );
    put(
        F::TimeExecution,
        record.time_execution().map(|t| Value::from(t.to_rfc3339())),
    );
    put(F::BeneficiaryIban, record.beneficiary_iban().map(Value::from));
    put(F::BeneficiaryName, record.beneficiary_name().map(Value::from));
    put(
        F::TimeSettlement,
        record.time_settlement().map(|t| Value::from(t.to_rfc3339())),
    );
    put(F::Purpose, record.purpose().map(Value::from));

    Value::Object(map)
}

// ---------------------------------------------------------------------------
// keygen
// ---------------------------------------------------------------------------

fn keygen(args: KeygenArgs) -> Result<()> {
    let out = &args.out;
    fs::create_dir_all(out)
        .with_context(|| format!("failed to create key directory: {}", out.display()))?;

    let signing = SigningKeypair::generate();
    let recipient = RecipientKeypair::generate();

    write_key(&out.join("signing.key"), &hex::encode(signing.secret_key_bytes()), true)?;
    write_key(&out.join("signing.pub"), &hex::encode(signing.public_key_bytes()), false)?;
    write_key(&out.join("recipient.key"), &hex::encode(recipient.secret_key_bytes()), true)?;
    write_key(&out.join("recipient.pub"), &recipient.public_key().to_hex(), false)?;

    tracing::info!(
        signing = %signing.fingerprint(),
        recipient = %recipient.fingerprint(),
        dir = %out.display(),
        "keys generated"
    );

    println!("Keys written to {}", out.display());
    println!("  Signing key    : {}", signing.fingerprint());
    println!("  Recipient key  : {}", recipient.fingerprint());
    println!("  Recipient pub  : {}", recipient.public_key().to_hex());

    Ok(())
}

/// Writes a key file, refusing to replace an existing one. Secret keys are
/// restricted to the owner on Unix.
fn write_key(path: &Path, contents: &str, secret: bool) -> Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if secret {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = secret;

    let mut file = options
        .open(path)
        .with_context(|| format!("failed to create key file {}", path.display()))?;
    writeln!(file, "{contents}")
        .with_context(|| format!("failed to write key file {}", path.display()))?;
    Ok(())
}

fn print_version() {
    println!("qrcrypt   {}", qrcrypt::config::VERSION);
    println!("envelope  {}", qrcrypt::config::MAGIC);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> TransactionMask {
        TransactionMask::from_json(&json!({
            "at01": "DE89370400440532013000",
            "at02": "Alice",
            "at04": 4200,
            "at05": "Invoice 7",
            "at07": "2024-05-01T12:00:00Z",
            "at20": "NL91ABNA0417164300",
            "at21": "Bob",
            "at42": "2024-05-02T00:00:00Z",
            "at44": "GDDS"
        }))
        .unwrap()
    }

    #[test]
    fn transaction_json_feeds_back_into_from_json() {
        let record = sample_record();
        let value = transaction_json(&record);
        assert_eq!(value["amount"], json!(4200));
        assert_eq!(TransactionMask::from_json(&value).unwrap(), record);
    }

    #[test]
    fn no_keys_means_plain_encoder() {
        let encoder = build_encoder(PlainMask::new("x"), None, &[]).unwrap();
        assert_eq!(encoder.protection(), Protection::None);
        assert_eq!(encoder.encode().unwrap(), b"QCR:plain :n:x");
    }

    #[test]
    fn keys_from_files_drive_protection() {
        let dir = tempfile::tempdir().unwrap();
        let signing = SigningKeypair::generate();
        let recipient = RecipientKeypair::generate();
        let sign_path = dir.path().join("signing.key");
        let pub_path = dir.path().join("recipient.pub");
        write_key(&sign_path, &hex::encode(signing.secret_key_bytes()), true).unwrap();
        write_key(&pub_path, &recipient.public_key().to_hex(), false).unwrap();

        let encoder = build_encoder(
            sample_record(),
            Some(&sign_path),
            &[pub_path.to_string_lossy().into_owned()],
        )
        .unwrap();
        assert_eq!(encoder.protection(), Protection::SignedAndEncrypted);

        let envelope = Envelope::parse(&encoder.encode().unwrap()).unwrap();
        let report = open_envelope(envelope, Some(&recipient)).unwrap();
        assert_eq!(report["mask"], json!("trans"));
        assert_eq!(report["mode"], json!("secured"));
        assert_eq!(report["encrypted"], json!(true));
        assert_eq!(report["signers"], json!([signing.fingerprint().to_hex()]));
        assert_eq!(report["content"]["purpose"], json!("GDDS"));
    }

    #[test]
    fn inline_hex_recipient_is_accepted() {
        let recipient = RecipientKeypair::generate();
        let key = load_recipient(&recipient.public_key().to_hex()).unwrap();
        assert_eq!(key, recipient.public_key());
        assert!(load_recipient("not-hex-and-not-a-file").is_err());
    }

    #[test]
    fn write_key_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k");
        write_key(&path, "aa", false).unwrap();
        assert!(write_key(&path, "bb", false).is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "aa\n");
    }

    #[test]
    fn plain_envelope_report() {
        let envelope = Envelope::parse(b"QCR:plain :n:hello").unwrap();
        let report = open_envelope(envelope, None).unwrap();
        assert_eq!(report["content"], json!("hello"));
        assert_eq!(report["mode"], json!("none"));
        assert_eq!(report["signers"], json!([]));
    }

    #[test]
    fn unknown_mask_is_an_error() {
        let envelope = Envelope::parse(b"QCR:zzz :n:hello").unwrap();
        assert!(open_envelope(envelope, None).is_err());
    }

    fn encode_args(argv: &[&str]) -> EncodeArgs {
        let cli = QrCryptCli::try_parse_from(argv.iter().copied()).unwrap();
        match cli.command {
            Commands::Encode(args) => args,
            other => panic!("expected encode, got {other:?}"),
        }
    }

    #[test]
    fn envelope_out_matches_saved_code() {
        let dir = tempfile::tempdir().unwrap();
        let envelope_path = dir.path().join("code.env");
        let recipient = RecipientKeypair::generate();
        let recipient_hex = recipient.public_key().to_hex();
        let out_dir = dir.path().to_string_lossy().into_owned();
        let envelope_arg = envelope_path.to_string_lossy().into_owned();

        let args = encode_args(&[
            "qrcrypt", "encode", "--text", "hello", "--recipient", &recipient_hex,
            "-d", &out_dir, "--filetype", "wbmp", "--envelope-out", &envelope_arg,
        ]);
        let options = QrOptions {
            max_version: args.max_version,
            min_error_correction: args.ecc,
            size: args.size,
            padding: args.padding,
            filetype: args.filetype,
        };
        let filename = encode(args).unwrap();

        let envelope = fs::read(&envelope_path).unwrap();
        let image = fs::read(dir.path().join(&filename)).unwrap();
        assert_eq!(image, qrcrypt::qr::render(&envelope, &options).unwrap());

        let report = open_envelope(Envelope::parse(&envelope).unwrap(), Some(&recipient)).unwrap();
        assert_eq!(report["content"], json!("hello"));
        assert_eq!(report["encrypted"], json!(true));
    }

    #[test]
    fn failed_save_writes_no_envelope() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("taken.png"), b"old").unwrap();
        let envelope_path = dir.path().join("code.env");
        let out_dir = dir.path().to_string_lossy().into_owned();
        let envelope_arg = envelope_path.to_string_lossy().into_owned();

        let args = encode_args(&[
            "qrcrypt", "encode", "--text", "hello", "-d", &out_dir,
            "--filename", "taken.png", "--envelope-out", &envelope_arg,
        ]);
        assert!(encode(args).is_err());
        assert!(!envelope_path.exists());
    }
}
