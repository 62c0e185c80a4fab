//! End-to-end integration tests for QrCrypt.
//!
//! These tests run the whole pipeline the way a deployment would: build a
//! mask, encode it (optionally through the native backend), render and save
//! the image, then play the reader: parse the envelope, open the payload and
//! decode the record.
//!
//! Each test uses its own temporary directory and freshly generated keys.

use chrono::{TimeZone, Utc};
use serde_json::json;

use qrcrypt::crypto::{self, BackendError, NativeBackend, RecipientKeypair, SigningKeypair};
use qrcrypt::envelope::{Encoder, Envelope, Mode, Protection};
use qrcrypt::mask::{Mask, PlainMask, SerializationError, TransactionMask};
use qrcrypt::qr::{ImageFormat, QrOptions};
use qrcrypt::{EncodeError, QrCrypt, QrCryptError};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn rent_payment() -> TransactionMask {
    TransactionMask::from_json(&json!({
        "originator_iban": "DE89370400440532013000",
        "originator_name": "Alice Example",
        "amount": 125_000,
        "remittance_information": "Rent May 2024",
        "time_execution": "2024-05-01T09:30:00Z",
        "beneficiary_iban": "NL91ABNA0417164300",
        "beneficiary_name": "Bob Landlord",
        "purpose": "RENT"
    }))
    .expect("valid record")
}

fn backend(signer: Option<&SigningKeypair>, recipient: Option<&RecipientKeypair>) -> NativeBackend {
    let mut backend = NativeBackend::new();
    if let Some(kp) = signer {
        backend.add_sign_key(kp.clone()).unwrap();
    }
    if let Some(kp) = recipient {
        backend.add_encrypt_key(kp.public_key()).unwrap();
    }
    backend
}

// ---------------------------------------------------------------------------
// 1. Plain Text to Image File
// ---------------------------------------------------------------------------

#[test]
fn plain_text_to_png_file() {
    let dir = tempfile::tempdir().unwrap();
    let qr = QrCrypt::new(Encoder::plain(PlainMask::new("hello"))).with_directory(dir.path());

    assert_eq!(qr.encode().unwrap(), b"QCR:plain :n:hello");

    let filename = qr.save(None).unwrap();
    assert!(filename.ends_with(".png"));

    let bytes = std::fs::read(dir.path().join(&filename)).unwrap();
    let image = image::load_from_memory(&bytes).unwrap();
    assert!(image.width() >= QrOptions::default().size);
}

// ---------------------------------------------------------------------------
// 2. Unprotected Transaction Round Trip
// ---------------------------------------------------------------------------

#[test]
fn transaction_envelope_roundtrip() {
    let mask = rent_payment();
    let wire = Encoder::plain(mask.clone()).encode().unwrap();
    assert!(wire.starts_with(b"QCR:trans :n:DE89370400440532013000\tAlice Example\t"));

    let envelope = Envelope::parse(&wire).unwrap();
    assert_eq!(envelope.mask_id, "trans");
    assert_eq!(envelope.mode, Mode::None);

    let decoded = TransactionMask::decode(&envelope.payload).unwrap();
    assert_eq!(decoded, mask);
    assert_eq!(decoded.amount(), Some(125_000));
    assert_eq!(
        decoded.time_execution(),
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap())
    );
    assert_eq!(decoded.time_settlement(), None);
}

// ---------------------------------------------------------------------------
// 3. Signed and Encrypted Transaction
// ---------------------------------------------------------------------------

#[test]
fn signed_and_encrypted_transaction() {
    let bank = SigningKeypair::generate();
    let scanner = RecipientKeypair::generate();
    let mask = rent_payment();

    let encoder = Encoder::secured(
        mask.clone(),
        Protection::SignedAndEncrypted,
        Box::new(backend(Some(&bank), Some(&scanner))),
    );
    let wire = encoder.encode().unwrap();

    let envelope = Envelope::parse(&wire).unwrap();
    assert_eq!(envelope.mode, Mode::Secured);
    // Armor framing never reaches the code.
    assert!(!String::from_utf8_lossy(&envelope.payload).contains("-----"));
    // Neither does the plaintext.
    assert!(!String::from_utf8_lossy(&envelope.payload).contains("Alice"));

    let opened = crypto::open(&envelope.payload, Some(&scanner)).unwrap();
    assert!(opened.encrypted);
    assert_eq!(opened.signers, vec![bank.fingerprint()]);
    assert_eq!(TransactionMask::decode(&opened.payload).unwrap(), mask);
}

#[test]
fn signed_only_is_readable_without_keys() {
    let bank = SigningKeypair::generate();
    let encoder = Encoder::secured(
        PlainMask::new("pay 12.50"),
        Protection::Signed,
        Box::new(backend(Some(&bank), None)),
    );
    let envelope = Envelope::parse(&encoder.encode().unwrap()).unwrap();

    let opened = crypto::open(&envelope.payload, None).unwrap();
    assert!(!opened.encrypted);
    assert_eq!(opened.payload, b"pay 12.50");
    assert_eq!(opened.signers, vec![bank.fingerprint()]);
}

// ---------------------------------------------------------------------------
// 4. Wrong Reader
// ---------------------------------------------------------------------------

#[test]
fn outsider_cannot_read_encrypted_code() {
    let scanner = RecipientKeypair::generate();
    let outsider = RecipientKeypair::generate();

    let encoder = Encoder::secured(
        rent_payment(),
        Protection::Encrypted,
        Box::new(backend(None, Some(&scanner))),
    );
    let envelope = Envelope::parse(&encoder.encode().unwrap()).unwrap();

    assert!(matches!(
        crypto::open(&envelope.payload, Some(&outsider)),
        Err(BackendError::NotARecipient)
    ));
}

// ---------------------------------------------------------------------------
// 5. Failures Leave Nothing Behind
// ---------------------------------------------------------------------------

#[test]
fn incomplete_record_writes_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let partial = TransactionMask::from_json(&json!({
        "at01": "DE89370400440532013000",
        "at04": 100
    }))
    .unwrap();

    let qr = QrCrypt::new(Encoder::plain(partial)).with_directory(dir.path());
    assert!(matches!(
        qr.save(None),
        Err(QrCryptError::Encode(EncodeError::Serialization(
            SerializationError::MissingInformation("originator_name")
        )))
    ));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn missing_backend_key_surfaces_through_facade() {
    let qr = QrCrypt::new(Encoder::secured(
        PlainMask::new("hello"),
        Protection::Encrypted,
        Box::new(NativeBackend::new()),
    ));
    assert!(matches!(
        qr.display(),
        Err(QrCryptError::Encode(EncodeError::Backend(BackendError::NoRecipients)))
    ));
}

// ---------------------------------------------------------------------------
// 6. Every Filetype Saves Under Its Extension
// ---------------------------------------------------------------------------

#[test]
fn every_filetype_saves() {
    let dir = tempfile::tempdir().unwrap();
    for filetype in [ImageFormat::Png, ImageFormat::Gif, ImageFormat::Jpeg, ImageFormat::Wbmp] {
        let qr = QrCrypt::new(Encoder::plain(rent_payment()))
            .with_options(QrOptions {
                filetype,
                size: 120,
                ..QrOptions::default()
            })
            .with_directory(dir.path());
        let name = qr.save(None).unwrap();
        assert!(name.ends_with(&format!(".{}", filetype.extension())));
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 4);
}

// ---------------------------------------------------------------------------
// 7. Mask Contract Through Trait Objects
// ---------------------------------------------------------------------------

#[test]
fn boxed_masks_encode_like_concrete_ones() {
    let masks: Vec<Box<dyn Mask>> = vec![Box::new(PlainMask::new("x")), Box::new(rent_payment())];
    for mask in masks {
        let id = mask.id();
        let wire = Encoder::plain(mask).encode().unwrap();
        assert_eq!(Envelope::parse(&wire).unwrap().mask_id, id);
    }
}
