//! ASCII armor.
//!
//! Crypto backends hand back text framed like
//!
//! ```text
//! -----BEGIN PGP MESSAGE-----
//! Version: GnuPG v1
//!
//! hQEMA...
//! -----END PGP MESSAGE-----
//! ```
//!
//! The framing costs QR capacity and carries nothing a reader needs, so the
//! encoder keeps only the body. [`strip_armor`] accepts any label and any
//! number of `Key: value` header lines; input that isn't a single armored
//! block comes back unchanged.

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use crate::config::{ARMOR_LINE_WIDTH, VERSION};

const DASHES: &str = "-----";

#[derive(Debug, Error)]
pub enum ArmorError {
    #[error("armor body is not valid base64")]
    InvalidBase64,
}

/// Armors `data` under `label` with a version header.
pub fn wrap(label: &str, data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = format!("{DASHES}BEGIN {label}{DASHES}\nVersion: QrCrypt {VERSION}\n\n");
    // Base64 output is ASCII, so splitting bytes never cuts a character.
    for line in encoded.as_bytes().chunks(ARMOR_LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }
    out.push_str(&format!("{DASHES}END {label}{DASHES}\n"));
    out
}

/// Removes the armor framing, keeping the body lines as they were.
pub fn strip_armor(data: &[u8]) -> Vec<u8> {
    let Ok(text) = std::str::from_utf8(data) else {
        return data.to_vec();
    };
    match armored_body(text) {
        Some(body) => body.into_bytes(),
        None => data.to_vec(),
    }
}

fn armored_body(text: &str) -> Option<String> {
    let mut lines: Vec<&str> = text
        .trim_end_matches(['\n', '\r'])
        .split('\n')
        .map(|l| l.trim_end_matches('\r'))
        .collect();

    let label = lines
        .first()?
        .strip_prefix(DASHES)?
        .strip_prefix("BEGIN ")?
        .strip_suffix(DASHES)?;
    let footer = format!("{DASHES}END {label}{DASHES}");
    if lines.len() < 3 || lines.pop()? != footer {
        return None;
    }

    // Header lines run up to the first blank line, which is mandatory.
    let blank = lines.iter().position(|l| l.is_empty())?;
    if !lines[1..blank].iter().all(|l| l.contains(": ")) {
        return None;
    }

    Some(lines[blank + 1..].join("\n"))
}

/// Decodes a stripped (or still armored) body back to bytes.
pub fn decode_body(body: &[u8]) -> Result<Vec<u8>, ArmorError> {
    let stripped = strip_armor(body);
    let compact: Vec<u8> = stripped
        .into_iter()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|_| ArmorError::InvalidBase64)
}
