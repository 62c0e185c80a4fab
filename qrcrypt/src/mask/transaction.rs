//! Credit-transfer instruction mask.
//!
//! A [`TransactionMask`] carries one credit transfer: who pays, who gets
//! paid, how much, when, and why. Values are validated once, when the mask
//! is built, and the mask is immutable afterwards.
//!
//! # Record Layout
//!
//! Nine segments joined by a single tab byte, in this order:
//!
//! ```text
//! originator IBAN \t originator name \t amount (u64 LE) \t remittance info \t
//! execution date (u32 LE) \t beneficiary IBAN \t beneficiary name \t
//! settlement date (u32 LE, or empty) \t purpose
//! ```
//!
//! Amount and dates are packed as fixed-width integers rather than text to
//! keep the payload small. Tabs inside text fields are not escaped; callers
//! must keep them out of names and remittance info. [`TransactionMask::decode`]
//! relies on the fixed widths, so packed bytes that happen to equal `0x09`
//! are read back correctly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Mask, SerializationError};
use crate::config::{
    AMOUNT_MAX, AMOUNT_MIN, FIELD_SEPARATOR, IBAN_MAX_LENGTH, IBAN_MIN_LENGTH,
    PACKED_AMOUNT_WIDTH, PACKED_DATE_WIDTH, PURPOSE_MAX_LENGTH, RECORD_SEGMENTS,
};

// ---------------------------------------------------------------------------
// TransactionField
// ---------------------------------------------------------------------------

/// Canonical names of the record fields.
///
/// Option keys arrive either as long names (`originator_iban`) or as the
/// attribute codes of the underlying credit-transfer rulebook (`at01`).
/// Both are resolved here, once, by [`TransactionField::from_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionField {
    OriginatorIban,
    OriginatorName,
    Amount,
    RemittanceInformation,
    TimeExecution,
    BeneficiaryIban,
    BeneficiaryName,
    TimeSettlement,
    Purpose,
}

impl TransactionField {
    /// All fields, in record order.
    pub const ALL: [TransactionField; RECORD_SEGMENTS] = [
        Self::OriginatorIban,
        Self::OriginatorName,
        Self::Amount,
        Self::RemittanceInformation,
        Self::TimeExecution,
        Self::BeneficiaryIban,
        Self::BeneficiaryName,
        Self::TimeSettlement,
        Self::Purpose,
    ];

    /// Long option name.
    pub fn name(self) -> &'static str {
        match self {
            Self::OriginatorIban => "originator_iban",
            Self::OriginatorName => "originator_name",
            Self::Amount => "amount",
            Self::RemittanceInformation => "remittance_information",
            Self::TimeExecution => "time_execution",
            Self::BeneficiaryIban => "beneficiary_iban",
            Self::BeneficiaryName => "beneficiary_name",
            Self::TimeSettlement => "time_settlement",
            Self::Purpose => "purpose",
        }
    }

    /// Rulebook attribute code.
    pub fn alias(self) -> &'static str {
        match self {
            Self::OriginatorIban => "at01",
            Self::OriginatorName => "at02",
            Self::Amount => "at04",
            Self::RemittanceInformation => "at05",
            Self::TimeExecution => "at07",
            Self::BeneficiaryIban => "at20",
            Self::BeneficiaryName => "at21",
            Self::TimeSettlement => "at42",
            Self::Purpose => "at44",
        }
    }

    /// Resolves a long name or an attribute code.
    pub fn from_key(key: &str) -> Result<Self, FieldError> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == key || f.alias() == key)
            .ok_or_else(|| FieldError::UnknownKey(key.to_string()))
    }

    /// Whether serialization requires this field. Only the settlement date
    /// is optional.
    pub fn is_required(self) -> bool {
        self != Self::TimeSettlement
    }

    /// Whether the field holds a date.
    pub fn is_date(self) -> bool {
        matches!(self, Self::TimeExecution | Self::TimeSettlement)
    }
}

impl fmt::Display for TransactionField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransactionField {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_key(s)
    }
}

// ---------------------------------------------------------------------------
// FieldValue
// ---------------------------------------------------------------------------

/// A raw option value, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Timestamp(DateTime<Utc>),
    /// Anything the options boundary could not classify. Kept as its textual
    /// form so validation errors can show it.
    Other(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) | Self::Other(s) => f.write_str(s),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Timestamp(t) => f.write_str(&t.to_rfc3339()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A rejected option. Construction stops at the first one; no partially
/// built mask is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("{0} is not a valid IBAN")]
    InvalidIban(String),

    #[error("{0} is not a valid amount; amounts are given in cents")]
    InvalidAmount(String),

    #[error("{field} should be a date, but {value} is not")]
    NotADate { field: TransactionField, value: String },

    #[error("{field} {value} is outside the packable range (1970-01-01 to 2106-02-07)")]
    DateOutOfRange { field: TransactionField, value: String },

    #[error("{0} is not a valid purpose")]
    InvalidPurpose(String),

    #[error("{field} should be text, but {value} is not")]
    NotText { field: TransactionField, value: String },

    #[error("could not interpret options key '{0}'")]
    UnknownKey(String),

    #[error("transaction options must be a key/value object")]
    NotAnObject,
}

/// Failure to read a serialized record back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record ends inside {0}")]
    Truncated(TransactionField),

    #[error("missing separator after {0}")]
    MissingSeparator(TransactionField),

    #[error("settlement date must be empty or {PACKED_DATE_WIDTH} bytes, got {0}")]
    BadSettlementWidth(usize),

    #[error("{0} is not valid UTF-8")]
    InvalidUtf8(TransactionField),

    #[error(transparent)]
    Field(#[from] FieldError),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// `[A-Za-z0-9]{4,34}`. No checksum.
pub fn is_valid_iban(iban: &str) -> bool {
    (IBAN_MIN_LENGTH..=IBAN_MAX_LENGTH).contains(&iban.len())
        && iban.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Amount in minor units, both bounds inclusive.
pub fn is_valid_amount(amount: i64) -> bool {
    u64::try_from(amount).is_ok_and(|a| (AMOUNT_MIN..=AMOUNT_MAX).contains(&a))
}

/// At most four bytes.
pub fn is_valid_purpose(purpose: &str) -> bool {
    purpose.len() <= PURPOSE_MAX_LENGTH
}

/// A date truncated to whole seconds, together with its packed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PackedDate {
    at: DateTime<Utc>,
    secs: u32,
}

impl PackedDate {
    fn from_secs(secs: u32) -> Option<Self> {
        DateTime::from_timestamp(i64::from(secs), 0).map(|at| Self { at, secs })
    }

    fn to_le_bytes(self) -> [u8; PACKED_DATE_WIDTH] {
        self.secs.to_le_bytes()
    }
}

// ---------------------------------------------------------------------------
// TransactionMask
// ---------------------------------------------------------------------------

/// A validated credit-transfer instruction.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use qrcrypt::mask::{FieldValue, Mask, TransactionField as F, TransactionMask};
///
/// let mask = TransactionMask::new([
///     (F::OriginatorIban, "DE89370400440532013000".into()),
///     (F::OriginatorName, "Alice".into()),
///     (F::Amount, FieldValue::Integer(1250)),
///     (F::RemittanceInformation, "Invoice 42".into()),
///     (F::TimeExecution, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap().into()),
///     (F::BeneficiaryIban, "FR1420041010050500013M02606".into()),
///     (F::BeneficiaryName, "Bob".into()),
///     (F::Purpose, "GDDS".into()),
/// ])
/// .unwrap();
///
/// assert_eq!(mask.id(), "trans");
/// assert_eq!(TransactionMask::decode(&mask.to_bytes().unwrap()).unwrap(), mask);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionMask {
    originator_iban: Option<String>,
    originator_name: Option<String>,
    amount: Option<u64>,
    remittance_information: Option<String>,
    time_execution: Option<PackedDate>,
    beneficiary_iban: Option<String>,
    beneficiary_name: Option<String>,
    time_settlement: Option<PackedDate>,
    purpose: Option<String>,
}

impl TransactionMask {
    /// Envelope identifier of transaction records.
    pub const ID: &'static str = "trans";

    /// Builds a mask from canonical options, validating each one.
    ///
    /// Later options for the same field replace earlier ones.
    pub fn new<I>(options: I) -> Result<Self, FieldError>
    where
        I: IntoIterator<Item = (TransactionField, FieldValue)>,
    {
        let mut mask = Self::default();
        for (field, value) in options {
            mask.set(field, value)?;
        }
        Ok(mask)
    }

    /// Builds a mask from a JSON object keyed by long names or codes.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, FieldError> {
        Self::new(crate::options::from_json(value)?)
    }

    fn set(&mut self, field: TransactionField, value: FieldValue) -> Result<(), FieldError> {
        use TransactionField as F;

        match field {
            F::OriginatorIban => self.originator_iban = Some(iban(value)?),
            F::BeneficiaryIban => self.beneficiary_iban = Some(iban(value)?),
            F::OriginatorName => self.originator_name = Some(text(field, value)?),
            F::BeneficiaryName => self.beneficiary_name = Some(text(field, value)?),
            F::RemittanceInformation => self.remittance_information = Some(text(field, value)?),
            F::Amount => self.amount = Some(amount(value)?),
            F::TimeExecution => self.time_execution = Some(date(field, value)?),
            F::TimeSettlement => self.time_settlement = Some(date(field, value)?),
            F::Purpose => self.purpose = Some(purpose(value)?),
        }
        Ok(())
    }

    pub fn originator_iban(&self) -> Option<&str> {
        self.originator_iban.as_deref()
    }

    pub fn originator_name(&self) -> Option<&str> {
        self.originator_name.as_deref()
    }

    /// Amount in minor currency units.
    pub fn amount(&self) -> Option<u64> {
        self.amount
    }

    pub fn remittance_information(&self) -> Option<&str> {
        self.remittance_information.as_deref()
    }

    pub fn time_execution(&self) -> Option<DateTime<Utc>> {
        self.time_execution.map(|d| d.at)
    }

    pub fn beneficiary_iban(&self) -> Option<&str> {
        self.beneficiary_iban.as_deref()
    }

    pub fn beneficiary_name(&self) -> Option<&str> {
        self.beneficiary_name.as_deref()
    }

    pub fn time_settlement(&self) -> Option<DateTime<Utc>> {
        self.time_settlement.map(|d| d.at)
    }

    pub fn purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Reads a record produced by [`Mask::to_bytes`] and validates it again.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        use TransactionField as F;

        let mut reader = SegmentReader { rest: bytes };

        let originator_iban = reader.text(F::OriginatorIban)?;
        let originator_name = reader.text(F::OriginatorName)?;
        let amount = reader.fixed::<PACKED_AMOUNT_WIDTH>(F::Amount)?;
        let remittance = reader.text(F::RemittanceInformation)?;
        let execution = reader.fixed::<PACKED_DATE_WIDTH>(F::TimeExecution)?;
        let beneficiary_iban = reader.text(F::BeneficiaryIban)?;
        let beneficiary_name = reader.text(F::BeneficiaryName)?;

        // Purpose never contains a tab, so the last tab closes the settlement
        // segment even when the packed date contains 0x09.
        let rest = reader.rest;
        let split = rest
            .iter()
            .rposition(|&b| b == FIELD_SEPARATOR)
            .ok_or(DecodeError::MissingSeparator(F::TimeSettlement))?;
        let (settlement, purpose) = (&rest[..split], &rest[split + 1..]);
        let purpose = utf8(F::Purpose, purpose)?;

        let mut options = vec![
            (F::OriginatorIban, FieldValue::Text(originator_iban)),
            (F::OriginatorName, FieldValue::Text(originator_name)),
            (F::Amount, packed_amount(amount)),
            (F::RemittanceInformation, FieldValue::Text(remittance)),
            (F::TimeExecution, packed_date(F::TimeExecution, execution)?),
            (F::BeneficiaryIban, FieldValue::Text(beneficiary_iban)),
            (F::BeneficiaryName, FieldValue::Text(beneficiary_name)),
            (F::Purpose, FieldValue::Text(purpose)),
        ];

        match <[u8; PACKED_DATE_WIDTH]>::try_from(settlement) {
            Ok(packed) => options.push((F::TimeSettlement, packed_date(F::TimeSettlement, packed)?)),
            Err(_) if settlement.is_empty() => {}
            Err(_) => return Err(DecodeError::BadSettlementWidth(settlement.len())),
        }

        Ok(Self::new(options)?)
    }
}

impl Mask for TransactionMask {
    fn to_bytes(&self) -> Result<Vec<u8>, SerializationError> {
        use TransactionField as F;

        fn require<T>(value: Option<T>, field: TransactionField) -> Result<T, SerializationError> {
            value.ok_or(SerializationError::MissingInformation(field.name()))
        }

        let originator_iban = require(self.originator_iban.as_deref(), F::OriginatorIban)?;
        let originator_name = require(self.originator_name.as_deref(), F::OriginatorName)?;
        let amount = require(self.amount, F::Amount)?;
        let remittance = require(self.remittance_information.as_deref(), F::RemittanceInformation)?;
        let execution = require(self.time_execution, F::TimeExecution)?;
        let beneficiary_iban = require(self.beneficiary_iban.as_deref(), F::BeneficiaryIban)?;
        let beneficiary_name = require(self.beneficiary_name.as_deref(), F::BeneficiaryName)?;
        let purpose = require(self.purpose.as_deref(), F::Purpose)?;

        let amount = amount.to_le_bytes();
        let execution = execution.to_le_bytes();
        let settlement = self.time_settlement.map(PackedDate::to_le_bytes);

        let segments: [&[u8]; RECORD_SEGMENTS] = [
            originator_iban.as_bytes(),
            originator_name.as_bytes(),
            &amount,
            remittance.as_bytes(),
            &execution,
            beneficiary_iban.as_bytes(),
            beneficiary_name.as_bytes(),
            settlement.as_ref().map_or(&[][..], |s| &s[..]),
            purpose.as_bytes(),
        ];

        let record = segments.join(&FIELD_SEPARATOR);
        tracing::debug!(
            bytes = record.len(),
            settlement = settlement.is_some(),
            "transaction record serialized"
        );
        Ok(record)
    }

    fn id(&self) -> &'static str {
        Self::ID
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn iban(value: FieldValue) -> Result<String, FieldError> {
    match value {
        FieldValue::Text(s) if is_valid_iban(&s) => Ok(s),
        other => Err(FieldError::InvalidIban(other.to_string())),
    }
}

fn text(field: TransactionField, value: FieldValue) -> Result<String, FieldError> {
    match value {
        FieldValue::Text(s) => Ok(s),
        other => Err(FieldError::NotText {
            field,
            value: other.to_string(),
        }),
    }
}

fn amount(value: FieldValue) -> Result<u64, FieldError> {
    match value {
        FieldValue::Integer(n) if is_valid_amount(n) => Ok(n.unsigned_abs()),
        other => Err(FieldError::InvalidAmount(other.to_string())),
    }
}

fn purpose(value: FieldValue) -> Result<String, FieldError> {
    match value {
        FieldValue::Text(s) if is_valid_purpose(&s) => Ok(s),
        other => Err(FieldError::InvalidPurpose(other.to_string())),
    }
}

fn date(field: TransactionField, value: FieldValue) -> Result<PackedDate, FieldError> {
    let at = match value {
        FieldValue::Timestamp(at) => at,
        other => {
            return Err(FieldError::NotADate {
                field,
                value: other.to_string(),
            })
        }
    };
    u32::try_from(at.timestamp())
        .ok()
        .and_then(PackedDate::from_secs)
        .ok_or_else(|| FieldError::DateOutOfRange {
            field,
            value: at.to_rfc3339(),
        })
}

fn packed_amount(bytes: [u8; PACKED_AMOUNT_WIDTH]) -> FieldValue {
    let raw = u64::from_le_bytes(bytes);
    match i64::try_from(raw) {
        Ok(n) => FieldValue::Integer(n),
        Err(_) => FieldValue::Other(raw.to_string()),
    }
}

fn packed_date(
    field: TransactionField,
    bytes: [u8; PACKED_DATE_WIDTH],
) -> Result<FieldValue, FieldError> {
    let secs = u32::from_le_bytes(bytes);
    PackedDate::from_secs(secs)
        .map(|d| FieldValue::Timestamp(d.at))
        .ok_or_else(|| FieldError::DateOutOfRange {
            field,
            value: secs.to_string(),
        })
}

fn utf8(field: TransactionField, bytes: &[u8]) -> Result<String, DecodeError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(field))
}

/// Walks a record front to back.
struct SegmentReader<'a> {
    rest: &'a [u8],
}

impl<'a> SegmentReader<'a> {
    /// A text segment followed by a separator.
    fn text(&mut self, field: TransactionField) -> Result<String, DecodeError> {
        let end = self
            .rest
            .iter()
            .position(|&b| b == FIELD_SEPARATOR)
            .ok_or(DecodeError::MissingSeparator(field))?;
        let value = utf8(field, &self.rest[..end])?;
        self.rest = &self.rest[end + 1..];
        Ok(value)
    }

    /// A fixed-width segment followed by a separator.
    fn fixed<const N: usize>(&mut self, field: TransactionField) -> Result<[u8; N], DecodeError> {
        if self.rest.len() < N {
            return Err(DecodeError::Truncated(field));
        }
        let (head, tail) = self.rest.split_at(N);
        if tail.first() != Some(&FIELD_SEPARATOR) {
            return Err(DecodeError::MissingSeparator(field));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(head);
        self.rest = &tail[1..];
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
