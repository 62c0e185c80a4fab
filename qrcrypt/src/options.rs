//! Option parsing boundary for transaction masks.
//!
//! Callers hand us loosely typed key/value data (a JSON object from a file,
//! string pairs from a form). This module turns it into canonical
//! `(TransactionField, FieldValue)` pairs so the mask itself never deals with
//! key aliases or JSON types.
//!
//! Dates are accepted as RFC 3339 strings or as integer Unix seconds. Values
//! that don't fit any recognised shape are passed through as
//! [`FieldValue::Other`] and rejected by the mask with a typed error.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::mask::{FieldError, FieldValue, TransactionField};

/// Resolves keys of string-keyed pairs.
pub fn from_pairs<I, K>(pairs: I) -> Result<Vec<(TransactionField, FieldValue)>, FieldError>
where
    I: IntoIterator<Item = (K, FieldValue)>,
    K: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(key, value)| {
            let field = TransactionField::from_key(key.as_ref())?;
            Ok((field, coerce_date(field, value)))
        })
        .collect()
}

/// Converts a JSON object into canonical options, in document order.
///
/// When a field appears twice (say as `at04` and `amount`), the later key
/// wins, as with [`from_pairs`].
///
/// ```
/// use qrcrypt::options::from_json;
/// use qrcrypt::mask::TransactionField;
///
/// let options = from_json(&serde_json::json!({ "at04": 1500, "purpose": "GDDS" })).unwrap();
/// assert!(options.iter().any(|(f, _)| *f == TransactionField::Amount));
/// ```
pub fn from_json(value: &Value) -> Result<Vec<(TransactionField, FieldValue)>, FieldError> {
    let object = value.as_object().ok_or(FieldError::NotAnObject)?;
    from_pairs(object.iter().map(|(k, v)| (k, json_value(v))))
}

fn json_value(value: &Value) -> FieldValue {
    match value {
        Value::String(s) => FieldValue::Text(s.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Other(n.to_string()),
        },
        other => FieldValue::Other(other.to_string()),
    }
}

/// Date fields accept RFC 3339 text or Unix seconds; anything else is left
/// for the mask to reject.
fn coerce_date(field: TransactionField, value: FieldValue) -> FieldValue {
    if !field.is_date() {
        return value;
    }
    let parsed = match &value {
        FieldValue::Text(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        FieldValue::Integer(secs) => DateTime::from_timestamp(*secs, 0),
        _ => None,
    };
    parsed.map_or(value, FieldValue::Timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{Mask, TransactionMask};
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_long_names_and_aliases_are_equivalent() {
        let long = json!({
            "originator_iban": "DE89370400440532013000",
            "originator_name": "Alice",
            "amount": 1500,
            "remittance_information": "Rent",
            "time_execution": "2024-05-01T12:00:00Z",
            "beneficiary_iban": "NL91ABNA0417164300",
            "beneficiary_name": "Bob",
            "purpose": "RENT"
        });
        let short = json!({
            "at01": "DE89370400440532013000",
            "at02": "Alice",
            "at04": 1500,
            "at05": "Rent",
            "at07": 1714564800,
            "at20": "NL91ABNA0417164300",
            "at21": "Bob",
            "at44": "RENT"
        });

        let a = TransactionMask::from_json(&long).unwrap();
        let b = TransactionMask::from_json(&short).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_bytes().unwrap(), b.to_bytes().unwrap());
        assert_eq!(
            a.time_execution(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_rfc3339_offset_is_normalised() {
        let options = from_json(&json!({ "at42": "2024-05-01T14:00:00+02:00" })).unwrap();
        assert_eq!(
            options[0].1,
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = from_json(&json!({ "amount": 10, "colour": "blue" })).unwrap_err();
        assert_eq!(err, FieldError::UnknownKey("colour".into()));
    }

    #[test]
    fn test_non_object_rejected() {
        assert_eq!(from_json(&json!([1, 2, 3])).unwrap_err(), FieldError::NotAnObject);
        assert_eq!(from_json(&json!("at01")).unwrap_err(), FieldError::NotAnObject);
    }

    #[test]
    fn test_float_amount_reaches_mask_as_other() {
        let err = TransactionMask::from_json(&json!({ "amount": 12.5 })).unwrap_err();
        assert_eq!(err, FieldError::InvalidAmount("12.5".into()));
    }

    #[test]
    fn test_unparseable_date_is_not_a_date() {
        let err = TransactionMask::from_json(&json!({ "at07": "next tuesday" })).unwrap_err();
        assert!(matches!(
            err,
            FieldError::NotADate {
                field: TransactionField::TimeExecution,
                ..
            }
        ));
    }

    #[test]
    fn test_from_pairs() {
        let options = from_pairs([
            ("at04", FieldValue::Integer(42)),
            ("purpose", FieldValue::from("GDDS")),
        ])
        .unwrap();
        assert_eq!(options[0], (TransactionField::Amount, FieldValue::Integer(42)));
        assert_eq!(options[1].0, TransactionField::Purpose);
    }

    #[test]
    fn test_integer_only_coerced_for_dates() {
        let options = from_pairs([("amount", FieldValue::Integer(1_700_000_000))]).unwrap();
        assert_eq!(options[0].1, FieldValue::Integer(1_700_000_000));
    }

    #[test]
    fn test_json_keeps_document_order() {
        let value: Value = serde_json::from_str(r#"{"at04": 5, "amount": 7}"#).unwrap();
        let options = from_json(&value).unwrap();
        assert_eq!(options[0].1, FieldValue::Integer(5));
        assert_eq!(options[1].1, FieldValue::Integer(7));

        let mask = TransactionMask::from_json(&value).unwrap();
        assert_eq!(mask.amount(), Some(7));

        let reversed: Value = serde_json::from_str(r#"{"amount": 7, "at04": 5}"#).unwrap();
        assert_eq!(TransactionMask::from_json(&reversed).unwrap().amount(), Some(5));
    }
}
