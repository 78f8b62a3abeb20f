//! Record codec: converts a table row to and from the store's key/value pair.
//!
//! The key is the primary key value in canonical string form. The value is
//! the remaining columns in declared order, canonically rendered and joined
//! with [`SEPARATOR`].

use super::schema::Attribute;
use super::types::{DataType, Value};
use crate::error::{Error, Result};

/// Separates column values in the positional encoding. Not allowed in strings.
pub const SEPARATOR: char = '#';

/// Encodes a typed row into its record key and positional value.
pub fn encode(attributes: &[Attribute], values: &[Value]) -> Result<(String, String)> {
    if attributes.len() != values.len() {
        return Err(Error::Value(format!(
            "Expected {} values, got {}",
            attributes.len(),
            values.len()
        )));
    }
    match (attributes.first(), values.first()) {
        (Some(pk), Some(Value::Null)) => {
            return Err(Error::Value(format!("Primary key '{}' cannot be empty", pk.name)))
        }
        (None, _) | (_, None) => return Err(Error::Value("Record has no attributes".into())),
        _ => {}
    }
    let mut tokens = Vec::with_capacity(values.len());
    for (attribute, value) in attributes.iter().zip(values) {
        match (attribute.datatype, value) {
            (_, Value::Null) => {}
            (DataType::Str, Value::Str(s)) if s.contains(SEPARATOR) => {
                return Err(Error::Type(format!(
                    "Value for attribute '{}' may not contain '{}'",
                    attribute.name, SEPARATOR
                )))
            }
            (datatype, v) if v.datatype() != Some(datatype) => {
                return Err(Error::Type(format!(
                    "Invalid {} value {} for {} attribute '{}'",
                    v.datatype().map(|d| d.to_string()).unwrap_or_default(),
                    v,
                    datatype,
                    attribute.name
                )))
            }
            _ => {}
        }
        tokens.push(value.canonical());
    }
    let key = tokens.remove(0);
    Ok((key, tokens.join(&SEPARATOR.to_string())))
}

/// Decodes a record into a typed row aligned with the attributes. The key
/// becomes the primary key value; a missing or unparseable segment decodes
/// to Null rather than failing.
pub fn decode(key: &str, value: &str, attributes: &[Attribute]) -> Vec<Value> {
    let mut row = Vec::with_capacity(attributes.len());
    let mut segments = value.split(SEPARATOR);
    for (i, attribute) in attributes.iter().enumerate() {
        if i == 0 {
            // A key that doesn't parse as its type is kept as a string.
            row.push(
                Value::parse(attribute.datatype, key).unwrap_or_else(|_| Value::Str(key.into())),
            );
            continue;
        }
        row.push(match segments.next() {
            Some(segment) if !(segment.is_empty() && attribute.datatype != DataType::Str) => {
                Value::parse(attribute.datatype, segment).unwrap_or(Value::Null)
            }
            _ => Value::Null,
        });
    }
    row
}

/// Decodes a record stored as raw bytes.
pub fn decode_bytes(key: &str, value: &[u8], attributes: &[Attribute]) -> Result<Vec<Value>> {
    let value = std::str::from_utf8(value)
        .map_err(|e| Error::Internal(format!("Invalid record {}: {}", key, e)))?;
    Ok(decode(key, value, attributes))
}
