use crate::error::{Error, Result};

use serde_derive::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

/// A column datatype
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Float,
    Str,
}

impl DataType {
    /// Parses a datatype name as written in CREATE TABLE.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "int" => Some(DataType::Int),
            "float" => Some(DataType::Float),
            "str" => Some(DataType::Str),
            _ => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Str => "str",
        })
    }
}

/// A specific value of a data type
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Returns the value's datatype, or None for null values
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(DataType::Int),
            Value::Float(_) => Some(DataType::Float),
            Value::Str(_) => Some(DataType::Str),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Renders the value in its canonical string form, as used for record
    /// keys, positional encoding, and index keys. Floats always carry a
    /// fractional part or exponent, so `7.0` and `7` stay distinguishable.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format!("{:?}", f),
            Value::Str(s) => s.clone(),
        }
    }

    /// Parses a canonical string back into a value of the given type.
    pub fn parse(datatype: DataType, token: &str) -> Result<Self> {
        match datatype {
            DataType::Int => token
                .parse()
                .map(Value::Int)
                .map_err(|_| Error::Type(format!("'{}' is not a valid int", token))),
            DataType::Float => token
                .parse()
                .map(Value::Float)
                .map_err(|_| Error::Type(format!("'{}' is not a valid float", token))),
            DataType::Str => Ok(Value::Str(token.to_string())),
        }
    }

    /// Casts the value to a datatype, the way a dynamically typed host
    /// language would: floats truncate to ints, strings are parsed, and
    /// anything renders to a string. Returns None when no cast exists.
    pub fn cast(&self, datatype: DataType) -> Option<Value> {
        match (self, datatype) {
            (Value::Null, _) => None,
            (Value::Int(i), DataType::Int) => Some(Value::Int(*i)),
            (Value::Int(i), DataType::Float) => Some(Value::Float(*i as f64)),
            (Value::Float(f), DataType::Int) if f.is_finite() => Some(Value::Int(f.trunc() as i64)),
            (Value::Float(_), DataType::Int) => None,
            (Value::Float(f), DataType::Float) => Some(Value::Float(*f)),
            (Value::Str(s), DataType::Int) => s.trim().parse().ok().map(Value::Int),
            (Value::Str(s), DataType::Float) => s.trim().parse().ok().map(Value::Float),
            (v, DataType::Str) => Some(Value::Str(v.canonical())),
        }
    }

    /// Coerces the value to a join key: join keys are always integers.
    pub fn join_key(&self) -> Option<i64> {
        match self.cast(DataType::Int)? {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Coerces the value to a number for SUM/AVG/MIN/MAX. Strings containing
    /// a period are read as floats, others as ints.
    pub fn numeric(&self) -> Option<Value> {
        match self {
            Value::Int(_) | Value::Float(_) => Some(self.clone()),
            Value::Str(s) if s.contains('.') => s.trim().parse().ok().map(Value::Float),
            Value::Str(s) => s.trim().parse().ok().map(Value::Int),
            Value::Null => None,
        }
    }

    /// Compares two non-null values: numbers numerically, strings lexically,
    /// and mixed types by their string renderings. Nulls compare equal to
    /// each other and greater than anything else.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (a, b) => a.canonical().cmp(&b.canonical()),
        }
    }

    /// Converts the value to JSON for result serialization.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

// Floats compare by bit pattern so that values can serve as hash keys for
// grouping and de-duplication.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            v => f.write_str(&v.canonical()),
        }
    }
}

/// A reference to a column, optionally qualified by a table alias, e.g.
/// `o.user_id` or `user_id`. Aggregate outputs such as `COUNT(*)` are
/// unqualified columns named after the aggregate.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl ColumnRef {
    pub fn new(qualifier: Option<String>, name: impl Into<String>) -> Self {
        Self { qualifier, name: name.into() }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Self { qualifier: Some(qualifier.into()), name: name.into() }
    }

    pub fn unqualified(name: impl Into<String>) -> Self {
        Self { qualifier: None, name: name.into() }
    }
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_floats_keep_fraction() {
        assert_eq!("7.0", Value::Float(7.0).canonical());
        assert_eq!("0.25", Value::Float(0.25).canonical());
        assert_eq!("-3", Value::Int(-3).canonical());
        assert_eq!(Value::Float(7.0), Value::parse(DataType::Float, "7.0").unwrap());
    }

    #[test]
    fn cast_follows_dynamic_semantics() {
        assert_eq!(Some(Value::Int(3)), Value::Float(3.9).cast(DataType::Int));
        assert_eq!(Some(Value::Int(12)), Value::Str(" 12".into()).cast(DataType::Int));
        assert_eq!(None, Value::Str("3.5".into()).cast(DataType::Int));
        assert_eq!(Some(Value::Str("3.5".into())), Value::Float(3.5).cast(DataType::Str));
        assert_eq!(None, Value::Null.cast(DataType::Str));
        assert_eq!(None, Value::Float(f64::NAN).cast(DataType::Int));
    }

    #[test]
    fn numeric_reads_strings() {
        assert_eq!(Some(Value::Float(2.5)), Value::Str("2.5".into()).numeric());
        assert_eq!(Some(Value::Int(2)), Value::Str("2".into()).numeric());
        assert_eq!(None, Value::Str("two".into()).numeric());
    }

    #[test]
    fn compare_mixed() {
        assert_eq!(Ordering::Less, Value::Int(2).compare(&Value::Float(2.5)));
        assert_eq!(Ordering::Less, Value::Str("a".into()).compare(&Value::Str("b".into())));
        // "10" < "9" as strings
        assert_eq!(Ordering::Less, Value::Int(10).compare(&Value::Str("9".into())));
        assert_eq!(Ordering::Greater, Value::Null.compare(&Value::Int(0)));
    }
}
