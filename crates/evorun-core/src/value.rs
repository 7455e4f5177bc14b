//! Dynamically typed attribute values.

use std::cmp::Ordering;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, EvoError};

/// A collection of values, e.g. one row of attribute payloads.
pub type Values = Vec<Value>;

/// The tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// No payload; the result of a failed validation.
    Invalid,
    /// A boolean.
    Bool,
    /// A signed integer.
    Int,
    /// A real number.
    Double,
    /// A UTF-8 string.
    String,
}

/// A dynamically typed value holding exactly one of the supported payloads.
///
/// Values are immutable once constructed and cheap to clone. Accessors fail
/// with [`EvoError::TypeMismatch`] when the stored tag differs; there is no
/// implicit coercion between payload types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum Value {
    /// No payload; compares unequal to every valid value.
    #[default]
    Invalid,
    /// A boolean payload.
    Bool(bool),
    /// An integer payload.
    Int(i64),
    /// A real payload.
    Double(f64),
    /// A string payload.
    String(String),
}

impl Value {
    /// Returns the tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Invalid => ValueKind::Invalid,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
        }
    }

    /// Returns true unless this is `Value::Invalid`.
    pub fn is_valid(&self) -> bool {
        !matches!(self, Value::Invalid)
    }

    /// Returns the boolean payload.
    pub fn as_bool(&self) -> Result<bool, EvoError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }

    /// Returns the integer payload.
    pub fn as_int(&self) -> Result<i64, EvoError> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(mismatch("int", other)),
        }
    }

    /// Returns the real payload.
    pub fn as_double(&self) -> Result<f64, EvoError> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(mismatch("double", other)),
        }
    }

    /// Returns the string payload.
    pub fn as_str(&self) -> Result<&str, EvoError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", other)),
        }
    }

    /// Renders the text form used by range validation and command strings.
    ///
    /// Booleans render as `1`/`0` so that the result always satisfies the
    /// `validate` grammar of the range the value came from. Invalid values
    /// have no text form.
    pub fn to_text(&self) -> Result<String, EvoError> {
        match self {
            Value::Invalid => Err(EvoError::TypeMismatch(ErrorInfo::new(
                "value.invalid_text",
                "an invalid value has no text form",
            ))),
            Value::Bool(b) => Ok(if *b { "1".into() } else { "0".into() }),
            Value::Int(i) => Ok(i.to_string()),
            Value::Double(d) => Ok(d.to_string()),
            Value::String(s) => Ok(s.clone()),
        }
    }

    /// Compares two values of the same orderable kind.
    ///
    /// Ordering is defined for booleans, integers and reals only; invalid
    /// operands, mismatched kinds, strings and NaN all fail with
    /// [`EvoError::Comparison`]. Use `==`/`!=` for the total equality that
    /// treats mismatched kinds as unequal.
    pub fn try_cmp(&self, other: &Value) -> Result<Ordering, EvoError> {
        if self.kind() != other.kind() {
            return Err(incomparable("kinds differ", self, other));
        }
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a
                .partial_cmp(b)
                .ok_or_else(|| incomparable("NaN operand", self, other)),
            (Value::String(_), Value::String(_)) => {
                Err(incomparable("strings are not orderable", self, other))
            }
            _ => Err(incomparable("invalid operand", self, other)),
        }
    }
}

fn mismatch(expected: &str, got: &Value) -> EvoError {
    EvoError::TypeMismatch(
        ErrorInfo::new("value.type_mismatch", "value accessor used on wrong tag")
            .with_context("expected", expected)
            .with_context("actual", format!("{:?}", got.kind())),
    )
}

fn incomparable(reason: &str, lhs: &Value, rhs: &Value) -> EvoError {
    EvoError::Comparison(
        ErrorInfo::new("value.incomparable", reason)
            .with_context("lhs", format!("{:?}", lhs.kind()))
            .with_context("rhs", format!("{:?}", rhs.kind())),
    )
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Invalid, Value::Invalid) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.try_cmp(other).ok()
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Ok(text) => f.write_str(&text),
            Err(_) => f.write_str("invalid"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
