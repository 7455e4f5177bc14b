//! Structured error types shared across evorun crates.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Structured payload attached to every [`EvoError`] variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable machine readable error code.
    pub code: String,
    /// Human readable diagnostic message.
    pub message: String,
    /// Contextual key value pairs (commands, names, bounds, etc.).
    #[serde(default)]
    pub context: BTreeMap<String, String>,
    /// Optional hint that may help the caller resolve the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl ErrorInfo {
    /// Creates a new error payload with the provided code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            hint: None,
        }
    }

    /// Adds a context entry to the payload.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Sets a human readable hint for remediation.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Canonical error type for the evorun engine.
///
/// Each variant corresponds to one error family: malformed command or
/// range specifications, out-of-domain values, `Value` misuse, failed
/// name/index lookups, and scheduler bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "family", content = "detail")]
pub enum EvoError {
    /// Malformed command or attribute-range specification.
    #[error("parse error: {0}")]
    Parse(ErrorInfo),
    /// Value outside its declared domain.
    #[error("validation error: {0}")]
    Validation(ErrorInfo),
    /// A `Value` accessor was used against the wrong tag.
    #[error("type mismatch: {0}")]
    TypeMismatch(ErrorInfo),
    /// An ordering comparison between incomparable `Value`s.
    #[error("comparison error: {0}")]
    Comparison(ErrorInfo),
    /// Unknown attribute name or out-of-range index.
    #[error("lookup error: {0}")]
    Lookup(ErrorInfo),
    /// Scheduler bookkeeping errors.
    #[error("scheduler error: {0}")]
    Scheduler(ErrorInfo),
}

impl Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code: {})", self.message, self.code)?;
        if !self.context.is_empty() {
            write!(f, " | context: [")?;
            for (idx, (key, value)) in self.context.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key}={value}")?;
            }
            write!(f, "]")?;
        }
        if let Some(hint) = &self.hint {
            write!(f, " | hint: {hint}")?;
        }
        Ok(())
    }
}

impl EvoError {
    /// Returns a reference to the payload describing the error.
    pub fn info(&self) -> &ErrorInfo {
        match self {
            EvoError::Parse(info)
            | EvoError::Validation(info)
            | EvoError::TypeMismatch(info)
            | EvoError::Comparison(info)
            | EvoError::Lookup(info)
            | EvoError::Scheduler(info) => info,
        }
    }
}
