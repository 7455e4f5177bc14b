//! Attribute range parsing, validation and random generation.

use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use evorun_core::errors::{ErrorInfo, EvoError};
use evorun_core::rng::Prg;
use evorun_core::value::Value;

/// Name → range mapping describing the valid domain of every attribute in a
/// population. Insertion order defines the attribute ids, so the map must be
/// built in column order. The scope is shared read-only across all trials of
/// all experiments that reference it.
pub type AttrsScope = IndexMap<String, Arc<AttributeRange>>;

/// Builds a scope from `(name, range spec)` pairs, assigning ids in order.
pub fn scope_from_specs(specs: &[(&str, &str)]) -> Result<AttrsScope, EvoError> {
    let mut scope = AttrsScope::with_capacity(specs.len());
    for (id, (name, spec)) in specs.iter().enumerate() {
        let range = AttributeRange::parse(id, name, spec);
        if !range.is_valid() {
            return Err(EvoError::Parse(
                ErrorInfo::new("range.bad_spec", "unable to parse the attribute range")
                    .with_context("attribute", *name)
                    .with_context("spec", *spec),
            ));
        }
        scope.insert((*name).to_string(), Arc::new(range));
    }
    Ok(scope)
}

/// The domain variant backing an [`AttributeRange`].
#[derive(Debug, Clone, PartialEq)]
pub enum RangeDef {
    /// Sentinel for an unparsable specification.
    Invalid,
    /// `bool`
    Bool,
    /// `int[min,max]`, both bounds inclusive.
    IntRange {
        /// Smallest accepted integer.
        min: i64,
        /// Largest accepted integer.
        max: i64,
    },
    /// `int{..}`; stored sorted and deduplicated.
    IntSet(Vec<i64>),
    /// `double[min,max]`, both bounds inclusive.
    DoubleRange {
        /// Smallest accepted real.
        min: f64,
        /// Largest accepted real.
        max: f64,
    },
    /// `double{..}`; stored sorted and deduplicated.
    DoubleSet(Vec<f64>),
    /// `string`: any string, including the empty one.
    AnyString,
    /// `string{..}`; candidates kept in the supplied order.
    StringSet(Vec<String>),
    /// `filepath`: a path that exists on disk as a file.
    FilePath,
    /// `dirpath`: a path that exists on disk as a directory.
    DirPath,
}

/// A typed validator/generator for one named attribute.
///
/// Created once from a specification string at plugin/scope setup time and
/// immutable thereafter. A failed parse yields a sentinel whose
/// [`is_valid`](AttributeRange::is_valid) is false and whose operations all
/// produce invalid values.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRange {
    id: usize,
    name: String,
    def: RangeDef,
}

impl AttributeRange {
    /// Parses a range specification string.
    ///
    /// Recognized, case-sensitively: `bool`, `int[a,b]`, `double[a,b]`,
    /// `int{..}`, `double{..}`, `string`, `string{..}`, `filepath`,
    /// `dirpath`. The upper bound of a numeric interval may be the token
    /// `max`. Anything else produces the invalid sentinel.
    pub fn parse(id: usize, name: &str, spec: &str) -> Self {
        let def = Self::parse_def(spec);
        if def == RangeDef::Invalid {
            warn!(attribute = name, spec, "unable to parse attribute range");
        }
        Self {
            id,
            name: name.to_string(),
            def,
        }
    }

    fn parse_def(spec: &str) -> RangeDef {
        match spec {
            "bool" => return RangeDef::Bool,
            "string" => return RangeDef::AnyString,
            "filepath" => return RangeDef::FilePath,
            "dirpath" => return RangeDef::DirPath,
            _ => {}
        }
        if let Some(body) = enclosed(spec, "int[", ']') {
            return parse_int_interval(body);
        }
        if let Some(body) = enclosed(spec, "double[", ']') {
            return parse_double_interval(body);
        }
        if let Some(body) = enclosed(spec, "int{", '}') {
            return parse_int_set(body);
        }
        if let Some(body) = enclosed(spec, "double{", '}') {
            return parse_double_set(body);
        }
        if let Some(body) = enclosed(spec, "string{", '}') {
            return parse_string_set(body);
        }
        RangeDef::Invalid
    }

    /// The attribute id (its column position in the scope).
    pub fn id(&self) -> usize {
        self.id
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parsed domain.
    pub fn def(&self) -> &RangeDef {
        &self.def
    }

    /// False for the sentinel produced by a failed parse.
    pub fn is_valid(&self) -> bool {
        self.def != RangeDef::Invalid
    }

    /// Smallest value in the range. Single-value and path ranges yield the
    /// empty string; string sets yield the byte-order smallest candidate.
    pub fn min(&self) -> Value {
        match &self.def {
            RangeDef::Invalid => Value::Invalid,
            RangeDef::Bool => Value::Bool(false),
            RangeDef::IntRange { min, .. } => Value::Int(*min),
            RangeDef::IntSet(values) => Value::Int(values[0]),
            RangeDef::DoubleRange { min, .. } => Value::Double(*min),
            RangeDef::DoubleSet(values) => Value::Double(values[0]),
            RangeDef::AnyString | RangeDef::FilePath | RangeDef::DirPath => {
                Value::String(String::new())
            }
            RangeDef::StringSet(values) => match values.iter().min() {
                Some(v) => Value::String(v.clone()),
                None => Value::Invalid,
            },
        }
    }

    /// Largest value in the range; see [`min`](AttributeRange::min).
    pub fn max(&self) -> Value {
        match &self.def {
            RangeDef::Invalid => Value::Invalid,
            RangeDef::Bool => Value::Bool(true),
            RangeDef::IntRange { max, .. } => Value::Int(*max),
            RangeDef::IntSet(values) => Value::Int(values[values.len() - 1]),
            RangeDef::DoubleRange { max, .. } => Value::Double(*max),
            RangeDef::DoubleSet(values) => Value::Double(values[values.len() - 1]),
            RangeDef::AnyString | RangeDef::FilePath | RangeDef::DirPath => {
                Value::String(String::new())
            }
            RangeDef::StringSet(values) => match values.iter().max() {
                Some(v) => Value::String(v.clone()),
                None => Value::Invalid,
            },
        }
    }

    /// Draws a uniform value from the range; the result always satisfies
    /// [`validate`](AttributeRange::validate). Intervals draw inclusively of
    /// both integer bounds; sets draw a uniform member.
    pub fn rand(&self, prg: &mut Prg) -> Value {
        match &self.def {
            RangeDef::Invalid => Value::Invalid,
            RangeDef::Bool => Value::Bool(prg.bernoulli()),
            RangeDef::IntRange { min, max } => Value::Int(prg.rand_int_between(*min, *max)),
            RangeDef::IntSet(values) => Value::Int(values[prg.rand_index(values.len())]),
            RangeDef::DoubleRange { min, max } => {
                Value::Double(prg.rand_double_between(*min, *max))
            }
            RangeDef::DoubleSet(values) => Value::Double(values[prg.rand_index(values.len())]),
            RangeDef::AnyString | RangeDef::FilePath | RangeDef::DirPath => {
                Value::String(String::new())
            }
            RangeDef::StringSet(values) => {
                Value::String(values[prg.rand_index(values.len())].clone())
            }
        }
    }

    /// Parses and range-checks a textual value.
    ///
    /// Out-of-range or unparsable input yields `Value::Invalid`; values are
    /// never clamped. The unconstrained `string` range accepts anything,
    /// including the empty string.
    pub fn validate(&self, text: &str) -> Value {
        if self.def == RangeDef::AnyString {
            return Value::String(text.to_string());
        }
        if text.is_empty() {
            return Value::Invalid;
        }
        match &self.def {
            RangeDef::Invalid | RangeDef::AnyString => Value::Invalid,
            RangeDef::Bool => match text.to_lowercase().as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => Value::Invalid,
            },
            RangeDef::IntRange { min, max } => match text.parse::<i64>() {
                Ok(v) if v >= *min && v <= *max => Value::Int(v),
                _ => Value::Invalid,
            },
            RangeDef::IntSet(values) => match text.parse::<i64>() {
                Ok(v) if values.binary_search(&v).is_ok() => Value::Int(v),
                _ => Value::Invalid,
            },
            RangeDef::DoubleRange { min, max } => match text.parse::<f64>() {
                Ok(v) if v >= *min && v <= *max => Value::Double(v),
                _ => Value::Invalid,
            },
            RangeDef::DoubleSet(values) => match text.parse::<f64>() {
                Ok(v) if values.iter().any(|c| *c == v) => Value::Double(v),
                _ => Value::Invalid,
            },
            RangeDef::StringSet(values) => {
                if values.iter().any(|c| c == text) {
                    Value::String(text.to_string())
                } else {
                    Value::Invalid
                }
            }
            RangeDef::FilePath => {
                if Path::new(text).is_file() {
                    Value::String(text.to_string())
                } else {
                    Value::Invalid
                }
            }
            RangeDef::DirPath => {
                if Path::new(text).is_dir() {
                    Value::String(text.to_string())
                } else {
                    Value::Invalid
                }
            }
        }
    }
}

fn enclosed<'a>(spec: &'a str, prefix: &str, close: char) -> Option<&'a str> {
    spec.strip_prefix(prefix)?.strip_suffix(close)
}

fn parse_int_interval(body: &str) -> RangeDef {
    let mut parts = body.split(',');
    let (Some(lo), Some(hi), None) = (parts.next(), parts.next(), parts.next()) else {
        return RangeDef::Invalid;
    };
    let Ok(min) = lo.trim().parse::<i64>() else {
        return RangeDef::Invalid;
    };
    let max = match hi.trim() {
        "max" => i64::MAX,
        other => match other.parse::<i64>() {
            Ok(v) => v,
            Err(_) => return RangeDef::Invalid,
        },
    };
    if min > max {
        return RangeDef::Invalid;
    }
    RangeDef::IntRange { min, max }
}

fn parse_double_interval(body: &str) -> RangeDef {
    let mut parts = body.split(',');
    let (Some(lo), Some(hi), None) = (parts.next(), parts.next(), parts.next()) else {
        return RangeDef::Invalid;
    };
    let Ok(min) = lo.trim().parse::<f64>() else {
        return RangeDef::Invalid;
    };
    let max = match hi.trim() {
        "max" => f64::MAX,
        other => match other.parse::<f64>() {
            Ok(v) => v,
            Err(_) => return RangeDef::Invalid,
        },
    };
    if !min.is_finite() || !max.is_finite() || min > max {
        return RangeDef::Invalid;
    }
    RangeDef::DoubleRange { min, max }
}

fn parse_int_set(body: &str) -> RangeDef {
    let mut values = Vec::new();
    for token in body.split(',') {
        match token.trim().parse::<i64>() {
            Ok(v) => values.push(v),
            Err(_) => return RangeDef::Invalid,
        }
    }
    values.sort_unstable();
    values.dedup();
    RangeDef::IntSet(values)
}

fn parse_double_set(body: &str) -> RangeDef {
    let mut values = Vec::new();
    for token in body.split(',') {
        match token.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => values.push(v),
            _ => return RangeDef::Invalid,
        }
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    values.dedup();
    RangeDef::DoubleSet(values)
}

fn parse_string_set(body: &str) -> RangeDef {
    let values: Vec<String> = body.split(',').map(str::to_string).collect();
    if values.iter().any(String::is_empty) {
        return RangeDef::Invalid;
    }
    RangeDef::StringSet(values)
}
