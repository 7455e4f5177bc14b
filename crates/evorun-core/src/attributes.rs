//! Ordered (name, value) record container.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInfo, EvoError};
use crate::value::{Value, Values};

/// A population of attribute records, one per node or agent.
pub type SetOfAttributes = Vec<Attributes>;

/// An ordered sequence of named [`Value`]s.
///
/// Indices are stable after construction unless the container is explicitly
/// resized. Names need not be unique; name lookup returns the first match.
/// Index and name access fail with [`EvoError::Lookup`] rather than
/// returning a default, except through [`Attributes::value_or`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    names: Vec<String>,
    values: Values,
}

impl Attributes {
    /// Creates an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a record with `size` unnamed, invalid entries.
    pub fn with_size(size: usize) -> Self {
        let mut attrs = Self::default();
        attrs.resize(size);
        attrs
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Returns true when the record holds no entries.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Resizes the record to `size` entries.
    ///
    /// Growing appends empty-name, invalid-value entries; shrinking
    /// truncates. Resizing to 0 restores the freshly constructed state.
    pub fn resize(&mut self, size: usize) {
        self.names.resize(size, String::new());
        self.values.resize(size, Value::Invalid);
    }

    /// Index of the first entry called `name`, if any.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Returns true when an entry called `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    /// All entry names, in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Name of the entry at `id`.
    pub fn name(&self, id: usize) -> Result<&str, EvoError> {
        self.names
            .get(id)
            .map(String::as_str)
            .ok_or_else(|| out_of_range(id, self.size()))
    }

    /// All values, in order.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Value of the entry at `id`.
    pub fn value(&self, id: usize) -> Result<&Value, EvoError> {
        self.values
            .get(id)
            .ok_or_else(|| out_of_range(id, self.size()))
    }

    /// Value of the first entry called `name`.
    pub fn value_by_name(&self, name: &str) -> Result<&Value, EvoError> {
        let id = self.index_of(name).ok_or_else(|| {
            EvoError::Lookup(
                ErrorInfo::new("attrs.unknown_name", "no attribute with the given name")
                    .with_context("name", name),
            )
        })?;
        Ok(&self.values[id])
    }

    /// Value of the first entry called `name`, or `fallback` on a miss.
    /// This accessor never fails.
    pub fn value_or(&self, name: &str, fallback: Value) -> Value {
        match self.index_of(name) {
            Some(id) => self.values[id].clone(),
            None => fallback,
        }
    }

    /// Overwrites both the name and the value of the entry at `id`.
    pub fn replace(
        &mut self,
        id: usize,
        name: impl Into<String>,
        value: Value,
    ) -> Result<(), EvoError> {
        if id >= self.size() {
            return Err(out_of_range(id, self.size()));
        }
        self.names[id] = name.into();
        self.values[id] = value;
        Ok(())
    }

    /// Overwrites the value of the entry at `id`, keeping its name.
    pub fn set_value(&mut self, id: usize, value: Value) -> Result<(), EvoError> {
        if id >= self.size() {
            return Err(out_of_range(id, self.size()));
        }
        self.values[id] = value;
        Ok(())
    }

    /// Appends an entry.
    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.names.push(name.into());
        self.values.push(value);
    }
}

fn out_of_range(id: usize, size: usize) -> EvoError {
    EvoError::Lookup(
        ErrorInfo::new("attrs.out_of_range", "attribute index out of range")
            .with_context("index", id.to_string())
            .with_context("size", size.to_string()),
    )
}
