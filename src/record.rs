//! Timestamped observations and the per-source field schemas.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{FitError, Result};

/// A single field value. Fields are either numeric or categorical.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// One observation: a timestamp plus an open set of named fields.
///
/// Absent fields are simply not in the map; they are never stored as zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub timestamp: DateTime<FixedOffset>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_number(mut self, name: &str, value: f64) -> Self {
        self.set_number(name, value);
        self
    }

    pub fn with_text(mut self, name: &str, value: &str) -> Self {
        self.fields
            .insert(name.to_string(), Value::Text(value.to_string()));
        self
    }

    /// NaN values are treated as missing.
    pub fn set_number(&mut self, name: &str, value: f64) {
        if !value.is_nan() {
            self.fields.insert(name.to_string(), Value::Number(value));
        }
    }

    pub fn set(&mut self, name: &str, value: Value) {
        match value {
            Value::Number(n) => self.set_number(name, n),
            text => {
                self.fields.insert(name.to_string(), text);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(Value::as_number)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Records read from a source together with the number of malformed
/// records that were skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl RecordBatch {
    pub fn new(records: Vec<Record>, skipped: usize) -> Self {
        Self { records, skipped }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Fails when at least one record was read and all of them were malformed.
    pub fn ensure_usable(self, source_name: &str) -> Result<Self> {
        if self.records.is_empty() && self.skipped > 0 {
            return Err(FitError::MalformedRecord {
                source_name: source_name.to_string(),
                skipped: self.skipped,
            });
        }
        Ok(self)
    }

    /// Keeps only the records matching `keep`.
    pub fn retain(mut self, keep: impl FnMut(&Record) -> bool) -> Self {
        self.records.retain(keep);
        self
    }
}

/// Mapping between a field's short name and the name used in the raw export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub short: &'static str,
    pub long: &'static str,
}

/// Declared set of fields a record source can produce.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    fields: &'static [FieldSpec],
}

impl Schema {
    pub const fn new(fields: &'static [FieldSpec]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    pub fn by_long(&self, long: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.long == long)
    }

    /// Resolves a short or long field name to its short name.
    pub fn resolve(&self, name: &str) -> Result<&'static str> {
        self.fields
            .iter()
            .find(|f| f.short == name || f.long == name)
            .map(|f| f.short)
            .ok_or_else(|| FitError::UnknownField {
                field: name.to_string(),
                known: self
                    .fields
                    .iter()
                    .map(|f| f.short)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    pub fn resolve_all<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>> {
        names
            .iter()
            .map(|n| self.resolve(n.as_ref()).map(str::to_string))
            .collect()
    }
}
