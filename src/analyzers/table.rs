//! Aggregation results.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::analyzers::bucket::{BucketKey, TimeUnit};
use crate::analyzers::reduction::Reduction;
use crate::record::Value;

/// One aggregated row: the bucket key and one cell per requested field.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: BucketKey,
    pub values: Vec<Option<Value>>,
}

/// Table keyed by bucket, one column per requested field in request order.
///
/// Only built by the aggregator; rows are sorted by bucket key.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    unit: TimeUnit,
    reduction: Reduction,
    fields: Vec<String>,
    rows: Vec<Row>,
    skipped: usize,
}

impl ResultTable {
    pub(crate) fn new(
        unit: TimeUnit,
        reduction: Reduction,
        fields: Vec<String>,
        rows: Vec<Row>,
        skipped: usize,
    ) -> Self {
        Self {
            unit,
            reduction,
            fields,
            rows,
            skipped,
        }
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn reduction(&self) -> Reduction {
        self.reduction
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of malformed source records skipped before aggregation.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn keys(&self) -> impl Iterator<Item = &BucketKey> {
        self.rows.iter().map(|r| &r.key)
    }

    pub fn row(&self, key: &BucketKey) -> Option<&Row> {
        self.rows
            .binary_search_by(|r| r.key.cmp(key))
            .ok()
            .map(|i| &self.rows[i])
    }

    fn field_index(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Cell at `key` / `field`; `None` when the bucket, the field, or the value is absent.
    pub fn get(&self, key: &BucketKey, field: &str) -> Option<&Value> {
        let idx = self.field_index(field)?;
        self.row(key)?.values[idx].as_ref()
    }

    pub fn number(&self, key: &BucketKey, field: &str) -> Option<f64> {
        self.get(key, field).and_then(Value::as_number)
    }

    /// All cells of one column, in row order.
    pub fn column(&self, field: &str) -> Option<Vec<(&BucketKey, Option<&Value>)>> {
        let idx = self.field_index(field)?;
        Some(
            self.rows
                .iter()
                .map(|r| (&r.key, r.values[idx].as_ref()))
                .collect(),
        )
    }

    /// Column names of the flat export: the key column followed by the fields.
    pub fn headers(&self) -> Vec<String> {
        std::iter::once(self.unit.key_label().to_string())
            .chain(self.fields.iter().cloned())
            .collect()
    }

    /// Flat row-oriented export, one `(column, cell)` list per row.
    pub fn to_rows(&self) -> Vec<Vec<(String, Option<Value>)>> {
        let key_label = self.unit.key_label();
        self.rows
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(self.fields.len() + 1);
                cells.push((key_label.to_string(), Some(key_value(&row.key))));
                for (name, value) in self.fields.iter().zip(&row.values) {
                    cells.push((name.clone(), value.clone()));
                }
                cells
            })
            .collect()
    }

    /// Rows as plain strings, with empty strings for absent cells.
    pub fn to_string_records(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                std::iter::once(row.key.to_string())
                    .chain(
                        row.values
                            .iter()
                            .map(|v| v.as_ref().map(Value::to_string).unwrap_or_default()),
                    )
                    .collect()
            })
            .collect()
    }
}

fn key_value(key: &BucketKey) -> Value {
    match key {
        BucketKey::Weekday(n) | BucketKey::Hour(n) => Value::Number(f64::from(*n)),
        BucketKey::Year(y) => Value::Number(f64::from(*y)),
        other => Value::Text(other.to_string()),
    }
}

/// Serialized as `{unit, reduction, fields, skipped, rows: [{<key>: .., <field>: ..}]}`.
impl Serialize for ResultTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        map.serialize_entry("unit", &self.unit.to_string())?;
        map.serialize_entry("reduction", &self.reduction.to_string())?;
        map.serialize_entry("fields", &self.fields)?;
        map.serialize_entry("skipped", &self.skipped)?;
        map.serialize_entry("rows", &ExportRows(self))?;
        map.end()
    }
}

struct ExportRows<'a>(&'a ResultTable);

impl Serialize for ExportRows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.rows.iter().map(|row| ExportRow {
            table: self.0,
            row,
        }))
    }
}

struct ExportRow<'a> {
    table: &'a ResultTable,
    row: &'a Row,
}

impl Serialize for ExportRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.table.fields.len() + 1))?;
        map.serialize_entry(self.table.unit.key_label(), &self.row.key)?;
        for (name, value) in self.table.fields.iter().zip(&self.row.values) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
