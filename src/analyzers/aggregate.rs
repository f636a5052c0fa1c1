use crate::analyzers::bucket::{BucketKey, TimeUnit};
use crate::analyzers::reduction::Reduction;
use crate::analyzers::table::{ResultTable, Row};
use crate::record::{Record, RecordBatch, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Groups `records` into buckets by `unit` and reduces every requested field.
///
/// Records missing a field are left out of that field's reduction. An empty
/// input gives an empty table. The output depends only on the arguments.
pub fn aggregate<S: AsRef<str>>(
    records: &[Record],
    fields: &[S],
    unit: TimeUnit,
    reduction: Reduction,
) -> ResultTable {
    build(records, fields, unit, reduction, 0)
}

/// Like [`aggregate`], carrying the batch's skipped-record count into the table.
pub fn aggregate_batch<S: AsRef<str>>(
    batch: &RecordBatch,
    fields: &[S],
    unit: TimeUnit,
    reduction: Reduction,
) -> ResultTable {
    build(&batch.records, fields, unit, reduction, batch.skipped)
}

fn build<S: AsRef<str>>(
    records: &[Record],
    fields: &[S],
    unit: TimeUnit,
    reduction: Reduction,
    skipped: usize,
) -> ResultTable {
    let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();

    // bucket -> per field -> values in input order
    let mut buckets: BTreeMap<BucketKey, Vec<Vec<&Value>>> = BTreeMap::new();

    for record in records {
        let series = buckets
            .entry(unit.bucket(record))
            .or_insert_with(|| vec![Vec::new(); fields.len()]);

        for (idx, field) in fields.iter().enumerate() {
            if let Some(value) = record.get(field) {
                series[idx].push(value);
            }
        }
    }

    let rows: Vec<Row> = buckets
        .into_iter()
        .map(|(key, series)| Row {
            key,
            values: series.iter().map(|values| reduction.apply(values)).collect(),
        })
        .collect();

    debug!(
        records = records.len(),
        buckets = rows.len(),
        %unit,
        %reduction,
        "Aggregated records"
    );

    ResultTable::new(unit, reduction, fields, rows, skipped)
}
