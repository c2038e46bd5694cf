//! Conversion of result rows into Arrow record batches

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use cf_core::{Row, Value};

use crate::Result;

/// Arrow type able to hold every value of a column
fn column_type<'a>(values: impl Iterator<Item = &'a Value>) -> DataType {
    let mut seen: Option<DataType> = None;
    for value in values {
        let ty = match value {
            Value::Null => continue,
            Value::Bool(_) => DataType::Boolean,
            Value::Int(_) => DataType::Int64,
            Value::Float(_) => DataType::Float64,
            Value::Timestamp(_) => DataType::Timestamp(TimeUnit::Millisecond, None),
            Value::Text(_) | Value::Array(_) => return DataType::Utf8,
        };
        seen = Some(match (seen, ty) {
            (None, ty) => ty,
            (Some(a), b) if a == b => a,
            (Some(DataType::Int64), DataType::Float64) | (Some(DataType::Float64), DataType::Int64) => {
                DataType::Float64
            }
            _ => return DataType::Utf8,
        });
    }
    seen.unwrap_or(DataType::Utf8)
}

fn build_column(rows: &[Row], name: &str, ty: &DataType) -> ArrayRef {
    let cells = rows.iter().map(|row| row.get(name).filter(|v| !v.is_null()));
    match ty {
        DataType::Boolean => Arc::new(BooleanArray::from(
            cells
                .map(|v| match v {
                    Some(Value::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(
            cells.map(|v| v.and_then(Value::as_i64)).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            cells.map(|v| v.and_then(Value::as_f64)).collect::<Vec<_>>(),
        )),
        DataType::Timestamp(_, _) => Arc::new(TimestampMillisecondArray::from(
            cells
                .map(|v| v.and_then(Value::as_timestamp).map(|t| t.timestamp_millis()))
                .collect::<Vec<_>>(),
        )),
        _ => Arc::new(StringArray::from(
            cells.map(|v| v.map(|v| v.to_string())).collect::<Vec<_>>(),
        )),
    }
}

/// Columns in first-seen order across all rows; missing cells are null
pub fn rows_to_record_batch(rows: &[Row]) -> Result<RecordBatch> {
    let mut names: Vec<&str> = Vec::new();
    for row in rows {
        for name in row.keys() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
    }
    if names.is_empty() {
        return Ok(RecordBatch::new_empty(Arc::new(Schema::empty())));
    }

    let mut fields = Vec::with_capacity(names.len());
    let mut columns = Vec::with_capacity(names.len());
    for name in names {
        let ty = column_type(rows.iter().filter_map(|row| row.get(name)));
        columns.push(build_column(rows, name, &ty));
        fields.push(Field::new(name, ty, true));
    }
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Render rows as a text table
pub fn pretty_format(rows: &[Row]) -> Result<String> {
    let batch = rows_to_record_batch(rows)?;
    Ok(pretty_format_batches(&[batch])?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_core::row;

    #[test]
    fn test_mixed_numbers_widen_to_float() {
        let rows = vec![
            row([("key0", Value::from("CA")), ("val", Value::Int(3))]),
            row([("key0", Value::from("NY")), ("val", Value::Float(2.5))]),
            row([("key0", Value::Null), ("val", Value::Null)]),
        ];
        let batch = rows_to_record_batch(&rows).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.schema().field(0).data_type(), &DataType::Utf8);
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Float64);
        assert_eq!(batch.column(1).null_count(), 1);
    }

    #[test]
    fn test_pretty_table() {
        let rows = vec![row([("key0", Value::from("CA")), ("val", Value::Int(10))])];
        let table = pretty_format(&rows).unwrap();
        assert!(table.contains("| key0 | val |"));
        assert!(table.contains("| CA   | 10  |"));
    }

    #[test]
    fn test_no_rows_is_an_empty_batch() {
        let batch = rows_to_record_batch(&[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 0);
    }
}
