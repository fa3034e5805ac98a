//! Parquet batch encoding.
//!
//! Unlike schema-inferring writers, the schema here is fixed: five Utf8
//! columns named after the record fields, with the metadata map carried
//! as a JSON-encoded string. Fixing the schema keeps every produced
//! object readable with the same reader configuration.

use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;

use crate::error::SerdeError;
use crate::record::Record;

/// The fixed batch schema shared by every produced object.
#[must_use]
pub fn batch_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("Operation", DataType::Utf8, false),
        Field::new("Position", DataType::Utf8, false),
        Field::new("Payload", DataType::Utf8, false),
        Field::new("Key", DataType::Utf8, false),
        Field::new("Metadata", DataType::Utf8, false),
    ]))
}

/// Encodes records as a single-row-group Parquet file, in input order.
///
/// # Errors
///
/// Returns `SerdeError::Parquet` if the Arrow batch or the file cannot be
/// built.
pub fn encode(records: &[Record]) -> Result<Vec<u8>, SerdeError> {
    let mut operations = Vec::with_capacity(records.len());
    let mut positions = Vec::with_capacity(records.len());
    let mut payloads = Vec::with_capacity(records.len());
    let mut keys = Vec::with_capacity(records.len());
    let mut metadata = Vec::with_capacity(records.len());

    for record in records {
        operations.push(record.operation.as_str().to_string());
        positions.push(String::from_utf8_lossy(&record.position).into_owned());
        payloads.push(
            record
                .payload
                .after
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default(),
        );
        keys.push(record.key_string());
        metadata.push(serde_json::to_string(&record.metadata)?);
    }

    let schema = batch_schema();
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(operations)),
        Arc::new(StringArray::from(positions)),
        Arc::new(StringArray::from(payloads)),
        Arc::new(StringArray::from(keys)),
        Arc::new(StringArray::from(metadata)),
    ];

    let batch = RecordBatch::try_new(Arc::clone(&schema), columns)
        .map_err(|e| SerdeError::Parquet(e.to_string()))?;

    let mut buf = Vec::new();
    let properties = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(properties))
        .map_err(|e| SerdeError::Parquet(e.to_string()))?;
    writer
        .write(&batch)
        .map_err(|e| SerdeError::Parquet(e.to_string()))?;
    writer
        .close()
        .map_err(|e| SerdeError::Parquet(e.to_string()))?;

    Ok(buf)
}
