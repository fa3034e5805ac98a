//! Newline-delimited JSON batch encoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::SerdeError;
use crate::record::Record;

/// One encoded line. Position, payload and key are written as strings of
/// their raw bytes.
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonRecord {
    /// Operation name (`snapshot`, `create`, `update`, `delete`).
    #[serde(rename = "Operation")]
    pub operation: String,

    /// Serialized position.
    #[serde(rename = "Position")]
    pub position: String,

    /// The `after` payload image; empty for deletes.
    #[serde(rename = "Payload")]
    pub payload: String,

    /// Object key.
    #[serde(rename = "Key")]
    pub key: String,

    /// Metadata headers.
    #[serde(rename = "Metadata")]
    pub metadata: HashMap<String, String>,
}

impl From<&Record> for JsonRecord {
    fn from(record: &Record) -> Self {
        Self {
            operation: record.operation.as_str().to_string(),
            position: String::from_utf8_lossy(&record.position).into_owned(),
            payload: record
                .payload
                .after
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default(),
            key: record.key_string(),
            metadata: record.metadata.clone(),
        }
    }
}

/// Encodes records as one JSON object per line, in input order.
///
/// # Errors
///
/// Returns `SerdeError::Json` if serialization fails.
pub fn encode(records: &[Record]) -> Result<Vec<u8>, SerdeError> {
    let mut buf = Vec::new();
    for record in records {
        serde_json::to_writer(&mut buf, &JsonRecord::from(record))?;
        buf.push(b'\n');
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records() -> Vec<Record> {
        vec![
            Record::snapshot(
                b"k1_s100".to_vec(),
                HashMap::from([("s3.contentType".to_string(), "text/plain".to_string())]),
                b"k1".to_vec(),
                b"body-1".to_vec(),
            ),
            Record::create(b"k2_c200".to_vec(), HashMap::new(), b"k2".to_vec(), b"body-2".to_vec()),
            Record::update(
                b"k3_c300".to_vec(),
                HashMap::new(),
                b"k3".to_vec(),
                None,
                b"body-3".to_vec(),
            ),
            Record::delete(b"k4_c400".to_vec(), HashMap::new(), b"k4".to_vec()),
        ]
    }

    #[test]
    fn test_one_line_per_record_in_input_order() {
        let bytes = encode(&sample_records()).unwrap();
        let text = std::str::from_utf8(&bytes).unwrap();

        assert!(text.ends_with('\n'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);

        let parsed: Vec<JsonRecord> = lines
            .iter()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(parsed[0].operation, "snapshot");
        assert_eq!(parsed[1].operation, "create");
        assert_eq!(parsed[2].operation, "update");
        assert_eq!(parsed[3].operation, "delete");
    }

    #[test]
    fn test_field_names_are_stable() {
        let bytes = encode(&sample_records()[..1]).unwrap();
        let value: serde_json::Value = serde_json::from_slice(
            bytes.split(|b| *b == b'\n').next().unwrap(),
        )
        .unwrap();

        let object = value.as_object().unwrap();
        for field in ["Operation", "Position", "Payload", "Key", "Metadata"] {
            assert!(object.contains_key(field), "missing field {field}");
        }
        assert_eq!(object.len(), 5);
    }

    #[test]
    fn test_round_trips_payload_and_key_bytes() {
        let bytes = encode(&sample_records()).unwrap();
        let parsed: Vec<JsonRecord> = std::str::from_utf8(&bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(parsed[1].key, "k2");
        assert_eq!(parsed[1].payload, "body-2");
        assert_eq!(parsed[1].position, "k2_c200");
        // Deletes carry no payload.
        assert_eq!(parsed[3].payload, "");
        assert_eq!(
            parsed[0].metadata.get("s3.contentType").map(String::as_str),
            Some("text/plain")
        );
    }

    #[test]
    fn test_empty_batch_is_empty_object() {
        assert!(encode(&[]).unwrap().is_empty());
    }
}
