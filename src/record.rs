//! Record model produced by the source and consumed by the destination.
//!
//! A [`Record`] describes one observed object event: the operation that
//! produced it, the resumable position it was observed at, the raw object
//! key and payload, and the metadata headers attached to the object.

use std::collections::HashMap;

/// Metadata key carrying the object's `Content-Type` header.
pub const METADATA_CONTENT_TYPE: &str = "s3.contentType";

/// The kind of change a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// The object existed before the connector started; emitted during the
    /// initial bucket scan.
    Snapshot,

    /// A new object appeared.
    Create,

    /// An existing object was overwritten.
    Update,

    /// The object was deleted.
    Delete,
}

impl Operation {
    /// Returns the operation name as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Snapshot => "snapshot",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Before/after images of an object body.
///
/// `before` is only meaningful for updates and is not currently populated;
/// fetching the prior version by its version id is a possible extension.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Object body before the change.
    pub before: Option<Vec<u8>>,

    /// Object body after the change.
    pub after: Option<Vec<u8>>,
}

/// One object event, as delivered to the host pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Serialized resumable position (see [`crate::source::position`]).
    pub position: Vec<u8>,

    /// The operation that produced this record.
    pub operation: Operation,

    /// Raw object key.
    pub key: Vec<u8>,

    /// Object body images.
    pub payload: Payload,

    /// Metadata headers: the object's content type under
    /// [`METADATA_CONTENT_TYPE`] plus every user metadata header.
    pub metadata: HashMap<String, String>,
}

impl Record {
    /// Creates a snapshot record for an object found during the initial scan.
    #[must_use]
    pub fn snapshot(
        position: Vec<u8>,
        metadata: HashMap<String, String>,
        key: Vec<u8>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            position,
            operation: Operation::Snapshot,
            key,
            payload: Payload {
                before: None,
                after: Some(payload),
            },
            metadata,
        }
    }

    /// Creates a record for a newly created object.
    #[must_use]
    pub fn create(
        position: Vec<u8>,
        metadata: HashMap<String, String>,
        key: Vec<u8>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            position,
            operation: Operation::Create,
            key,
            payload: Payload {
                before: None,
                after: Some(payload),
            },
            metadata,
        }
    }

    /// Creates a record for an overwritten object.
    #[must_use]
    pub fn update(
        position: Vec<u8>,
        metadata: HashMap<String, String>,
        key: Vec<u8>,
        before: Option<Vec<u8>>,
        after: Vec<u8>,
    ) -> Self {
        Self {
            position,
            operation: Operation::Update,
            key,
            payload: Payload {
                before,
                after: Some(after),
            },
            metadata,
        }
    }

    /// Creates a record for a deleted object. Carries no payload.
    #[must_use]
    pub fn delete(position: Vec<u8>, metadata: HashMap<String, String>, key: Vec<u8>) -> Self {
        Self {
            position,
            operation: Operation::Delete,
            key,
            payload: Payload::default(),
            metadata,
        }
    }

    /// Returns the object key as a lossy string, for logs and encoders.
    #[must_use]
    pub fn key_string(&self) -> String {
        String::from_utf8_lossy(&self.key).into_owned()
    }
}
