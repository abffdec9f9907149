//! Documents and attachments as they cross the command contract.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::etag::Etag;

/// Structured body of a document.
pub type DocumentBody = Map<String, Value>;

/// Free-form metadata attached to a document or attachment.
pub type Metadata = Map<String, Value>;

/// Metadata key naming the collection a document belongs to.
pub const COLLECTION_METADATA_KEY: &str = "Collection";

/// Metadata key holding the unix timestamp of the last write.
pub const LAST_MODIFIED_METADATA_KEY: &str = "Last-Modified";

/// A stored document as returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocument {
    pub key: String,
    pub etag: Option<Etag>,
    pub data: DocumentBody,
    pub metadata: Metadata,
    /// Unix timestamp (seconds) of the last write.
    pub last_modified: Option<u64>,
}

impl JsonDocument {
    /// The document's header information without its body.
    pub fn to_metadata(&self) -> JsonDocumentMetadata {
        JsonDocumentMetadata {
            key: self.key.clone(),
            etag: self.etag,
            metadata: self.metadata.clone(),
            last_modified: self.last_modified,
        }
    }

    /// Collection tag from metadata, if any.
    pub fn collection(&self) -> Option<&str> {
        self.metadata
            .get(COLLECTION_METADATA_KEY)
            .and_then(Value::as_str)
    }
}

/// Document header information returned by a head request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonDocumentMetadata {
    pub key: String,
    pub etag: Option<Etag>,
    pub metadata: Metadata,
    pub last_modified: Option<u64>,
}

/// Outcome of a successful put.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutResult {
    pub key: String,
    pub etag: Etag,
}

/// Documents loaded by key, plus the documents their include paths pointed at.
///
/// `results` is positionally aligned with the requested keys; a missing key
/// yields `None` in its slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiLoadResult {
    pub results: Vec<Option<JsonDocument>>,
    pub includes: Vec<JsonDocument>,
}

/// A binary attachment with its metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub key: String,
    pub etag: Etag,
    pub data: Bytes,
    pub metadata: Metadata,
}

impl Attachment {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> JsonDocument {
        let mut metadata = Metadata::new();
        metadata.insert(COLLECTION_METADATA_KEY.into(), json!("Books"));
        JsonDocument {
            key: "books/1".into(),
            etag: Some(Etag::from_sequence(3)),
            data: json!({"Title": "Dune"}).as_object().cloned().unwrap(),
            metadata,
            last_modified: Some(1000),
        }
    }

    #[test]
    fn to_metadata_drops_body() {
        let head = doc().to_metadata();
        assert_eq!(head.key, "books/1");
        assert_eq!(head.etag, Some(Etag::from_sequence(3)));
        assert_eq!(head.last_modified, Some(1000));
        assert_eq!(head.metadata[COLLECTION_METADATA_KEY], json!("Books"));
    }

    #[test]
    fn collection_reads_metadata_tag() {
        assert_eq!(doc().collection(), Some("Books"));

        let mut untagged = doc();
        untagged.metadata.clear();
        assert_eq!(untagged.collection(), None);
    }

    #[test]
    fn attachment_size_is_payload_length() {
        let attachment = Attachment {
            key: "files/a".into(),
            etag: Etag::from_sequence(1),
            data: Bytes::from_static(b"hello"),
            metadata: Metadata::new(),
        };
        assert_eq!(attachment.size(), 5);
    }
}
