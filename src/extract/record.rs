//! Records flowing through the pipeline and the filter that selects them.

use bson::{Bson, Document, RawDocumentBuf};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, SourceError};

/// An undecoded record as handed out by a cursor source.
///
/// The payload is kept in the source's wire encoding (raw BSON bytes for
/// MongoDB) until a worker decodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    id: String,
    payload: Vec<u8>,
}

/// A decoded record: the source identifier paired with the typed fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub id: String,
    pub code: String,
}

/// The ordered collection accumulated by the aggregator.
pub type ResultSet = Vec<DecodedRecord>;

/// Schema a payload must satisfy.
#[derive(Debug, Deserialize)]
struct CodeFields {
    code: String,
}

impl RawRecord {
    pub fn new(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    /// Build a raw record from one BSON document, taking the identifier
    /// from its `_id` field.
    ///
    /// Only `_id` is read; the rest of the document stays undecoded. An
    /// `_id` that is present but null is still an identifier.
    pub fn from_raw_document(doc: RawDocumentBuf) -> Result<Self, SourceError> {
        let id = match doc.get("_id") {
            Ok(Some(value)) => Bson::try_from(value)
                .map(id_to_string)
                .map_err(|e| SourceError::MalformedRecord(format!("unreadable _id: {e}")))?,
            Ok(None) => {
                return Err(SourceError::MalformedRecord(
                    "document has no _id".to_string(),
                ));
            }
            Err(e) => {
                return Err(SourceError::MalformedRecord(format!(
                    "unreadable document: {e}"
                )));
            }
        };
        Ok(Self {
            id,
            payload: doc.into_bytes(),
        })
    }

    /// Serialize a document into a raw record.
    pub fn from_document(doc: &Document) -> Result<Self, SourceError> {
        let raw = RawDocumentBuf::from_document(doc)
            .map_err(|e| SourceError::MalformedRecord(e.to_string()))?;
        Self::from_raw_document(raw)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Decode the payload against the `{ code: string }` schema.
    ///
    /// No partial decoding: any schema mismatch fails the whole record.
    pub fn decode(self) -> Result<DecodedRecord, DecodeError> {
        match bson::from_slice::<CodeFields>(&self.payload) {
            Ok(fields) => Ok(DecodedRecord {
                id: self.id,
                code: fields.code,
            }),
            Err(e) => Err(DecodeError::new(self.id, e.to_string())),
        }
    }
}

fn id_to_string(id: Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s,
        other => other.into_relaxed_extjson().to_string(),
    }
}

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionFilter {
    field: String,
    value: String,
}

impl ExtractionFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// MongoDB query document for this filter.
    pub fn to_document(&self) -> Document {
        let mut query = Document::new();
        query.insert(self.field.clone(), self.value.clone());
        query
    }
}

impl std::fmt::Display for ExtractionFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} == {:?}", self.field, self.value)
    }
}
