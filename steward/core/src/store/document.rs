//! Whole-document read/modify/write over a blob store.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::schema::decode_document;
use super::{BlobStore, DateBucket, DocumentPath, FeatureDocument, StoreError};
use crate::error::{StewardError, StewardResult};
use crate::ids::GuildId;
use crate::panel::PanelRecord;

/// A configuration document: setting name to value
pub type Document = Map<String, Value>;

/// Document access for feature handlers
///
/// Cheap to clone; every clone shares the same backend. Holds no document
/// state of its own, so every call observes the backend as it is now.
#[derive(Clone)]
pub struct DocumentStore {
    blobs: Arc<dyn BlobStore>,
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("backend", &self.blobs.name())
            .finish()
    }
}

impl DocumentStore {
    /// Wrap a blob store
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self { blobs }
    }

    /// The underlying blob store
    #[must_use]
    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    // ------------------------------------------------------------------------
    // Configuration documents
    // ------------------------------------------------------------------------

    /// Read the configuration document for (guild, feature)
    ///
    /// A document that was never written is an empty object, not an error.
    pub async fn get_document(
        &self,
        guild: &GuildId,
        feature: &str,
    ) -> Result<Document, StoreError> {
        let path = DocumentPath::config(guild, feature)?;
        match self.read_json::<Value>(&path).await? {
            None => Ok(Document::new()),
            Some(Value::Object(doc)) => Ok(doc),
            Some(_) => Err(StoreError::Shape {
                path: path.to_string(),
                expected: "object",
            }),
        }
    }

    /// Replace the configuration document wholesale
    pub async fn put_document(
        &self,
        guild: &GuildId,
        feature: &str,
        doc: &Document,
    ) -> Result<(), StoreError> {
        let path = DocumentPath::config(guild, feature)?;
        self.write_json(&path, doc).await
    }

    /// Assign `value` to the top-level `field` and write the document back
    ///
    /// Read, assign, write as one unit with no concurrency control: a writer
    /// that read an older snapshot and lands later wins on the whole document.
    /// Nested objects under `field` are replaced, never merged.
    pub async fn set_field(
        &self,
        guild: &GuildId,
        feature: &str,
        field: &str,
        value: Value,
    ) -> Result<Document, StoreError> {
        let mut doc = self.get_document(guild, feature).await?;
        doc.insert(field.to_string(), value);
        self.put_document(guild, feature, &doc).await?;
        debug!(guild_id = %guild, feature, field, "Document field written");
        Ok(doc)
    }

    /// Load a typed feature document (the feature default when never written)
    pub async fn load<T: FeatureDocument>(&self, guild: &GuildId) -> StewardResult<T> {
        let doc = self.get_document(guild, T::FEATURE_KEY).await?;
        decode_document(guild, doc)
    }

    /// Validate and write a typed feature document wholesale
    pub async fn save<T: FeatureDocument>(&self, guild: &GuildId, doc: &T) -> StewardResult<()> {
        doc.validate()?;
        match serde_json::to_value(doc).map_err(StoreError::Encode)? {
            Value::Object(map) => Ok(self.put_document(guild, T::FEATURE_KEY, &map).await?),
            _ => Err(StewardError::Storage(StoreError::Shape {
                path: format!("{guild}/{}/config", T::FEATURE_KEY),
                expected: "object",
            })),
        }
    }

    // ------------------------------------------------------------------------
    // Append-only logs
    // ------------------------------------------------------------------------

    /// Read the records in a date bucket (empty when never written)
    pub async fn read_log(
        &self,
        guild: &GuildId,
        feature: &str,
        bucket: DateBucket,
    ) -> Result<Vec<Value>, StoreError> {
        let path = DocumentPath::log(guild, feature, bucket)?;
        match self.read_json::<Value>(&path).await? {
            None => Ok(Vec::new()),
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err(StoreError::Shape {
                path: path.to_string(),
                expected: "array",
            }),
        }
    }

    /// Append a record to a date bucket; returns the new record count
    ///
    /// Same whole-document semantics as [`Self::set_field`]: concurrent
    /// appends to one bucket can drop a record.
    pub async fn append_record(
        &self,
        guild: &GuildId,
        feature: &str,
        bucket: DateBucket,
        record: Value,
    ) -> Result<usize, StoreError> {
        let path = DocumentPath::log(guild, feature, bucket)?;
        let mut records = self.read_log(guild, feature, bucket).await?;
        records.push(record);
        self.write_json(&path, &records).await?;
        debug!(guild_id = %guild, feature, %bucket, count = records.len(), "Record appended");
        Ok(records.len())
    }

    // ------------------------------------------------------------------------
    // Panel bindings
    // ------------------------------------------------------------------------

    /// Read the panel binding for (guild, feature)
    pub async fn panel_record(
        &self,
        guild: &GuildId,
        feature: &str,
    ) -> Result<Option<PanelRecord>, StoreError> {
        let path = DocumentPath::panel(guild, feature)?;
        self.read_json(&path).await
    }

    /// Overwrite the panel binding for (guild, feature)
    pub async fn put_panel_record(
        &self,
        guild: &GuildId,
        feature: &str,
        record: &PanelRecord,
    ) -> Result<(), StoreError> {
        let path = DocumentPath::panel(guild, feature)?;
        self.write_json(&path, record).await
    }

    // ------------------------------------------------------------------------
    // Encoding
    // ------------------------------------------------------------------------

    async fn read_json<T: DeserializeOwned>(
        &self,
        path: &DocumentPath,
    ) -> Result<Option<T>, StoreError> {
        let Some(bytes) = self.blobs.read_blob(path.as_str()).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: path.to_string(),
                source,
            })
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &DocumentPath,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(StoreError::Encode)?;
        self.blobs.write_blob(path.as_str(), bytes).await
    }
}
