//! Typed feature documents.
//!
//! Storage stays opaque JSON; each feature declares its in-memory shape here
//! and the store converts at the boundary.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{Document, StoreError};
use crate::error::StewardResult;
use crate::ids::GuildId;

/// A feature's configuration document shape
///
/// Implementors should mark their struct `#[serde(default)]` so documents
/// written by older versions (or partially by `set_field`) still load.
pub trait FeatureDocument:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
    /// Feature key the document is stored under
    const FEATURE_KEY: &'static str;

    /// Check invariants the feature relies on
    ///
    /// Runs after every typed load and before every typed save.
    fn validate(&self) -> StewardResult<()> {
        Ok(())
    }
}

/// Convert a raw configuration document into `T` and validate it
///
/// An empty document is the feature default.
pub fn decode_document<T: FeatureDocument>(guild: &GuildId, doc: Document) -> StewardResult<T> {
    let typed = if doc.is_empty() {
        T::default()
    } else {
        serde_json::from_value(Value::Object(doc)).map_err(|source| StoreError::Corrupt {
            path: format!("{guild}/{}/config", T::FEATURE_KEY),
            source,
        })?
    };
    typed.validate()?;
    Ok(typed)
}
