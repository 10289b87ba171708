//! Document Store
//!
//! Opaque named documents (feature configuration, panel bindings, append-only
//! logs) persisted as JSON blobs through a [`BlobStore`].
//!
//! # Layout
//!
//! ```text
//! {guild}/{feature}/config      one object per (guild, feature)
//! {guild}/{feature}/panel       PanelRecord binding for the feature's panel
//! {guild}/{feature}/{date}      append-only array per date bucket
//! ```
//!
//! # Concurrency
//!
//! There is no locking, no version token and no compare-and-swap. Every
//! mutation is a whole-document read, modify, write. Two writers racing on the
//! same document produce last-write-wins on the *whole* document, so a field
//! written by one can be silently dropped by the other. Edits are infrequent
//! and admin-driven; the gap is kept rather than changing observable
//! behavior under contention.

mod blob;
mod document;
mod layout;
mod schema;

pub use blob::{BlobStore, FsBlobStore, MemoryBlobStore};
pub use document::{Document, DocumentStore};
pub use layout::{DateBucket, DocumentPath};
pub use schema::{decode_document, FeatureDocument};

use thiserror::Error;

/// Errors from the blob store or from decoding what it returned
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that failed
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Stored bytes are not valid JSON for the expected type
    #[error("document at {path} is corrupt: {source}")]
    Corrupt {
        /// Path of the document
        path: String,
        /// Decode error
        #[source]
        source: serde_json::Error,
    },

    /// Stored JSON has the wrong top-level shape
    #[error("document at {path} has unexpected shape: expected {expected}")]
    Shape {
        /// Path of the document
        path: String,
        /// What was expected ("object", "array")
        expected: &'static str,
    },

    /// Encoding a document failed
    #[error("failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),

    /// A path segment is empty or tries to escape its directory
    #[error("invalid document path: {0}")]
    InvalidPath(String),

    /// The backing service reported a failure
    #[error("blob store backend failure: {0}")]
    Backend(String),
}
