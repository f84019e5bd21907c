//! Headless-CMS port.
//!
//! The CMS is a typed document store read through a query-language string and
//! mutated by document id.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::DocumentId;

#[derive(Debug, Error)]
pub enum CmsError {
    #[error("CMS request failed: {0}")]
    Transport(String),

    #[error("CMS returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("CMS response could not be parsed: {0}")]
    InvalidResponse(String),

    #[error("CMS document must be an object with a '_type' field")]
    InvalidDocument,
}

#[async_trait]
pub trait CmsClient: Send + Sync {
    /// Runs a query with named parameters and returns its result
    /// (usually a list of documents, sometimes a scalar such as a count).
    async fn fetch(&self, query: &str, params: Value) -> Result<Value, CmsError>;

    /// Creates a document and returns it as stored.
    async fn create(&self, document: Value) -> Result<Value, CmsError>;

    /// Creates the document or replaces the existing one with the same `_id`.
    async fn create_or_replace(&self, document: Value) -> Result<Value, CmsError>;

    /// Sets `fields` on an existing document and returns it as stored.
    async fn patch(&self, id: &DocumentId, fields: Map<String, Value>) -> Result<Value, CmsError>;

    async fn delete(&self, id: &DocumentId) -> Result<(), CmsError>;
}
