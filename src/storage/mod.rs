//! Object storage module
//!
//! Defines the [`ObjectStore`] seam the sync engine talks to, the native
//! AWS S3 backend, an in-memory backend, and the paginating remote lister.

mod lister;
mod memory;
mod s3;

pub use lister::*;
pub use memory::*;
pub use s3::*;

use crate::config::ObjectParams;
use crate::error::StoreError;
use async_trait::async_trait;
use std::path::PathBuf;

/// Result type for object store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One object as reported by a listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full object key
    pub key: String,
    /// Size in bytes
    pub size: u64,
    /// ETag as returned by the backend (usually quoted)
    pub etag: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page
    pub objects: Vec<ListedObject>,
    /// Token for the next page, `None` when exhausted
    pub next_token: Option<String>,
}

/// Upload request for a single object
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Destination bucket
    pub bucket: String,
    /// Destination key
    pub key: String,
    /// Local file providing the body
    pub local_path: PathBuf,
    /// Expected body length
    pub size: u64,
    /// Fully resolved parameters (ACL, headers, metadata)
    pub params: ObjectParams,
}

/// Minimal object storage operations needed for syncing
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects under `prefix`
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StoreResult<ListPage>;

    /// Upload a local file, returning the number of bytes sent
    async fn put_object(&self, request: &PutRequest) -> StoreResult<u64>;

    /// Delete a single object
    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()>;
}
