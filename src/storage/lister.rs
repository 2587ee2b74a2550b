//! Remote prefix listing
//!
//! Follows continuation tokens until a listing is exhausted and indexes the
//! result by key relative to the prefix.

use super::{ListedObject, ObjectStore};
use crate::error::{Result, SyncError};
use std::collections::HashMap;

/// Metadata of one remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectMeta {
    /// Full object key
    pub key: String,
    /// Key with the listing prefix removed
    pub relative_key: String,
    /// Size in bytes
    pub size: u64,
    /// ETag as reported by the backend
    pub etag: Option<String>,
}

impl RemoteObjectMeta {
    fn from_listed(object: ListedObject, prefix: &str) -> Self {
        let relative_key = object
            .key
            .strip_prefix(prefix)
            .unwrap_or(&object.key)
            .to_string();

        Self {
            key: object.key,
            relative_key,
            size: object.size,
            etag: object.etag,
        }
    }
}

/// Complete listing of a prefix, in listing order
#[derive(Debug, Clone, Default)]
pub struct RemoteListing {
    objects: Vec<RemoteObjectMeta>,
    index: HashMap<String, usize>,
}

impl RemoteListing {
    /// Build a listing from already-converted objects
    pub fn from_objects(objects: Vec<RemoteObjectMeta>) -> Self {
        let index = objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.relative_key.clone(), i))
            .collect();
        Self { objects, index }
    }

    /// Look up an object by key relative to the prefix
    pub fn get(&self, relative_key: &str) -> Option<&RemoteObjectMeta> {
        self.index.get(relative_key).map(|&i| &self.objects[i])
    }

    /// Iterate in listing order
    pub fn iter(&self) -> impl Iterator<Item = &RemoteObjectMeta> {
        self.objects.iter()
    }

    /// Number of objects
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True when the prefix holds no objects
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Sum of object sizes
    pub fn total_size(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }

    /// Consume into objects in listing order
    pub fn into_objects(self) -> Vec<RemoteObjectMeta> {
        self.objects
    }
}

/// Lists a bucket prefix through an [`ObjectStore`]
pub struct RemoteLister<'a> {
    store: &'a dyn ObjectStore,
}

impl<'a> RemoteLister<'a> {
    /// Create a lister over `store`
    pub fn new(store: &'a dyn ObjectStore) -> Self {
        Self { store }
    }

    /// List every object under `prefix`
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<RemoteListing> {
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self
                .store
                .list_page(bucket, prefix, token.take())
                .await
                .map_err(|source| SyncError::RemoteListFailed {
                    bucket: bucket.to_string(),
                    prefix: prefix.to_string(),
                    source,
                })?;

            pages += 1;
            objects.extend(
                page.objects
                    .into_iter()
                    .map(|o| RemoteObjectMeta::from_listed(o, prefix)),
            );

            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            "Listed {} objects under s3://{}/{} in {} page(s)",
            objects.len(),
            bucket,
            prefix,
            pages
        );

        Ok(RemoteListing::from_objects(objects))
    }
}
