//! In-memory object store
//!
//! Keeps buckets in process memory. Supports paging, artificial latency,
//! fault injection and in-flight tracking so the engine can be exercised
//! without a network.

use super::{ListPage, ListedObject, ObjectStore, PutRequest, StoreResult};
use crate::config::ObjectParams;
use crate::error::{StoreError, StoreErrorKind};
use crate::hash::md5_bytes;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Default listing page size (matches S3)
const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object held by [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Body bytes
    pub body: Vec<u8>,
    /// Size reported by listings
    pub size: u64,
    /// ETag reported by listings
    pub etag: String,
    /// Parameters the object was uploaded with
    pub params: ObjectParams,
}

#[derive(Debug)]
struct InjectedFailure {
    error: StoreError,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct MemoryState {
    buckets: HashMap<String, BTreeMap<String, StoredObject>>,
    failures: HashMap<String, InjectedFailure>,
    list_failure: Option<StoreError>,
}

/// Object store backed by process memory
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    page_size: usize,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    list_calls: AtomicUsize,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    /// Limit listing pages to `size` objects
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    /// Delay every put and delete by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Seed an object with the given body
    pub fn insert(&self, bucket: &str, key: &str, body: &[u8]) {
        let object = StoredObject {
            body: body.to_vec(),
            size: body.len() as u64,
            etag: format!("\"{}\"", md5_bytes(body)),
            params: ObjectParams::default(),
        };
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    /// Seed an object with an explicit size and ETag (e.g. multipart)
    pub fn insert_with_etag(&self, bucket: &str, key: &str, size: u64, etag: &str) {
        let object = StoredObject {
            body: Vec::new(),
            size,
            etag: etag.to_string(),
            params: ObjectParams::default(),
        };
        self.lock()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), object);
    }

    /// Make every put/delete of `key` fail with `error`
    pub fn fail_key(&self, key: &str, error: StoreError) {
        self.lock().failures.insert(
            key.to_string(),
            InjectedFailure {
                error,
                remaining: None,
            },
        );
    }

    /// Make the next `times` puts/deletes of `key` fail with `error`
    pub fn fail_key_times(&self, key: &str, error: StoreError, times: u32) {
        self.lock().failures.insert(
            key.to_string(),
            InjectedFailure {
                error,
                remaining: Some(times),
            },
        );
    }

    /// Make every listing call fail with `error`
    pub fn fail_listing(&self, error: StoreError) {
        self.lock().list_failure = Some(error);
    }

    /// Keys currently stored in `bucket`, sorted
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock()
            .buckets
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Fetch a stored object
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key).cloned())
    }

    /// Highest number of concurrent put/delete calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Number of listing calls made
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of put calls made
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of delete calls made
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, key: &str) -> Option<StoreError> {
        let mut state = self.lock();
        let failure = state.failures.get_mut(key)?;
        let error = failure.error.clone();

        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                state.failures.remove(key);
            }
        }

        Some(error)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> StoreResult<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let state = self.lock();
        if let Some(error) = &state.list_failure {
            return Err(error.clone());
        }

        let Some(objects) = state.buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        let mut page: Vec<ListedObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| match &continuation {
                Some(after) => key.as_str() > after.as_str(),
                None => true,
            })
            .take(self.page_size + 1)
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                size: object.size,
                etag: Some(object.etag.clone()),
            })
            .collect();

        let next_token = if page.len() > self.page_size {
            page.truncate(self.page_size);
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_token,
        })
    }

    async fn put_object(&self, request: &PutRequest) -> StoreResult<u64> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.take_failure(&request.key) {
            return Err(error);
        }

        let body = tokio::fs::read(&request.local_path).await.map_err(|e| {
            StoreError::new(
                StoreErrorKind::LocalIo,
                format!("failed to read {}: {}", request.local_path.display(), e),
            )
        })?;

        let size = body.len() as u64;
        let object = StoredObject {
            etag: format!("\"{}\"", md5_bytes(&body)),
            size,
            body,
            params: request.params.clone(),
        };

        self.lock()
            .buckets
            .entry(request.bucket.clone())
            .or_default()
            .insert(request.key.clone(), object);

        Ok(size)
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> StoreResult<()> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self.take_failure(key) {
            return Err(error);
        }

        if let Some(objects) = self.lock().buckets.get_mut(bucket) {
            objects.remove(key);
        }
        Ok(())
    }
}
