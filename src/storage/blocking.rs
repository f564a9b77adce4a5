//! Blocking flavor of every adapter
//!
//! Each call is submitted to a process-wide multi-thread Tokio runtime and
//! the calling thread waits on a channel for the result, which works both
//! from plain threads and from inside another runtime.

use bytes::Bytes;
use chrono::Duration;
use once_cell::sync::OnceCell;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{mpsc, Arc};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;
use url::Url;

use super::{BlobStorageAsyncClient, BlobStorageSyncClient};
use crate::config::Provider;
use crate::errors::{Error, Result};
use crate::model::{Blob, Bucket};

static RUNTIME: OnceCell<Runtime> = OnceCell::new();

fn global_runtime() -> Result<&'static Runtime> {
    RUNTIME.get_or_try_init(|| {
        debug!("Creating blocking bridge runtime");
        Builder::new_multi_thread()
            .enable_all()
            .thread_name("ubsa-blocking")
            .build()
            .map_err(|e| Error::Runtime(format!("failed to build runtime: {}", e)))
    })
}

/// Run `fut` on the shared runtime and block the current thread until it completes.
pub(crate) fn run_blocking<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let runtime = global_runtime()?;
    let (tx, rx) = mpsc::sync_channel(1);
    runtime.spawn(async move {
        let _ = tx.send(fut.await);
    });
    rx.recv()
        .map_err(|_| Error::Runtime("storage task terminated before completing".to_string()))?
}

/// Blocking client over any async adapter.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<dyn BlobStorageAsyncClient>,
}

impl BlockingClient {
    pub fn new(inner: Arc<dyn BlobStorageAsyncClient>) -> Self {
        Self { inner }
    }

    /// The async adapter this client drives
    pub fn as_async(&self) -> Arc<dyn BlobStorageAsyncClient> {
        Arc::clone(&self.inner)
    }
}

impl BlobStorageSyncClient for BlockingClient {
    fn provider(&self) -> Provider {
        self.inner.provider()
    }

    fn native_client(&self) -> &(dyn Any + Send + Sync) {
        self.inner.native_client()
    }

    fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        let inner = self.as_async();
        let bucket = bucket.to_owned();
        run_blocking(async move { inner.bucket_exists(&bucket).await })
    }

    fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob> {
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        run_blocking(async move { inner.get_blob(&bucket, &key).await })
    }

    fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let inner = self.as_async();
        let bucket = bucket.to_owned();
        run_blocking(async move { inner.delete_bucket(&bucket).await })
    }

    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        run_blocking(async move { inner.blob_exists(&bucket, &key).await })
    }

    fn create_blob(&self, bucket: &str, blob: &Blob) -> Result<String> {
        let inner = self.as_async();
        let (bucket, blob) = (bucket.to_owned(), blob.clone());
        run_blocking(async move { inner.create_blob(&bucket, &blob).await })
    }

    fn delete_blob(&self, bucket: &str, key: &str) -> Result<()> {
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        run_blocking(async move { inner.delete_blob(&bucket, &key).await })
    }

    fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<String> {
        let inner = self.as_async();
        let (source_bucket, source_key) = (source_bucket.to_owned(), source_key.to_owned());
        let (destination_bucket, destination_key) =
            (destination_bucket.to_owned(), destination_key.to_owned());
        run_blocking(async move {
            inner
                .copy_blob(&source_bucket, &source_key, &destination_bucket, &destination_key)
                .await
        })
    }

    fn list_all_buckets(&self) -> Result<HashSet<Bucket>> {
        let inner = self.as_async();
        run_blocking(async move { inner.list_all_buckets().await })
    }

    fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>> {
        let inner = self.as_async();
        let (bucket, prefix) = (bucket.to_owned(), prefix.to_owned());
        run_blocking(async move { inner.list_blobs_by_prefix(&bucket, &prefix).await })
    }

    fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        let inner = self.as_async();
        let bucket = bucket.clone();
        run_blocking(async move { inner.create_bucket(&bucket).await })
    }

    fn get_all_blobs_in_bucket(&self, bucket: &str) -> Result<HashSet<Blob>> {
        let inner = self.as_async();
        let bucket = bucket.to_owned();
        run_blocking(async move { inner.get_all_blobs_in_bucket(&bucket).await })
    }

    fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()> {
        let inner = self.as_async();
        let bucket = bucket.to_owned();
        run_blocking(async move { inner.delete_bucket_if_exists(&bucket).await })
    }

    fn get_byte_range(
        &self,
        bucket: &str,
        key: &str,
        start_inclusive: i64,
        end_inclusive: i64,
    ) -> Result<Bytes> {
        super::validate_range(start_inclusive, end_inclusive)?;
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        run_blocking(async move {
            inner
                .get_byte_range(&bucket, &key, start_inclusive, end_inclusive)
                .await
        })
    }

    fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String> {
        let inner = self.as_async();
        let (bucket, blob) = (bucket.to_owned(), blob.clone());
        run_blocking(async move { inner.create_blob_if_not_exists(&bucket, &blob).await })
    }

    fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url> {
        super::validate_expiry(expiry)?;
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        run_blocking(async move { inner.generate_get_url(&bucket, &key, expiry).await })
    }

    fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url> {
        super::validate_expiry(expiry)?;
        let inner = self.as_async();
        let (bucket, key) = (bucket.to_owned(), key.to_owned());
        let content_type = content_type.map(str::to_owned);
        run_blocking(async move {
            inner
                .generate_put_url(&bucket, &key, expiry, content_type.as_deref())
                .await
        })
    }
}
