//! Storage adapter abstraction layer
//!
//! Provides a unified interface over the native AWS S3, Azure Blob Storage
//! and Google Cloud Storage SDK clients. Each provider has one async adapter;
//! the blocking flavor of every adapter is [`BlockingClient`], which drives
//! the async adapter on a shared runtime.

#[cfg(feature = "aws")]
pub(crate) mod aws;
#[cfg(feature = "azure")]
pub(crate) mod azure;
mod blocking;
#[cfg(feature = "gcp")]
pub(crate) mod gcp;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::any::Any;
use std::collections::HashSet;
use url::Url;

use crate::config::Provider;
use crate::errors::{Error, Result};
use crate::model::{Blob, Bucket};

#[cfg(feature = "aws")]
pub use aws::AwsAdapter;
#[cfg(feature = "azure")]
pub use azure::AzureAdapter;
pub use blocking::BlockingClient;
pub(crate) use blocking::run_blocking;
#[cfg(feature = "gcp")]
pub use gcp::GcpAdapter;

/// Non-blocking storage operations.
///
/// Every operation completes on the runtime of the awaiting task. Not-found
/// is reported as `false` by the existence checks and swallowed by
/// [`delete_bucket_if_exists`](Self::delete_bucket_if_exists); every other
/// operation propagates it as an [`Error::Storage`].
#[async_trait]
pub trait BlobStorageAsyncClient: Send + Sync {
    /// Provider of the wrapped native client
    fn provider(&self) -> Provider;

    /// The wrapped native client, for [`unwrap`](dyn BlobStorageAsyncClient::unwrap)
    fn native_client(&self) -> &(dyn Any + Send + Sync);

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Fetch content and metadata of one object
    async fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob>;

    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    async fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool>;

    /// Upload `blob` and return the resulting etag
    async fn create_blob(&self, bucket: &str, blob: &Blob) -> Result<String>;

    async fn delete_blob(&self, bucket: &str, key: &str) -> Result<()>;

    /// Server-side copy; returns the destination etag
    async fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<String>;

    async fn list_all_buckets(&self) -> Result<HashSet<Bucket>>;

    /// Metadata-only listing; a blank prefix lists the whole bucket
    async fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>>;

    async fn create_bucket(&self, bucket: &Bucket) -> Result<()>;

    async fn get_all_blobs_in_bucket(&self, bucket: &str) -> Result<HashSet<Blob>> {
        self.list_blobs_by_prefix(bucket, "").await
    }

    async fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()>;

    /// Read the inclusive byte span `[start_inclusive, end_inclusive]`
    async fn get_byte_range(
        &self,
        bucket: &str,
        key: &str,
        start_inclusive: i64,
        end_inclusive: i64,
    ) -> Result<Bytes>;

    /// Return the existing etag if the object is present, else upload it.
    ///
    /// The existence check and the upload are two calls; a concurrent writer can slip
    /// in between them.
    async fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String>;

    async fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url>;

    async fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url>;
}

impl dyn BlobStorageAsyncClient {
    /// The native client as `T`, or `None` if it is not a `T`.
    pub fn unwrap<T: Any>(&self) -> Option<&T> {
        self.native_client().downcast_ref::<T>()
    }
}

/// Blocking storage operations, with the same semantics as
/// [`BlobStorageAsyncClient`].
pub trait BlobStorageSyncClient: Send + Sync {
    fn provider(&self) -> Provider;

    fn native_client(&self) -> &(dyn Any + Send + Sync);

    fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob>;

    fn delete_bucket(&self, bucket: &str) -> Result<()>;

    fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool>;

    fn create_blob(&self, bucket: &str, blob: &Blob) -> Result<String>;

    fn delete_blob(&self, bucket: &str, key: &str) -> Result<()>;

    fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<String>;

    fn list_all_buckets(&self) -> Result<HashSet<Bucket>>;

    fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>>;

    fn create_bucket(&self, bucket: &Bucket) -> Result<()>;

    fn get_all_blobs_in_bucket(&self, bucket: &str) -> Result<HashSet<Blob>> {
        self.list_blobs_by_prefix(bucket, "")
    }

    fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()>;

    fn get_byte_range(
        &self,
        bucket: &str,
        key: &str,
        start_inclusive: i64,
        end_inclusive: i64,
    ) -> Result<Bytes>;

    fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String>;

    fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url>;

    fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url>;
}

impl dyn BlobStorageSyncClient {
    /// The native client as `T`, or `None` if it is not a `T`.
    pub fn unwrap<T: Any>(&self) -> Option<&T> {
        self.native_client().downcast_ref::<T>()
    }
}

pub(crate) fn validate_range(start_inclusive: i64, end_inclusive: i64) -> Result<()> {
    if start_inclusive < 0 || end_inclusive < start_inclusive {
        return Err(Error::InvalidArgument(format!(
            "Invalid range {}-{}: start must be >= 0 and end must be >= start",
            start_inclusive, end_inclusive
        )));
    }
    Ok(())
}

pub(crate) fn validate_expiry(expiry: Duration) -> Result<std::time::Duration> {
    if expiry <= Duration::zero() {
        return Err(Error::InvalidArgument(
            "Expiry must be a positive duration.".to_string(),
        ));
    }
    expiry
        .to_std()
        .map_err(|e| Error::InvalidArgument(format!("Invalid expiry {}: {}", expiry, e)))
}

pub(crate) fn validate_key(blob: &Blob) -> Result<()> {
    if blob.key.is_empty() {
        return Err(Error::InvalidArgument("Blob key must not be empty.".to_string()));
    }
    Ok(())
}

/// `None` for a blank prefix
pub(crate) fn normalize_prefix(prefix: &str) -> Option<&str> {
    if prefix.trim().is_empty() {
        None
    } else {
        Some(prefix)
    }
}

/// `scheme://bucket[/key]`
pub(crate) fn locator(scheme: &str, bucket: &str, key: Option<&str>) -> Option<Url> {
    let uri = match key {
        Some(key) if !key.trim().is_empty() => format!("{}://{}/{}", scheme, bucket, key),
        _ => format!("{}://{}", scheme, bucket),
    };
    Url::parse(&uri).ok()
}

/// Azure and GCS report times as `time::OffsetDateTime`
#[cfg(any(feature = "azure", feature = "gcp"))]
pub(crate) fn from_offset_date_time(t: time::OffsetDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(t.unix_timestamp(), t.nanosecond()).single()
}

/// Instant `expiry` from now. Fails with `InvalidArgument` on a
/// non-positive expiry or one past the representable range.
#[cfg(feature = "azure")]
pub(crate) fn expires_at(expiry: Duration) -> Result<time::OffsetDateTime> {
    validate_expiry(expiry)?;
    let at = Utc::now().checked_add_signed(expiry).ok_or_else(|| {
        Error::InvalidArgument(format!("Expiry {} is out of range.", expiry))
    })?;
    time::OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| Error::InvalidArgument(format!("Invalid expiry {}: {}", expiry, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_range() {
        assert!(validate_range(0, 0).is_ok());
        assert!(validate_range(0, 4).is_ok());
        assert!(matches!(validate_range(-1, 4), Err(Error::InvalidArgument(_))));
        assert!(matches!(validate_range(5, 4), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_validate_expiry() {
        assert_eq!(
            validate_expiry(Duration::seconds(90)).unwrap(),
            std::time::Duration::from_secs(90)
        );
        assert!(matches!(validate_expiry(Duration::zero()), Err(Error::InvalidArgument(_))));
        assert!(matches!(
            validate_expiry(Duration::seconds(-5)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key(&Blob::new("k", "v")).is_ok());
        assert!(validate_key(&Blob::default()).is_err());
    }

    #[test]
    fn test_normalize_prefix() {
        assert_eq!(normalize_prefix(""), None);
        assert_eq!(normalize_prefix("   "), None);
        assert_eq!(normalize_prefix("logs/"), Some("logs/"));
    }

    #[test]
    fn test_locator() {
        assert_eq!(
            locator("s3", "bkt", Some("a/b.txt")).unwrap().as_str(),
            "s3://bkt/a/b.txt"
        );
        assert_eq!(locator("gs", "bkt", None).unwrap().as_str(), "gs://bkt");
        assert_eq!(locator("gs", "bkt", Some(" ")).unwrap().as_str(), "gs://bkt");
    }

    #[cfg(any(feature = "azure", feature = "gcp"))]
    #[test]
    fn test_offset_date_time_conversion() {
        let t = time::OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let converted = from_offset_date_time(t).unwrap();
        assert_eq!(converted.timestamp(), 1_700_000_000);
    }

    #[cfg(feature = "azure")]
    #[test]
    fn test_expires_at_rejects_out_of_range() {
        let soon = expires_at(Duration::minutes(5)).unwrap();
        assert!(soon > time::OffsetDateTime::now_utc());

        for expiry in [
            Duration::zero(),
            Duration::days(100_000_000),
            Duration::seconds(i64::MAX / 1000),
        ] {
            assert!(matches!(expires_at(expiry), Err(Error::InvalidArgument(_))));
        }
    }
}
