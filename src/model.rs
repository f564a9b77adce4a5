//! Provider-neutral descriptors of stored objects and containers
//!
//! Adapters build these from native SDK responses. Both are plain values:
//! construct them with named fields and `..Default::default()`.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use url::Url;

/// One stored object, addressed by `(bucket, key)`.
///
/// `content` is `None` for the metadata-only entries returned by listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Blob {
    pub key: String,
    pub bucket: String,
    pub content: Option<Bytes>,
    /// Size in bytes
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    /// Content-Encoding of the stored bytes
    pub encoding: Option<String>,
    /// Opaque entity tag; the format is provider specific
    pub etag: Option<String>,
    /// User-supplied metadata
    pub metadata: BTreeMap<String, String>,
    /// Informational locator (`s3://`, `gs://` or the Azure blob URL)
    pub uri: Option<Url>,
    pub expires: Option<DateTime<Utc>>,
}

impl Blob {
    /// A blob ready for upload under `key`.
    pub fn new(key: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            key: key.into(),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_expires(mut self, expires: DateTime<Utc>) -> Self {
        self.expires = Some(expires);
        self
    }

    /// Bytes to upload; empty when no content was supplied.
    pub fn content_or_empty(&self) -> Bytes {
        self.content.clone().unwrap_or_default()
    }
}

/// A top-level named container (S3 bucket, Azure container, GCS bucket).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bucket {
    pub name: String,
    pub uri: Option<Url>,
    pub creation_date: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_blob_new_sets_key_and_content() {
        let blob = Blob::new("reports/q1.csv", "a,b,c")
            .with_encoding("gzip")
            .with_metadata("owner", "finance");

        assert_eq!(blob.key, "reports/q1.csv");
        assert_eq!(blob.content.as_deref(), Some(&b"a,b,c"[..]));
        assert_eq!(blob.encoding.as_deref(), Some("gzip"));
        assert_eq!(blob.metadata.get("owner").map(String::as_str), Some("finance"));
        assert!(blob.etag.is_none());
    }

    #[test]
    fn test_content_or_empty() {
        let blob = Blob {
            key: "empty".into(),
            ..Default::default()
        };
        assert!(blob.content_or_empty().is_empty());
    }

    #[test]
    fn test_metadata_order_is_irrelevant() {
        let a = Blob::new("k", "v").with_metadata("x", "1").with_metadata("y", "2");
        let b = Blob::new("k", "v").with_metadata("y", "2").with_metadata("x", "1");
        assert_eq!(a, b);

        let set: HashSet<Blob> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_bucket_new() {
        let bucket = Bucket::new("logs");
        assert_eq!(bucket.name, "logs");
        assert!(bucket.uri.is_none());
    }
}
