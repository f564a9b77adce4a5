//! Azure Blob Storage adapter
//!
//! Wraps an `azure_storage_blobs` service client. Containers play the role
//! of buckets. Copies are server-side `copy_from_url` calls authorized with
//! a short-lived read SAS on the source, and presigned URLs are blob SAS URLs
//! signed by the account key the client was built with.

use async_trait::async_trait;
use azure_core::request_options::Metadata;
use azure_core::StatusCode;
use azure_storage::shared_access_signature::service_sas::BlobSasPermissions;
use azure_storage_blobs::prelude::{BlobClient, BlobContentEncoding, BlobServiceClient};
use bytes::{Bytes, BytesMut};
use chrono::Duration;
use futures::StreamExt;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument, warn};
use url::Url;

use super::{
    expires_at, from_offset_date_time, normalize_prefix, validate_key,
    validate_range, BlobStorageAsyncClient,
};
use crate::config::Provider;
use crate::errors::{Error, Result, UbsaError};
use crate::metrics::track;
use crate::model::{Blob, Bucket};

const NOT_FOUND_CODES: &[&str] = &["BlobNotFound", "ContainerNotFound", "ResourceNotFound"];

/// Lifetime of the read SAS handed to the service for server-side copies
const COPY_SOURCE_SAS_MINUTES: i64 = 15;

/// Azure Blob Storage adapter
#[derive(Debug, Clone)]
pub struct AzureAdapter {
    client: BlobServiceClient,
}

impl AzureAdapter {
    pub fn new(client: BlobServiceClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &BlobServiceClient {
        &self.client
    }

    fn blob_client(&self, container: &str, blob: &str) -> BlobClient {
        self.client.container_client(container).blob_client(blob)
    }

    async fn upload(&self, container: &str, blob: &Blob) -> Result<String> {
        let client = self.blob_client(container, &blob.key);
        let mut request = client.put_block_blob(blob.content_or_empty());

        if let Some(encoding) = &blob.encoding {
            request = request.content_encoding(BlobContentEncoding::from(encoding.clone()));
        }
        if !blob.metadata.is_empty() {
            let mut metadata = Metadata::new();
            for (key, value) in &blob.metadata {
                metadata.insert(key.clone(), value.clone());
            }
            request = request.metadata(metadata);
        }
        if blob.expires.is_some() {
            debug!(key = %blob.key, "Azure block blobs carry no expiry on upload, ignoring");
        }

        let response = request.await.map_err(|e| {
            wrap(
                format!(
                    "Failed to create Azure blob {} in container {}",
                    blob.key, container
                ),
                e,
            )
        })?;
        Ok(response.etag.to_string())
    }

    /// SAS URL for `client`, valid until `expires_at`.
    async fn signed_url(
        client: &BlobClient,
        permissions: BlobSasPermissions,
        expires_at: time::OffsetDateTime,
    ) -> azure_core::Result<Url> {
        let sas = client.shared_access_signature(permissions, expires_at).await?;
        client.generate_signed_blob_url(&sas)
    }
}

#[async_trait]
impl BlobStorageAsyncClient for AzureAdapter {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    fn native_client(&self) -> &(dyn Any + Send + Sync) {
        &self.client
    }

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        track(Provider::Azure, "bucket_exists", async {
            self.client
                .container_client(bucket)
                .exists()
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to check whether Azure container exists: {}", bucket),
                        e,
                    )
                })
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob> {
        track(Provider::Azure, "get_blob", async {
            let message = || format!("Failed to get Azure blob {} from container {}", key, bucket);
            let client = self.blob_client(bucket, key);

            let properties = client
                .get_properties()
                .await
                .map_err(|e| wrap(message(), e))?;
            let content = client.get_content().await.map_err(|e| wrap(message(), e))?;

            let native = properties.blob;
            let metadata: BTreeMap<String, String> =
                native.metadata.unwrap_or_default().into_iter().collect();
            debug!(bucket, key, size = content.len(), "downloaded Azure blob");

            Ok(Blob {
                key: key.to_owned(),
                bucket: bucket.to_owned(),
                size: content.len() as u64,
                content: Some(Bytes::from(content)),
                last_modified: from_offset_date_time(native.properties.last_modified),
                encoding: native.properties.content_encoding,
                etag: Some(native.properties.etag.to_string()),
                metadata,
                uri: client.url().ok(),
                expires: native.properties.expiry_time.and_then(from_offset_date_time),
            })
        })
        .await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        track(Provider::Azure, "delete_bucket", async {
            self.client
                .container_client(bucket)
                .delete()
                .await
                .map_err(|e| wrap(format!("Failed to delete Azure container: {}", bucket), e))?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        track(Provider::Azure, "blob_exists", async {
            self.blob_client(bucket, key).exists().await.map_err(|e| {
                wrap(
                    format!(
                        "Failed to check whether Azure blob exists: {}/{}",
                        bucket, key
                    ),
                    e,
                )
            })
        })
        .await
    }

    #[instrument(skip(self, blob), fields(key = %blob.key))]
    async fn create_blob(&self, bucket: &str, blob: &Blob) -> Result<String> {
        validate_key(blob)?;
        track(Provider::Azure, "create_blob", self.upload(bucket, blob)).await
    }

    async fn delete_blob(&self, bucket: &str, key: &str) -> Result<()> {
        track(Provider::Azure, "delete_blob", async {
            self.blob_client(bucket, key)
                .delete()
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to delete Azure blob {} from container {}", key, bucket),
                        e,
                    )
                })?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn copy_blob(
        &self,
        source_bucket: &str,
        source_key: &str,
        destination_bucket: &str,
        destination_key: &str,
    ) -> Result<String> {
        track(Provider::Azure, "copy_blob", async {
            let message = || {
                format!(
                    "Failed to copy Azure blob from {}/{} to {}/{}",
                    source_bucket, source_key, destination_bucket, destination_key
                )
            };
            let source = self.blob_client(source_bucket, source_key);
            let source_url = match Self::signed_url(
                &source,
                BlobSasPermissions {
                    read: true,
                    ..Default::default()
                },
                expires_at(Duration::minutes(COPY_SOURCE_SAS_MINUTES))?,
            )
            .await
            {
                Ok(url) => url,
                Err(e) => {
                    // Clients without an account key cannot sign; the source
                    // must then be readable by the destination as-is.
                    warn!(error = %e, "could not sign copy source, using its plain URL");
                    source.url().map_err(|e| wrap(message(), e))?
                }
            };

            let destination = self.blob_client(destination_bucket, destination_key);
            destination
                .copy_from_url(source_url)
                .await
                .map_err(|e| wrap(message(), e))?;

            let properties = destination
                .get_properties()
                .await
                .map_err(|e| wrap(message(), e))?;
            Ok(properties.blob.properties.etag.to_string())
        })
        .await
    }

    async fn list_all_buckets(&self) -> Result<HashSet<Bucket>> {
        track(Provider::Azure, "list_all_buckets", async {
            let mut buckets = HashSet::new();
            let mut pages = self.client.list_containers().into_stream();

            while let Some(page) = pages.next().await {
                let page =
                    page.map_err(|e| wrap("Failed to list Azure containers".to_string(), e))?;
                for container in page.containers {
                    // the listing exposes no creation time
                    let modified = from_offset_date_time(container.last_modified);
                    buckets.insert(Bucket {
                        uri: self.client.container_client(&container.name).url().ok(),
                        name: container.name,
                        creation_date: modified,
                        last_modified: modified,
                    });
                }
            }

            debug!(count = buckets.len(), "listed Azure containers");
            Ok(buckets)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>> {
        track(Provider::Azure, "list_blobs_by_prefix", async {
            let container = self.client.container_client(bucket);
            let mut request = container.list_blobs();
            if let Some(prefix) = normalize_prefix(prefix) {
                request = request.prefix(prefix.to_owned());
            }

            let mut blobs = HashSet::new();
            let mut pages = request.into_stream();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| {
                    wrap(format!("Failed to list Azure blobs in container {}", bucket), e)
                })?;
                for item in page.blobs.blobs() {
                    blobs.insert(Blob {
                        key: item.name.clone(),
                        bucket: bucket.to_owned(),
                        size: item.properties.content_length,
                        last_modified: from_offset_date_time(item.properties.last_modified),
                        encoding: item.properties.content_encoding.clone(),
                        etag: Some(item.properties.etag.to_string()),
                        expires: item.properties.expiry_time.and_then(from_offset_date_time),
                        metadata: item
                            .metadata
                            .clone()
                            .unwrap_or_default()
                            .into_iter()
                            .collect(),
                        uri: container.blob_client(&item.name).url().ok(),
                        ..Default::default()
                    });
                }
            }

            Ok(blobs)
        })
        .await
    }

    async fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        track(Provider::Azure, "create_bucket", async {
            self.client
                .container_client(&bucket.name)
                .create()
                .await
                .map_err(|e| {
                    wrap(format!("Failed to create Azure container {}", bucket.name), e)
                })?;
            Ok(())
        })
        .await
    }

    async fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()> {
        track(Provider::Azure, "delete_bucket_if_exists", async {
            match self.client.container_client(bucket).delete().await {
                Ok(_) => Ok(()),
                Err(e) if is_not_found(&e) => {
                    debug!(bucket, "Azure container already absent");
                    Ok(())
                }
                Err(e) => Err(wrap(
                    format!("Failed to delete Azure container if exists: {}", bucket),
                    e,
                )),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_byte_range(
        &self,
        bucket: &str,
        key: &str,
        start_inclusive: i64,
        end_inclusive: i64,
    ) -> Result<Bytes> {
        validate_range(start_inclusive, end_inclusive)?;
        track(Provider::Azure, "get_byte_range", async {
            let message = || {
                format!(
                    "Failed to read byte range from Azure blob {}/{}",
                    bucket, key
                )
            };
            let range = start_inclusive as u64..end_inclusive as u64 + 1;
            let mut chunks = self.blob_client(bucket, key).get().range(range).into_stream();

            let mut buffer = BytesMut::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.map_err(|e| wrap(message(), e))?;
                let data = chunk.data.collect().await.map_err(|e| wrap(message(), e))?;
                buffer.extend_from_slice(&data);
            }
            Ok(buffer.freeze())
        })
        .await
    }

    #[instrument(skip(self, blob), fields(key = %blob.key))]
    async fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String> {
        validate_key(blob)?;
        track(Provider::Azure, "create_blob_if_not_exists", async {
            match self.blob_client(bucket, &blob.key).get_properties().await {
                Ok(existing) => {
                    debug!(bucket, key = %blob.key, "Azure blob exists, skipping upload");
                    Ok(existing.blob.properties.etag.to_string())
                }
                Err(e) if is_not_found(&e) => self.upload(bucket, blob).await,
                Err(e) => Err(wrap(
                    format!(
                        "Failed to create Azure blob if not exists: {}/{}",
                        bucket, blob.key
                    ),
                    e,
                )),
            }
        })
        .await
    }

    async fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url> {
        let deadline = expires_at(expiry)?;
        track(Provider::Azure, "generate_get_url", async {
            let permissions = BlobSasPermissions {
                read: true,
                ..Default::default()
            };
            Self::signed_url(&self.blob_client(bucket, key), permissions, deadline)
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to generate Azure GET URL for {}/{}", bucket, key),
                        e,
                    )
                })
        })
        .await
    }

    /// The content type is not part of a blob SAS and is ignored here.
    async fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        _content_type: Option<&str>,
    ) -> Result<Url> {
        let deadline = expires_at(expiry)?;
        track(Provider::Azure, "generate_put_url", async {
            let permissions = BlobSasPermissions {
                create: true,
                write: true,
                ..Default::default()
            };
            Self::signed_url(&self.blob_client(bucket, key), permissions, deadline)
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to generate Azure PUT URL for {}/{}", bucket, key),
                        e,
                    )
                })
        })
        .await
    }
}

pub(crate) fn is_not_found(error: &azure_core::Error) -> bool {
    match error.as_http_error() {
        Some(http) => {
            http.status() == StatusCode::NotFound
                || http
                    .error_code()
                    .map_or(false, |code| NOT_FOUND_CODES.contains(&code))
        }
        None => false,
    }
}

fn wrap(message: String, error: azure_core::Error) -> Error {
    UbsaError::new(message, error).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use azure_storage::{CloudLocation, StorageCredentials};
    use azure_storage_blobs::prelude::ClientBuilder;

    // Well-known Azurite development key
    const AZURITE_ACCOUNT: &str = "devstoreaccount1";
    const AZURITE_KEY: &str =
        "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

    fn adapter() -> AzureAdapter {
        let location = CloudLocation::Custom {
            account: AZURITE_ACCOUNT.to_string(),
            uri: format!("http://127.0.0.1:10000/{}", AZURITE_ACCOUNT),
        };
        let credentials = StorageCredentials::access_key(AZURITE_ACCOUNT, AZURITE_KEY);
        AzureAdapter::new(ClientBuilder::with_location(location, credentials).blob_service_client())
    }

    #[tokio::test]
    async fn test_get_url_carries_read_sas() {
        let url = adapter()
            .generate_get_url("reports", "q1.csv", Duration::hours(1))
            .await
            .unwrap();

        assert!(url.path().ends_with("/reports/q1.csv"));
        let query = url.query().unwrap_or_default();
        assert!(query.contains("sig="));
        assert!(query.contains("sp=r"));
    }

    #[tokio::test]
    async fn test_put_url_carries_create_and_write() {
        let url = adapter()
            .generate_put_url("reports", "q2.csv", Duration::minutes(5), Some("text/csv"))
            .await
            .unwrap();

        let permissions = url
            .query_pairs()
            .find(|(k, _)| k == "sp")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        assert!(permissions.contains('c'));
        assert!(permissions.contains('w'));
    }

    #[tokio::test]
    async fn test_presign_rejects_non_positive_expiry() {
        let err = adapter()
            .generate_get_url("reports", "q1.csv", Duration::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_presign_rejects_overflowing_expiry() {
        let adapter = adapter();
        let err = adapter
            .generate_get_url("reports", "q1.csv", Duration::days(100_000_000))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = adapter
            .generate_put_url("reports", "q1.csv", Duration::seconds(i64::MAX / 1000), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_non_http_error_is_not_not_found() {
        let error = azure_core::Error::new(azure_core::error::ErrorKind::Other, "boom");
        assert!(!is_not_found(&error));
    }
}
