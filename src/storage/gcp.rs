//! Google Cloud Storage adapter
//!
//! Wraps a `gcloud_storage` client. Bucket listing and creation are
//! project-scoped, so the adapter carries an optional project id, falling
//! back to `GOOGLE_CLOUD_PROJECT`. Presigned URLs are V4 signed URLs produced
//! with the credentials the client was authenticated with.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Duration;
use gcloud_storage::client::Client;
use gcloud_storage::http::buckets::delete::DeleteBucketRequest;
use gcloud_storage::http::buckets::get::GetBucketRequest;
use gcloud_storage::http::buckets::insert::{InsertBucketParam, InsertBucketRequest};
use gcloud_storage::http::buckets::list::ListBucketsRequest;
use gcloud_storage::http::objects::copy::CopyObjectRequest;
use gcloud_storage::http::objects::delete::DeleteObjectRequest;
use gcloud_storage::http::objects::download::Range;
use gcloud_storage::http::objects::get::GetObjectRequest;
use gcloud_storage::http::objects::list::ListObjectsRequest;
use gcloud_storage::http::objects::upload::{UploadObjectRequest, UploadType};
use gcloud_storage::http::objects::Object;
use gcloud_storage::sign::{SignedURLMethod, SignedURLOptions};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};
use url::Url;

use super::{
    from_offset_date_time, locator, normalize_prefix, validate_expiry, validate_key,
    validate_range, BlobStorageAsyncClient,
};
use crate::config::Provider;
use crate::errors::{Error, Result, UbsaError};
use crate::metrics::track;
use crate::model::{Blob, Bucket};

/// Environment variable consulted when no project id was supplied
pub const ENV_GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";

/// Google Cloud Storage adapter
#[derive(Clone)]
pub struct GcpAdapter {
    client: Client,
    project_id: Option<String>,
}

impl GcpAdapter {
    /// Adapter whose project id comes from `GOOGLE_CLOUD_PROJECT`, if set.
    pub fn new(client: Client) -> Self {
        let project_id = std::env::var(ENV_GOOGLE_CLOUD_PROJECT)
            .ok()
            .filter(|p| !p.trim().is_empty());
        Self { client, project_id }
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    fn require_project(&self) -> Result<&str> {
        self.project_id.as_deref().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "A GCP project id is required; call with_project_id or set {}",
                ENV_GOOGLE_CLOUD_PROJECT
            ))
        })
    }

    async fn upload(&self, bucket: &str, blob: &Blob) -> Result<String> {
        let metadata = (!blob.metadata.is_empty()).then(|| {
            blob.metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
        let object = Object {
            name: blob.key.clone(),
            content_encoding: blob
                .encoding
                .clone()
                .filter(|encoding| !encoding.trim().is_empty()),
            metadata,
            ..Default::default()
        };
        if blob.expires.is_some() {
            debug!(key = %blob.key, "GCS objects carry no expiry, ignoring");
        }

        let created = self
            .client
            .upload_object(
                &UploadObjectRequest {
                    bucket: bucket.to_owned(),
                    ..Default::default()
                },
                blob.content_or_empty(),
                &UploadType::Multipart(Box::new(object)),
            )
            .await
            .map_err(|e| {
                wrap(
                    format!("Failed to create GCP blob gs://{}/{}", bucket, blob.key),
                    e,
                )
            })?;
        Ok(created.etag)
    }

    async fn sign(
        &self,
        bucket: &str,
        key: &str,
        method: SignedURLMethod,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url> {
        let expires = validate_expiry(expiry)?;
        let options = SignedURLOptions {
            method,
            expires,
            content_type: content_type
                .filter(|ct| !ct.trim().is_empty())
                .map(str::to_owned),
            ..Default::default()
        };
        let signed = self
            .client
            .signed_url(bucket, key, None, None, options)
            .await
            .map_err(|e| {
                Error::from(UbsaError::new(
                    format!("Failed to generate GCP signed URL for gs://{}/{}", bucket, key),
                    e,
                ))
            })?;
        Ok(Url::parse(&signed)?)
    }
}

impl std::fmt::Debug for GcpAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpAdapter")
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BlobStorageAsyncClient for GcpAdapter {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    fn native_client(&self) -> &(dyn Any + Send + Sync) {
        &self.client
    }

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        track(Provider::Gcp, "bucket_exists", async {
            let request = GetBucketRequest {
                bucket: bucket.to_owned(),
                ..Default::default()
            };
            match self.client.get_bucket(&request).await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(wrap(
                    format!("Failed to check whether GCP bucket exists: {}", bucket),
                    e,
                )),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob> {
        track(Provider::Gcp, "get_blob", async {
            let message = || format!("Failed to get GCP blob gs://{}/{}", bucket, key);
            let request = GetObjectRequest {
                bucket: bucket.to_owned(),
                object: key.to_owned(),
                ..Default::default()
            };

            let object = self
                .client
                .get_object(&request)
                .await
                .map_err(|e| wrap(message(), e))?;
            let content = self
                .client
                .download_object(&request, &Range::default())
                .await
                .map_err(|e| wrap(message(), e))?;
            debug!(bucket, key, size = content.len(), "downloaded GCP blob");

            let mut blob = to_blob(bucket, object);
            blob.content = Some(Bytes::from(content));
            Ok(blob)
        })
        .await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        track(Provider::Gcp, "delete_bucket", async {
            let request = DeleteBucketRequest {
                bucket: bucket.to_owned(),
                ..Default::default()
            };
            self.client
                .delete_bucket(&request)
                .await
                .map_err(|e| wrap(format!("Failed to delete GCP bucket: {}", bucket), e))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        track(Provider::Gcp, "blob_exists", async {
            let request = GetObjectRequest {
                bucket: bucket.to_owned(),
                object: key.to_owned(),
                ..Default::default()
            };
            match self.client.get_object(&request).await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(wrap(
                    format!(
                        "Failed to check whether GCP blob exists: gs://{}/{}",
                        bucket, key
                    ),
                    e,
                )),
            }
        })
        .await
    }

    #[instrument(skip(self, blob), fields(key = %blob.key))]
    async fn create_blob(&self, bucket: &str, blob: &Blob) -> Result<String> {
        validate_key(blob)?;
        track(Provider::Gcp, "create_blob", self.upload(bucket, blob)).await
    }

    async fn delete_blob(&self, bucket: &str, key: &str) -> Result<()> {
        track(Provider::Gcp, "delete_blob", async {
            let request = DeleteObjectRequest {
                bucket: bucket.to_owned(),
                object: key.to_owned(),
                ..Default::default()
            };
            self.client
                .delete_object(&request)
                .await
                .map_err(|e| wrap(format!("Failed to delete GCP blob gs://{}/{}", bucket, key), e))
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
        track(Provider::Gcp, "copy_blob", async {
            let request = CopyObjectRequest {
                source_bucket: source_bucket.to_owned(),
                source_object: source_key.to_owned(),
                destination_bucket: destination_bucket.to_owned(),
                destination_object: destination_key.to_owned(),
                ..Default::default()
            };
            let copied = self.client.copy_object(&request).await.map_err(|e| {
                wrap(
                    format!(
                        "Failed to copy GCP blob from gs://{}/{} to gs://{}/{}",
                        source_bucket, source_key, destination_bucket, destination_key
                    ),
                    e,
                )
            })?;
            Ok(copied.etag)
        })
        .await
    }

    async fn list_all_buckets(&self) -> Result<HashSet<Bucket>> {
        let project = self.require_project()?.to_owned();
        track(Provider::Gcp, "list_all_buckets", async {
            let mut buckets = HashSet::new();
            let mut page_token: Option<String> = None;

            loop {
                let request = ListBucketsRequest {
                    project: project.clone(),
                    page_token: page_token.take(),
                    ..Default::default()
                };
                let response = self.client.list_buckets(&request).await.map_err(|e| {
                    wrap(format!("Failed to list GCP buckets in project {}", project), e)
                })?;

                for bucket in response.items {
                    buckets.insert(Bucket {
                        uri: locator("gs", &bucket.name, None),
                        creation_date: bucket.time_created.and_then(from_offset_date_time),
                        last_modified: bucket.updated.and_then(from_offset_date_time),
                        name: bucket.name,
                    });
                }

                match response.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }

            debug!(count = buckets.len(), "listed GCP buckets");
            Ok(buckets)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>> {
        track(Provider::Gcp, "list_blobs_by_prefix", async {
            let mut blobs = HashSet::new();
            let mut page_token: Option<String> = None;

            loop {
                let request = ListObjectsRequest {
                    bucket: bucket.to_owned(),
                    prefix: normalize_prefix(prefix).map(str::to_owned),
                    page_token: page_token.take(),
                    ..Default::default()
                };
                let response = self.client.list_objects(&request).await.map_err(|e| {
                    wrap(format!("Failed to list GCP blobs in bucket {}", bucket), e)
                })?;

                for object in response.items.unwrap_or_default() {
                    blobs.insert(to_blob(bucket, object));
                }

                match response.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }

            Ok(blobs)
        })
        .await
    }

    async fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        let project = self.require_project()?.to_owned();
        track(Provider::Gcp, "create_bucket", async {
            let request = InsertBucketRequest {
                name: bucket.name.clone(),
                param: InsertBucketParam {
                    project,
                    ..Default::default()
                },
                ..Default::default()
            };
            self.client
                .insert_bucket(&request)
                .await
                .map_err(|e| wrap(format!("Failed to create GCP bucket {}", bucket.name), e))?;
            Ok(())
        })
        .await
    }

    async fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()> {
        track(Provider::Gcp, "delete_bucket_if_exists", async {
            let request = DeleteBucketRequest {
                bucket: bucket.to_owned(),
                ..Default::default()
            };
            match self.client.delete_bucket(&request).await {
                Ok(()) => Ok(()),
                Err(e) if is_not_found(&e) => {
                    debug!(bucket, "GCP bucket already absent");
                    Ok(())
                }
                Err(e) => Err(wrap(
                    format!("Failed to delete GCP bucket if exists: {}", bucket),
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
        track(Provider::Gcp, "get_byte_range", async {
            let request = GetObjectRequest {
                bucket: bucket.to_owned(),
                object: key.to_owned(),
                ..Default::default()
            };
            let range = Range(Some(start_inclusive as u64), Some(end_inclusive as u64));
            let data = self
                .client
                .download_object(&request, &range)
                .await
                .map_err(|e| {
                    wrap(
                        format!(
                            "Failed to read byte range from GCP blob gs://{}/{}",
                            bucket, key
                        ),
                        e,
                    )
                })?;
            Ok(Bytes::from(data))
        })
        .await
    }

    #[instrument(skip(self, blob), fields(key = %blob.key))]
    async fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String> {
        validate_key(blob)?;
        track(Provider::Gcp, "create_blob_if_not_exists", async {
            let request = GetObjectRequest {
                bucket: bucket.to_owned(),
                object: blob.key.clone(),
                ..Default::default()
            };
            match self.client.get_object(&request).await {
                Ok(existing) => {
                    debug!(bucket, key = %blob.key, "GCP blob exists, skipping upload");
                    Ok(existing.etag)
                }
                Err(e) if is_not_found(&e) => self.upload(bucket, blob).await,
                Err(e) => Err(wrap(
                    format!(
                        "Failed to create GCP blob if not exists: gs://{}/{}",
                        bucket, blob.key
                    ),
                    e,
                )),
            }
        })
        .await
    }

    async fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url> {
        validate_expiry(expiry)?;
        track(
            Provider::Gcp,
            "generate_get_url",
            self.sign(bucket, key, SignedURLMethod::GET, expiry, None),
        )
        .await
    }

    async fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url> {
        validate_expiry(expiry)?;
        track(
            Provider::Gcp,
            "generate_put_url",
            self.sign(bucket, key, SignedURLMethod::PUT, expiry, content_type),
        )
        .await
    }
}

fn to_blob(bucket: &str, object: Object) -> Blob {
    Blob {
        uri: locator("gs", bucket, Some(&object.name)),
        key: object.name,
        bucket: bucket.to_owned(),
        content: None,
        size: object.size.max(0) as u64,
        last_modified: object.updated.and_then(from_offset_date_time),
        encoding: object.content_encoding,
        etag: Some(object.etag),
        metadata: object
            .metadata
            .map(|m| m.into_iter().collect::<BTreeMap<_, _>>())
            .unwrap_or_default(),
        expires: None,
    }
}

pub(crate) fn is_not_found(error: &gcloud_storage::http::Error) -> bool {
    use gcloud_storage::http::Error as HttpError;

    match error {
        HttpError::Response(response) => response.code == 404,
        HttpError::HttpClient(e) => e.status().map_or(false, |s| s.as_u16() == 404),
        _ => false,
    }
}

fn wrap(message: String, error: gcloud_storage::http::Error) -> Error {
    UbsaError::new(message, error).into()
}
