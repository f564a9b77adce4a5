//! AWS S3 storage adapter
//!
//! Wraps an `aws_sdk_s3::Client`. Not-found is recognized from the service
//! error codes (`NoSuchBucket`, `NoSuchKey`, `NotFound`) or a raw HTTP 404,
//! which is all HEAD requests ever return.
//!
//! Presigned URLs are produced by a short-lived signer client built from the
//! wrapped client's configuration. The signer's addressing style is taken
//! from a sample URL presigned by the wrapped client itself, so path-style
//! clients (MinIO and other S3-compatible endpoints) get path-style URLs.

use async_trait::async_trait;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::put_object::builders::PutObjectFluentBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime as AwsDateTime};
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, instrument};
use url::Url;

use super::{
    locator, normalize_prefix, validate_expiry, validate_key, validate_range,
    BlobStorageAsyncClient,
};
use crate::config::Provider;
use crate::errors::{Error, Result, UbsaError};
use crate::metrics::track;
use crate::model::{Blob, Bucket};

const PATH_STYLE_SAMPLE_BUCKET: &str = "ubsa-path-style-sample";
const PATH_STYLE_SAMPLE_KEY: &str = "sample";
const NOT_FOUND_CODES: &[&str] = &["NoSuchBucket", "NoSuchKey", "NotFound"];

/// AWS S3 adapter
#[derive(Debug, Clone)]
pub struct AwsAdapter {
    client: Client,
}

impl AwsAdapter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether the wrapped client addresses buckets in the URL path.
    ///
    /// Presigns a throwaway GET for a sample bucket and inspects its path.
    /// Falls back to virtual-host style if the sample cannot be signed.
    pub async fn is_path_style_enabled(&self) -> bool {
        let config = match PresigningConfig::expires_in(std::time::Duration::from_secs(60)) {
            Ok(config) => config,
            Err(_) => return false,
        };
        let sample = self
            .client
            .get_object()
            .bucket(PATH_STYLE_SAMPLE_BUCKET)
            .key(PATH_STYLE_SAMPLE_KEY)
            .presigned(config)
            .await;
        match sample {
            Ok(request) => {
                let expected = format!("/{}/", PATH_STYLE_SAMPLE_BUCKET);
                Url::parse(request.uri())
                    .map(|url| url.path().starts_with(&expected))
                    .unwrap_or(false)
            }
            Err(e) => {
                debug!(error = %e, "path-style detection failed, assuming virtual-host addressing");
                false
            }
        }
    }

    /// Signer for one presign call; dropped when the call returns.
    async fn presigner(&self) -> Client {
        let path_style = self.is_path_style_enabled().await;
        let config = self
            .client
            .config()
            .to_builder()
            .force_path_style(path_style)
            .build();
        Client::from_conf(config)
    }

    fn presigning_config(expiry: Duration) -> Result<PresigningConfig> {
        let expires_in = validate_expiry(expiry)?;
        PresigningConfig::expires_in(expires_in)
            .map_err(|e| Error::InvalidArgument(format!("Invalid expiry {}: {}", expiry, e)))
    }

    async fn upload(&self, bucket: &str, blob: &Blob) -> Result<String> {
        let mut request = self
            .client
            .put_object()
            .bucket(bucket)
            .key(&blob.key)
            .body(ByteStream::from(blob.content_or_empty()));

        if let Some(encoding) = &blob.encoding {
            request = request.content_encoding(encoding);
        }
        for (key, value) in &blob.metadata {
            request = request.metadata(key, value);
        }
        if let Some(expires) = blob.expires {
            request = with_expires(request, expires);
        }

        let output = request.send().await.map_err(|e| {
            wrap(
                format!("Failed to create AWS blob {} in bucket {}", blob.key, bucket),
                e,
            )
        })?;
        Ok(output.e_tag().map(str::to_owned).unwrap_or_default())
    }
}

#[async_trait]
impl BlobStorageAsyncClient for AwsAdapter {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    fn native_client(&self) -> &(dyn Any + Send + Sync) {
        &self.client
    }

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        track(Provider::Aws, "bucket_exists", async {
            match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(wrap(
                    format!("Failed to check whether AWS bucket exists: {}", bucket),
                    e,
                )),
            }
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_blob(&self, bucket: &str, key: &str) -> Result<Blob> {
        track(Provider::Aws, "get_blob", async {
            let message = || format!("Failed to get AWS blob {} from bucket {}", key, bucket);
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| wrap(message(), e))?;

            let metadata: BTreeMap<String, String> = output
                .metadata()
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let mut blob = Blob {
                key: key.to_owned(),
                bucket: bucket.to_owned(),
                content: None,
                size: output.content_length().unwrap_or_default().max(0) as u64,
                last_modified: output.last_modified().and_then(to_utc),
                encoding: output.content_encoding().map(str::to_owned),
                etag: output.e_tag().map(str::to_owned),
                metadata,
                uri: locator("s3", bucket, Some(key)),
                expires: output.expires_string().and_then(parse_http_date),
            };

            let content = output
                .body
                .collect()
                .await
                .map_err(|e| Error::from(UbsaError::new(message(), e)))?
                .into_bytes();
            debug!(bucket, key, size = content.len(), "downloaded AWS blob");
            blob.content = Some(content);
            Ok(blob)
        })
        .await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        track(Provider::Aws, "delete_bucket", async {
            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(|e| wrap(format!("Failed to delete AWS bucket: {}", bucket), e))?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn blob_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        track(Provider::Aws, "blob_exists", async {
            match self.client.head_object().bucket(bucket).key(key).send().await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(wrap(
                    format!(
                        "Failed to check whether AWS blob exists: s3://{}/{}",
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
        track(Provider::Aws, "create_blob", self.upload(bucket, blob)).await
    }

    async fn delete_blob(&self, bucket: &str, key: &str) -> Result<()> {
        track(Provider::Aws, "delete_blob", async {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| wrap(format!("Failed to delete AWS blob s3://{}/{}", bucket, key), e))?;
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
        track(Provider::Aws, "copy_blob", async {
            let output = self
                .client
                .copy_object()
                .copy_source(format!("{}/{}", source_bucket, source_key))
                .bucket(destination_bucket)
                .key(destination_key)
                .send()
                .await
                .map_err(|e| {
                    wrap(
                        format!(
                            "Failed to copy AWS blob from s3://{}/{} to s3://{}/{}",
                            source_bucket, source_key, destination_bucket, destination_key
                        ),
                        e,
                    )
                })?;
            Ok(output
                .copy_object_result()
                .and_then(|result| result.e_tag())
                .map(str::to_owned)
                .unwrap_or_default())
        })
        .await
    }

    async fn list_all_buckets(&self) -> Result<HashSet<Bucket>> {
        track(Provider::Aws, "list_all_buckets", async {
            let mut buckets = HashSet::new();
            let mut continuation_token: Option<String> = None;

            loop {
                let output = self
                    .client
                    .list_buckets()
                    .set_continuation_token(continuation_token.take())
                    .send()
                    .await
                    .map_err(|e| wrap("Failed to list AWS buckets".to_string(), e))?;

                for bucket in output.buckets() {
                    let Some(name) = bucket.name() else { continue };
                    let created = bucket.creation_date().and_then(to_utc);
                    buckets.insert(Bucket {
                        name: name.to_owned(),
                        uri: locator("s3", name, None),
                        creation_date: created,
                        last_modified: created,
                    });
                }

                match output.continuation_token() {
                    Some(token) if !token.is_empty() => continuation_token = Some(token.to_owned()),
                    _ => break,
                }
            }

            debug!(count = buckets.len(), "listed AWS buckets");
            Ok(buckets)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_blobs_by_prefix(&self, bucket: &str, prefix: &str) -> Result<HashSet<Blob>> {
        track(Provider::Aws, "list_blobs_by_prefix", async {
            let mut blobs = HashSet::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_prefix(normalize_prefix(prefix).map(str::to_owned))
                .into_paginator()
                .send();

            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| {
                    wrap(format!("Failed to list AWS blobs in bucket {}", bucket), e)
                })?;
                for object in page.contents() {
                    let Some(key) = object.key() else { continue };
                    blobs.insert(Blob {
                        key: key.to_owned(),
                        bucket: bucket.to_owned(),
                        size: object.size().unwrap_or_default().max(0) as u64,
                        last_modified: object.last_modified().and_then(to_utc),
                        etag: object.e_tag().map(str::to_owned),
                        uri: locator("s3", bucket, Some(key)),
                        ..Default::default()
                    });
                }
            }

            Ok(blobs)
        })
        .await
    }

    async fn create_bucket(&self, bucket: &Bucket) -> Result<()> {
        track(Provider::Aws, "create_bucket", async {
            let mut request = self.client.create_bucket().bucket(&bucket.name);

            // us-east-1 rejects an explicit location constraint
            if let Some(region) = self.client.config().region() {
                if region.as_ref() != "us-east-1" {
                    request = request.create_bucket_configuration(
                        CreateBucketConfiguration::builder()
                            .location_constraint(BucketLocationConstraint::from(region.as_ref()))
                            .build(),
                    );
                }
            }

            request
                .send()
                .await
                .map_err(|e| wrap(format!("Failed to create AWS bucket {}", bucket.name), e))?;
            Ok(())
        })
        .await
    }

    async fn delete_bucket_if_exists(&self, bucket: &str) -> Result<()> {
        track(Provider::Aws, "delete_bucket_if_exists", async {
            match self.client.delete_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(()),
                Err(e) if is_not_found(&e) => {
                    debug!(bucket, "AWS bucket already absent");
                    Ok(())
                }
                Err(e) => Err(wrap(
                    format!("Failed to delete AWS bucket if exists: {}", bucket),
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
        track(Provider::Aws, "get_byte_range", async {
            let message = || {
                format!(
                    "Failed to read byte range from AWS blob s3://{}/{}",
                    bucket, key
                )
            };
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .range(format!("bytes={}-{}", start_inclusive, end_inclusive))
                .send()
                .await
                .map_err(|e| wrap(message(), e))?;
            let data = output
                .body
                .collect()
                .await
                .map_err(|e| Error::from(UbsaError::new(message(), e)))?;
            Ok(data.into_bytes())
        })
        .await
    }

    #[instrument(skip(self, blob), fields(key = %blob.key))]
    async fn create_blob_if_not_exists(&self, bucket: &str, blob: &Blob) -> Result<String> {
        validate_key(blob)?;
        track(Provider::Aws, "create_blob_if_not_exists", async {
            let head = self
                .client
                .head_object()
                .bucket(bucket)
                .key(&blob.key)
                .send()
                .await;
            match head {
                Ok(existing) => {
                    debug!(bucket, key = %blob.key, "AWS blob exists, skipping upload");
                    Ok(existing.e_tag().map(str::to_owned).unwrap_or_default())
                }
                Err(e) if is_not_found(&e) => self.upload(bucket, blob).await,
                Err(e) => Err(wrap(
                    format!(
                        "Failed to create AWS blob if not exists: s3://{}/{}",
                        bucket, blob.key
                    ),
                    e,
                )),
            }
        })
        .await
    }

    async fn generate_get_url(&self, bucket: &str, key: &str, expiry: Duration) -> Result<Url> {
        let config = Self::presigning_config(expiry)?;
        track(Provider::Aws, "generate_get_url", async {
            let signer = self.presigner().await;
            let request = signer
                .get_object()
                .bucket(bucket)
                .key(key)
                .presigned(config)
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to generate AWS GET URL for s3://{}/{}", bucket, key),
                        e,
                    )
                })?;
            Ok(Url::parse(request.uri())?)
        })
        .await
    }

    async fn generate_put_url(
        &self,
        bucket: &str,
        key: &str,
        expiry: Duration,
        content_type: Option<&str>,
    ) -> Result<Url> {
        let config = Self::presigning_config(expiry)?;
        track(Provider::Aws, "generate_put_url", async {
            let signer = self.presigner().await;
            let content_type = content_type
                .filter(|ct| !ct.trim().is_empty())
                .map(str::to_owned);
            let request = signer
                .put_object()
                .bucket(bucket)
                .key(key)
                .set_content_type(content_type)
                .presigned(config)
                .await
                .map_err(|e| {
                    wrap(
                        format!("Failed to generate AWS PUT URL for s3://{}/{}", bucket, key),
                        e,
                    )
                })?;
            Ok(Url::parse(request.uri())?)
        })
        .await
    }
}

fn is_not_found<E>(error: &SdkError<E, HttpResponse>) -> bool
where
    E: ProvideErrorMetadata,
{
    if let Some(response) = error.raw_response() {
        if response.status().as_u16() == 404 {
            return true;
        }
    }
    error
        .as_service_error()
        .and_then(|e| e.code())
        .map_or(false, |code| NOT_FOUND_CODES.contains(&code))
}

pub(crate) fn is_not_found_error(error: &aws_sdk_s3::Error) -> bool {
    match error {
        aws_sdk_s3::Error::NoSuchBucket(_)
        | aws_sdk_s3::Error::NoSuchKey(_)
        | aws_sdk_s3::Error::NotFound(_) => true,
        other => other
            .code()
            .map_or(false, |code| NOT_FOUND_CODES.contains(&code)),
    }
}

fn wrap<E>(message: String, error: SdkError<E, HttpResponse>) -> Error
where
    aws_sdk_s3::Error: From<SdkError<E, HttpResponse>>,
{
    UbsaError::new(message, aws_sdk_s3::Error::from(error)).into()
}

#[allow(deprecated)]
fn with_expires(request: PutObjectFluentBuilder, expires: DateTime<Utc>) -> PutObjectFluentBuilder {
    request.expires(AwsDateTime::from_secs(expires.timestamp()))
}

fn to_utc(time: &AwsDateTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(time.secs(), time.subsec_nanos()).single()
}

/// `Expires` arrives as an HTTP date, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|time| time.with_timezone(&Utc))
}
