//! ubsa-smoke - exercises a configured storage backend end to end
//!
//! The provider and credentials come from the `BLOBSTORAGE_*` environment
//! variables (see [`ubsa::StorageConfig::from_env`]). The bucket used is the
//! first command-line argument, defaulting to `ubsa-smoke-test`. It is created
//! if missing, and only a bucket created here is removed again afterwards.

use chrono::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ubsa::{Blob, BlobStorageAsyncClient, BlobStorageClientBuilder, Bucket};

const DEFAULT_BUCKET: &str = "ubsa-smoke-test";
const SMOKE_KEY: &str = "ubsa/smoke.txt";
const SMOKE_COPY_KEY: &str = "ubsa/smoke-copy.txt";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with JSON output for structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    ubsa::metrics::init_metrics();

    let bucket = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_BUCKET.to_string());

    let builder = BlobStorageClientBuilder::from_env()?;
    info!(provider = %builder.provider(), bucket = %bucket, "Starting storage smoke test");
    let client = builder.build().await?;

    let outcome = match ensure_bucket(client.as_ref(), &bucket).await {
        Ok(created) => {
            let outcome = run(client.as_ref(), &bucket).await;
            // Clean up even when a step failed
            cleanup(client.as_ref(), &bucket, created).await;
            outcome
        }
        Err(e) => Err(e),
    };

    print!("{}", ubsa::metrics::render());

    if let Err(e) = outcome {
        error!(error = %e, "Smoke test failed");
        return Err(e.into());
    }
    info!("Smoke test complete");
    Ok(())
}

/// Create `bucket` if missing. Returns whether it was created here.
async fn ensure_bucket(client: &dyn BlobStorageAsyncClient, bucket: &str) -> ubsa::Result<bool> {
    if client.bucket_exists(bucket).await? {
        info!(bucket, "Using existing bucket");
        return Ok(false);
    }
    client.create_bucket(&Bucket::new(bucket)).await?;
    info!(bucket, "Created bucket");
    Ok(true)
}

/// Remove the smoke blobs, and the bucket too when `created` is set.
async fn cleanup(client: &dyn BlobStorageAsyncClient, bucket: &str, created: bool) {
    for key in [SMOKE_KEY, SMOKE_COPY_KEY] {
        if let Ok(true) = client.blob_exists(bucket, key).await {
            if let Err(e) = client.delete_blob(bucket, key).await {
                error!(error = %e, key, "Failed to remove smoke blob");
            }
        }
    }
    if created {
        if let Err(e) = client.delete_bucket_if_exists(bucket).await {
            error!(error = %e, "Failed to remove smoke bucket");
        }
    }
}

async fn run(client: &dyn BlobStorageAsyncClient, bucket: &str) -> ubsa::Result<()> {
    let blob = Blob::new(SMOKE_KEY, "hello from ubsa").with_metadata("purpose", "smoke");
    let etag = client.create_blob(bucket, &blob).await?;
    info!(key = SMOKE_KEY, etag = %etag, "Uploaded blob");

    let again = client.create_blob_if_not_exists(bucket, &blob).await?;
    info!(etag = %again, "Idempotent create returned existing etag");

    let fetched = client.get_blob(bucket, SMOKE_KEY).await?;
    info!(size = fetched.size, uri = ?fetched.uri, "Fetched blob");

    let head = client.get_byte_range(bucket, SMOKE_KEY, 0, 4).await?;
    info!(bytes = %String::from_utf8_lossy(&head), "Read byte range");

    let copied = client
        .copy_blob(bucket, SMOKE_KEY, bucket, SMOKE_COPY_KEY)
        .await?;
    info!(etag = %copied, "Copied blob");

    let listed = client.list_blobs_by_prefix(bucket, "ubsa/").await?;
    info!(count = listed.len(), "Listed blobs");

    match client
        .generate_get_url(bucket, SMOKE_KEY, Duration::minutes(10))
        .await
    {
        Ok(url) => info!(url = %url, "Presigned GET URL"),
        // Credential-less emulator setups cannot sign
        Err(e) => error!(error = %e, "Could not presign GET URL"),
    }

    Ok(())
}

#[cfg(all(test, feature = "aws"))]
mod tests {
    use super::*;
    use ubsa::ClientFactory;

    fn s3_client(endpoint: &str) -> aws_sdk_s3::Client {
        use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(config)
    }

    #[tokio::test]
    async fn test_existing_bucket_survives_cleanup() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", mockito::Matcher::Regex(r"^/smoke(\?.*)?$".to_string()))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", mockito::Matcher::Regex(r"^/smoke/ubsa/".to_string()))
            .with_status(404)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", mockito::Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let client = ClientFactory::async_client(s3_client(&server.url())).unwrap();
        let created = ensure_bucket(client.as_ref(), "smoke").await.unwrap();
        assert!(!created);

        cleanup(client.as_ref(), "smoke", created).await;
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn test_created_bucket_is_removed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", mockito::Matcher::Regex(r"^/smoke(\?.*)?$".to_string()))
            .with_status(404)
            .create_async()
            .await;
        server
            .mock("PUT", mockito::Matcher::Regex(r"^/smoke(\?.*)?$".to_string()))
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("HEAD", mockito::Matcher::Regex(r"^/smoke/ubsa/".to_string()))
            .with_status(404)
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", mockito::Matcher::Regex(r"^/smoke(\?.*)?$".to_string()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let client = ClientFactory::async_client(s3_client(&server.url())).unwrap();
        let created = ensure_bucket(client.as_ref(), "smoke").await.unwrap();
        assert!(created);

        cleanup(client.as_ref(), "smoke", created).await;
        delete.assert_async().await;
    }
}
