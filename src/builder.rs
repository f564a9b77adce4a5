//! Builder-based construction from raw configuration
//!
//! Builds the native SDK client for the selected provider from an endpoint,
//! region and credential pair, then wraps it in the matching adapter.
//!
//! Supported authentication:
//! - AWS: static access key pair, or the `aws-config` default chain
//! - Azure: account name plus account key, or the `azure_identity` default credential
//! - GCP: service account file or JSON key, or Application Default Credentials

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{Provider, StorageConfig};
use crate::errors::{Error, Result};
use crate::storage::{run_blocking, BlobStorageAsyncClient, BlobStorageSyncClient, BlockingClient};

#[cfg(feature = "gcp")]
use gcloud_storage::client::google_cloud_auth::credentials::CredentialsFile;

/// Name the static AWS credentials are reported under
#[cfg(feature = "aws")]
const AWS_CREDENTIALS_SOURCE: &str = "ubsa";

/// Builds a storage client from raw settings.
///
/// ```no_run
/// # async fn demo() -> ubsa::Result<()> {
/// use ubsa::{BlobStorageClientBuilder, Provider};
///
/// let client = BlobStorageClientBuilder::new(Provider::Aws)
///     .endpoint("http://localhost:9000")
///     .region("us-east-1")
///     .credentials("minio", "minio123")
///     .build()
///     .await?;
/// assert!(!client.bucket_exists("missing").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BlobStorageClientBuilder {
    config: StorageConfig,
}

impl BlobStorageClientBuilder {
    pub fn new(provider: Provider) -> Self {
        Self {
            config: StorageConfig::new(provider),
        }
    }

    /// Builder seeded from `BLOBSTORAGE_*` environment variables and the
    /// optional config file. Fails if no valid provider is configured.
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_config(StorageConfig::from_env()?))
    }

    pub fn from_config(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = Some(endpoint.into());
        self
    }

    /// Credential pair; see [`StorageConfig`] for its meaning per provider.
    pub fn credentials(mut self, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        self.config.access_key = Some(access_key.into());
        self.config.secret_key = Some(secret_key.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.config.region = Some(region.into());
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.config.project_id = Some(project_id.into());
        self
    }

    pub fn service_account_path(mut self, path: impl Into<String>) -> Self {
        self.config.service_account_path = Some(path.into());
        self
    }

    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Build the non-blocking client.
    pub async fn build(self) -> Result<Arc<dyn BlobStorageAsyncClient>> {
        info!(provider = %self.config.provider, endpoint = ?self.config.endpoint, "building storage client");

        match self.config.provider {
            #[cfg(feature = "aws")]
            Provider::Aws => build_aws(&self.config).await,
            #[cfg(feature = "azure")]
            Provider::Azure => build_azure(&self.config),
            #[cfg(feature = "gcp")]
            Provider::Gcp => build_gcp(&self.config).await,
            #[allow(unreachable_patterns)]
            provider => Err(Error::Config(format!(
                "Provider {} is not enabled; rebuild with the `{}` feature",
                provider,
                provider.as_str()
            ))),
        }
    }

    /// Build the blocking client. Credential discovery runs on the shared
    /// blocking runtime.
    pub fn build_blocking(self) -> Result<Arc<dyn BlobStorageSyncClient>> {
        let inner = run_blocking(self.build())?;
        Ok(Arc::new(BlockingClient::new(inner)))
    }
}

#[cfg(feature = "aws")]
async fn build_aws(config: &StorageConfig) -> Result<Arc<dyn BlobStorageAsyncClient>> {
    use aws_config::BehaviorVersion;
    use aws_sdk_s3::config::{Credentials, Region};

    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(Region::new(region.clone()));
    }

    match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            loader = loader.credentials_provider(Credentials::new(
                access_key,
                secret_key,
                None,
                None,
                AWS_CREDENTIALS_SOURCE,
            ));
        }
        (None, None) => debug!("no static AWS credentials, using the default provider chain"),
        _ => {
            return Err(Error::Config(
                "AWS credentials need both an access key and a secret key".to_string(),
            ))
        }
    }

    // Configure endpoint (for S3-compatible services like MinIO)
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    let shared = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(config.endpoint.is_some())
        .build();

    Ok(Arc::new(crate::storage::AwsAdapter::new(
        aws_sdk_s3::Client::from_conf(s3_config),
    )))
}

#[cfg(feature = "azure")]
fn build_azure(config: &StorageConfig) -> Result<Arc<dyn BlobStorageAsyncClient>> {
    use azure_storage::{CloudLocation, StorageCredentials};
    use azure_storage_blobs::prelude::ClientBuilder;

    let account = config.access_key.clone().ok_or_else(|| {
        Error::Config("Azure needs the storage account name as the access key".to_string())
    })?;

    let credentials = match &config.secret_key {
        Some(key) => StorageCredentials::access_key(account.clone(), key.clone()),
        None => {
            debug!(account = %account, "no Azure account key, using the default credential");
            let credential = Arc::new(azure_identity::DefaultAzureCredentialBuilder::new().build());
            StorageCredentials::token_credential(credential)
        }
    };

    let location = match &config.endpoint {
        Some(uri) => CloudLocation::Custom {
            account,
            uri: uri.trim_end_matches('/').to_string(),
        },
        None => CloudLocation::Public { account },
    };

    let client = ClientBuilder::with_location(location, credentials).blob_service_client();
    Ok(Arc::new(crate::storage::AzureAdapter::new(client)))
}

#[cfg(feature = "gcp")]
async fn build_gcp(config: &StorageConfig) -> Result<Arc<dyn BlobStorageAsyncClient>> {
    use gcloud_storage::client::{Client, ClientConfig};

    let client_config = match &config.endpoint {
        Some(endpoint) => {
            // Local emulators take no credentials
            info!(endpoint = %endpoint, "using custom GCS endpoint with anonymous access");
            ClientConfig {
                storage_endpoint: endpoint.trim_end_matches('/').to_string(),
                ..ClientConfig::default()
            }
            .anonymous()
        }
        None => {
            let base = ClientConfig::default();
            let authenticated = match gcp_credentials(config).await? {
                Some(credentials) => base.with_credentials(credentials).await,
                None => base.with_auth().await,
            };
            authenticated
                .map_err(|e| Error::Config(format!("Failed to initialize GCS authentication: {}", e)))?
        }
    };

    // An explicit project wins over the one named in the service account key
    let project_id = config.project_id.clone().or_else(|| client_config.project_id.clone());
    let mut adapter = crate::storage::GcpAdapter::new(Client::new(client_config));
    if let Some(project_id) = project_id {
        adapter = adapter.with_project_id(project_id);
    }
    Ok(Arc::new(adapter))
}

/// Explicit service account credentials, or `None` to fall back to
/// Application Default Credentials. The key file path wins over a JSON key
/// passed as the secret.
#[cfg(feature = "gcp")]
async fn gcp_credentials(config: &StorageConfig) -> Result<Option<CredentialsFile>> {
    if let Some(path) = &config.service_account_path {
        debug!(path = %path, "loading GCP service account key file");
        let credentials = CredentialsFile::new_from_file(path.clone()).await.map_err(|e| {
            Error::Config(format!("Failed to read GCP service account file {}: {}", path, e))
        })?;
        return Ok(Some(credentials));
    }

    let Some(key) = &config.secret_key else {
        debug!("no GCP service account supplied, using Application Default Credentials");
        return Ok(None);
    };

    let credentials = CredentialsFile::new_from_str(key).await.map_err(|e| {
        Error::Config(format!("GCP secret key is not a service account JSON key: {}", e))
    })?;
    Ok(Some(credentials))
}
