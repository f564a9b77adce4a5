//! Configuration management for ubsa
//!
//! The builder-based construction path reads its settings from:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// Storage provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Provider {
    /// AWS S3
    Aws,
    /// Azure Blob Storage
    Azure,
    /// Google Cloud Storage
    Gcp,
}

impl Provider {
    /// Metric label and log field value
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Aws => f.write_str("AWS"),
            Provider::Azure => f.write_str("Azure"),
            Provider::Gcp => f.write_str("GCP"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "aws" | "s3" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "gcp" | "gcs" | "google" => Ok(Provider::Gcp),
            _ => Err(Error::Config(format!(
                "Invalid blob storage provider: {}. Set {} to AWS, Azure or GCP.",
                s, ENV_PROVIDER
            ))),
        }
    }
}

impl TryFrom<String> for Provider {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

pub const ENV_CONFIG_FILE: &str = "BLOBSTORAGE_CONFIG_FILE";
pub const ENV_PROVIDER: &str = "BLOBSTORAGE_PROVIDER";
pub const ENV_ENDPOINT: &str = "BLOBSTORAGE_ENDPOINT";
pub const ENV_REGION: &str = "BLOBSTORAGE_REGION";
pub const ENV_ACCESS_KEY: &str = "BLOBSTORAGE_ACCESS_KEY";
pub const ENV_SECRET_KEY: &str = "BLOBSTORAGE_SECRET_KEY";
pub const ENV_PROJECT_ID: &str = "BLOBSTORAGE_PROJECT_ID";
pub const ENV_SERVICE_ACCOUNT_PATH: &str = "BLOBSTORAGE_SERVICE_ACCOUNT_PATH";

/// Raw settings used to build a native client.
///
/// The credential pair means:
/// - AWS: access key id and secret access key
/// - Azure: storage account name and account key
/// - GCP: `secret_key` may hold a service account JSON key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub provider: Provider,

    /// Custom endpoint URL (S3-compatible services, Azurite, GCS emulators)
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default)]
    pub access_key: Option<String>,

    #[serde(default)]
    pub secret_key: Option<String>,

    /// GCP project used for bucket creation and listing
    #[serde(default)]
    pub project_id: Option<String>,

    /// GCP service account JSON key file
    #[serde(default)]
    pub service_account_path: Option<String>,
}

impl StorageConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            endpoint: None,
            region: None,
            access_key: None,
            secret_key: None,
            project_id: None,
            service_account_path: None,
        }
    }

    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - BLOBSTORAGE_PROVIDER: aws|azure|gcp (case-insensitive)
    /// - BLOBSTORAGE_ENDPOINT: custom endpoint URL (optional)
    /// - BLOBSTORAGE_REGION: region (optional)
    /// - BLOBSTORAGE_ACCESS_KEY / BLOBSTORAGE_SECRET_KEY: credential pair (optional)
    /// - BLOBSTORAGE_PROJECT_ID: GCP project (optional)
    /// - BLOBSTORAGE_SERVICE_ACCOUNT_PATH: GCP key file (optional)
    /// - BLOBSTORAGE_CONFIG_FILE: optional path to TOML config file
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Try to load from config file first if specified
        let mut config = match lookup(ENV_CONFIG_FILE) {
            Some(path) => Some(Self::from_file(&path)?),
            None => None,
        };

        // Override with environment variables
        if let Some(provider) = lookup(ENV_PROVIDER) {
            let provider = provider.parse()?;
            match config.as_mut() {
                Some(config) => config.provider = provider,
                None => config = Some(Self::new(provider)),
            }
        }

        let mut config = config.ok_or_else(|| {
            Error::Config(format!(
                "Invalid blob storage provider: <unset>. Set {} to AWS, Azure or GCP.",
                ENV_PROVIDER
            ))
        })?;

        if let Some(endpoint) = lookup(ENV_ENDPOINT) {
            config.endpoint = Some(endpoint);
        }

        if let Some(region) = lookup(ENV_REGION) {
            config.region = Some(region);
        }

        if let Some(access_key) = lookup(ENV_ACCESS_KEY) {
            config.access_key = Some(access_key);
        }

        if let Some(secret_key) = lookup(ENV_SECRET_KEY) {
            config.secret_key = Some(secret_key);
        }

        if let Some(project_id) = lookup(ENV_PROJECT_ID) {
            config.project_id = Some(project_id);
        }

        if let Some(path) = lookup(ENV_SERVICE_ACCOUNT_PATH) {
            config.service_account_path = Some(path);
        }

        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file {}: {}", path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(Provider::from_str("aws").unwrap(), Provider::Aws);
        assert_eq!(Provider::from_str("AWS").unwrap(), Provider::Aws);
        assert_eq!(Provider::from_str("Azure").unwrap(), Provider::Azure);
        assert_eq!(Provider::from_str("gCp").unwrap(), Provider::Gcp);
        assert_eq!(Provider::from_str("gcs").unwrap(), Provider::Gcp);
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let err = Provider::from_str("dropbox").unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("dropbox")));
    }

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Aws.to_string(), "AWS");
        assert_eq!(Provider::Azure.to_string(), "Azure");
        assert_eq!(Provider::Gcp.to_string(), "GCP");
    }

    #[test]
    fn test_from_env_reads_all_fields() {
        let config = StorageConfig::from_lookup(lookup(&[
            (ENV_PROVIDER, "azure"),
            (ENV_ENDPOINT, "http://127.0.0.1:10000/devstoreaccount1"),
            (ENV_ACCESS_KEY, "devstoreaccount1"),
            (ENV_SECRET_KEY, "secret"),
        ]))
        .unwrap();

        assert_eq!(config.provider, Provider::Azure);
        assert_eq!(
            config.endpoint.as_deref(),
            Some("http://127.0.0.1:10000/devstoreaccount1")
        );
        assert_eq!(config.access_key.as_deref(), Some("devstoreaccount1"));
        assert_eq!(config.secret_key.as_deref(), Some("secret"));
        assert!(config.region.is_none());
    }

    #[test]
    fn test_missing_provider_is_fatal() {
        let err = StorageConfig::from_lookup(lookup(&[(ENV_REGION, "us-east-1")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile_path("ubsa-config");
        writeln!(
            file.1,
            "provider = \"gcp\"\nproject_id = \"from-file\"\nregion = \"europe-west1\""
        )
        .unwrap();

        let path = file.0.to_string_lossy().to_string();
        let config = StorageConfig::from_lookup(lookup(&[
            (ENV_CONFIG_FILE, path.as_str()),
            (ENV_PROJECT_ID, "from-env"),
        ]))
        .unwrap();

        assert_eq!(config.provider, Provider::Gcp);
        assert_eq!(config.project_id.as_deref(), Some("from-env"));
        assert_eq!(config.region.as_deref(), Some("europe-west1"));
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn test_file_provider_is_case_insensitive() {
        let mut file = tempfile_path("ubsa-provider");
        writeln!(file.1, "provider = \"AWS\"\nregion = \"us-east-1\"").unwrap();

        let path = file.0.to_string_lossy().to_string();
        let config = StorageConfig::from_file(&path).unwrap();
        assert_eq!(config.provider, Provider::Aws);
        assert_eq!(config.region.as_deref(), Some("us-east-1"));
        std::fs::remove_file(&file.0).unwrap();
    }

    #[test]
    fn test_file_with_unknown_provider_is_config_error() {
        let mut file = tempfile_path("ubsa-provider");
        writeln!(file.1, "provider = \"dropbox\"").unwrap();

        let path = file.0.to_string_lossy().to_string();
        let err = StorageConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("dropbox")));
        std::fs::remove_file(&file.0).unwrap();
    }

    fn tempfile_path(prefix: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("{}-{}.toml", prefix, uuid::Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
