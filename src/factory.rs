//! Client dispatcher
//!
//! Maps a native SDK client onto the adapter for its provider. The set of
//! supported native clients is closed: one [`NativeClient`] variant per
//! enabled provider feature.

use std::any::Any;
use std::sync::Arc;
use tracing::debug;

use crate::config::Provider;
use crate::errors::{Error, Result};
use crate::storage::{BlobStorageAsyncClient, BlobStorageSyncClient, BlockingClient};

#[cfg(feature = "aws")]
use crate::storage::AwsAdapter;
#[cfg(feature = "azure")]
use crate::storage::AzureAdapter;
#[cfg(feature = "gcp")]
use crate::storage::GcpAdapter;

/// A native SDK client of one of the supported providers.
#[derive(Clone)]
#[non_exhaustive]
pub enum NativeClient {
    #[cfg(feature = "aws")]
    Aws(aws_sdk_s3::Client),
    #[cfg(feature = "azure")]
    Azure(azure_storage_blobs::prelude::BlobServiceClient),
    #[cfg(feature = "gcp")]
    Gcp(gcloud_storage::client::Client),
}

impl NativeClient {
    /// Identify `value` as a supported native client.
    ///
    /// Candidates are tried in the order AWS, Azure, GCP. A `NativeClient`
    /// is passed through unchanged.
    pub fn detect<T: Any + Send>(value: T) -> Result<Self> {
        let mut slot = Some(value);
        let slot: &mut dyn Any = &mut slot;

        if let Some(native) = slot.downcast_mut::<Option<NativeClient>>() {
            if let Some(native) = native.take() {
                return Ok(native);
            }
        }

        #[cfg(feature = "aws")]
        if let Some(client) = slot
            .downcast_mut::<Option<aws_sdk_s3::Client>>()
            .and_then(Option::take)
        {
            return Ok(NativeClient::Aws(client));
        }

        #[cfg(feature = "azure")]
        if let Some(client) = slot
            .downcast_mut::<Option<azure_storage_blobs::prelude::BlobServiceClient>>()
            .and_then(Option::take)
        {
            return Ok(NativeClient::Azure(client));
        }

        #[cfg(feature = "gcp")]
        if let Some(client) = slot
            .downcast_mut::<Option<gcloud_storage::client::Client>>()
            .and_then(Option::take)
        {
            return Ok(NativeClient::Gcp(client));
        }

        Err(Error::UnsupportedClient {
            type_name: std::any::type_name::<T>(),
        })
    }

    pub fn provider(&self) -> Provider {
        match self {
            #[cfg(feature = "aws")]
            NativeClient::Aws(_) => Provider::Aws,
            #[cfg(feature = "azure")]
            NativeClient::Azure(_) => Provider::Azure,
            #[cfg(feature = "gcp")]
            NativeClient::Gcp(_) => Provider::Gcp,
        }
    }
}

impl std::fmt::Debug for NativeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeClient").field(&self.provider()).finish()
    }
}

#[cfg(feature = "aws")]
impl From<aws_sdk_s3::Client> for NativeClient {
    fn from(client: aws_sdk_s3::Client) -> Self {
        NativeClient::Aws(client)
    }
}

#[cfg(feature = "azure")]
impl From<azure_storage_blobs::prelude::BlobServiceClient> for NativeClient {
    fn from(client: azure_storage_blobs::prelude::BlobServiceClient) -> Self {
        NativeClient::Azure(client)
    }
}

#[cfg(feature = "gcp")]
impl From<gcloud_storage::client::Client> for NativeClient {
    fn from(client: gcloud_storage::client::Client) -> Self {
        NativeClient::Gcp(client)
    }
}

/// Entry point for wrapping an already-built native client.
pub struct ClientFactory;

impl ClientFactory {
    /// Non-blocking adapter for `native`.
    ///
    /// Accepts a [`NativeClient`] or any of the native client types it wraps;
    /// anything else fails with [`Error::UnsupportedClient`].
    pub fn async_client<T: Any + Send>(native: T) -> Result<Arc<dyn BlobStorageAsyncClient>> {
        let native = NativeClient::detect(native)?;
        debug!(provider = %native.provider(), "dispatching native client");

        let adapter: Arc<dyn BlobStorageAsyncClient> = match native {
            #[cfg(feature = "aws")]
            NativeClient::Aws(client) => Arc::new(AwsAdapter::new(client)),
            #[cfg(feature = "azure")]
            NativeClient::Azure(client) => Arc::new(AzureAdapter::new(client)),
            #[cfg(feature = "gcp")]
            NativeClient::Gcp(client) => Arc::new(GcpAdapter::new(client)),
        };
        Ok(adapter)
    }

    /// Blocking adapter for `native`, with the same dispatch rules as
    /// [`async_client`](Self::async_client).
    pub fn sync_client<T: Any + Send>(native: T) -> Result<Arc<dyn BlobStorageSyncClient>> {
        let inner = Self::async_client(native)?;
        Ok(Arc::new(BlockingClient::new(inner)))
    }
}
