//! UBSA - unified blob storage adapter
//!
//! One storage interface over AWS S3, Azure Blob Storage and Google Cloud
//! Storage, in a non-blocking ([`BlobStorageAsyncClient`]) and a blocking
//! ([`BlobStorageSyncClient`]) flavor with identical operation names.
//!
//! Clients are obtained either by handing an already-configured native SDK
//! client to [`ClientFactory`], which detects its provider, or by building
//! one from raw settings with [`BlobStorageClientBuilder`].
//!
//! ```no_run
//! # async fn demo(s3: aws_sdk_s3::Client) -> ubsa::Result<()> {
//! use ubsa::{Blob, ClientFactory};
//!
//! let client = ClientFactory::async_client(s3)?;
//! let etag = client.create_blob("reports", &Blob::new("q1.csv", "a,b,c")).await?;
//! let head = client.get_byte_range("reports", "q1.csv", 0, 0).await?;
//! assert_eq!(&head[..], b"a");
//! # let _ = etag;
//! # Ok(())
//! # }
//! ```
//!
//! Provider SDKs are behind the `aws`, `azure` and `gcp` features, all
//! enabled by default.

#[cfg(not(any(feature = "aws", feature = "azure", feature = "gcp")))]
compile_error!("enable at least one of the `aws`, `azure` or `gcp` features");

pub mod builder;
pub mod config;
pub mod errors;
pub mod factory;
pub mod metrics;
pub mod model;
pub mod storage;

pub use builder::BlobStorageClientBuilder;
pub use config::{Provider, StorageConfig};
pub use errors::{Error, NativeError, Result, UbsaError};
pub use factory::{ClientFactory, NativeClient};
pub use model::{Blob, Bucket};
pub use storage::{BlobStorageAsyncClient, BlobStorageSyncClient, BlockingClient};

#[cfg(feature = "aws")]
pub use storage::AwsAdapter;
#[cfg(feature = "azure")]
pub use storage::AzureAdapter;
#[cfg(feature = "gcp")]
pub use storage::GcpAdapter;
