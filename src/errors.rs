//! Error types for ubsa
//!
//! Every failure a caller can observe is an [`Error`]. Provider failures are
//! carried by [`UbsaError`], which wraps exactly one native SDK error tagged
//! with its family ([`NativeError`]) so callers can still reach the typed
//! value when they need provider-specific detail.

use thiserror::Error;

use crate::config::Provider;

/// Main error type for ubsa operations
#[derive(Error, Debug)]
pub enum Error {
    /// A native SDK call failed
    #[error(transparent)]
    Storage(#[from] UbsaError),

    /// Caller supplied an invalid argument (bad range, non-positive expiry, missing key)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider selection or client construction failed
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dispatcher was handed a value that is not a supported native client
    #[error(
        "Unsupported native client type {type_name}; expected one of \
         aws_sdk_s3::Client, azure_storage_blobs::prelude::BlobServiceClient, \
         gcloud_storage::client::Client"
    )]
    UnsupportedClient { type_name: &'static str },

    /// The blocking bridge could not run the operation
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// A provider returned a URL that does not parse
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True if this is a provider error that reports a missing bucket or object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Storage(e) if e.is_not_found())
    }

    /// The wrapped provider error, if this is one.
    pub fn as_storage(&self) -> Option<&UbsaError> {
        match self {
            Error::Storage(e) => Some(e),
            _ => None,
        }
    }
}

/// A failed native SDK call, with an operation-specific message.
#[derive(Error, Debug)]
#[error("{message}: {source}")]
pub struct UbsaError {
    message: String,
    #[source]
    source: NativeError,
}

impl UbsaError {
    pub fn new(message: impl Into<String>, source: impl Into<NativeError>) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Provider whose SDK produced the wrapped error
    pub fn provider(&self) -> Provider {
        self.source.provider()
    }

    /// Borrow the wrapped native error
    pub fn native(&self) -> &NativeError {
        &self.source
    }

    /// Take the wrapped native error
    pub fn into_native(self) -> NativeError {
        self.source
    }

    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

/// One variant per native error family.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum NativeError {
    #[cfg(feature = "aws")]
    #[error(transparent)]
    Aws(Box<aws_sdk_s3::Error>),

    /// Failure while streaming an S3 response body
    #[cfg(feature = "aws")]
    #[error(transparent)]
    AwsBody(aws_sdk_s3::primitives::ByteStreamError),

    #[cfg(feature = "azure")]
    #[error(transparent)]
    Azure(azure_core::Error),

    #[cfg(feature = "gcp")]
    #[error(transparent)]
    Gcp(gcloud_storage::http::Error),

    #[cfg(feature = "gcp")]
    #[error(transparent)]
    GcpSigning(gcloud_storage::sign::SignedURLError),
}

impl NativeError {
    pub fn provider(&self) -> Provider {
        match self {
            #[cfg(feature = "aws")]
            NativeError::Aws(_) | NativeError::AwsBody(_) => Provider::Aws,
            #[cfg(feature = "azure")]
            NativeError::Azure(_) => Provider::Azure,
            #[cfg(feature = "gcp")]
            NativeError::Gcp(_) | NativeError::GcpSigning(_) => Provider::Gcp,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            #[cfg(feature = "aws")]
            NativeError::Aws(e) => crate::storage::aws::is_not_found_error(e),
            #[cfg(feature = "aws")]
            NativeError::AwsBody(_) => false,
            #[cfg(feature = "azure")]
            NativeError::Azure(e) => crate::storage::azure::is_not_found(e),
            #[cfg(feature = "gcp")]
            NativeError::Gcp(e) => crate::storage::gcp::is_not_found(e),
            #[cfg(feature = "gcp")]
            NativeError::GcpSigning(_) => false,
        }
    }

    #[cfg(feature = "aws")]
    pub fn as_aws(&self) -> Option<&aws_sdk_s3::Error> {
        match self {
            NativeError::Aws(e) => Some(e),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "azure")]
    pub fn as_azure(&self) -> Option<&azure_core::Error> {
        match self {
            NativeError::Azure(e) => Some(e),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }

    #[cfg(feature = "gcp")]
    pub fn as_gcp(&self) -> Option<&gcloud_storage::http::Error> {
        match self {
            NativeError::Gcp(e) => Some(e),
            #[allow(unreachable_patterns)]
            _ => None,
        }
    }
}

#[cfg(feature = "aws")]
impl From<aws_sdk_s3::Error> for NativeError {
    fn from(e: aws_sdk_s3::Error) -> Self {
        NativeError::Aws(Box::new(e))
    }
}

#[cfg(feature = "aws")]
impl From<aws_sdk_s3::primitives::ByteStreamError> for NativeError {
    fn from(e: aws_sdk_s3::primitives::ByteStreamError) -> Self {
        NativeError::AwsBody(e)
    }
}

#[cfg(feature = "azure")]
impl From<azure_core::Error> for NativeError {
    fn from(e: azure_core::Error) -> Self {
        NativeError::Azure(e)
    }
}

#[cfg(feature = "gcp")]
impl From<gcloud_storage::http::Error> for NativeError {
    fn from(e: gcloud_storage::http::Error) -> Self {
        NativeError::Gcp(e)
    }
}

#[cfg(feature = "gcp")]
impl From<gcloud_storage::sign::SignedURLError> for NativeError {
    fn from(e: gcloud_storage::sign::SignedURLError) -> Self {
        NativeError::GcpSigning(e)
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
