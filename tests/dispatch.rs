// tests/dispatch.rs
//
// Dispatcher selection in both modes, and the blocking bridge end to end.

mod common;

use std::sync::Arc;
use ubsa::{BlobStorageSyncClient, ClientFactory, Error, NativeClient, Provider};

#[cfg(feature = "aws")]
#[test]
fn test_aws_client_dispatches_in_both_modes() {
    let native = common::s3_client("http://127.0.0.1:9000");

    let async_client = ClientFactory::async_client(native.clone()).unwrap();
    assert_eq!(async_client.provider(), Provider::Aws);
    assert!(async_client.unwrap::<aws_sdk_s3::Client>().is_some());
    assert!(async_client.unwrap::<String>().is_none());

    let sync_client = ClientFactory::sync_client(native).unwrap();
    assert_eq!(sync_client.provider(), Provider::Aws);
    assert!(sync_client.unwrap::<aws_sdk_s3::Client>().is_some());
}

#[cfg(feature = "azure")]
#[test]
fn test_azure_client_dispatches_in_both_modes() {
    let native = common::azure_client("http://127.0.0.1:10000/devstoreaccount1");

    let async_client = ClientFactory::async_client(native.clone()).unwrap();
    assert_eq!(async_client.provider(), Provider::Azure);

    let sync_client = ClientFactory::sync_client(native).unwrap();
    assert_eq!(sync_client.provider(), Provider::Azure);
    assert!(sync_client
        .unwrap::<azure_storage_blobs::prelude::BlobServiceClient>()
        .is_some());
}

#[cfg(feature = "gcp")]
#[test]
fn test_gcp_client_dispatches_in_both_modes() {
    let native = common::gcs_client("http://127.0.0.1:4443");

    let async_client = ClientFactory::async_client(native.clone()).unwrap();
    assert_eq!(async_client.provider(), Provider::Gcp);

    let sync_client = ClientFactory::sync_client(native).unwrap();
    assert_eq!(sync_client.provider(), Provider::Gcp);
    assert!(sync_client.unwrap::<gcloud_storage::client::Client>().is_some());
}

#[cfg(feature = "gcp")]
#[test]
fn test_native_client_enum_dispatches() {
    let native = NativeClient::from(common::gcs_client("http://127.0.0.1:4443"));
    assert_eq!(native.provider(), Provider::Gcp);

    let client = ClientFactory::async_client(native).unwrap();
    assert_eq!(client.provider(), Provider::Gcp);
}

#[test]
fn test_unsupported_type_is_rejected() {
    let err = ClientFactory::async_client(Arc::new(5u8))
        .err()
        .expect("u8 is not a storage client");
    match err {
        Error::UnsupportedClient { type_name } => assert!(type_name.contains("u8")),
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(
        NativeClient::detect(String::from("s3://bkt")),
        Err(Error::UnsupportedClient { .. })
    ));
}

#[cfg(feature = "aws")]
#[test]
fn test_blocking_client_round_trips_through_mock() {
    let mut server = mockito::Server::new();
    server
        .mock("HEAD", common::path("/bkt"))
        .with_status(404)
        .create();
    server
        .mock("HEAD", common::path("/bkt/present.txt"))
        .with_status(200)
        .with_header("etag", "\"p\"")
        .create();

    let client: Arc<dyn BlobStorageSyncClient> =
        ClientFactory::sync_client(common::s3_client(&server.url())).unwrap();

    assert!(!tokio_test::assert_ok!(client.bucket_exists(common::BUCKET)));
    assert!(tokio_test::assert_ok!(client.blob_exists(common::BUCKET, "present.txt")));
}

#[cfg(feature = "aws")]
#[test]
fn test_blocking_client_validates_before_io() {
    let mut server = mockito::Server::new();
    let any = server.mock("GET", mockito::Matcher::Any).expect(0).create();

    let client = ClientFactory::sync_client(common::s3_client(&server.url())).unwrap();
    let err = tokio_test::assert_err!(client.get_byte_range(common::BUCKET, "k", 3, 1));
    assert!(matches!(err, Error::InvalidArgument(_)));

    let err = client
        .generate_get_url(common::BUCKET, "k", chrono::Duration::seconds(0))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    any.assert();
}

#[cfg(feature = "aws")]
#[tokio::test(flavor = "multi_thread")]
async fn test_blocking_client_inside_runtime() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("HEAD", common::path("/bkt"))
        .with_status(200)
        .create_async()
        .await;

    let client = ClientFactory::sync_client(common::s3_client(&server.url())).unwrap();
    let exists = tokio::task::spawn_blocking(move || client.bucket_exists(common::BUCKET))
        .await
        .unwrap()
        .unwrap();
    assert!(exists);
}
