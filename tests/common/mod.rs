// tests/common/mod.rs
//
// Native clients pointed at a local mockito server.

#![allow(dead_code)]

use mockito::Matcher;

pub const BUCKET: &str = "bkt";

/// Matches `path` exactly, with or without a query string.
pub fn path(path: &str) -> Matcher {
    Matcher::Regex(format!(r"^{}(\?.*)?$", regex_escape(path)))
}

fn regex_escape(value: &str) -> String {
    value
        .chars()
        .flat_map(|c| match c {
            '.' | '?' | '*' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\' => {
                vec!['\\', c]
            }
            _ => vec![c],
        })
        .collect()
}

#[cfg(feature = "aws")]
pub fn s3_client(endpoint: &str) -> aws_sdk_s3::Client {
    use aws_sdk_s3::config::retry::RetryConfig;
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    let config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
        .endpoint_url(endpoint)
        .force_path_style(true)
        .retry_config(RetryConfig::disabled())
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

#[cfg(feature = "gcp")]
pub fn gcs_client(endpoint: &str) -> gcloud_storage::client::Client {
    use gcloud_storage::client::{Client, ClientConfig};

    let config = ClientConfig {
        storage_endpoint: endpoint.to_string(),
        ..ClientConfig::default()
    }
    .anonymous();
    Client::new(config)
}

#[cfg(feature = "azure")]
pub fn azure_client(endpoint: &str) -> azure_storage_blobs::prelude::BlobServiceClient {
    use azure_storage::{CloudLocation, StorageCredentials};
    use azure_storage_blobs::prelude::ClientBuilder;

    let location = CloudLocation::Custom {
        account: "devstoreaccount1".to_string(),
        uri: endpoint.trim_end_matches('/').to_string(),
    };
    ClientBuilder::with_location(location, StorageCredentials::anonymous()).blob_service_client()
}

/// JSON error body as returned by the GCS JSON API
pub fn gcs_error(code: u16, reason: &str, message: &str) -> String {
    format!(
        r#"{{"error":{{"code":{code},"message":"{message}","errors":[{{"domain":"global","reason":"{reason}","message":"{message}"}}]}}}}"#
    )
}

/// XML error body as returned by S3
pub fn s3_error(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{code}</Code><Message>{message}</Message><RequestId>req-1</RequestId></Error>"#
    )
}

/// RFC 1123 timestamp used in mocked response headers
pub const HTTP_DATE: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

/// Headers the Azure SDK needs to read blob properties off a response.
#[cfg(feature = "azure")]
pub fn azure_blob_headers(mock: mockito::Mock, etag: &str) -> mockito::Mock {
    azure_response_headers(mock)
        .with_header("last-modified", HTTP_DATE)
        .with_header("x-ms-creation-time", HTTP_DATE)
        .with_header("etag", etag)
        .with_header("x-ms-blob-type", "BlockBlob")
        .with_header("x-ms-server-encrypted", "true")
}

/// Headers every Azure Blob service response carries.
#[cfg(feature = "azure")]
pub fn azure_response_headers(mock: mockito::Mock) -> mockito::Mock {
    mock.with_header("x-ms-request-id", "8f0c7a4e-0c1b-4a55-9f49-7f3d2c1b0a01")
        .with_header("x-ms-version", "2022-11-02")
        .with_header("date", HTTP_DATE)
}

/// One `List Blobs` result page. Each entry is `(name, size, expiry)`.
#[cfg(feature = "azure")]
pub fn azure_blob_list(blobs: &[(&str, u64, Option<&str>)], next_marker: Option<&str>) -> String {
    let mut body = String::from(
        r#"<?xml version="1.0" encoding="utf-8"?><EnumerationResults ServiceEndpoint="http://127.0.0.1/" ContainerName="bkt"><Blobs>"#,
    );
    for (name, size, expiry) in blobs {
        body.push_str(&format!(
            "<Blob><Name>{name}</Name><Properties>\
             <Creation-Time>{HTTP_DATE}</Creation-Time>\
             <Last-Modified>{HTTP_DATE}</Last-Modified>"
        ));
        if let Some(expiry) = expiry {
            body.push_str(&format!("<Expiry-Time>{expiry}</Expiry-Time>"));
        }
        body.push_str(&format!(
            "<Etag>0x{size:X}</Etag>\
             <Content-Length>{size}</Content-Length>\
             <Content-Type>application/octet-stream</Content-Type>\
             <BlobType>BlockBlob</BlobType>\
             <ServerEncrypted>true</ServerEncrypted>\
             </Properties></Blob>"
        ));
    }
    body.push_str("</Blobs>");
    if let Some(marker) = next_marker {
        body.push_str(&format!("<NextMarker>{marker}</NextMarker>"));
    }
    body.push_str("</EnumerationResults>");
    body
}

/// A GCS object resource named `name` in the shared bucket.
#[cfg(feature = "gcp")]
pub fn gcs_object(name: &str, size: u64) -> serde_json::Value {
    serde_json::json!({
        "kind": "storage#object",
        "id": format!("{BUCKET}/{name}/1"),
        "selfLink": format!("http://localhost/storage/v1/b/{BUCKET}/o/{name}"),
        "mediaLink": format!("http://localhost/download/storage/v1/b/{BUCKET}/o/{name}?alt=media"),
        "name": name,
        "bucket": BUCKET,
        "generation": "1",
        "metageneration": "1",
        "contentType": "application/octet-stream",
        "storageClass": "STANDARD",
        "size": size.to_string(),
        "md5Hash": "XrY7u+Ae7tCTyyK7j1rNww==",
        "crc32c": "yZRlqg==",
        "etag": format!("etag-{name}"),
        "timeCreated": "2024-01-01T00:00:00.000Z",
        "updated": "2024-01-02T00:00:00.000Z",
        "timeStorageClassUpdated": "2024-01-01T00:00:00.000Z"
    })
}

/// A GCS bucket resource.
#[cfg(feature = "gcp")]
pub fn gcs_bucket(name: &str) -> serde_json::Value {
    serde_json::json!({
        "kind": "storage#bucket",
        "id": name,
        "name": name,
        "projectNumber": "123456789",
        "metageneration": "1",
        "location": "US",
        "storageClass": "STANDARD",
        "etag": "CAE=",
        "locationType": "multi-region",
        "timeCreated": "2024-01-01T00:00:00.000Z",
        "updated": "2024-01-02T00:00:00.000Z"
    })
}
