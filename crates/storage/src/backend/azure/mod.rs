//! Azure Blob Storage backend.
//!
//! Talks to the Blob service REST API directly: container creation, paged
//! listing, `Put Blob`, `Put Block` and `Put Block List`. Requests are
//! signed with the account's Shared Key.
//!
//! # Credentials
//!
//! The account name and base64 account key are handed over explicitly by
//! the caller (the CLI reads them from configuration). No retry policy is
//! configured: a failed request fails the operation.

mod auth;
mod xml;

use self::auth::SharedKey;
use crate::backend::{BlobInfoStream, MAX_BLOCK_SIZE, MAX_PUT_BLOB_SIZE};
use crate::error::{ErrorKind, Result};
use crate::models::{Block, BlockList, Digest};
use crate::{BlobStore, validate_blob, validate_container};
use async_stream::stream;
use async_trait::async_trait;
use exn::ResultExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Response, StatusCode, Url};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

/// Service version sent with every request.
const API_VERSION: &str = "2021-12-02";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// `x-ms-date` wants an RFC 1123 date in GMT.
const HTTP_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT");

const MS_DATE: HeaderName = HeaderName::from_static("x-ms-date");
const MS_VERSION: HeaderName = HeaderName::from_static("x-ms-version");
const MS_BLOB_TYPE: HeaderName = HeaderName::from_static("x-ms-blob-type");
const MS_BLOB_CONTENT_MD5: HeaderName = HeaderName::from_static("x-ms-blob-content-md5");
const MS_ERROR_CODE: &str = "x-ms-error-code";

/// Azure Blob Storage backend.
///
/// # Examples
///
/// ```no_run
/// use absync_storage::backend::AzureBackend;
///
/// # fn example() -> absync_storage::error::Result<()> {
/// // Public cloud endpoint derived from the account name.
/// let backend = AzureBackend::new("myaccount", "c2VjcmV0LWtleQ==", None)?;
/// // Local emulator.
/// let azurite = AzureBackend::new(
///     "devstoreaccount1",
///     "c2VjcmV0LWtleQ==",
///     Some("http://127.0.0.1:10000/devstoreaccount1"),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AzureBackend {
    client: Client,
    endpoint: Url,
    auth: std::sync::Arc<SharedKey>,
}

impl AzureBackend {
    /// Create a new backend for a storage account.
    ///
    /// # Arguments
    /// * `account` - Storage account name
    /// * `key` - Base64 account key
    /// * `endpoint` - Blob service URL; defaults to
    ///   `https://{account}.blob.core.windows.net/`
    pub fn new(account: impl Into<String>, key: &str, endpoint: Option<&str>) -> Result<Self> {
        let auth = SharedKey::new(account, key)?;
        let endpoint = match endpoint {
            Some(endpoint) => endpoint.to_string(),
            None => format!("https://{}.blob.core.windows.net/", auth.account()),
        };
        let endpoint = Url::parse(&endpoint).or_raise(|| ErrorKind::InvalidEndpoint(endpoint.clone()))?;
        if endpoint.cannot_be_a_base() || endpoint.query().is_some() {
            exn::bail!(ErrorKind::InvalidEndpoint(endpoint.to_string()));
        }
        let client = Client::builder()
            .user_agent(concat!("absync/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .or_raise(|| ErrorKind::Network("failed to initialise HTTP client".to_string()))?;
        Ok(Self { client, endpoint, auth: std::sync::Arc::new(auth) })
    }

    /// Build a resource URL below the endpoint.
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Sign and send a request, without looking at the response status.
    async fn execute(&self, method: Method, url: Url, mut headers: HeaderMap, body: Vec<u8>) -> Result<Response> {
        let date = OffsetDateTime::now_utc()
            .format(HTTP_DATE)
            .or_raise(|| ErrorKind::BackendError("failed to format request date".to_string()))?;
        headers.insert(MS_DATE, header_value(&date)?);
        headers.insert(MS_VERSION, HeaderValue::from_static(API_VERSION));
        let authorization = self.auth.authorization(&method, &url, &headers, body.len())?;
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        let context = format!("{method} {}", url.path());
        tracing::trace!(request = context.as_str(), bytes = body.len(), "Sending blob service request");
        self.client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .or_raise(|| ErrorKind::Network(context.clone()))
    }

    /// Turn a non-success response into an error.
    fn check(response: Response, resource: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = error_code(&response);
        tracing::debug!(status = status.as_u16(), code = code.as_str(), resource, "Blob service rejected request");
        exn::bail!(match status {
            StatusCode::NOT_FOUND => ErrorKind::NotFound(resource.to_string()),
            StatusCode::FORBIDDEN => ErrorKind::PermissionDenied(format!("{resource} ({code})")),
            _ => ErrorKind::Service { status: status.as_u16(), code },
        })
    }

    async fn list_page(&self, container: &str, marker: Option<&str>) -> Result<xml::ListPage> {
        let mut query = vec![("restype", "container"), ("comp", "list")];
        if let Some(marker) = marker {
            query.push(("marker", marker));
        }
        let url = self.url(&[container], &query);
        let response = self.execute(Method::GET, url, HeaderMap::new(), Vec::new()).await?;
        let response = Self::check(response, container)?;
        let body = response
            .text()
            .await
            .or_raise(|| ErrorKind::Network(format!("failed to read listing of {container}")))?;
        xml::parse_list_page(&body)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).or_raise(|| ErrorKind::BackendError(format!("invalid header value {value:?}")))
}

fn error_code(response: &Response) -> String {
    response
        .headers()
        .get(MS_ERROR_CODE)
        .and_then(|code| code.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| response.status().canonical_reason().unwrap_or("Unknown").to_string())
}

#[async_trait]
impl BlobStore for AzureBackend {
    fn name(&self) -> &str {
        self.auth.account()
    }

    async fn create_container_if_absent(&self, container: &str) -> Result<bool> {
        validate_container(container)?;
        let url = self.url(&[container], &[("restype", "container")]);
        // No x-ms-blob-public-access header: the container stays private.
        let response = self.execute(Method::PUT, url, HeaderMap::new(), Vec::new()).await?;
        if response.status() == StatusCode::CONFLICT && error_code(&response) == "ContainerAlreadyExists" {
            tracing::debug!(container, "Container already exists");
            return Ok(false);
        }
        Self::check(response, container)?;
        tracing::debug!(container, "Container created");
        Ok(true)
    }

    fn list_blobs_stream<'a>(&'a self, container: &'a str) -> BlobInfoStream<'a> {
        Box::pin(stream! {
            let mut marker: Option<String> = None;
            loop {
                let page = match self.list_page(container, marker.as_deref()).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        break;
                    },
                };
                for blob in page.blobs {
                    yield Ok(blob);
                }
                match page.next_marker {
                    Some(next) => marker = Some(next),
                    None => break,
                }
            }
        })
    }

    async fn put_blob(&self, container: &str, name: &str, data: Vec<u8>) -> Result<()> {
        validate_blob(name)?;
        if data.len() as u64 > MAX_PUT_BLOB_SIZE {
            exn::bail!(ErrorKind::BackendError(format!(
                "{} bytes exceeds the single upload limit of {MAX_PUT_BLOB_SIZE}",
                data.len()
            )));
        }
        let mut headers = HeaderMap::new();
        headers.insert(MS_BLOB_TYPE, HeaderValue::from_static("BlockBlob"));
        let url = self.url(&[container, name], &[]);
        let response = self.execute(Method::PUT, url, headers, data).await?;
        Self::check(response, name)?;
        Ok(())
    }

    async fn put_block(&self, container: &str, name: &str, block: Block) -> Result<()> {
        validate_blob(name)?;
        if block.len() as u64 > MAX_BLOCK_SIZE {
            exn::bail!(ErrorKind::BackendError(format!(
                "block of {} bytes exceeds the limit of {MAX_BLOCK_SIZE}",
                block.len()
            )));
        }
        let url = self.url(&[container, name], &[("comp", "block"), ("blockid", block.id.as_str())]);
        let response = self.execute(Method::PUT, url, HeaderMap::new(), block.data).await?;
        Self::check(response, name)?;
        Ok(())
    }

    async fn put_block_list(
        &self,
        container: &str,
        name: &str,
        blocks: &BlockList,
        content_md5: Option<&Digest>,
    ) -> Result<()> {
        validate_blob(name)?;
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        if let Some(digest) = content_md5 {
            headers.insert(MS_BLOB_CONTENT_MD5, header_value(&digest.to_base64())?);
        }
        let url = self.url(&[container, name], &[("comp", "blocklist")]);
        let body = xml::block_list_body(blocks).into_bytes();
        let response = self.execute(Method::PUT, url, headers, body).await?;
        Self::check(response, name)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DryRunStore;
    use crate::models::BlobInfo;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const KEY: &str = "c2VjcmV0LWtleQ==";

    #[test]
    fn test_default_endpoint() {
        let backend = AzureBackend::new("myaccount", KEY, None).unwrap();
        assert_eq!(backend.name(), "myaccount");
        assert_eq!(
            backend.url(&["default", "a.txt"], &[]).as_str(),
            "https://myaccount.blob.core.windows.net/default/a.txt"
        );
    }

    #[test]
    fn test_emulator_endpoint_keeps_account_path() {
        let backend =
            AzureBackend::new("devstoreaccount1", KEY, Some("http://127.0.0.1:10000/devstoreaccount1/")).unwrap();
        assert_eq!(
            backend.url(&["default"], &[("restype", "container")]).as_str(),
            "http://127.0.0.1:10000/devstoreaccount1/default?restype=container"
        );
    }

    #[test]
    fn test_blob_names_and_block_ids_are_encoded() {
        let backend = AzureBackend::new("myaccount", KEY, None).unwrap();
        let url = backend.url(&["default", "my file#1.txt"], &[("comp", "block"), ("blockid", "NTA=")]);
        assert_eq!(url.path(), "/default/my%20file%231.txt");
        assert_eq!(url.query(), Some("comp=block&blockid=NTA%3D"));
        let decoded: Vec<_> = url.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(decoded[1], ("blockid".to_string(), "NTA=".to_string()));
    }

    #[test]
    fn test_invalid_endpoint() {
        let err = AzureBackend::new("myaccount", KEY, Some("not a url")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidEndpoint(_)));
        let err = AzureBackend::new("myaccount", KEY, Some("mailto:someone@example.com")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidEndpoint(_)));
    }

    #[test]
    fn test_http_date_format() {
        let date = time::macros::datetime!(2009-10-11 21:49:13 UTC);
        assert_eq!(date.format(HTTP_DATE).unwrap(), "Sun, 11 Oct 2009 21:49:13 GMT");
    }

    #[tokio::test]
    async fn test_oversized_block_rejected_before_sending() {
        let backend = AzureBackend::new("myaccount", KEY, Some("http://127.0.0.1:9/")).unwrap();
        let block = Block::new(0, vec![0; MAX_BLOCK_SIZE as usize + 1]);
        let err = backend.put_block("default", "big.bin", block).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::BackendError(_)));
    }

    /// Local stand-in for the blob service. Every connection is answered
    /// with the next canned response and then closed; the raw requests are
    /// kept for inspection.
    struct FakeService {
        endpoint: String,
        requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeService {
        async fn start(responses: Vec<String>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let endpoint = format!("http://{}/devstoreaccount1", listener.local_addr().unwrap());
            let requests = Arc::new(Mutex::new(Vec::new()));
            let recorded = requests.clone();
            tokio::spawn(async move {
                for response in responses {
                    let (mut socket, _) = listener.accept().await.unwrap();
                    let request = read_request(&mut socket).await;
                    recorded.lock().unwrap().push(request);
                    socket.write_all(response.as_bytes()).await.unwrap();
                    socket.shutdown().await.unwrap();
                }
            });
            Self { endpoint, requests }
        }

        fn backend(&self) -> AzureBackend {
            AzureBackend::new("devstoreaccount1", KEY, Some(&self.endpoint)).unwrap()
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    async fn read_request(socket: &mut TcpStream) -> String {
        let mut request = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            if let Some(end) = request.windows(4).position(|window| window == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&request).into_owned()
    }

    fn response(status: &str, headers: &[(&str, &str)], body: &str) -> String {
        let mut response = format!("HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n", body.len());
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        response.push_str(body);
        response
    }

    fn listing(blob: &str, content_md5: &str, next_marker: &str) -> String {
        format!(
            "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ContainerName=\"default\"><Blobs><Blob><Name>{blob}</Name>\
            <Properties><Content-Length>11</Content-Length><Content-MD5>{content_md5}</Content-MD5></Properties>\
            </Blob></Blobs><NextMarker>{next_marker}</NextMarker></EnumerationResults>"
        )
    }

    #[tokio::test]
    async fn test_listing_follows_next_marker() {
        let service = FakeService::start(vec![
            response("200 OK", &[], &listing("a.txt", "XrY7u+Ae7tCTyyK7j1rNww==", "page2")),
            response("200 OK", &[], &listing("b.txt", "", "")),
        ])
        .await;

        let blobs = service.backend().list_blobs("default").await.unwrap();
        assert_eq!(
            blobs,
            [
                BlobInfo::new("a.txt", 11).with_content_md5(Digest::of(b"hello world")),
                BlobInfo::new("b.txt", 11),
            ]
        );
        let requests = service.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].starts_with("GET /devstoreaccount1/default?restype=container&comp=list HTTP/1.1\r\n"));
        assert!(requests[1].starts_with("GET /devstoreaccount1/default?restype=container&comp=list&marker=page2 "));
        assert!(requests.iter().all(|request| request.contains("x-ms-version: 2021-12-02\r\n")));
        assert!(requests.iter().all(|request| request.contains("authorization: SharedKey devstoreaccount1:")));
    }

    #[tokio::test]
    async fn test_create_container_outcomes() {
        let service = FakeService::start(vec![
            response("201 Created", &[], ""),
            response("409 Conflict", &[("x-ms-error-code", "ContainerAlreadyExists")], ""),
            response("409 Conflict", &[("x-ms-error-code", "ContainerBeingDeleted")], ""),
        ])
        .await;
        let backend = service.backend();

        assert!(backend.create_container_if_absent("default").await.unwrap());
        assert!(!backend.create_container_if_absent("default").await.unwrap());
        let err = backend.create_container_if_absent("default").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Service { status: 409, code } if code == "ContainerBeingDeleted"));
        let requests = service.requests();
        assert!(requests.iter().all(|request| request.starts_with("PUT /devstoreaccount1/default?restype=container ")));
        assert!(requests.iter().all(|request| !request.contains("x-ms-blob-public-access")));
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let service = FakeService::start(vec![
            response("404 Not Found", &[("x-ms-error-code", "ContainerNotFound")], ""),
            response("403 Forbidden", &[("x-ms-error-code", "AuthenticationFailed")], ""),
            response("404 Not Found", &[("x-ms-error-code", "ContainerNotFound")], ""),
        ])
        .await;
        let backend = service.backend();

        let err = backend.list_blobs("default").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(container) if container == "default"));
        let err = backend.put_blob("default", "a.txt", b"hello world".to_vec()).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PermissionDenied(detail) if detail.contains("AuthenticationFailed")));

        // A dry run treats the missing container as empty.
        let dry_run = DryRunStore::new(Arc::new(backend));
        assert!(dry_run.list_blobs("default").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_upload_requests() {
        let service = FakeService::start(vec![
            response("201 Created", &[], ""),
            response("201 Created", &[], ""),
        ])
        .await;
        let backend = service.backend();

        let block = Block::new(0, b"hello world".to_vec());
        let mut list = BlockList::new();
        list.push(&block);
        backend.put_block("default", "big.iso", block).await.unwrap();
        backend.put_block_list("default", "big.iso", &list, Some(&Digest::of(b"hello world"))).await.unwrap();

        let requests = service.requests();
        assert!(requests[0].starts_with("PUT /devstoreaccount1/default/big.iso?comp=block&blockid=NTA%3D "));
        assert!(requests[0].ends_with("\r\n\r\nhello world"));
        assert!(requests[1].starts_with("PUT /devstoreaccount1/default/big.iso?comp=blocklist "));
        assert!(requests[1].contains("x-ms-blob-content-md5: XrY7u+Ae7tCTyyK7j1rNww==\r\n"));
        assert!(requests[1].contains("content-type: application/xml\r\n"));
        assert!(requests[1].ends_with("<BlockList><Latest>NTA=</Latest></BlockList>"));
    }
}
