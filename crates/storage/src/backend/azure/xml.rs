//! Request and response bodies of the blob service.

use crate::error::{ErrorKind, Result};
use crate::models::{BlobInfo, BlockList, Digest};
use exn::ResultExt;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: Blobs,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    blob: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties")]
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    #[serde(rename = "Content-Length", default)]
    content_length: u64,
    #[serde(rename = "Content-MD5", default)]
    content_md5: Option<String>,
}

/// One page of a `List Blobs` response.
#[derive(Debug)]
pub(super) struct ListPage {
    pub(super) blobs: Vec<BlobInfo>,
    pub(super) next_marker: Option<String>,
}

/// Parse a `List Blobs` response body.
///
/// A blob whose `Content-MD5` is empty or cannot be decoded is listed
/// without a digest, which makes the sync upload it again.
pub(super) fn parse_list_page(body: &str) -> Result<ListPage> {
    // The service prefixes its XML with a byte order mark.
    let body = body.trim_start_matches('\u{feff}');
    let results: EnumerationResults = quick_xml::de::from_str(body)
        .or_raise(|| ErrorKind::InvalidResponse("unparseable blob listing".to_string()))?;
    let blobs = results
        .blobs
        .blob
        .into_iter()
        .map(|item| {
            let content_md5 = item.properties.content_md5.filter(|md5| !md5.trim().is_empty()).and_then(|md5| {
                Digest::from_base64(&md5)
                    .inspect_err(|_| {
                        let blob = item.name.as_str();
                        tracing::warn!(blob, content_md5 = md5.as_str(), "Ignoring undecodable content digest")
                    })
                    .ok()
            });
            BlobInfo { name: item.name, size: item.properties.content_length, content_md5 }
        })
        .collect();
    let next_marker = results.next_marker.filter(|marker| !marker.is_empty());
    Ok(ListPage { blobs, next_marker })
}

/// Render a `Put Block List` request body.
pub(super) fn block_list_body(blocks: &BlockList) -> String {
    let mut body = String::from(r#"<?xml version="1.0" encoding="utf-8"?><BlockList>"#);
    for (id, status) in blocks.entries() {
        // Block ids are base64, so they never need escaping.
        body.push_str(&format!("<{0}>{1}</{0}>", status.element(), id));
    }
    body.push_str("</BlockList>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Block;

    const LISTING: &str = "\u{feff}<?xml version=\"1.0\" encoding=\"utf-8\"?>\
        <EnumerationResults ServiceEndpoint=\"https://myaccount.blob.core.windows.net/\" ContainerName=\"default\">\
          <Blobs>\
            <Blob>\
              <Name>a.txt</Name>\
              <Properties>\
                <Last-Modified>Wed, 09 Sep 2009 09:20:02 GMT</Last-Modified>\
                <Content-Length>11</Content-Length>\
                <Content-Type>text/plain</Content-Type>\
                <Content-MD5>XrY7u+Ae7tCTyyK7j1rNww==</Content-MD5>\
                <BlobType>BlockBlob</BlobType>\
              </Properties>\
            </Blob>\
            <Blob>\
              <Name>big.iso</Name>\
              <Properties>\
                <Content-Length>150000000</Content-Length>\
                <Content-MD5 />\
              </Properties>\
            </Blob>\
            <Blob>\
              <Name>broken.bin</Name>\
              <Properties>\
                <Content-Length>3</Content-Length>\
                <Content-MD5>***</Content-MD5>\
              </Properties>\
            </Blob>\
          </Blobs>\
          <NextMarker>2!88!MDAwMDE</NextMarker>\
        </EnumerationResults>";

    #[test]
    fn test_parse_listing() {
        let page = parse_list_page(LISTING).unwrap();
        assert_eq!(page.blobs.len(), 3);
        assert_eq!(page.blobs[0], BlobInfo::new("a.txt", 11).with_content_md5(Digest::of(b"hello world")));
        assert_eq!(page.blobs[1], BlobInfo::new("big.iso", 150_000_000));
        assert_eq!(page.blobs[2], BlobInfo::new("broken.bin", 3));
        assert_eq!(page.next_marker.as_deref(), Some("2!88!MDAwMDE"));
    }

    #[test]
    fn test_parse_empty_last_page() {
        let body = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
            <EnumerationResults ContainerName=\"default\"><Blobs /><NextMarker /></EnumerationResults>";
        let page = parse_list_page(body).unwrap();
        assert!(page.blobs.is_empty());
        assert_eq!(page.next_marker, None);
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_list_page("").unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidResponse(_)));
    }

    #[test]
    fn test_block_list_body() {
        let mut list = BlockList::new();
        list.push(&Block::new(0, vec![0]));
        list.push(&Block::new(1, vec![1]));
        assert_eq!(
            block_list_body(&list),
            concat!(
                "<?xml version=\"1.0\" encoding=\"utf-8\"?>",
                "<BlockList><Latest>NTA=</Latest><Latest>NTE=</Latest></BlockList>"
            )
        );
    }
}
