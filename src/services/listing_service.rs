//! src/services/listing_service.rs
//!
//! ListingClient: issues the "list container contents" request against the
//! blob endpoint and turns the XML enumeration into descriptors. Only the
//! first page of a listing is read; continuation markers are reported but
//! not followed.

use crate::models::{DescriptorError, ObjectCollection, ObjectDescriptor};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};
use reqwest::{Client, StatusCode};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Host suffix of the public blob endpoint: `{account}.blob.core.windows.net`.
pub const DEFAULT_BLOB_HOST: &str = "blob.core.windows.net";

const LIST_QUERY: &str = "restype=container&comp=list";

const ROOT: &str = "EnumerationResults";
const BLOB: [&str; 3] = [ROOT, "Blobs", "Blob"];
const BLOB_NAME: [&str; 4] = [ROOT, "Blobs", "Blob", "Name"];
const BLOB_URL: [&str; 4] = [ROOT, "Blobs", "Blob", "Url"];
const BLOB_PROPERTIES: [&str; 4] = [ROOT, "Blobs", "Blob", "Properties"];
const NEXT_MARKER: [&str; 2] = [ROOT, "NextMarker"];

#[derive(Debug, Error)]
pub enum ListingError {
    #[error("invalid listing endpoint for account `{account}`: {reason}")]
    InvalidEndpoint { account: String, reason: String },
    #[error("listing request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("listing request to `{url}` returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("listing body is empty")]
    EmptyDocument,
    #[error("listing body ended inside `<{0}>`")]
    Truncated(String),
    #[error("unexpected listing root element `{0}`")]
    UnexpectedRoot(String),
    #[error("blob entry {index} is missing required field `{field}`")]
    MissingField { index: usize, field: &'static str },
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

pub type ListingResult<T> = Result<T, ListingError>;

/// One parsed listing page.
#[derive(Debug)]
pub struct Listing {
    pub objects: ObjectCollection,
    /// Continuation marker when the provider truncated the enumeration.
    pub next_marker: Option<String>,
}

/// Client for the container listing endpoint. Requests are anonymous.
#[derive(Clone, Debug)]
pub struct ListingClient {
    http: Client,
    /// Path-style endpoint (`{endpoint}/{account}`) used instead of the
    /// public `{account}.blob.core.windows.net` host, e.g. for emulators.
    endpoint: Option<Url>,
}

impl ListingClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            endpoint: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: Option<Url>) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Build the listing URL for `account`/`container`.
    pub fn listing_url(&self, account: &str, container: &str) -> ListingResult<Url> {
        let invalid = |reason: String| ListingError::InvalidEndpoint {
            account: account.to_string(),
            reason,
        };

        let mut url = match &self.endpoint {
            Some(endpoint) => {
                let mut url = endpoint.clone();
                url.path_segments_mut()
                    .map_err(|_| invalid(format!("`{}` cannot be a base url", endpoint)))?
                    .pop_if_empty()
                    .push(account)
                    .push(container);
                url
            }
            None => Url::parse(&format!("https://{}.{}/", account, DEFAULT_BLOB_HOST))
                .map_err(|err| invalid(err.to_string()))
                .and_then(|mut url| {
                    url.path_segments_mut()
                        .map_err(|_| invalid("host-only url".into()))?
                        .pop_if_empty()
                        .push(container);
                    Ok(url)
                })?,
        };
        url.set_query(Some(LIST_QUERY));
        Ok(url)
    }

    /// List every object in the container (first page only).
    pub async fn list(&self, account: &str, container: &str) -> ListingResult<ObjectCollection> {
        let url = self.listing_url(account, container)?;
        debug!("Listing container via {}", url);

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ListingError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ListingError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ListingError::Request {
                url: url.to_string(),
                source,
            })?;

        let listing = parse_listing(account, container, &body)?;
        if let Some(marker) = &listing.next_marker {
            warn!(
                "Listing of {}/{} was truncated at marker `{}`; only the first {} objects are visible",
                account,
                container,
                marker,
                listing.objects.len()
            );
        }

        tracing::info!(
            "Listed {} objects in {}/{}",
            listing.objects.len(),
            account,
            container
        );
        Ok(listing.objects)
    }
}

#[derive(Default)]
struct BlobEntry {
    name: Option<String>,
    url: Option<String>,
    properties: BTreeMap<String, String>,
}

/// Parse an `EnumerationResults` document.
///
/// Every `Blob` must carry non-empty `Name` and `Url` elements. Children of
/// `Properties` with text become properties; empty ones are skipped.
pub fn parse_listing(account: &str, container: &str, body: &str) -> ListingResult<Listing> {
    let mut reader = Reader::from_str(body.trim_start_matches('\u{feff}'));

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut entry: Option<BlobEntry> = None;
    let mut objects = Vec::new();
    let mut next_marker = None;
    let mut saw_root = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = local_name(&e);
                if path.is_empty() {
                    expect_root(&name)?;
                    saw_root = true;
                }
                path.push(name);
                text.clear();
                if at(&path, &BLOB) {
                    entry = Some(BlobEntry::default());
                }
            }
            Event::Empty(e) => {
                let name = local_name(&e);
                if path.is_empty() {
                    expect_root(&name)?;
                    saw_root = true;
                } else if at(&path, &BLOB[..2]) && name == "Blob" {
                    return Err(ListingError::MissingField {
                        index: objects.len(),
                        field: "Name",
                    });
                }
            }
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(_) => {
                let value = std::mem::take(&mut text);
                if let Some(current) = entry.as_mut() {
                    if at(&path, &BLOB_NAME) {
                        current.name = Some(value.clone());
                    } else if at(&path, &BLOB_URL) {
                        current.url = Some(value.trim().to_string());
                    } else if path.len() == BLOB_PROPERTIES.len() + 1
                        && at(&path[..BLOB_PROPERTIES.len()], &BLOB_PROPERTIES)
                    {
                        let value = value.trim();
                        if !value.is_empty() {
                            current
                                .properties
                                .insert(path[BLOB_PROPERTIES.len()].clone(), value.to_string());
                        }
                    }
                }
                if at(&path, &BLOB) {
                    if let Some(done) = entry.take() {
                        objects.push(build_descriptor(account, container, objects.len(), done)?);
                    }
                } else if at(&path, &NEXT_MARKER) {
                    let value = value.trim();
                    if !value.is_empty() {
                        next_marker = Some(value.to_string());
                    }
                }
                path.pop();
            }
            Event::Eof => {
                if let Some(open) = path.last() {
                    return Err(ListingError::Truncated(open.clone()));
                }
                break;
            }
            _ => {}
        }
    }

    if !saw_root {
        return Err(ListingError::EmptyDocument);
    }

    Ok(Listing {
        objects: ObjectCollection::new(objects),
        next_marker,
    })
}

fn build_descriptor(
    account: &str,
    container: &str,
    index: usize,
    entry: BlobEntry,
) -> ListingResult<ObjectDescriptor> {
    let name = entry
        .name
        .filter(|n| !n.is_empty())
        .ok_or(ListingError::MissingField {
            index,
            field: "Name",
        })?;
    let url = entry
        .url
        .filter(|u| !u.is_empty())
        .ok_or(ListingError::MissingField { index, field: "Url" })?;

    Ok(ObjectDescriptor::new(
        account,
        container,
        name,
        &url,
        entry.properties,
    )?)
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn expect_root(name: &str) -> ListingResult<()> {
    if name == ROOT {
        Ok(())
    } else {
        Err(ListingError::UnexpectedRoot(name.to_string()))
    }
}

fn at(path: &[String], expected: &[&str]) -> bool {
    path.len() == expected.len() && path.iter().zip(expected).all(|(a, b)| a == b)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ContainerName="https://acct.blob.core.windows.net/docs">
  <Blobs>
    <Blob>
      <Name>reports/q1.pdf</Name>
      <Url>https://acct.blob.core.windows.net/docs/reports/q1.pdf</Url>
      <Properties>
        <Last-Modified>Mon, 02 Jan 2023 10:00:00 GMT</Last-Modified>
        <Etag>0x8DAEC</Etag>
        <Content-Length>2048</Content-Length>
        <Content-Type>application/pdf</Content-Type>
        <Content-Encoding />
        <Content-MD5></Content-MD5>
      </Properties>
    </Blob>
    <Blob>
      <Name>R&amp;D notes</Name>
      <Url>https://acct.blob.core.windows.net/docs/R&amp;D%20notes</Url>
      <Properties />
    </Blob>
  </Blobs>
  <NextMarker />
</EnumerationResults>"#;

    #[test]
    fn test_parse_listing_entries() {
        let listing = parse_listing("acct", "docs", LISTING).unwrap();
        let objects: Vec<_> = listing.objects.iter().collect();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].name(), "reports/q1.pdf");
        assert_eq!(objects[0].account(), "acct");
        assert_eq!(objects[0].container(), "docs");
        assert_eq!(objects[0].extension(), "pdf");
        assert_eq!(objects[0].content_length(), Some(2048));
        assert_eq!(objects[0].content_type(), Some("application/pdf"));
        assert_eq!(objects[0].properties().len(), 4);
        assert!(objects[0].property("Content-Encoding").is_none());
        assert!(objects[0].content_md5().is_none());

        assert_eq!(objects[1].name(), "R&D notes");
        assert!(objects[1].properties().is_empty());
        assert!(listing.next_marker.is_none());
    }

    #[test]
    fn test_parse_empty_blobs() {
        for body in [
            "<EnumerationResults><Blobs /></EnumerationResults>",
            "<EnumerationResults><Blobs></Blobs></EnumerationResults>",
            "\u{feff}<?xml version=\"1.0\"?><EnumerationResults/>",
        ] {
            let listing = parse_listing("a", "c", body).unwrap();
            assert!(listing.objects.is_empty(), "body: {body}");
        }
    }

    #[test]
    fn test_parse_missing_url_fails() {
        let body = "<EnumerationResults><Blobs><Blob><Name>a.txt</Name></Blob></Blobs></EnumerationResults>";
        assert!(matches!(
            parse_listing("a", "c", body),
            Err(ListingError::MissingField { index: 0, field: "Url" })
        ));
    }

    #[test]
    fn test_parse_missing_name_fails() {
        let body = "<EnumerationResults><Blobs>\
            <Blob><Name>a.txt</Name><Url>https://h/c/a.txt</Url></Blob>\
            <Blob><Name></Name><Url>https://h/c/b.txt</Url></Blob>\
            </Blobs></EnumerationResults>";
        assert!(matches!(
            parse_listing("a", "c", body),
            Err(ListingError::MissingField { index: 1, field: "Name" })
        ));

        let body = "<EnumerationResults><Blobs><Blob/></Blobs></EnumerationResults>";
        assert!(matches!(
            parse_listing("a", "c", body),
            Err(ListingError::MissingField { index: 0, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_other_documents() {
        assert!(matches!(
            parse_listing("a", "c", "<Error><Code>ResourceNotFound</Code></Error>"),
            Err(ListingError::UnexpectedRoot(root)) if root == "Error"
        ));
        assert!(matches!(
            parse_listing("a", "c", ""),
            Err(ListingError::EmptyDocument)
        ));
        assert!(matches!(
            parse_listing("a", "c", "<EnumerationResults><Blobs></EnumerationResults>"),
            Err(ListingError::Xml(_))
        ));
    }

    #[test]
    fn test_parse_rejects_truncated_body() {
        let cut_in_entry = "<EnumerationResults><Blobs><Blob><Name>a.txt</Name><Url>https://h/c/a.txt</Url></Blob><Blob><Name>b.t";
        assert!(matches!(
            parse_listing("a", "c", cut_in_entry),
            Err(ListingError::Truncated(open)) if open == "Name"
        ));

        let cut_between_entries = "<EnumerationResults><Blobs><Blob><Name>a.txt</Name><Url>https://h/c/a.txt</Url></Blob>";
        assert!(matches!(
            parse_listing("a", "c", cut_between_entries),
            Err(ListingError::Truncated(open)) if open == "Blobs"
        ));
    }

    #[test]
    fn test_parse_invalid_url_is_descriptor_error() {
        let body = "<EnumerationResults><Blobs><Blob><Name>a</Name><Url>nope</Url></Blob></Blobs></EnumerationResults>";
        assert!(matches!(
            parse_listing("a", "c", body),
            Err(ListingError::Descriptor(DescriptorError::InvalidUrl { .. }))
        ));
    }

    #[test]
    fn test_parse_next_marker() {
        let body = "<EnumerationResults><Blobs/><NextMarker>2!72!abc</NextMarker></EnumerationResults>";
        let listing = parse_listing("a", "c", body).unwrap();
        assert_eq!(listing.next_marker.as_deref(), Some("2!72!abc"));
    }

    #[test]
    fn test_listing_url_public_host() {
        let client = ListingClient::new(Client::new());
        let url = client.listing_url("acct", "docs").unwrap();
        assert_eq!(
            url.as_str(),
            "https://acct.blob.core.windows.net/docs?restype=container&comp=list"
        );
    }

    #[test]
    fn test_listing_url_custom_endpoint() {
        let endpoint = Url::parse("http://127.0.0.1:10000/").unwrap();
        let client = ListingClient::new(Client::new()).with_endpoint(Some(endpoint));
        let url = client.listing_url("devstore", "box").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:10000/devstore/box?restype=container&comp=list"
        );
    }

    #[test]
    fn test_listing_url_invalid_account() {
        let client = ListingClient::new(Client::new());
        assert!(matches!(
            client.listing_url("bad host", "docs"),
            Err(ListingError::InvalidEndpoint { .. })
        ));
    }
}
