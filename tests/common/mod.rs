//! In-process fake of the blob endpoint used by the integration tests.
//!
//! Serves a path-style listing at `/{account}/{container}` and blob bodies
//! at `/{account}/{container}/{*name}`, and counts how many blob requests
//! are being served at once.
//!
//! Blob query flags:
//! - `chunked=1`  → stream the body without a content length
//! - `redirect=1` → answer with a redirect to the plain blob URL

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};
use blobscan::models::ObjectDescriptor;
use std::{
    collections::{BTreeMap, HashMap},
    io,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;
use url::Url;

pub const ACCOUNT: &str = "acct";
pub const CONTAINER: &str = "box";

/// A blob the fake service knows about.
#[derive(Clone, Debug)]
pub struct Blob {
    pub name: String,
    pub body: Vec<u8>,
    pub properties: Vec<(String, String)>,
}

impl Blob {
    pub fn new(name: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            body: body.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: &str) -> Self {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }
}

/// Request counters shared with the handlers.
#[derive(Debug, Default)]
pub struct Stats {
    pub requests: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a Stats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a Stats) -> Self {
        stats.requests.fetch_add(1, Ordering::SeqCst);
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
struct AppState {
    base: String,
    blobs: Arc<Vec<Blob>>,
    stats: Arc<Stats>,
    delay: Duration,
}

pub struct FakeBlobService {
    pub addr: SocketAddr,
    pub stats: Arc<Stats>,
}

impl FakeBlobService {
    pub async fn start(blobs: Vec<Blob>) -> Self {
        Self::start_with_delay(blobs, Duration::ZERO).await
    }

    /// Start serving; every blob response waits `delay` before answering.
    pub async fn start_with_delay(blobs: Vec<Blob>, delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let stats = Arc::new(Stats::default());

        let state = AppState {
            base: format!("http://{}", addr),
            blobs: Arc::new(blobs),
            stats: stats.clone(),
            delay,
        };
        let app = Router::new()
            .route("/{account}/{container}", get(list_container))
            .route("/{account}/{container}/{*name}", get(get_blob))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, stats }
    }

    /// Path-style endpoint for `ListingClient::with_endpoint`.
    pub fn endpoint(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    pub fn blob_url(&self, name: &str) -> String {
        format!("http://{}/{}/{}/{}", self.addr, ACCOUNT, CONTAINER, name)
    }

    /// Descriptor for `name` as the listing would report it.
    pub fn descriptor(&self, name: &str) -> Arc<ObjectDescriptor> {
        self.descriptor_with_url(name, &self.blob_url(name), BTreeMap::new())
    }

    pub fn descriptor_with_url(
        &self,
        name: &str,
        url: &str,
        properties: BTreeMap<String, String>,
    ) -> Arc<ObjectDescriptor> {
        Arc::new(ObjectDescriptor::new(ACCOUNT, CONTAINER, name, url, properties).unwrap())
    }

    pub fn max_in_flight(&self) -> usize {
        self.stats.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.stats.requests.load(Ordering::SeqCst)
    }
}

async fn list_container(
    State(state): State<AppState>,
    Path((account, container)): Path<(String, String)>,
) -> Response {
    if account != ACCOUNT || container != CONTAINER {
        return (
            StatusCode::NOT_FOUND,
            [(header::CONTENT_TYPE, "application/xml")],
            "<Error><Code>ContainerNotFound</Code></Error>",
        )
            .into_response();
    }

    let mut xml = String::from(r#"<?xml version="1.0" encoding="utf-8"?>"#);
    xml.push_str(&format!(
        r#"<EnumerationResults ContainerName="{}/{}/{}"><Blobs>"#,
        state.base, account, container
    ));
    for blob in state.blobs.iter() {
        xml.push_str("<Blob>");
        xml.push_str(&format!("<Name>{}</Name>", xml_escape(&blob.name)));
        xml.push_str(&format!(
            "<Url>{}/{}/{}/{}</Url>",
            state.base,
            account,
            container,
            xml_escape(&blob.name)
        ));
        xml.push_str("<Properties>");
        xml.push_str(&format!("<Content-Length>{}</Content-Length>", blob.body.len()));
        for (key, value) in &blob.properties {
            xml.push_str(&format!("<{key}>{}</{key}>", xml_escape(value)));
        }
        xml.push_str("<Content-Encoding /></Properties></Blob>");
    }
    xml.push_str("</Blobs><NextMarker /></EnumerationResults>");

    ([(header::CONTENT_TYPE, "application/xml")], xml).into_response()
}

async fn get_blob(
    State(state): State<AppState>,
    Path((account, container, name)): Path<(String, String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if query.contains_key("redirect") {
        return Redirect::temporary(&format!("/{}/{}/{}", account, container, name))
            .into_response();
    }

    let _guard = InFlight::enter(&state.stats);
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }

    let Some(blob) = state.blobs.iter().find(|b| b.name == name) else {
        return (StatusCode::NOT_FOUND, "BlobNotFound").into_response();
    };

    if query.contains_key("chunked") {
        let pieces: Vec<Result<Vec<u8>, io::Error>> =
            blob.body.chunks(700).map(|c| Ok(c.to_vec())).collect();
        return Body::from_stream(futures::stream::iter(pieces)).into_response();
    }

    blob.body.clone().into_response()
}

fn xml_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
