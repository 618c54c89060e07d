//! Response Server
//!
//! Writes a cached asset to a response sink, choosing between the raw and
//! gzip representations from the request's `Accept-Encoding`.

use std::collections::BTreeMap;
use std::io;

use tracing::trace;

use crate::asset::{AssetEntry, AssetError};

pub const CONTENT_TYPE: &str = "content-type";
pub const CONTENT_ENCODING: &str = "content-encoding";
pub const LAST_MODIFIED: &str = "last-modified";
pub const ETAG: &str = "etag";
pub const CACHE_CONTROL: &str = "cache-control";

/// Request attributes consulted when serving an asset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetRequest {
    /// Request path, relative to the cache root
    pub path: String,
    /// Raw `Accept-Encoding` header value
    pub accept_encoding: Option<String>,
}

impl AssetRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            accept_encoding: None,
        }
    }

    pub fn with_accept_encoding(mut self, value: impl Into<String>) -> Self {
        self.accept_encoding = Some(value.into());
        self
    }

    /// Whether the requester accepts a gzip body
    pub fn accepts_gzip(&self) -> bool {
        self.accept_encoding
            .as_deref()
            .is_some_and(|value| value.contains("gzip"))
    }
}

/// Destination for a response's status, headers and body
///
/// Header names are case-insensitive.
pub trait ResponseSink {
    fn header(&self, name: &str) -> Option<&str>;
    fn set_header(&mut self, name: &str, value: &str);
    fn set_status(&mut self, status: u16);
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<usize>;
    fn add_content_length(&mut self, len: u64);
}

/// In-memory [`ResponseSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub content_length: u64,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: Vec::new(),
            content_length: 0,
        }
    }
}

impl Default for BufferedResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseSink for BufferedResponse {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn add_content_length(&mut self, len: u64) {
        self.content_length += len;
    }
}

/// Write `entry` to `response`
///
/// A `Last-Modified` header already present on the response is kept, and
/// none is added when the file's mtime has no HTTP-date form. The
/// gzip body and its ETag are used only when the entry has a compressed
/// variant and the request accepts gzip.
///
/// # Returns
/// Number of body bytes written
pub fn serve_asset(
    entry: &AssetEntry,
    request: &AssetRequest,
    response: &mut dyn ResponseSink,
) -> Result<usize, AssetError> {
    response.set_header(CONTENT_TYPE, entry.content_type());
    if response.header(LAST_MODIFIED).is_none() {
        if let Some(last_modified) = entry.last_modified() {
            response.set_header(LAST_MODIFIED, &last_modified);
        }
    }

    let written = match entry.compressed() {
        Some(variant) if request.accepts_gzip() => {
            response.set_header(ETAG, &variant.etag);
            response.set_header(CONTENT_ENCODING, "gzip");
            response.write_body(&variant.bytes)
        }
        _ => {
            response.set_header(ETAG, entry.etag());
            response.write_body(entry.raw_bytes())
        }
    }
    .map_err(AssetError::Write)?;

    response.add_content_length(written as u64);
    trace!(path = %request.path, written = written, "Served asset");
    Ok(written)
}
