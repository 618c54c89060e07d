//! IPC protocol definitions
//!
//! Newline-delimited JSON exchanged with clients over a Unix domain socket.
//! Response bodies travel base64-encoded.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::serve::response::BufferedResponse;

/// Protocol version for future compatibility
pub const PROTOCOL_VERSION: u32 = 1;

/// Commands sent by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Fetch an asset
    #[serde(rename_all = "camelCase")]
    Fetch {
        /// Request path relative to the cache root
        path: String,
        /// `Accept-Encoding` header value
        #[serde(default)]
        accept_encoding: Option<String>,
    },
    /// Drop a cached asset
    #[serde(rename_all = "camelCase")]
    Invalidate {
        /// Request path relative to the cache root
        path: String,
    },
    /// Restart the sweeper with a new interval
    #[serde(rename_all = "camelCase")]
    SetInterval {
        /// Interval in seconds, must be positive
        seconds: u64,
    },
    /// Replace the compressible-extension allow-list
    #[serde(rename_all = "camelCase")]
    SetCompressible {
        /// Extensions such as `".css"`; `""` matches names without a dot
        extensions: Vec<String>,
    },
    /// Get daemon status and cache counters
    GetStatus,
}

/// Responses sent back to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Response {
    /// Success response
    #[serde(rename_all = "camelCase")]
    Success {
        /// Optional success message
        message: Option<String>,
    },
    /// Error response
    #[serde(rename_all = "camelCase")]
    Error {
        /// Error message
        error: String,
    },
    /// A served asset, or the status page produced for it
    #[serde(rename_all = "camelCase")]
    Asset {
        status: u16,
        headers: BTreeMap<String, String>,
        content_length: u64,
        /// Base64-encoded body
        body: String,
    },
    /// Status response with cache state
    #[serde(rename_all = "camelCase")]
    Status {
        /// Protocol version
        version: u32,
        /// Whether daemon is healthy
        healthy: bool,
        entries: usize,
        hits: u64,
        misses: u64,
        /// Whether the sweeper is running
        sweeping: bool,
        ttl_secs: u64,
        interval_secs: u64,
        /// Extensions that currently get a gzip variant
        compressible: Vec<String>,
    },
}

impl Response {
    /// Wrap a buffered HTTP-style response
    pub fn from_buffered(response: BufferedResponse) -> Self {
        Response::Asset {
            status: response.status,
            headers: response.headers,
            content_length: response.content_length,
            body: BASE64.encode(&response.body),
        }
    }
}

/// Decode the body of an `Asset` response
#[cfg(test)]
pub fn decode_body(body: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(body)
}

/// Parse a JSON command from bytes
pub fn parse_command(data: &[u8]) -> Result<Command, serde_json::Error> {
    serde_json::from_slice(data)
}

/// Serialize a response to JSON bytes
pub fn serialize_response(response: &Response) -> Result<Vec<u8>, serde_json::Error> {
    let mut json = serde_json::to_vec(response)?;
    json.push(b'\n'); // Add newline delimiter
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serve::response::ResponseSink;

    #[test]
    fn test_parse_fetch_command() {
        let json = r#"{"type":"fetch","path":"/index.html","acceptEncoding":"gzip, br"}"#;
        let cmd = parse_command(json.as_bytes()).unwrap();
        assert_eq!(
            cmd,
            Command::Fetch {
                path: "/index.html".to_string(),
                accept_encoding: Some("gzip, br".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_fetch_without_encoding() {
        let json = r#"{"type":"fetch","path":"/"}"#;
        match parse_command(json.as_bytes()).unwrap() {
            Command::Fetch {
                path,
                accept_encoding,
            } => {
                assert_eq!(path, "/");
                assert!(accept_encoding.is_none());
            }
            _ => panic!("Expected Fetch command"),
        }
    }

    #[test]
    fn test_parse_control_commands() {
        let cmd = parse_command(br#"{"type":"invalidate","path":"/a.css"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Invalidate {
                path: "/a.css".to_string()
            }
        );

        let cmd = parse_command(br#"{"type":"setInterval","seconds":30}"#).unwrap();
        assert_eq!(cmd, Command::SetInterval { seconds: 30 });

        let cmd =
            parse_command(br#"{"type":"setCompressible","extensions":[".css",""]}"#).unwrap();
        assert_eq!(
            cmd,
            Command::SetCompressible {
                extensions: vec![".css".to_string(), String::new()]
            }
        );

        let cmd = parse_command(br#"{"type":"getStatus"}"#).unwrap();
        assert_eq!(cmd, Command::GetStatus);
    }

    #[test]
    fn test_parse_unknown_command() {
        assert!(parse_command(br#"{"type":"mount"}"#).is_err());
        assert!(parse_command(b"not json").is_err());
    }

    #[test]
    fn test_serialize_asset_response() {
        let mut buffered = BufferedResponse::new();
        buffered.set_header("ETag", "\"abc\"");
        buffered.write_body(b"hello").unwrap();
        buffered.add_content_length(5);

        let json = serialize_response(&Response::from_buffered(buffered)).unwrap();
        assert_eq!(json.last(), Some(&b'\n'));

        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["type"], "asset");
        assert_eq!(value["status"], 200);
        assert_eq!(value["contentLength"], 5);
        assert_eq!(value["headers"]["etag"], "\"abc\"");
        assert_eq!(
            decode_body(value["body"].as_str().unwrap()).unwrap(),
            b"hello"
        );
    }

    #[test]
    fn test_serialize_status_response() {
        let response = Response::Status {
            version: PROTOCOL_VERSION,
            healthy: true,
            entries: 3,
            hits: 10,
            misses: 2,
            sweeping: true,
            ttl_secs: 300,
            interval_secs: 60,
            compressible: vec![".css".to_string()],
        };
        let json = serialize_response(&response).unwrap();
        let json_str = String::from_utf8(json).unwrap();
        assert!(json_str.contains(r#""type":"status""#));
        assert!(json_str.contains(r#""entries":3"#));
        assert!(json_str.contains(r#""ttlSecs":300"#));
        assert!(json_str.contains(r#""compressible":[".css"]"#));
    }

    #[test]
    fn test_serialize_error_response() {
        let response = Response::Error {
            error: "Interval must be positive".to_string(),
        };
        let json = serialize_response(&response).unwrap();
        let json_str = String::from_utf8(json).unwrap();
        assert!(json_str.contains("error"));
        assert!(json_str.contains("Interval must be positive"));
    }
}
