//! Asset Handler
//!
//! Entry point for the dispatch layer: resolves a request through the
//! cache and serves it, or hands failures to an error collaborator.

use std::sync::Arc;

use tracing::{debug, warn};

use super::response::{serve_asset, AssetRequest, ResponseSink, CACHE_CONTROL, CONTENT_TYPE};
use crate::asset::AssetError;
use crate::cache::AssetCache;

/// Produces the response when no asset can be served
pub trait ErrorHandler: Send + Sync {
    /// Returning `Ok` means the failure has been turned into a response
    fn handle(
        &self,
        request: &AssetRequest,
        response: &mut dyn ResponseSink,
        error: AssetError,
    ) -> Result<usize, AssetError>;
}

/// Plain-text status page: 404 for missing assets, 500 for anything else
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusPage;

impl ErrorHandler for StatusPage {
    fn handle(
        &self,
        request: &AssetRequest,
        response: &mut dyn ResponseSink,
        error: AssetError,
    ) -> Result<usize, AssetError> {
        let status = error.status_code();
        let body: &[u8] = if error.is_not_found() {
            b"404 Not Found"
        } else {
            warn!(path = %request.path, error = %error, "Failed to serve asset");
            b"500 Internal Server Error"
        };

        response.set_status(status);
        response.set_header(CONTENT_TYPE, "text/plain; charset=utf-8");
        let written = response.write_body(body).map_err(AssetError::Write)?;
        response.add_content_length(written as u64);
        Ok(written)
    }
}

/// Serves cached assets for incoming requests
pub struct AssetHandler {
    cache: Arc<AssetCache>,
    on_error: Option<Arc<dyn ErrorHandler>>,
    cache_control: Option<String>,
}

impl AssetHandler {
    /// Handler that returns errors to the caller untouched
    pub fn new(cache: Arc<AssetCache>) -> Self {
        Self {
            cache,
            on_error: None,
            cache_control: None,
        }
    }

    /// Route failures to `handler` instead of returning them
    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.on_error = Some(handler);
        self
    }

    /// `Cache-Control` value for served assets, unless the response has one
    pub fn with_cache_control(mut self, value: impl Into<String>) -> Self {
        self.cache_control = Some(value.into());
        self
    }

    pub fn cache(&self) -> &Arc<AssetCache> {
        &self.cache
    }

    /// Serve `request` into `response`
    ///
    /// # Returns
    /// Number of body bytes written
    pub fn handle(
        &self,
        request: &AssetRequest,
        response: &mut dyn ResponseSink,
    ) -> Result<usize, AssetError> {
        match self.cache.get(&request.path) {
            Ok(entry) => {
                if let Some(value) = &self.cache_control {
                    if response.header(CACHE_CONTROL).is_none() {
                        response.set_header(CACHE_CONTROL, value);
                    }
                }
                serve_asset(&entry, request, response)
            }
            Err(error) => {
                debug!(path = %request.path, error = %error, "Asset unavailable");
                match &self.on_error {
                    Some(handler) => handler.handle(request, response, error),
                    None => Err(error),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheOptions;
    use crate::serve::BufferedResponse;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_cache(dir: &TempDir) -> Arc<AssetCache> {
        Arc::new(
            AssetCache::new(CacheOptions::new(
                dir.path(),
                Duration::from_secs(3600),
                Duration::from_secs(3600),
            ))
            .unwrap(),
        )
    }

    /// Counts invocations and answers with an empty 410
    #[derive(Default)]
    struct Recording {
        calls: AtomicUsize,
    }

    impl ErrorHandler for Recording {
        fn handle(
            &self,
            _request: &AssetRequest,
            response: &mut dyn ResponseSink,
            error: AssetError,
        ) -> Result<usize, AssetError> {
            assert!(error.is_not_found());
            self.calls.fetch_add(1, Ordering::SeqCst);
            response.set_status(410);
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_root_serves_like_index() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), "hello").unwrap();
        let handler = AssetHandler::new(create_test_cache(&dir));

        let request = AssetRequest::new("/").with_accept_encoding("gzip");
        let mut via_root = BufferedResponse::new();
        handler.handle(&request, &mut via_root).unwrap();

        let request = AssetRequest::new("/index.html").with_accept_encoding("gzip");
        let mut via_index = BufferedResponse::new();
        handler.handle(&request, &mut via_index).unwrap();

        assert_eq!(via_root, via_index);
        assert_eq!(via_root.status, 200);
    }

    #[tokio::test]
    async fn test_missing_without_error_handler() {
        let dir = TempDir::new().unwrap();
        let handler = AssetHandler::new(create_test_cache(&dir));

        let mut response = BufferedResponse::new();
        let err = handler
            .handle(&AssetRequest::new("/nope.js"), &mut response)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(response.body.is_empty());
    }

    #[tokio::test]
    async fn test_missing_delegates_to_error_handler() {
        let dir = TempDir::new().unwrap();
        let recording = Arc::new(Recording::default());
        let handler = AssetHandler::new(create_test_cache(&dir))
            .with_error_handler(Arc::clone(&recording) as Arc<dyn ErrorHandler>);

        let mut response = BufferedResponse::new();
        handler
            .handle(&AssetRequest::new("/nope.js"), &mut response)
            .unwrap();

        assert_eq!(recording.calls.load(Ordering::SeqCst), 1);
        assert_eq!(response.status, 410);
    }

    #[tokio::test]
    async fn test_status_page() {
        let dir = TempDir::new().unwrap();
        let handler =
            AssetHandler::new(create_test_cache(&dir)).with_error_handler(Arc::new(StatusPage));

        let mut response = BufferedResponse::new();
        handler
            .handle(&AssetRequest::new("/nope.js"), &mut response)
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, b"404 Not Found");

        let mut response = BufferedResponse::new();
        StatusPage
            .handle(
                &AssetRequest::new("/x"),
                &mut response,
                AssetError::Hash(std::io::Error::other("digest")),
            )
            .unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(response.body, b"500 Internal Server Error");
    }

    #[tokio::test]
    async fn test_cache_control() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.css"), "a {}").unwrap();
        let handler = AssetHandler::new(create_test_cache(&dir))
            .with_cache_control("private, must-revalidate");

        let mut response = BufferedResponse::new();
        handler
            .handle(&AssetRequest::new("/a.css"), &mut response)
            .unwrap();
        assert_eq!(
            response.header("cache-control"),
            Some("private, must-revalidate")
        );

        let mut response = BufferedResponse::new();
        response.set_header("Cache-Control", "no-store");
        handler
            .handle(&AssetRequest::new("/a.css"), &mut response)
            .unwrap();
        assert_eq!(response.header("cache-control"), Some("no-store"));
    }
}
