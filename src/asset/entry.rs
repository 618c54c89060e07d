//! Cached asset representation
//!
//! One immutable value per file version. Refreshing a path replaces the
//! whole entry in the store; nothing here is ever mutated in place.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// First instant `httpdate` cannot format (year 10000)
const HTTP_DATE_LIMIT: Duration = Duration::from_secs(253_402_300_800);

/// gzip representation of an asset together with its validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedVariant {
    /// gzip-encoded content
    pub bytes: Vec<u8>,
    /// Quoted hex SHA-256 of `bytes`
    pub etag: String,
}

/// An immutable cached file
#[derive(Debug, Clone)]
pub struct AssetEntry {
    content_type: String,
    raw: Vec<u8>,
    etag: String,
    compressed: Option<CompressedVariant>,
    modified_at: SystemTime,
    loaded_at: Instant,
}

impl AssetEntry {
    pub(crate) fn new(
        content_type: String,
        raw: Vec<u8>,
        etag: String,
        compressed: Option<CompressedVariant>,
        modified_at: SystemTime,
    ) -> Self {
        Self {
            content_type,
            raw,
            etag,
            compressed,
            modified_at,
            loaded_at: Instant::now(),
        }
    }

    /// MIME type, empty when the extension is unknown
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Uncompressed file content
    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Strong validator of the raw content
    pub fn etag(&self) -> &str {
        &self.etag
    }

    /// gzip variant, present iff the extension was compressible at load time
    pub fn compressed(&self) -> Option<&CompressedVariant> {
        self.compressed.as_ref()
    }

    #[cfg(test)]
    pub fn compressed_bytes(&self) -> Option<&[u8]> {
        self.compressed.as_ref().map(|c| c.bytes.as_slice())
    }

    #[cfg(test)]
    pub fn etag_compressed(&self) -> Option<&str> {
        self.compressed.as_ref().map(|c| c.etag.as_str())
    }

    /// `Last-Modified` value for the file's mtime
    ///
    /// `None` when the mtime lies before 1970 or past year 9999.
    pub fn last_modified(&self) -> Option<String> {
        http_date(self.modified_at)
    }

    /// When this entry was built
    #[cfg(test)]
    pub fn loaded_at(&self) -> Instant {
        self.loaded_at
    }

    /// Age of the entry relative to `now`
    ///
    /// Saturates at zero if `now` precedes the load time.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.loaded_at)
    }

    /// Whether the entry has lived at least `ttl` as of `now`
    pub fn is_expired(&self, ttl: Duration, now: Instant) -> bool {
        self.age(now) >= ttl
    }
}

/// Format `time` as an HTTP-date if it is representable
pub fn http_date(time: SystemTime) -> Option<String> {
    let since_epoch = time.duration_since(UNIX_EPOCH).ok()?;
    (since_epoch < HTTP_DATE_LIMIT).then(|| httpdate::fmt_http_date(time))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_entry(compressed: bool) -> AssetEntry {
        let variant = compressed.then(|| CompressedVariant {
            bytes: vec![0x1f, 0x8b],
            etag: "\"bb\"".to_string(),
        });
        AssetEntry::new(
            "text/plain".to_string(),
            b"hello".to_vec(),
            "\"aa\"".to_string(),
            variant,
            SystemTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn test_compressed_accessors_agree() {
        let plain = create_test_entry(false);
        assert!(plain.compressed_bytes().is_none());
        assert!(plain.etag_compressed().is_none());

        let gz = create_test_entry(true);
        assert_eq!(gz.compressed_bytes(), Some(&[0x1f, 0x8b][..]));
        assert_eq!(gz.etag_compressed(), Some("\"bb\""));
    }

    #[test]
    fn test_http_date_range() {
        assert_eq!(
            http_date(UNIX_EPOCH).as_deref(),
            Some("Thu, 01 Jan 1970 00:00:00 GMT")
        );
        assert_eq!(
            http_date(UNIX_EPOCH + Duration::from_secs(784_111_777)).as_deref(),
            Some("Sun, 06 Nov 1994 08:49:37 GMT")
        );
        assert!(http_date(UNIX_EPOCH - Duration::from_secs(86_400)).is_none());
        assert!(http_date(UNIX_EPOCH + HTTP_DATE_LIMIT).is_none());
        assert!(http_date(UNIX_EPOCH + HTTP_DATE_LIMIT - Duration::from_secs(1)).is_some());
    }

    #[test]
    fn test_last_modified_out_of_range() {
        let entry = AssetEntry::new(
            String::new(),
            Vec::new(),
            "\"e\"".to_string(),
            None,
            UNIX_EPOCH - Duration::from_secs(86_400),
        );
        assert!(entry.last_modified().is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let entry = create_test_entry(false);
        let ttl = Duration::from_secs(10);
        let t0 = entry.loaded_at();

        assert!(!entry.is_expired(ttl, t0));
        assert!(!entry.is_expired(ttl, t0 + Duration::from_millis(9_999)));
        assert!(entry.is_expired(ttl, t0 + ttl));
        assert!(entry.is_expired(ttl, t0 + Duration::from_secs(11)));
    }
}
