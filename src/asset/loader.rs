//! Asset Loader
//!
//! Reads a file from disk and builds an immutable [`AssetEntry`]: raw bytes,
//! an optional gzip variant, and SHA-256 validators for both.

use std::collections::HashSet;
use std::fs::{self, Metadata};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::entry::{AssetEntry, CompressedVariant};
use super::errors::AssetError;

/// File served when a directory is requested
pub const INDEX_FILE: &str = "index.html";

/// Extensions compressed by default; `""` covers file names without a dot
pub const DEFAULT_COMPRESSIBLE: &[&str] = &[
    "", ".txt", ".htm", ".html", ".css", ".toml", ".php", ".js", ".json", ".md", ".mdown",
    ".xml", ".svg", ".go", ".cgi", ".py", ".pl", ".aspx", ".asp",
];

/// Resolves a MIME type from a file extension
pub trait MimeResolver: Send + Sync {
    /// `ext` is lowercase with its leading dot (`".css"`), or `""` for a file
    /// name without one; return `""` when unknown
    fn content_type(&self, ext: &str) -> String;
}

/// [`MimeResolver`] backed by `mime_guess`
#[derive(Debug, Default, Clone, Copy)]
pub struct GuessMime;

impl MimeResolver for GuessMime {
    fn content_type(&self, ext: &str) -> String {
        let ext = ext.trim_start_matches('.');
        if ext.is_empty() {
            return String::new();
        }
        mime_guess::from_ext(ext)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default()
    }
}

/// Case-insensitive allow-list of compressible extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Compressible {
    extensions: HashSet<String>,
}

impl Compressible {
    /// Build an allow-list; `"css"` and `".CSS"` name the same extension and
    /// `""` matches file names without a dot
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    /// An allow-list that compresses nothing
    pub fn none() -> Self {
        Self {
            extensions: HashSet::new(),
        }
    }

    pub fn contains(&self, ext: &str) -> bool {
        self.extensions.contains(&normalize_extension(ext))
    }

    /// Sorted extensions, each with its leading dot
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.extensions.iter().cloned().collect();
        extensions.sort();
        extensions
    }
}

impl Default for Compressible {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSIBLE.iter().copied())
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.is_empty() || ext.starts_with('.') {
        ext.to_ascii_lowercase()
    } else {
        format!(".{}", ext.to_ascii_lowercase())
    }
}

/// Collaborators consulted while building an entry
#[derive(Clone, Copy)]
pub struct LoadOptions<'a> {
    pub compressible: &'a Compressible,
    pub mime: &'a dyn MimeResolver,
}

/// Load `path` into a fresh [`AssetEntry`]
///
/// A directory is retried once as `path/index.html`; an index that is itself
/// a directory counts as missing.
///
/// # Errors
/// * `NotFound` if the path (or the index file) cannot be stat'ed
/// * `Read`, `Compression`, `Hash` for failures while building the entry
pub fn load_asset(path: &Path, options: LoadOptions<'_>) -> Result<AssetEntry, AssetError> {
    let metadata = stat(path)?;
    if !metadata.is_dir() {
        return build_entry(path, &metadata, options);
    }

    let index = path.join(INDEX_FILE);
    let index_metadata = stat(&index)?;
    if index_metadata.is_dir() {
        return Err(AssetError::NotFound(index));
    }
    build_entry(&index, &index_metadata, options)
}

fn stat(path: &Path) -> Result<Metadata, AssetError> {
    fs::metadata(path).map_err(|e| {
        debug!(path = %path.display(), error = %e, "Asset stat failed");
        AssetError::NotFound(path.to_path_buf())
    })
}

fn build_entry(
    path: &Path,
    metadata: &Metadata,
    options: LoadOptions<'_>,
) -> Result<AssetEntry, AssetError> {
    let raw = fs::read(path).map_err(|source| AssetError::Read {
        path: PathBuf::from(path),
        source,
    })?;

    let ext = file_extension(path);
    let content_type = options.mime.content_type(&ext);

    let compressed = if options.compressible.contains(&ext) {
        let bytes = gzip_bytes(&raw, Compression::best()).map_err(AssetError::Compression)?;
        let etag = strong_etag(&bytes).map_err(AssetError::Hash)?;
        Some(CompressedVariant { bytes, etag })
    } else {
        None
    };

    let etag = strong_etag(&raw).map_err(AssetError::Hash)?;
    let modified_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    debug!(
        path = %path.display(),
        size = raw.len(),
        compressed_size = compressed.as_ref().map(|c| c.bytes.len()),
        content_type = %content_type,
        "Built asset entry"
    );

    Ok(AssetEntry::new(content_type, raw, etag, compressed, modified_at))
}

/// Lowercase suffix of the file name from its last dot on, `""` if the
/// name has no dot
///
/// `.htaccess` yields `".htaccess"` and `notes.` yields `"."`.
pub fn file_extension(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    name.rfind('.')
        .map(|dot| name[dot..].to_ascii_lowercase())
        .unwrap_or_default()
}

/// gzip-encode `content` at `level`
pub fn gzip_bytes(content: &[u8], level: Compression) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), level);
    encoder.write_all(content)?;
    encoder.finish()
}

/// Quoted lowercase hex SHA-256 of `bytes`
pub fn strong_etag(bytes: &[u8]) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut &bytes[..], &mut hasher)?;
    Ok(format!("\"{:x}\"", hasher.finalize()))
}
