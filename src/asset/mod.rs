//! Cached asset construction
//!
//! Immutable entries built from files on disk, plus the error taxonomy
//! shared by loading and serving.

pub mod entry;
pub mod errors;
pub mod loader;

pub use entry::AssetEntry;
pub use errors::AssetError;
pub use loader::{load_asset, Compressible, GuessMime, LoadOptions, MimeResolver};
