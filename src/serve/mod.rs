//! Serving cached assets

pub mod handler;
pub mod response;

pub use handler::{AssetHandler, StatusPage};
pub use response::{AssetRequest, BufferedResponse};
