//! IPC server exposing the asset cache over a Unix socket

pub mod protocol;
pub mod server;

pub use server::IpcServer;
