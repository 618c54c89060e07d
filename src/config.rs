//! Daemon configuration
//!
//! Read from the environment; every value has a default so the daemon can
//! start with no configuration at all.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::asset::Compressible;
use crate::cache::CacheOptions;

pub const ENV_ROOT: &str = "ASSETD_ROOT";
pub const ENV_TTL_SECS: &str = "ASSETD_TTL_SECS";
pub const ENV_SWEEP_SECS: &str = "ASSETD_SWEEP_SECS";
pub const ENV_SOCKET: &str = "ASSETD_SOCKET";
pub const ENV_CACHE_CONTROL: &str = "ASSETD_CACHE_CONTROL";
pub const ENV_COMPRESSIBLE: &str = "ASSETD_COMPRESSIBLE";

/// Default socket path for IPC communication
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/assetd.sock";

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_SWEEP_SECS: u64 = 60;

/// Runtime settings for the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Directory served by the cache
    pub root: PathBuf,
    /// Maximum age of a cached entry
    pub ttl: Duration,
    /// Time between sweeps
    pub sweep_interval: Duration,
    /// Unix socket for the IPC server
    pub socket_path: PathBuf,
    /// `Cache-Control` value added to served assets
    pub cache_control: Option<String>,
    /// Extensions that get a gzip variant
    pub compressible: Compressible,
}

impl DaemonConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let root = lookup(ENV_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let ttl = parse_secs(&lookup, ENV_TTL_SECS, DEFAULT_TTL_SECS)?;
        let sweep_interval = parse_secs(&lookup, ENV_SWEEP_SECS, DEFAULT_SWEEP_SECS)?;
        let socket_path = lookup(ENV_SOCKET)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SOCKET_PATH));
        let cache_control = lookup(ENV_CACHE_CONTROL).filter(|value| !value.trim().is_empty());
        let compressible = lookup(ENV_COMPRESSIBLE)
            .map(|raw| parse_compressible(&raw))
            .unwrap_or_default();

        Ok(Self {
            root,
            ttl,
            sweep_interval,
            socket_path,
            cache_control,
            compressible,
        })
    }

    /// Options for building the asset cache
    pub fn cache_options(&self) -> CacheOptions {
        CacheOptions::new(self.root.clone(), self.ttl, self.sweep_interval)
            .with_compressible(self.compressible.clone())
    }
}

/// Comma-separated extensions; an empty item stands for file names without
/// a dot, and a blank value disables compression
fn parse_compressible(raw: &str) -> Compressible {
    if raw.trim().is_empty() {
        return Compressible::none();
    }
    Compressible::new(raw.split(',').map(str::trim))
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds, got {:?}", key, raw))?,
        None => default,
    };
    if secs == 0 {
        bail!("{} must be greater than zero", key);
    }
    Ok(Duration::from_secs(secs))
}
