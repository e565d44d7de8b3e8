//! Trust-core configuration.
//!
//! The trusted signer set and signature threshold are compile-time constants
//! in production, but they live in an explicit immutable structure so tests
//! can build their own policies without touching the verification algorithm.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::keys::Address;
use crate::updater::version::UpdateVersion;

/// Fixed manifest location; the pipeline appends installation and platform
/// query parameters.
pub const MANIFEST_URL: &str = "https://xtswallet.org/updates/manifest.json";

/// The custom URI scheme this client registers for deep links.
pub const CUSTOM_URL_SCHEME: &str = "xts";

/// Minimum count of distinct trusted signers required on any update.
pub const SIGNATURE_REQUIREMENT: usize = 2;

/// Addresses of the release signing keys. Never mutated at runtime.
pub const TRUSTED_SIGNER_ADDRESSES: [[u8; 20]; 4] = [
    [
        0x2f, 0x8a, 0x41, 0xc9, 0x0e, 0x6b, 0x77, 0x25, 0xd3, 0x1c, 0xa0, 0x54, 0x98, 0xe2, 0x6f,
        0x0b, 0x44, 0x7d, 0x39, 0x61,
    ],
    [
        0x91, 0x3e, 0x5c, 0x02, 0xbd, 0x4f, 0xa8, 0x66, 0x17, 0xe9, 0x2b, 0x70, 0xcd, 0x05, 0x83,
        0x4a, 0xf1, 0x28, 0x96, 0xdc,
    ],
    [
        0x6d, 0xb2, 0x09, 0x57, 0x3a, 0xe4, 0x1f, 0x8c, 0x60, 0x75, 0x4e, 0x99, 0x12, 0xc6, 0x0a,
        0xbf, 0x83, 0x5d, 0x24, 0x78,
    ],
    [
        0x48, 0x07, 0xf3, 0x6a, 0x85, 0x21, 0xd9, 0x33, 0xbe, 0x40, 0x6c, 0x1e, 0xa7, 0x52, 0xf8,
        0x90, 0x0d, 0xcb, 0x67, 0x15,
    ],
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not determine data directory")]
    NoDataDir,
    #[error("Failed to read or write installation id: {0}")]
    InstallationId(#[from] std::io::Error),
}

/// Immutable signing policy: who may authorize updates, how many of them it
/// takes, and the oldest timestamp this build will accept.
#[derive(Debug, Clone)]
pub struct SigningPolicy {
    pub trusted: BTreeSet<Address>,
    pub requirement: usize,
    /// Release timestamp of the running binary, seconds since epoch. An
    /// update older than the binary checking it is a rollback and rejected.
    pub build_timestamp: u64,
}

impl SigningPolicy {
    pub fn new(trusted: BTreeSet<Address>, requirement: usize, build_timestamp: u64) -> Self {
        Self {
            trusted,
            requirement,
            build_timestamp,
        }
    }

    /// The production policy: the constant signer set and threshold.
    pub fn production(build_timestamp: u64) -> Self {
        let trusted = TRUSTED_SIGNER_ADDRESSES
            .iter()
            .map(|bytes| Address::from_bytes(*bytes))
            .collect();
        Self::new(trusted, SIGNATURE_REQUIREMENT, build_timestamp)
    }
}

/// Everything the trust core needs to know about its environment.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub manifest_url: String,
    pub data_dir: PathBuf,
    pub scheme: String,
    /// Host:port of the local HTTP service the web interface is served from.
    /// Deep-link navigation only ever targets this endpoint.
    pub local_endpoint: String,
    pub installation_id: Uuid,
    pub platform: String,
    pub os: String,
    pub current_version: UpdateVersion,
    pub policy: SigningPolicy,
}

impl TrustConfig {
    /// Production configuration. `data_dir` defaults to the platform data
    /// directory; the installation id is created on first run and persisted.
    pub fn production(
        local_endpoint: String,
        current_version: UpdateVersion,
        build_timestamp: u64,
    ) -> Result<Self, ConfigError> {
        let data_dir = dirs::data_local_dir()
            .ok_or(ConfigError::NoDataDir)?
            .join("XtsWallet");
        fs::create_dir_all(&data_dir)?;
        let installation_id = load_or_create_installation_id(&data_dir)?;

        Ok(Self {
            manifest_url: MANIFEST_URL.to_string(),
            data_dir,
            scheme: CUSTOM_URL_SCHEME.to_string(),
            local_endpoint,
            installation_id,
            platform: platform_name().to_string(),
            os: os_tag().to_string(),
            current_version,
            policy: SigningPolicy::production(build_timestamp),
        })
    }
}

/// Stable per-installation identifier, reported with manifest requests.
pub fn load_or_create_installation_id(data_dir: &Path) -> std::io::Result<Uuid> {
    let path = data_dir.join("app_id");
    if let Ok(content) = fs::read_to_string(&path) {
        if let Ok(id) = content.trim().parse() {
            return Ok(id);
        }
    }
    let id = Uuid::new_v4();
    fs::write(&path, id.to_string())?;
    Ok(id)
}

fn platform_name() -> &'static str {
    std::env::consts::ARCH
}

fn os_tag() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "linux"
    }
    #[cfg(target_os = "windows")]
    {
        "windows"
    }
    #[cfg(target_os = "macos")]
    {
        "mac"
    }
    #[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
    {
        "unknown"
    }
}
