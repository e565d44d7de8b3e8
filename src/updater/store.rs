//! On-disk persistence of the installed web bundle.
//!
//! An installed bundle is two companion files in the data directory: the
//! descriptor `web.json` (one manifest entry) and the payload `web.dat` (the
//! raw verified package bytes). Both exist or neither does; a split state is
//! corruption and gets purged. The descriptor is written last during install,
//! so a crash mid-install can only ever orphan the payload.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::updater::bundle::{self, AssetBundle};
use crate::updater::manifest::UpdateDetails;
use crate::updater::verify::UpdateVerifier;
use crate::updater::version::UpdateVersion;

pub const DESCRIPTOR_FILE: &str = "web.json";
pub const PAYLOAD_FILE: &str = "web.dat";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Exactly one of {DESCRIPTOR_FILE}/{PAYLOAD_FILE} exists on disk")]
    CorruptOnDiskState,
    #[error("Failed to serialize descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

/// Owner of the active bundle: the on-disk pair plus the in-memory pointer
/// the display surface reads through. Swaps are atomic from a reader's
/// perspective; a reader holds either the fully-old or fully-new bundle.
pub struct WebStore {
    data_dir: PathBuf,
    active: RwLock<Option<Arc<AssetBundle>>>,
}

impl WebStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            active: RwLock::new(None),
        }
    }

    fn descriptor_path(&self) -> PathBuf {
        self.data_dir.join(DESCRIPTOR_FILE)
    }

    fn payload_path(&self) -> PathBuf {
        self.data_dir.join(PAYLOAD_FILE)
    }

    /// The currently active bundle, if an update is installed.
    pub fn active_bundle(&self) -> Option<Arc<AssetBundle>> {
        self.active.read().ok().and_then(|guard| guard.clone())
    }

    /// Startup load path. Re-verifies the on-disk payload against its
    /// descriptor before trusting it; this guards against tampering between
    /// installs, not just network tampering. Returns the installed version,
    /// or `None` when no (intact, authorized) bundle exists.
    pub fn load(&self, verifier: &UpdateVerifier) -> Result<Option<UpdateVersion>, StoreError> {
        match self.check_paired_state() {
            Ok(false) => return Ok(None),
            Ok(true) => {}
            Err(StoreError::CorruptOnDiskState) => {
                warn!("Found split descriptor/payload state on disk; purging both");
                self.purge()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let descriptor_text = fs::read_to_string(self.descriptor_path())?;
        let entry: UpdateDetails = match serde_json::from_str(&descriptor_text) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Installed descriptor is unreadable; purging");
                self.purge()?;
                return Ok(None);
            }
        };
        let package = fs::read(self.payload_path())?;

        if let Err(e) = verifier.verify_package(&package, &entry) {
            error!(
                error = %e,
                "Found web update package on disk, but its signature does not check out; removing it"
            );
            self.purge()?;
            return Ok(None);
        }

        let bundle = match decode_package(&package) {
            Ok(bundle) => bundle,
            Err(e) => {
                // A payload that verifies but cannot be decoded would fail
                // again on every startup; treat it like any other corruption.
                error!(error = %e, "Failed to decode installed web package; removing it");
                self.purge()?;
                return Ok(None);
            }
        };

        self.swap_active(Some(bundle));
        info!(version = %entry.version, "Loaded installed web bundle");
        Ok(Some(entry.version))
    }

    /// Install a verified package: payload first, descriptor last, then swap
    /// the in-memory bundle. Callers have already run the package signature
    /// check; nothing here re-trusts the network.
    pub fn install(
        &self,
        entry: &UpdateDetails,
        package: &[u8],
        bundle: AssetBundle,
    ) -> Result<(), StoreError> {
        fs::create_dir_all(&self.data_dir)?;
        fs::write(self.payload_path(), package)?;
        let descriptor = serde_json::to_string_pretty(entry)?;
        fs::write(self.descriptor_path(), descriptor)?;

        self.swap_active(Some(bundle));
        info!(version = %entry.version, "Installed web bundle");
        Ok(())
    }

    /// Remove any installed bundle. Idempotent.
    pub fn remove(&self) -> Result<(), StoreError> {
        self.purge()?;
        self.swap_active(None);
        Ok(())
    }

    fn check_paired_state(&self) -> Result<bool, StoreError> {
        let descriptor = self.descriptor_path().exists();
        let payload = self.payload_path().exists();
        match (descriptor, payload) {
            (true, true) => Ok(true),
            (false, false) => Ok(false),
            _ => Err(StoreError::CorruptOnDiskState),
        }
    }

    fn purge(&self) -> Result<(), StoreError> {
        for path in [self.descriptor_path(), self.payload_path()] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    fn swap_active(&self, bundle: Option<AssetBundle>) {
        if let Ok(mut guard) = self.active.write() {
            *guard = bundle.map(Arc::new);
        }
    }
}

/// Decompress and deserialize raw package bytes into a bundle.
pub fn decode_package(package: &[u8]) -> Result<AssetBundle, bundle::BundleError> {
    let packed = bundle::decompress(package)?;
    AssetBundle::unpack(&packed)
}

/// True when the data directory holds exactly one of the two companion
/// files. Exposed for startup diagnostics.
pub fn is_split_state(data_dir: &Path) -> bool {
    data_dir.join(DESCRIPTOR_FILE).exists() ^ data_dir.join(PAYLOAD_FILE).exists()
}

#[cfg(test)]
mod tests {
    use secp256k1::Secp256k1;

    use super::*;
    use crate::updater::verify::testutil::*;
    use crate::updater::version::UpdateVersion;

    const BUILD_TS: u64 = 1_600_000_000;

    fn signed_package(
        secp: &Secp256k1<secp256k1::All>,
        signers: &[secp256k1::SecretKey],
    ) -> (UpdateDetails, Vec<u8>, AssetBundle) {
        let entries = vec![
            ("index.html".to_string(), b"<html/>".to_vec()),
            ("app.js".to_string(), b"boot();".to_vec()),
        ];
        let package = bundle::compress(&AssetBundle::pack(&entries));
        let mut entry = unsigned_entry(UpdateVersion::new(0, 4, 16, 'b'), BUILD_TS + 10);
        sign_package(secp, &mut entry, &package, signers);
        let bundle = entries.into_iter().collect();
        (entry, package, bundle)
    }

    #[test]
    fn test_install_then_load_roundtrip() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let verifier = UpdateVerifier::new(policy_for(&secp, &signers, 2, BUILD_TS));
        let dir = tempfile::tempdir().unwrap();

        let (entry, package, bundle) = signed_package(&secp, &signers[..2]);
        let store = WebStore::new(dir.path());
        store.install(&entry, &package, bundle).unwrap();
        assert!(dir.path().join(DESCRIPTOR_FILE).exists());
        assert!(dir.path().join(PAYLOAD_FILE).exists());

        // A fresh store (new process) loads and re-verifies from disk.
        let reloaded = WebStore::new(dir.path());
        let version = reloaded.load(&verifier).unwrap();
        assert_eq!(version, Some(UpdateVersion::new(0, 4, 16, 'b')));
        let active = reloaded.active_bundle().unwrap();
        assert_eq!(active.get("index.html"), Some(&b"<html/>"[..]));
        assert_eq!(active.get("app.js"), Some(&b"boot();"[..]));
    }

    #[test]
    fn test_split_state_is_purged() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let verifier = UpdateVerifier::new(policy_for(&secp, &signers, 2, BUILD_TS));
        let dir = tempfile::tempdir().unwrap();

        fs::write(dir.path().join(DESCRIPTOR_FILE), "{}").unwrap();
        let store = WebStore::new(dir.path());
        assert_eq!(store.load(&verifier).unwrap(), None);
        assert!(!dir.path().join(DESCRIPTOR_FILE).exists());
        assert!(store.active_bundle().is_none());
    }

    #[test]
    fn test_tampered_payload_is_purged_on_load() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let verifier = UpdateVerifier::new(policy_for(&secp, &signers, 2, BUILD_TS));
        let dir = tempfile::tempdir().unwrap();

        let (entry, package, bundle) = signed_package(&secp, &signers[..2]);
        let store = WebStore::new(dir.path());
        store.install(&entry, &package, bundle).unwrap();

        // Tamper with the payload after install.
        fs::write(dir.path().join(PAYLOAD_FILE), b"evil bytes").unwrap();

        let reloaded = WebStore::new(dir.path());
        assert_eq!(reloaded.load(&verifier).unwrap(), None);
        assert!(!dir.path().join(DESCRIPTOR_FILE).exists());
        assert!(!dir.path().join(PAYLOAD_FILE).exists());
    }

    #[test]
    fn test_undecodable_payload_is_purged_on_load() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let verifier = UpdateVerifier::new(policy_for(&secp, &signers, 2, BUILD_TS));
        let dir = tempfile::tempdir().unwrap();

        // Properly signed, but the payload is not a valid package stream.
        let package = b"signed but not gzip".to_vec();
        let mut entry = unsigned_entry(UpdateVersion::new(0, 4, 16, 'b'), BUILD_TS + 10);
        sign_package(&secp, &mut entry, &package, &signers[..2]);
        let store = WebStore::new(dir.path());
        store.install(&entry, &package, AssetBundle::default()).unwrap();

        let reloaded = WebStore::new(dir.path());
        assert_eq!(reloaded.load(&verifier).unwrap(), None);
        assert!(reloaded.active_bundle().is_none());
        // Both halves are gone, so the next startup does not retry.
        assert!(!dir.path().join(DESCRIPTOR_FILE).exists());
        assert!(!dir.path().join(PAYLOAD_FILE).exists());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let dir = tempfile::tempdir().unwrap();

        let (entry, package, bundle) = signed_package(&secp, &signers[..2]);
        let store = WebStore::new(dir.path());
        store.install(&entry, &package, bundle).unwrap();
        assert!(store.active_bundle().is_some());

        store.remove().unwrap();
        assert!(store.active_bundle().is_none());
        assert!(!dir.path().join(PAYLOAD_FILE).exists());
        // Removing again is a no-op.
        store.remove().unwrap();
    }

    #[test]
    fn test_load_with_nothing_installed() {
        let secp = Secp256k1::new();
        let signers: Vec<_> = (1..=4).map(signer).collect();
        let verifier = UpdateVerifier::new(policy_for(&secp, &signers, 2, BUILD_TS));
        let dir = tempfile::tempdir().unwrap();

        let store = WebStore::new(dir.path());
        assert_eq!(store.load(&verifier).unwrap(), None);
        assert!(store.active_bundle().is_none());
    }
}
