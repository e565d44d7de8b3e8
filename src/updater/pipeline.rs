//! The update pipeline state machine.
//!
//! One check runs the full chain fetch → verify → select → download →
//! re-verify → decompress → deserialize → install. Runs are single-flight: a
//! trigger while one is active is a no-op, not a queued retry. Scheduling of
//! periodic checks belongs to the caller; this core has no timer of its own.
//!
//! Every failure path is non-destructive: nothing persisted changes, the
//! previously installed bundle (if any) stays active, and the pipeline
//! returns to idle, eligible for a future trigger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::TrustConfig;
use crate::updater::bundle::BundleError;
use crate::updater::download::{FetchError, Fetcher};
use crate::updater::selector::select_next;
use crate::updater::store::{StoreError, WebStore};
use crate::updater::verify::{UpdateVerifier, VerifyError};
use crate::updater::version::UpdateVersion;
use crate::wallet::{DisplaySurface, WalletSigner};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Where a pipeline run currently is. Observable while a check is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    ManifestFetching,
    ManifestVerifying,
    PackageFetching,
    PackageVerifying,
    Decompressing,
    Deserializing,
    Installing,
}

/// Terminal result of a successful (non-erroring) check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A new bundle was verified and installed.
    Installed(UpdateVersion),
    /// No applicable update. This is the normal outcome, not an error; it
    /// also covers entries that failed authorization.
    NoUpdate { current: UpdateVersion },
    /// Another check is already in flight; this trigger was a no-op.
    AlreadyRunning,
}

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Package signature invalid: {0}")]
    PackageSignatureInvalid(VerifyError),
    #[error("Package decompression failed: {0}")]
    Decompression(BundleError),
    #[error("Package deserialization failed: {0}")]
    Deserialization(BundleError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct UpdatePipeline {
    config: TrustConfig,
    verifier: UpdateVerifier,
    fetcher: Fetcher,
    store: Arc<WebStore>,
    wallet: Arc<dyn WalletSigner>,
    display: Arc<dyn DisplaySurface>,
    in_flight: AtomicBool,
    status: Mutex<PipelineStatus>,
    last_check: Mutex<Option<DateTime<Utc>>>,
}

impl UpdatePipeline {
    pub fn new(
        config: TrustConfig,
        store: Arc<WebStore>,
        wallet: Arc<dyn WalletSigner>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self::with_fetch_timeout(config, store, wallet, display, DEFAULT_FETCH_TIMEOUT)
    }

    /// Same as `new` with an explicit network timeout bound.
    pub fn with_fetch_timeout(
        config: TrustConfig,
        store: Arc<WebStore>,
        wallet: Arc<dyn WalletSigner>,
        display: Arc<dyn DisplaySurface>,
        fetch_timeout: Duration,
    ) -> Self {
        let verifier = UpdateVerifier::new(config.policy.clone());
        Self {
            verifier,
            fetcher: Fetcher::new(fetch_timeout),
            store,
            wallet,
            display,
            in_flight: AtomicBool::new(false),
            status: Mutex::new(PipelineStatus::Idle),
            last_check: Mutex::new(None),
            config,
        }
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
            .lock()
            .map(|guard| *guard)
            .unwrap_or(PipelineStatus::Idle)
    }

    pub fn last_check(&self) -> Option<DateTime<Utc>> {
        self.last_check.lock().ok().and_then(|guard| *guard)
    }

    pub fn store(&self) -> &Arc<WebStore> {
        &self.store
    }

    fn set_status(&self, status: PipelineStatus) {
        if let Ok(mut guard) = self.status.lock() {
            *guard = status;
        }
    }

    /// Run one full update check. Single-flight: returns `AlreadyRunning`
    /// without doing anything if a check is in progress.
    pub async fn check_for_update(&self) -> Result<CheckOutcome, UpdateError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Ok(CheckOutcome::AlreadyRunning);
        }
        if let Ok(mut guard) = self.last_check.lock() {
            *guard = Some(Utc::now());
        }

        let result = self.run_check().await;
        self.set_status(PipelineStatus::Idle);
        self.in_flight.store(false, Ordering::SeqCst);
        result
    }

    async fn run_check(&self) -> Result<CheckOutcome, UpdateError> {
        let current = self.config.current_version;

        self.set_status(PipelineStatus::ManifestFetching);
        let manifest = self.fetcher.fetch_manifest(&self.config).await?;

        self.set_status(PipelineStatus::ManifestVerifying);
        let requirement = self.config.policy.requirement;
        let Some(candidate) = select_next(current, &manifest, requirement) else {
            info!(%current, "No applicable update in manifest");
            return Ok(CheckOutcome::NoUpdate { current });
        };
        if let Err(e) = self.verifier.verify_entry(candidate) {
            // Unauthorized is indistinguishable from "no update" to callers;
            // the details are in the local log only.
            warn!(version = %candidate.version, error = %e, "Selected update failed authorization");
            return Ok(CheckOutcome::NoUpdate { current });
        }
        let entry = candidate.clone();
        info!(version = %entry.version, url = %entry.update_package_url, "Fetching update package");

        self.set_status(PipelineStatus::PackageFetching);
        let package = self.fetcher.fetch_package(&entry.update_package_url).await?;

        self.set_status(PipelineStatus::PackageVerifying);
        self.verifier
            .verify_package(&package, &entry)
            .map_err(UpdateError::PackageSignatureInvalid)?;

        self.set_status(PipelineStatus::Decompressing);
        let packed = crate::updater::bundle::decompress(&package)
            .map_err(UpdateError::Decompression)?;

        self.set_status(PipelineStatus::Deserializing);
        let bundle = crate::updater::bundle::AssetBundle::unpack(&packed)
            .map_err(UpdateError::Deserialization)?;

        self.set_status(PipelineStatus::Installing);
        self.store.install(&entry, &package, bundle)?;
        // The new interface starts from an unauthenticated state.
        self.wallet.lock();
        self.display.reload();

        Ok(CheckOutcome::Installed(entry.version))
    }

    /// Startup path: load a previously installed bundle from disk, if intact
    /// and still authorized, and bring the display up on it.
    pub fn load_installed(&self) -> Result<Option<UpdateVersion>, StoreError> {
        let version = self.store.load(&self.verifier)?;
        if version.is_some() {
            self.wallet.lock();
            self.display.reload();
        }
        Ok(version)
    }

    /// Remove any installed updates and fall back to the built-in interface.
    pub fn remove_installed(&self) -> Result<(), StoreError> {
        self.store.remove()?;
        self.wallet.lock();
        self.display.reload();
        Ok(())
    }
}
