//! webtrust - Signed update distribution and deep-link trust core for the
//! XTS desktop wallet.
//!
//! Two subsystems share one trust model:
//! - `updater`: fetches a signed manifest, verifies threshold signatures
//!   from the trusted signer set, and atomically installs web interface
//!   bundles.
//! - `deeplink`: parses custom-scheme URLs against a closed allow-list and
//!   runs the mutually authenticating login handshake.
//!
//! The host application supplies wallet, chain, and display access through
//! the traits in `wallet`.

pub mod config;
pub mod deeplink;
pub mod keys;
pub mod updater;
pub mod wallet;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
