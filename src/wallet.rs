//! Trait boundaries to the external collaborators.
//!
//! The trust core never talks to the wallet keystore, the chain database, or
//! the UI shell directly; it sees them through these traits. Production
//! implementations live in the host application, tests supply mocks.

use secp256k1::PublicKey;
use thiserror::Error;
use url::Url;

use crate::keys::CompactSignature;

#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Wallet is locked")]
    Locked,
    #[error("Unknown wallet account: {0}")]
    UnknownAccount(String),
    #[error("Signing failed: {0}")]
    Signing(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionLookupError {
    #[error("The provided ID is not a valid transaction ID")]
    InvalidId,
    #[error("Could not find the specified transaction")]
    NotFound,
    #[error("Transaction lookup failed: {0}")]
    Other(String),
}

/// Signing capability of the local wallet. Keys never leave the wallet; the
/// trust core only ever asks it to sign a 32-byte hash on behalf of a named
/// account.
pub trait WalletSigner: Send + Sync {
    /// Whether the wallet is currently unlocked. Callers re-check this
    /// immediately before signing; `sign_hash` still fails cleanly with
    /// `WalletError::Locked` if the wallet locks in between.
    fn is_unlocked(&self) -> bool;

    /// Names of all accounts in the local wallet.
    fn account_names(&self) -> Vec<String>;

    /// Sign a hash with the key of the named account.
    fn sign_hash(&self, account: &str, hash: &[u8; 32]) -> Result<CompactSignature, WalletError>;

    /// Lock the wallet. Invoked before the displayed interface is replaced,
    /// so a freshly installed bundle starts from an unauthenticated state.
    fn lock(&self);
}

/// Read-only view of the chain the client is synced against.
pub trait ChainReader: Send + Sync {
    /// Resolve a registered account name from its public key.
    fn account_name_by_key(&self, key: &PublicKey) -> Option<String>;

    /// Age in seconds of the most recent block we know about, or `None` if
    /// the chain state is unavailable. Used to tell "that server is unknown"
    /// apart from "our own view of the chain is stale".
    fn head_block_age_secs(&self) -> Option<u64>;

    /// Resolve a block id string to its block number.
    fn block_number_by_id(&self, id: &str) -> Option<u32>;

    /// Confirm a transaction id exists and is visible to the wallet.
    fn resolve_transaction(&self, id: &str) -> Result<(), TransactionLookupError>;
}

/// User-consent seam for the login handshake. Silently picking an identity
/// for a remote login request is never acceptable, so both the single-account
/// confirmation and the multi-account selection go through the shell.
pub trait AccountChooser: Send + Sync {
    /// With exactly one wallet account: confirm the user wants to log in to
    /// `server_name` as `account`.
    fn confirm_login(&self, server_name: &str, account: &str) -> bool;

    /// With multiple accounts: pick one, or `None` to cancel.
    fn choose_account(&self, server_name: &str, accounts: &[String]) -> Option<String>;
}

/// The display surface hosting the web interface.
pub trait DisplaySurface: Send + Sync {
    /// Reload the displayed interface after the active bundle changed.
    fn reload(&self);

    /// Open a URL in a browsing context outside the embedded view. Login
    /// redirects go through here so the response never executes in the same
    /// trust context as the wallet UI.
    fn open_external(&self, url: &Url);
}
