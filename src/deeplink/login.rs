//! The deep-link login handshake.
//!
//! A mutually authenticating key exchange: the server proves ownership of its
//! account key by signing its one-time key, the client proves ownership of a
//! locally chosen account by signing a value only derivable from both
//! one-time keys. The shared secret travels back in the URL fragment, which
//! browsers do not send to servers, so it never lands in server-side logs.
//!
//! Everything ephemeral (the one-time secret key, the shared secret, the
//! chosen identity) lives only inside `execute`; on any failure it drops
//! before anything observable happens, and no failure detail reaches the
//! remote party.

use std::sync::Arc;

use secp256k1::{All, Secp256k1};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::deeplink::router::{DeepLinkCommand, LoginRequest};
use crate::keys;
use crate::wallet::{AccountChooser, ChainReader, DisplaySurface, WalletError, WalletSigner};

/// A head block younger than this means our chain view is current, so a
/// failed server-account lookup is the server's fault, not sync lag.
const MAX_TRUSTED_HEAD_AGE_SECS: u64 = 1;

#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("The URL provided is not valid")]
    ParseKey,
    #[error("The URL provided is not valid")]
    ParseSignature,
    #[error("The website you are trying to log into is experiencing problems, and cannot accept logins at this time")]
    ServerUnknown,
    #[error("Cannot login right now because your computer is out of sync with the network. Please try again later")]
    OutOfSync,
    #[error("Please unlock your wallet and try again")]
    WalletLocked,
    #[error("An error occurred during login")]
    Wallet(#[from] WalletError),
    #[error("The URL provided is not valid")]
    ReturnUrl,
}

/// How a handshake attempt ended without erroring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Handshake complete; the redirect URL was handed to the external
    /// browser opener.
    Redirect(Url),
    /// No wallet accounts exist; the caller should route the user to account
    /// creation.
    NoAccounts,
    /// The user declined the login.
    Cancelled,
}

impl LoginOutcome {
    /// The navigation the shell should dispatch after this outcome, if any.
    /// A wallet with no accounts is sent to account creation so the user can
    /// retry the login afterwards.
    pub fn follow_up(&self) -> Option<DeepLinkCommand> {
        match self {
            Self::NoAccounts => Some(DeepLinkCommand::CreateAccount),
            Self::Redirect(_) | Self::Cancelled => None,
        }
    }
}

pub struct LoginHandshake {
    wallet: Arc<dyn WalletSigner>,
    chain: Arc<dyn ChainReader>,
    chooser: Arc<dyn AccountChooser>,
    display: Arc<dyn DisplaySurface>,
    secp: Secp256k1<All>,
}

impl LoginHandshake {
    pub fn new(
        wallet: Arc<dyn WalletSigner>,
        chain: Arc<dyn ChainReader>,
        chooser: Arc<dyn AccountChooser>,
        display: Arc<dyn DisplaySurface>,
    ) -> Self {
        Self {
            wallet,
            chain,
            chooser,
            display,
            secp: Secp256k1::new(),
        }
    }

    /// Run the full handshake for a parsed login request. On success the
    /// redirect URL is opened outside the embedded view and returned; on any
    /// failure nothing is opened.
    pub fn execute(&self, request: &LoginRequest) -> Result<LoginOutcome, HandshakeError> {
        let server_one_time_key = keys::parse_public_key(&request.server_one_time_key)
            .map_err(|e| {
                error!(key = %request.server_one_time_key, error = %e, "Unable to parse server one-time key");
                HandshakeError::ParseKey
            })?;
        let server_signature = keys::CompactSignature::from_hex(&request.server_signature)
            .map_err(|e| {
                error!(error = %e, "Unable to parse server signature");
                HandshakeError::ParseSignature
            })?;

        // The server's long-lived account key is whoever signed the one-time
        // key. A bogus signature recovers to garbage, which simply fails the
        // account lookup below.
        let one_time_key_hash = keys::sha256(&server_one_time_key.serialize());
        let server_account_key = keys::recover(&self.secp, &server_signature, &one_time_key_hash)
            .map_err(|e| {
                error!(error = %e, "Unable to derive server account public key");
                HandshakeError::ParseSignature
            })?;

        let server_name = match self.chain.account_name_by_key(&server_account_key) {
            Some(name) => name,
            None => {
                return Err(match self.chain.head_block_age_secs() {
                    Some(age) if age < MAX_TRUSTED_HEAD_AGE_SECS => HandshakeError::ServerUnknown,
                    _ => HandshakeError::OutOfSync,
                });
            }
        };

        let account = match self.select_account(&server_name)? {
            Selection::Account(name) => name,
            Selection::NoAccounts => return Ok(LoginOutcome::NoAccounts),
            Selection::Cancelled => return Ok(LoginOutcome::Cancelled),
        };

        // One-time key pair for this attempt only; the secret half drops at
        // the end of this call.
        let (local_secret, local_public) = keys::generate_keypair(&self.secp);
        let secret = keys::shared_secret(&local_secret, &server_one_time_key);

        // Re-check immediately before signing; sign_hash still fails cleanly
        // if the wallet locks in the window between.
        if !self.wallet.is_unlocked() {
            return Err(HandshakeError::WalletLocked);
        }
        let signed_secret = self.wallet.sign_hash(&account, &keys::sha256(&secret))?;

        let url = build_redirect_url(
            &request.return_path,
            &local_public.to_string(),
            &account,
            &server_one_time_key.to_string(),
            &signed_secret.to_hex(),
            &hex::encode(secret),
        )?;

        info!(
            client_key = %local_public,
            server = %server_name,
            "Opening login redirect in external browser"
        );
        self.display.open_external(&url);
        Ok(LoginOutcome::Redirect(url))
    }

    fn select_account(&self, server_name: &str) -> Result<Selection, HandshakeError> {
        let accounts = self.wallet.account_names();
        Ok(match accounts.as_slice() {
            [] => Selection::NoAccounts,
            [only] => {
                if self.chooser.confirm_login(server_name, only) {
                    Selection::Account(only.clone())
                } else {
                    Selection::Cancelled
                }
            }
            _ => match self.chooser.choose_account(server_name, &accounts) {
                Some(account) => Selection::Account(account),
                None => Selection::Cancelled,
            },
        })
    }
}

enum Selection {
    Account(String),
    NoAccounts,
    Cancelled,
}

/// Assemble the redirect URL: the return path becomes the authority and
/// path, the handshake values ride in the query, and the shared secret rides
/// in the fragment.
fn build_redirect_url(
    return_path: &[String],
    client_key: &str,
    client_name: &str,
    server_key: &str,
    signed_secret: &str,
    secret_hex: &str,
) -> Result<Url, HandshakeError> {
    let mut url =
        Url::parse(&format!("http://{}", return_path.join("/"))).map_err(|_| HandshakeError::ReturnUrl)?;
    if !url.has_host() {
        return Err(HandshakeError::ReturnUrl);
    }
    url.query_pairs_mut()
        .append_pair("client_key", client_key)
        .append_pair("client_name", client_name)
        .append_pair("server_key", server_key)
        .append_pair("signed_secret", signed_secret);
    url.set_fragment(Some(secret_hex));
    Ok(url)
}
