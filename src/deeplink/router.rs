//! Parsing of custom-scheme deep links into typed commands.
//!
//! The URL surface is remote-controllable, so the first path component goes
//! through a closed allow-list: anything unrecognized produces no command and
//! no side effect. Deep-link values are path fragments targeting the local
//! service endpoint; the only full URL a deep link can carry is the login
//! flow's redirect target, which the handshake constrains separately.

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::wallet::{ChainReader, TransactionLookupError};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeepLinkError {
    #[error("The URL provided is not valid")]
    EmptyUrl,
    #[error("The specified block number does not exist: {0}")]
    InvalidBlockNumber(String),
    #[error("The specified block does not exist: {0}")]
    UnknownBlockId(String),
    #[error(transparent)]
    Transaction(#[from] TransactionLookupError),
    #[error("Login URL is missing its key or signature")]
    MalformedLogin,
    #[error("Navigation target is not a valid URL")]
    BadEndpoint,
}

/// A login request parsed from a deep link. Key and signature stay as text
/// until the handshake parses them, so a malformed value fails there with a
/// handshake error rather than poisoning the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub server_one_time_key: String,
    pub server_signature: String,
    /// Host and path components of the redirect target, joined with '/'.
    pub return_path: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
    pub asset: String,
    pub memo: String,
}

/// A typed deep-link command. Constructed only by the router; immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeepLinkCommand {
    Navigate(&'static str),
    ViewAccounts,
    ViewAccount(String),
    ViewBlocks,
    ViewBlockByNumber(u32),
    ViewBlockById(String),
    OpenTransaction(String),
    CreateAccount,
    AddContact,
    Login(LoginRequest),
    Transfer(TransferRequest),
    ReferralCode { faucet: String, code: String },
}

/// Simple navigation families: first component maps straight to a local
/// path of the same name.
const NAVIGATION_FAMILIES: &[&str] = &[
    "home",
    "delegates",
    "notes",
    "directory",
    "preferences",
    "console",
    "help",
];

pub struct DeepLinkRouter {
    scheme: String,
}

impl DeepLinkRouter {
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
        }
    }

    /// Parse a raw deep-link string. `Ok(None)` means the URL was ignored
    /// (wrong scheme or a component outside the allow-list); errors are the
    /// cases that warrant a user-visible message.
    pub fn parse(&self, raw: &str) -> Result<Option<DeepLinkCommand>, DeepLinkError> {
        let Some((scheme, rest)) = raw.split_once(':') else {
            warn!(url = raw, "Got URL with no scheme");
            return Ok(None);
        };
        if !scheme.eq_ignore_ascii_case(&self.scheme) {
            warn!(url = raw, "Got URL of unknown scheme");
            return Ok(None);
        }

        info!(url = raw, "Processing custom URL request");
        let components: Vec<&str> = rest
            .trim_start_matches('/')
            .split('/')
            .filter(|c| !c.is_empty())
            .collect();
        let Some((family, args)) = components.split_first() else {
            warn!("Invalid URL has no contents");
            return Err(DeepLinkError::EmptyUrl);
        };

        let family = family.to_ascii_lowercase();
        if let Some(path) = NAVIGATION_FAMILIES.iter().copied().find(|f| *f == family) {
            return Ok(Some(DeepLinkCommand::Navigate(path)));
        }

        match family.as_str() {
            "newcontact" => Ok(Some(DeepLinkCommand::AddContact)),
            "accounts" => Ok(Some(match args.first() {
                Some(name) => DeepLinkCommand::ViewAccount(name.to_string()),
                None => DeepLinkCommand::ViewAccounts,
            })),
            "blocks" => match args.first() {
                None => Ok(Some(DeepLinkCommand::ViewBlocks)),
                Some(number) => match number.parse() {
                    Ok(n) => Ok(Some(DeepLinkCommand::ViewBlockByNumber(n))),
                    Err(_) => Err(DeepLinkError::InvalidBlockNumber(number.to_string())),
                },
            },
            "login" => {
                if args.len() < 2 {
                    return Err(DeepLinkError::MalformedLogin);
                }
                Ok(Some(DeepLinkCommand::Login(LoginRequest {
                    server_one_time_key: args[0].to_string(),
                    server_signature: args[1].to_string(),
                    return_path: args[2..].iter().map(|c| c.to_string()).collect(),
                })))
            }
            "transfer" => Ok(args.split_first().map(|(to, parameters)| {
                DeepLinkCommand::Transfer(parse_transfer(to, parameters))
            })),
            "referral_code" => {
                let mut faucet = String::new();
                let mut code = String::new();
                parse_pairs(args, |name, value| match name {
                    "faucet" => faucet = value.to_string(),
                    "code" => code = value.to_string(),
                    _ => {}
                });
                Ok(Some(DeepLinkCommand::ReferralCode { faucet, code }))
            }
            _ => {
                // Closed allow-list: unknown families are dropped, never
                // forwarded anywhere.
                info!(family, "Ignoring deep link outside the allow-list");
                Ok(None)
            }
        }
    }

    /// Resolve the chain-dependent commands into navigable ones: a block id
    /// becomes a block number, a transaction id is confirmed to exist.
    /// Everything else passes through unchanged.
    pub fn resolve(
        &self,
        command: DeepLinkCommand,
        chain: &dyn ChainReader,
    ) -> Result<DeepLinkCommand, DeepLinkError> {
        match command {
            DeepLinkCommand::ViewBlockById(id) => match chain.block_number_by_id(&id) {
                Some(number) => Ok(DeepLinkCommand::ViewBlockByNumber(number)),
                None => {
                    warn!(id, "Block id did not resolve to a block");
                    Err(DeepLinkError::UnknownBlockId(id))
                }
            },
            DeepLinkCommand::OpenTransaction(id) => {
                chain.resolve_transaction(&id)?;
                Ok(DeepLinkCommand::OpenTransaction(id))
            }
            other => Ok(other),
        }
    }

    /// The same-origin navigation URL for a command, targeting the local
    /// service endpoint. Commands that are not plain navigation (login)
    /// return `None`, as does an unresolved block id; run `resolve` first.
    pub fn navigation_target(
        &self,
        command: &DeepLinkCommand,
        local_endpoint: &str,
    ) -> Result<Option<Url>, DeepLinkError> {
        let path = match command {
            DeepLinkCommand::Navigate(path) => format!("/{path}"),
            DeepLinkCommand::ViewAccounts => "/accounts".to_string(),
            DeepLinkCommand::ViewAccount(name) => format!("/accounts/{name}"),
            DeepLinkCommand::ViewBlocks => "/blocks".to_string(),
            DeepLinkCommand::ViewBlockByNumber(n) => format!("/blocks/{n}"),
            DeepLinkCommand::OpenTransaction(id) => format!("/tx/{id}"),
            DeepLinkCommand::CreateAccount => "/create/account".to_string(),
            DeepLinkCommand::AddContact => "/newcontact".to_string(),
            DeepLinkCommand::Transfer(t) => format!(
                "/transfer?from={}&to={}&amount={}&asset={}&memo={}",
                t.from, t.to, t.amount, t.asset, t.memo
            ),
            DeepLinkCommand::ReferralCode { faucet, code } => {
                format!("/referral_code?faucet={faucet}&code={code}")
            }
            DeepLinkCommand::Login(_) | DeepLinkCommand::ViewBlockById(_) => return Ok(None),
        };

        // The host is always the local endpoint; deep links cannot steer the
        // embedded view to a foreign origin.
        Url::parse(&format!("http://{local_endpoint}/#{path}"))
            .map(Some)
            .map_err(|_| DeepLinkError::BadEndpoint)
    }
}

fn parse_transfer(to: &str, parameters: &[&str]) -> TransferRequest {
    let mut transfer = TransferRequest {
        to: to.to_string(),
        ..Default::default()
    };
    parse_pairs(parameters, |name, value| match name {
        "from" => transfer.from = value.to_string(),
        "amount" => transfer.amount = value.to_string(),
        "asset" => transfer.asset = value.to_string(),
        "memo" => transfer.memo = value.to_string(),
        _ => warn!(token = name, "Ignoring unknown token in URL"),
    });
    transfer
}

/// Walk alternating name/value components. A trailing name with no value is
/// malformed; parsing stops there.
fn parse_pairs(components: &[&str], mut apply: impl FnMut(&str, &str)) {
    let mut iter = components.iter();
    while let Some(name) = iter.next() {
        let Some(value) = iter.next() else {
            warn!(token = name, "URL is malformed; ignoring unparseable token");
            break;
        };
        apply(name, value);
    }
}
