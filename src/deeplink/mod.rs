//! Custom-scheme deep links.
//!
//! Components:
//! - `router` - parsing URLs into commands against a closed allow-list
//! - `login` - the mutually authenticating login handshake
//! - `ipc` - loopback forwarding of URLs from secondary instances

pub mod ipc;
pub mod login;
pub mod router;

pub use login::{HandshakeError, LoginHandshake, LoginOutcome};
pub use router::{DeepLinkCommand, DeepLinkError, DeepLinkRouter, LoginRequest, TransferRequest};
