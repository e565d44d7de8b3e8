//! Single-instance deep-link forwarding.
//!
//! The OS hands a custom-scheme URL to a freshly launched process, but only
//! one instance should own the wallet. The first instance binds a loopback
//! TCP port and listens; any later instance fails the bind, forwards its URL
//! to the listener instead (one URL per line), and exits.
//!
//! Bound to 127.0.0.1 only. Anything local can connect, but everything
//! received here goes through the deep-link router's allow-list, so a rogue
//! local writer gets no more capability than typing a URL would.

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Another instance is already running")]
    AlreadyRunning,
}

/// The listening half held by the primary instance.
pub struct InstanceListener {
    listener: TcpListener,
}

impl InstanceListener {
    /// Claim the single-instance port. Fails with `AlreadyRunning` if another
    /// process holds it.
    pub async fn claim(port: u16) -> Result<Self, IpcError> {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => {
                info!(port, "Claimed single-instance port");
                Ok(Self { listener })
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => Err(IpcError::AlreadyRunning),
            Err(e) => Err(IpcError::Io(e)),
        }
    }

    /// The port actually bound. Useful with port 0 in tests.
    pub fn local_port(&self) -> Result<u16, IpcError> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Accept forwarded URLs forever, sending each line to `urls`. Returns
    /// when the receiving side is dropped.
    pub async fn run(self, urls: mpsc::Sender<String>) {
        loop {
            let stream = match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "Secondary instance connected");
                    stream
                }
                Err(e) => {
                    warn!(error = %e, "Failed to accept forwarded connection");
                    continue;
                }
            };

            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let url = line.trim().to_string();
                        if url.is_empty() {
                            continue;
                        }
                        if urls.send(url).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Error reading forwarded URL");
                        break;
                    }
                }
            }
        }
    }
}

/// Secondary-instance path: hand our URL to whoever owns the port.
pub async fn forward_url(port: u16, url: &str) -> Result<(), IpcError> {
    let mut stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await?;
    stream.write_all(url.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await?;
    Ok(())
}
