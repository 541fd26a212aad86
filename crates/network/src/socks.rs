use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_socks::tcp::Socks5Stream;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, TorClientError};

/// The local SOCKS listener the daemon exposes.
#[derive(Debug, Clone)]
pub struct SocksEndpoint {
    addr: String,
    connect_timeout: Duration,
}

impl SocksEndpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.socks_addr())
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    fn socket_addr(&self) -> Result<SocketAddr> {
        self.addr
            .parse()
            .map_err(|e| TorClientError::Config(format!("Invalid SOCKS address: {}", e)))
    }

    /// Whether anything accepts TCP connections on the SOCKS port.
    pub async fn is_listening(&self) -> Result<bool> {
        let proxy_addr = self.socket_addr()?;

        match tokio::time::timeout(self.connect_timeout, TcpStream::connect(proxy_addr)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                debug!("SOCKS endpoint {} refused: {}", self.addr, e);
                Ok(false)
            }
            Err(_) => Ok(false),
        }
    }

    /// Opens and drops a SOCKS5 tunnel to `target_host:target_port`.
    pub async fn probe(&self, target_host: &str, target_port: u16) -> Result<()> {
        let proxy_addr = self.socket_addr()?;

        let connect = Socks5Stream::connect(proxy_addr, (target_host, target_port));
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(TorClientError::transport(format!(
                "SOCKS5 connection failed: {}",
                e
            ))),
            Err(_) => Err(TorClientError::timeout(format!(
                "SOCKS5 connection to {}:{} timed out",
                target_host, target_port
            ))),
        }
    }
}
