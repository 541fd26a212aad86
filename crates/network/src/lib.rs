//! HTTP client that routes every request through a local Tor SOCKS port and
//! can rotate the exit circuit between attempts.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tor_http_client::{Config, RequestSpec, RetryPolicy, TorHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> tor_http_client::Result<()> {
//!     let mut client = TorHttpClient::new(Config::default()).await?;
//!
//!     // Up to 3 attempts, 2s apart, new circuit before each retry
//!     let policy = RetryPolicy::new(3, Duration::from_secs(2));
//!     let outcome = client
//!         .execute_with_retry(&RequestSpec::get("https://httpbin.org/ip"), &policy)
//!         .await?;
//!
//!     if let Some(response) = outcome.response() {
//!         println!("{}", response.text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod circuit;
pub mod config;
pub mod error;
pub mod http_client;
pub mod outcome;
pub mod request;
pub mod retry;
pub mod session;
pub mod socks;
pub mod transport;

pub use circuit::{CircuitControl, CircuitController, SystemdTor};
pub use config::{Config, RetryPolicy, DEFAULT_SOCKS_HOST, DEFAULT_SOCKS_PORT};
pub use error::{Result, TorClientError};
pub use http_client::TorHttpClient;
pub use outcome::{Failure, FailureKind, RequestOutcome, Response};
pub use request::{Body, Method, RequestSpec};
pub use retry::BatchEntry;
pub use session::{ProxyTarget, Session};
pub use socks::SocksEndpoint;
pub use transport::{Connection, OutboundRequest, ReqwestTransport, Transport};
pub use tokio_util::sync::CancellationToken;

pub async fn tor_client() -> Result<TorHttpClient> {
    TorHttpClient::new(Config::default()).await
}
