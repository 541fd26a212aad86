use std::time::Duration;

use crate::error::{Result, TorClientError};

pub const DEFAULT_SOCKS_HOST: &str = "127.0.0.1";
pub const DEFAULT_SOCKS_PORT: u16 = 9050;
pub const DEFAULT_IP_CHECK_URL: &str = "https://httpbin.org/ip";
pub const TOR_CHECK_URL: &str = "https://check.torproject.org/api/ip";
pub const DEFAULT_DAEMON_UNIT: &str = "tor";

#[derive(Debug, Clone)]
pub struct Config {
    pub socks_host: String,
    pub proxy_port: u16,
    pub debug: bool,
    pub timeout_secs: u64,
    pub verify_tls: bool,
    pub ip_check_url: String,
    /// systemd unit controlled on start and reload.
    pub daemon_unit: String,
    pub use_sudo: bool,
    /// Start the daemon when the client is constructed.
    pub autostart: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socks_host: DEFAULT_SOCKS_HOST.to_string(),
            proxy_port: DEFAULT_SOCKS_PORT,
            debug: false,
            timeout_secs: 60,
            verify_tls: true,
            ip_check_url: DEFAULT_IP_CHECK_URL.to_string(),
            daemon_unit: DEFAULT_DAEMON_UNIT.to_string(),
            use_sudo: true,
            autostart: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let socks_host = std::env::var("TOR_SOCKS_HOST").unwrap_or(defaults.socks_host);
        let proxy_port = std::env::var("TOR_SOCKS_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.proxy_port);
        let debug = std::env::var("TOR_DEBUG")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(defaults.debug);
        let timeout_secs = std::env::var("TOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.timeout_secs);
        let daemon_unit = std::env::var("TOR_SERVICE").unwrap_or(defaults.daemon_unit);
        let use_sudo = std::env::var("TOR_USE_SUDO")
            .ok()
            .and_then(|s| parse_flag(&s))
            .unwrap_or(defaults.use_sudo);

        Self {
            socks_host,
            proxy_port,
            debug,
            timeout_secs,
            daemon_unit,
            use_sudo,
            ..defaults
        }
    }

    pub fn with_proxy_port(mut self, port: u16) -> Self {
        self.proxy_port = port;
        self
    }

    pub fn with_socks_host(mut self, host: impl Into<String>) -> Self {
        self.socks_host = host.into();
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn without_tls_verify(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    pub fn with_ip_check_url(mut self, url: impl Into<String>) -> Self {
        self.ip_check_url = url.into();
        self
    }

    pub fn with_daemon_unit(mut self, unit: impl Into<String>) -> Self {
        self.daemon_unit = unit.into();
        self
    }

    pub fn without_sudo(mut self) -> Self {
        self.use_sudo = false;
        self
    }

    pub fn without_autostart(mut self) -> Self {
        self.autostart = false;
        self
    }

    pub fn socks_addr(&self) -> String {
        format!("{}:{}", self.socks_host, self.proxy_port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub retry_delay: Duration,
    /// When false a 4xx response ends the loop without rotating.
    pub retry_client_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            retry_client_errors: true,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
            ..Default::default()
        }
    }

    /// A single attempt, no rotation.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn without_client_error_retry(mut self) -> Self {
        self.retry_client_errors = false;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(TorClientError::Config(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
