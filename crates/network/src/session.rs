use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::error::{Result, TorClientError};
use crate::request::validate_header;

/// SOCKS proxy used for both `http` and `https` traffic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyTarget {
    pub http: String,
    pub https: String,
}

impl ProxyTarget {
    pub fn socks(host: &str, port: u16) -> Self {
        // socks5h: hostnames are resolved by the exit, not locally
        let url = format!("socks5h://{}:{}", host, port);
        Self {
            http: url.clone(),
            https: url,
        }
    }
}

/// Client-owned request state: default headers, timeout, cookies.
#[derive(Debug, Clone)]
pub struct Session {
    headers: BTreeMap<String, String>,
    timeout: Duration,
    cookies: BTreeMap<String, BTreeMap<String, String>>,
    proxy: ProxyTarget,
}

#[derive(Serialize)]
struct SessionExport<'a> {
    cookies: &'a BTreeMap<String, BTreeMap<String, String>>,
    headers: &'a BTreeMap<String, String>,
    proxies: &'a ProxyTarget,
}

impl Session {
    pub fn new(proxy: ProxyTarget, timeout: Duration) -> Self {
        Self {
            headers: BTreeMap::new(),
            timeout,
            cookies: BTreeMap::new(),
            proxy,
        }
    }

    pub fn proxy(&self) -> &ProxyTarget {
        &self.proxy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Merges `headers` into the defaults. Nothing is applied if any pair
    /// is not a valid HTTP header.
    pub fn set_headers<I, K, V>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        for (name, value) in &headers {
            validate_header(name, value)?;
        }

        self.headers.extend(headers);
        info!("Session headers updated");
        Ok(())
    }

    /// All cookies, keyed by host.
    pub fn cookies(&self) -> &BTreeMap<String, BTreeMap<String, String>> {
        &self.cookies
    }

    pub fn cookies_for(&self, host: &str) -> Option<&BTreeMap<String, String>> {
        self.cookies.get(host)
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
        info!("Session cookies cleared");
    }

    /// `Cookie` header value for a host, if any cookie is stored for it.
    pub fn cookie_header(&self, host: &str) -> Option<String> {
        let jar = self.cookies.get(host)?;
        if jar.is_empty() {
            return None;
        }
        Some(
            jar.iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn store_set_cookie<'a>(&mut self, host: &str, values: impl IntoIterator<Item = &'a str>) {
        for value in values {
            if let Some((name, val)) = parse_set_cookie(value) {
                self.cookies
                    .entry(host.to_string())
                    .or_default()
                    .insert(name, val);
            }
        }
    }

    pub fn export(&self, path: &Path) -> Result<()> {
        let export = SessionExport {
            cookies: &self.cookies,
            headers: &self.headers,
            proxies: &self.proxy,
        };

        let result: Result<()> = serde_json::to_string_pretty(&export)
            .map_err(TorClientError::from)
            .and_then(|json| std::fs::write(path, json).map_err(TorClientError::from));

        match &result {
            Ok(()) => info!("Session exported to {}", path.display()),
            Err(e) => error!("Failed to export session: {}", e),
        }
        result
    }
}

fn parse_set_cookie(value: &str) -> Option<(String, String)> {
    let pair = value.split(';').next()?;
    let (name, val) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), val.trim().to_string()))
}
