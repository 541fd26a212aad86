use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::circuit::{CircuitControl, CircuitController, SystemdTor};
use crate::config::{Config, TOR_CHECK_URL};
use crate::error::{Result, TorClientError};
use crate::outcome::{Failure, RequestOutcome, Response};
use crate::request::RequestSpec;
use crate::session::{ProxyTarget, Session};
use crate::socks::SocksEndpoint;
use crate::transport::{OutboundRequest, ReqwestTransport, Transport};

pub struct TorHttpClient {
    config: Config,
    transport: Arc<dyn Transport>,
    circuit: CircuitController,
    session: Session,
    last_response: Option<Response>,
    pub(crate) cancel: CancellationToken,
    blocked_ips: Vec<String>,
}

impl TorHttpClient {
    /// Builds a client over reqwest and `systemctl`, starting the daemon if
    /// `config.autostart` is set.
    pub async fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.verify_tls));
        let control = Arc::new(SystemdTor::from_config(&config));
        Self::with_parts(config, transport, control).await
    }

    pub async fn with_parts(
        config: Config,
        transport: Arc<dyn Transport>,
        control: Arc<dyn CircuitControl>,
    ) -> Result<Self> {
        if config.proxy_port == 0 {
            return Err(TorClientError::Config("proxy port must be non-zero".into()));
        }
        if config.socks_host.trim().is_empty() {
            return Err(TorClientError::Config("SOCKS host must be set".into()));
        }

        let proxy = ProxyTarget::socks(&config.socks_host, config.proxy_port);
        let session = Session::new(proxy, config.timeout());

        let client = Self {
            transport,
            circuit: CircuitController::new(control),
            session,
            last_response: None,
            cancel: CancellationToken::new(),
            blocked_ips: Vec::new(),
            config,
        };

        if client.config.autostart && client.circuit.start().await && client.config.debug {
            client.show_ip().await;
        }

        Ok(client)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn circuit(&self) -> &CircuitController {
        &self.circuit
    }

    pub fn socks_endpoint(&self) -> SocksEndpoint {
        SocksEndpoint::from_config(&self.config)
    }

    /// The last response received, whatever its status. `None` after an
    /// attempt that produced no response at all.
    pub fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    /// One attempt through the proxy, no retry.
    ///
    /// Only configuration errors are returned as `Err`: an invalid `spec`, or
    /// a request the transport refuses to build. Every network failure is
    /// folded into the outcome.
    pub async fn execute(&mut self, spec: &RequestSpec) -> Result<RequestOutcome> {
        let url = spec.validate()?;

        if self.cancel.is_cancelled() {
            return Ok(RequestOutcome::Cancelled);
        }

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            outcome = self.attempt(spec, url) => outcome?,
            _ = cancel.cancelled() => RequestOutcome::Cancelled,
        };

        if outcome.is_cancelled() {
            debug!("{} request to {} cancelled", spec.method, spec.url);
            self.last_response = None;
        }
        Ok(outcome)
    }

    async fn attempt(&mut self, spec: &RequestSpec, url: Url) -> Result<RequestOutcome> {
        let host = url.host_str().unwrap_or_default().to_string();
        let request = self.outbound(spec, url, &host);

        let mut connection = match self.transport.open(self.session.proxy()).await {
            Ok(connection) => connection,
            Err(e) => {
                self.last_response = None;
                if let TorClientError::Config(_) = e {
                    return Err(e);
                }
                error!(
                    "Could not open proxied connection for {} {}: {}",
                    spec.method, spec.url, e
                );
                return Ok(RequestOutcome::Failure(Failure::transport(&e)));
            }
        };

        let result = connection.send(request).await;
        drop(connection);

        match result {
            Ok(response) => {
                self.session
                    .store_set_cookie(&host, response.header_all("set-cookie"));
                self.last_response = Some(response.clone());

                let outcome = RequestOutcome::classify(response, spec.method.as_str(), &spec.url);
                match &outcome {
                    RequestOutcome::Failure(failure) => error!(
                        "An error occurred during {} request to {}: {}",
                        spec.method, spec.url, failure
                    ),
                    _ => debug!("{} request to {} successful", spec.method, spec.url),
                }
                Ok(outcome)
            }
            Err(TorClientError::Config(message)) => {
                self.last_response = None;
                Err(TorClientError::Config(message))
            }
            Err(e) => {
                error!(
                    "An error occurred during {} request to {}: {}",
                    spec.method, spec.url, e
                );
                self.last_response = None;
                Ok(RequestOutcome::Failure(Failure::transport(&e)))
            }
        }
    }

    /// Layers per-request headers and timeout over the session defaults.
    fn outbound(&self, spec: &RequestSpec, url: Url, host: &str) -> OutboundRequest {
        let mut headers: Vec<(String, String)> = self
            .session
            .headers()
            .iter()
            .filter(|(name, _)| {
                !spec
                    .headers
                    .keys()
                    .any(|override_name| override_name.eq_ignore_ascii_case(name))
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.extend(spec.headers.iter().map(|(k, v)| (k.clone(), v.clone())));

        let has_cookie = headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("cookie"));
        if !has_cookie {
            if let Some(cookie) = self.session.cookie_header(host) {
                headers.push(("Cookie".to_string(), cookie));
            }
        }

        OutboundRequest {
            method: spec.method,
            url,
            headers,
            body: spec.body(),
            timeout: spec.timeout.unwrap_or_else(|| self.session.timeout()),
        }
    }

    /// GET through the proxy without touching `last_response` or cookies.
    async fn fetch_untracked(&self, url: &str) -> Result<Response> {
        let spec = RequestSpec::get(url);
        let url = spec.validate()?;
        let host = url.host_str().unwrap_or_default().to_string();
        let request = self.outbound(&spec, url, &host);

        let fetch = async {
            let mut connection = self.transport.open(self.session.proxy()).await?;
            connection.send(request).await
        };

        let response = tokio::select! {
            response = fetch => response?,
            _ = self.cancel.cancelled() => {
                return Err(TorClientError::transport("cancelled"));
            }
        };

        if !response.is_success() {
            return Err(TorClientError::Http(format!(
                "GET {} returned status {}",
                spec.url, response.status
            )));
        }
        Ok(response)
    }

    pub async fn get(&mut self, url: &str) -> Result<RequestOutcome> {
        self.execute(&RequestSpec::get(url)).await
    }

    pub async fn post(
        &mut self,
        url: &str,
        data: Option<Vec<u8>>,
        json: Option<serde_json::Value>,
    ) -> Result<RequestOutcome> {
        self.execute(&with_body(RequestSpec::post(url), data, json))
            .await
    }

    pub async fn put(
        &mut self,
        url: &str,
        data: Option<Vec<u8>>,
        json: Option<serde_json::Value>,
    ) -> Result<RequestOutcome> {
        self.execute(&with_body(RequestSpec::put(url), data, json))
            .await
    }

    pub async fn delete(&mut self, url: &str) -> Result<RequestOutcome> {
        self.execute(&RequestSpec::delete(url)).await
    }

    /// Requests a new circuit; in debug mode the new exit IP is logged.
    pub async fn change_ip(&self) -> bool {
        let rotated = self.circuit.rotate().await;
        if self.config.debug {
            self.show_ip().await;
        }
        rotated
    }

    /// Current exit IP as reported by `config.ip_check_url`.
    pub async fn show_ip(&self) -> Option<String> {
        let ip = match self.fetch_untracked(&self.config.ip_check_url).await {
            Ok(response) => response
                .json::<serde_json::Value>()
                .ok()
                .and_then(|v| v.get("origin").and_then(|o| o.as_str()).map(str::to_string)),
            Err(e) => {
                debug!("IP lookup failed: {}", e);
                None
            }
        };

        match &ip {
            Some(ip) => info!("Current IP: {}", ip),
            None => warn!("Failed to retrieve the IP address"),
        }
        ip
    }

    pub async fn verify_tor_connection(&self) -> bool {
        match self.fetch_untracked(TOR_CHECK_URL).await {
            Ok(response) => response
                .json::<serde_json::Value>()
                .ok()
                .and_then(|v| v.get("IsTor").and_then(|b| b.as_bool()))
                .unwrap_or(false),
            Err(e) => {
                error!("Failed to verify Tor connection: {}", e);
                false
            }
        }
    }

    /// Whether the current exit IP is on the block list. `blocked_ips_file`,
    /// when given, replaces the list with its JSON array of addresses.
    pub async fn check_ip_blocked(&mut self, blocked_ips_file: Option<&Path>) -> bool {
        let Some(current_ip) = self.show_ip().await else {
            return false;
        };

        if let Some(path) = blocked_ips_file {
            match load_blocked_ips(path) {
                Ok(ips) => {
                    info!("Loaded {} blocked IPs from file", ips.len());
                    self.blocked_ips = ips;
                }
                Err(e) => {
                    error!("Failed to load blocked IPs from file: {}", e);
                    return false;
                }
            }
        }

        let is_blocked = self.blocked_ips.iter().any(|ip| *ip == current_ip);
        if is_blocked {
            warn!("Current IP {} is blocked", current_ip);
        } else {
            debug!("Current IP {} is not blocked", current_ip);
        }
        is_blocked
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.session.set_timeout(timeout);
    }

    pub fn set_headers<I, K, V>(&mut self, headers: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.session.set_headers(headers)
    }

    pub fn clear_cookies(&mut self) {
        self.session.clear_cookies();
    }

    pub fn export_session(&self, path: &Path) -> Result<()> {
        self.session.export(path)
    }
}

fn with_body(
    spec: RequestSpec,
    data: Option<Vec<u8>>,
    json: Option<serde_json::Value>,
) -> RequestSpec {
    RequestSpec { data, json, ..spec }
}

fn load_blocked_ips(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
