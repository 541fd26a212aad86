use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Proxy, Url};

use crate::error::Result;
use crate::outcome::Response;
use crate::request::{Body, Method};
use crate::session::ProxyTarget;

/// Fully resolved request handed to a [`Connection`].
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
    pub timeout: Duration,
}

/// Opens one connection per attempt through the proxy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, proxy: &ProxyTarget) -> Result<Box<dyn Connection>>;
}

/// A single-use connection. Dropping it releases every socket it holds.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, request: OutboundRequest) -> Result<Response>;
}

pub struct ReqwestTransport {
    verify_tls: bool,
}

impl ReqwestTransport {
    pub fn new(verify_tls: bool) -> Self {
        Self { verify_tls }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, proxy: &ProxyTarget) -> Result<Box<dyn Connection>> {
        let mut builder = Client::builder()
            .proxy(Proxy::http(&proxy.http)?)
            .proxy(Proxy::https(&proxy.https)?)
            .pool_max_idle_per_host(0);

        if !self.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder.build()?;
        Ok(Box::new(ReqwestConnection { client }))
    }
}

struct ReqwestConnection {
    client: Client,
}

#[async_trait]
impl Connection for ReqwestConnection {
    async fn send(&mut self, request: OutboundRequest) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method.into(), request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            Some(Body::Raw(data)) => builder.body(data),
            Some(Body::Json(value)) => builder.json(&value),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
