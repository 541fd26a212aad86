use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Url;
use serde::Serialize;

use crate::error::{Result, TorClientError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }

    /// Whether the CLI forwards `--data` / `--json` for this verb.
    pub fn carries_body(&self) -> bool {
        matches!(self, Method::Post | Method::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = TorClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            other => Err(TorClientError::Config(format!(
                "Unsupported method: {}",
                other
            ))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Raw(Vec<u8>),
    Json(serde_json::Value),
}

/// One call's input. `data` and `json` are mutually exclusive.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub url: String,
    pub data: Option<Vec<u8>>,
    pub json: Option<serde_json::Value>,
    pub headers: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
}

impl RequestSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            data: None,
            json: None,
            headers: BTreeMap::new(),
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::Delete, url)
    }

    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self> {
        self.json = Some(serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn with_json_value(mut self, value: serde_json::Value) -> Self {
        self.json = Some(value);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Rejects requests that cannot be sent, before any network activity.
    pub fn validate(&self) -> Result<Url> {
        if self.data.is_some() && self.json.is_some() {
            return Err(TorClientError::Config(
                "raw data and JSON body are mutually exclusive".to_string(),
            ));
        }

        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }

        let url = Url::parse(&self.url)
            .map_err(|e| TorClientError::Config(format!("Invalid URL {}: {}", self.url, e)))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(TorClientError::Config(format!(
                "Unsupported URL scheme: {}",
                other
            ))),
        }
    }

    pub fn body(&self) -> Option<Body> {
        if let Some(data) = &self.data {
            return Some(Body::Raw(data.clone()));
        }
        self.json.clone().map(Body::Json)
    }
}

/// Header name and value must be sendable as-is.
pub(crate) fn validate_header(name: &str, value: &str) -> Result<()> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TorClientError::Config(format!("Invalid header {}: {}", name, e)))?;
    HeaderValue::from_str(value)
        .map_err(|e| TorClientError::Config(format!("Invalid header {}: {}", name, e)))?;
    Ok(())
}
