use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::{Result, TorClientError};

/// A response as received through the proxy, status not yet judged.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Header names are lowercase; repeated headers keep one entry each.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(TorClientError::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transport { timeout: bool },
    HttpStatus(u16),
}

impl FailureKind {
    pub fn is_timeout(&self) -> bool {
        matches!(self, FailureKind::Transport { timeout: true })
    }

    /// A 4xx status, which the retry policy may decline to retry.
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|status| (400..500).contains(&status))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FailureKind::HttpStatus(status) => Some(*status),
            FailureKind::Transport { .. } => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transport { timeout: true } => f.write_str("timeout"),
            FailureKind::Transport { timeout: false } => f.write_str("transport error"),
            FailureKind::HttpStatus(status) => write!(f, "HTTP status {}", status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn transport(err: &TorClientError) -> Self {
        Self {
            kind: FailureKind::Transport {
                timeout: err.is_timeout(),
            },
            message: err.to_string(),
        }
    }

    pub fn status(response: &Response, method: &str, url: &str) -> Self {
        Self {
            kind: FailureKind::HttpStatus(response.status),
            message: format!("{} {} returned status {}", method, url, response.status),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    Success(Response),
    Failure(Failure),
    Cancelled,
}

impl RequestOutcome {
    /// Judges a received response: statuses in [200, 400) succeed.
    pub fn classify(response: Response, method: &str, url: &str) -> Self {
        if response.is_success() {
            RequestOutcome::Success(response)
        } else {
            RequestOutcome::Failure(Failure::status(&response, method, url))
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestOutcome::Cancelled)
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            RequestOutcome::Success(response) => Some(response),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            RequestOutcome::Failure(failure) => Some(failure),
            _ => None,
        }
    }
}
