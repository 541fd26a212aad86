#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tor_http_client::{
    CircuitControl, Config, Connection, OutboundRequest, ProxyTarget, Response, Result,
    TorClientError, TorHttpClient, Transport,
};

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16),
    StatusWithHeaders(u16, Vec<(String, String)>),
    Json(serde_json::Value),
    Refused,
    Timeout,
    /// The request cannot be built, as reqwest reports for a bad header.
    Unbuildable,
    /// Never completes; used to exercise cancellation.
    Hang,
}

type Responder = dyn Fn(&OutboundRequest, usize) -> Reply + Send + Sync;

/// Counts connections and answers each send from `responder`, which gets the
/// request and the zero-based index of the send.
#[derive(Clone)]
pub struct FakeTransport {
    responder: Arc<Responder>,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<OutboundRequest>>>,
    pub proxies: Arc<Mutex<Vec<ProxyTarget>>>,
    refuse_open: bool,
}

impl FakeTransport {
    pub fn new(responder: impl Fn(&OutboundRequest, usize) -> Reply + Send + Sync + 'static) -> Self {
        Self {
            responder: Arc::new(responder),
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            sent: Arc::new(Mutex::new(Vec::new())),
            proxies: Arc::new(Mutex::new(Vec::new())),
            refuse_open: false,
        }
    }

    pub fn always(reply: Reply) -> Self {
        Self::new(move |_, _| reply.clone())
    }

    /// Plays `script` in order, then repeats the last reply.
    pub fn script(script: Vec<Reply>) -> Self {
        Self::new(move |_, n| script[n.min(script.len() - 1)].clone())
    }

    /// Fails at connection setup, as if the SOCKS port were closed.
    pub fn unreachable() -> Self {
        Self {
            refuse_open: true,
            ..Self::always(Reply::Refused)
        }
    }

    pub fn sends(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn last_sent(&self) -> OutboundRequest {
        self.sent.lock().unwrap().last().cloned().expect("nothing sent")
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, proxy: &ProxyTarget) -> Result<Box<dyn Connection>> {
        self.proxies.lock().unwrap().push(proxy.clone());
        if self.refuse_open {
            return Err(TorClientError::transport("proxy connection refused"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            transport: self.clone(),
        }))
    }
}

struct FakeConnection {
    transport: FakeTransport,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.transport.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connection for FakeConnection {
    async fn send(&mut self, request: OutboundRequest) -> Result<Response> {
        let reply = {
            let mut sent = self.transport.sent.lock().unwrap();
            let reply = (self.transport.responder)(&request, sent.len());
            sent.push(request);
            reply
        };

        match reply {
            Reply::Status(status) => Ok(Response {
                status,
                headers: Vec::new(),
                body: format!("status {}", status).into_bytes(),
            }),
            Reply::StatusWithHeaders(status, headers) => Ok(Response {
                status,
                headers,
                body: Vec::new(),
            }),
            Reply::Json(value) => Ok(Response {
                status: 200,
                headers: vec![("content-type".into(), "application/json".into())],
                body: serde_json::to_vec(&value)?,
            }),
            Reply::Refused => Err(TorClientError::transport("connection refused")),
            Reply::Timeout => Err(TorClientError::timeout("operation timed out")),
            Reply::Unbuildable => Err(TorClientError::Config("builder error".into())),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

/// Records start and reload calls; can be told to fail either.
#[derive(Clone, Default)]
pub struct FakeDaemon {
    pub starts: Arc<AtomicUsize>,
    pub reloads: Arc<AtomicUsize>,
    fail_start: bool,
    fail_reload: bool,
}

impl FakeDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::default()
        }
    }

    pub fn failing_reload() -> Self {
        Self {
            fail_reload: true,
            ..Self::default()
        }
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn reloads(&self) -> usize {
        self.reloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CircuitControl for FakeDaemon {
    async fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            return Err(TorClientError::CircuitControl("tor.service not found".into()));
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reload {
            return Err(TorClientError::CircuitControl("reload refused".into()));
        }
        Ok(())
    }
}

pub async fn client(transport: &FakeTransport, daemon: &FakeDaemon) -> TorHttpClient {
    client_with(Config::default(), transport, daemon).await
}

pub async fn client_with(
    config: Config,
    transport: &FakeTransport,
    daemon: &FakeDaemon,
) -> TorHttpClient {
    TorHttpClient::with_parts(
        config,
        Arc::new(transport.clone()),
        Arc::new(daemon.clone()),
    )
    .await
    .expect("client construction")
}
