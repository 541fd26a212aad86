use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tor_http_client::{
    Config, Method, RequestOutcome, RequestSpec, Response, RetryPolicy, TorClientError,
    TorHttpClient,
};
use tracing::{debug, error, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "UPPER")]
enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::Get,
            HttpMethod::Post => Method::Post,
            HttpMethod::Put => Method::Put,
            HttpMethod::Delete => Method::Delete,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "thc")]
#[command(about = "A simple HTTP client over Tor")]
struct Args {
    /// URL to request
    #[arg(value_name = "URL")]
    url: String,

    #[arg(short, long, value_enum, ignore_case = true, default_value = "GET")]
    method: HttpMethod,

    /// Raw body to send (POST/PUT only)
    #[arg(short, long)]
    data: Option<String>,

    /// JSON body to send (POST/PUT only)
    #[arg(short, long)]
    json: Option<String>,

    #[arg(long)]
    debug: bool,

    /// Local Tor SOCKS port
    #[arg(short, long)]
    port: Option<u16>,

    /// Total attempts; a new circuit is requested before each retry
    #[arg(short, long, default_value = "1")]
    retries: u32,

    /// Seconds to wait before rotating and retrying
    #[arg(long, default_value = "5")]
    retry_delay: u64,

    /// Request timeout in seconds
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Write cookies, headers and proxy settings to this file afterwards
    #[arg(long, value_name = "PATH")]
    export_session: Option<PathBuf>,

    /// Do not start the Tor service
    #[arg(long)]
    no_start: bool,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if self.debug {
            config = config.with_debug(true);
        }
        if let Some(port) = self.port {
            config = config.with_proxy_port(port);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(secs);
        }
        if self.no_start {
            config = config.without_autostart();
        }
        config
    }

    fn request(&self) -> Result<RequestSpec> {
        let method = Method::from(self.method);
        let mut spec = RequestSpec::new(method, self.url.as_str());

        if method.carries_body() {
            if let Some(data) = &self.data {
                spec = spec.with_data(data.as_bytes());
            }
            if let Some(json) = &self.json {
                let value: serde_json::Value =
                    serde_json::from_str(json).context("--json is not valid JSON")?;
                spec = spec.with_json_value(value);
            }
        } else if self.data.is_some() || self.json.is_some() {
            warn!("Ignoring request body for {}", method);
        }

        spec.validate()?;
        Ok(spec)
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_secs(self.retry_delay))
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug {
        "thc=debug,tor_http_client=debug"
    } else {
        "thc=info,tor_http_client=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_body(response: &Response) {
    match response.json::<serde_json::Value>() {
        Ok(value) => match serde_json::to_string_pretty(&value) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", response.text()),
        },
        Err(_) => println!("{}", response.text()),
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let spec = args.request()?;
    let policy = args.policy();
    let mut client = TorHttpClient::new(args.config()).await?;

    let token = client.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("Interrupted, cancelling request");
            token.cancel();
        }
    });

    let outcome = client.execute_with_retry(&spec, &policy).await?;

    if let Some(path) = &args.export_session {
        if let Err(e) = client.export_session(path) {
            debug!("Session not exported: {}", e);
        }
    }

    match outcome {
        RequestOutcome::Success(response) => {
            print_body(&response);
            Ok(ExitCode::SUCCESS)
        }
        RequestOutcome::Failure(failure) => {
            error!("Request failed: {}", failure);
            Ok(ExitCode::from(1))
        }
        RequestOutcome::Cancelled => {
            error!("Request cancelled");
            Ok(ExitCode::from(1))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            let is_config = e
                .downcast_ref::<TorClientError>()
                .is_some_and(|e| matches!(e, TorClientError::Config(_)))
                || e.downcast_ref::<serde_json::Error>().is_some();
            if is_config {
                ExitCode::from(2)
            } else {
                ExitCode::from(1)
            }
        }
    }
}
