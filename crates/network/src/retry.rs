//! Bounded retries with a circuit rotation between attempts.

use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::http_client::TorHttpClient;
use crate::outcome::{RequestOutcome, Response};
use crate::request::{Method, RequestSpec};

/// Result for one URL of a batch. `outcome` is `Err` only when that entry's
/// request could not be built.
#[derive(Debug)]
pub struct BatchEntry {
    pub url: String,
    pub outcome: Result<RequestOutcome>,
}

impl BatchEntry {
    pub fn response(&self) -> Option<&Response> {
        self.outcome.as_ref().ok().and_then(RequestOutcome::response)
    }
}

impl TorHttpClient {
    /// Runs `spec` until it succeeds or `policy.max_attempts` attempts have
    /// failed. Each failed attempt that will be retried is followed by
    /// `policy.retry_delay` and a circuit rotation.
    pub async fn execute_with_retry(
        &mut self,
        spec: &RequestSpec,
        policy: &RetryPolicy,
    ) -> Result<RequestOutcome> {
        policy.validate()?;
        spec.validate()?;

        let max = policy.max_attempts;
        let mut attempt = 1;

        loop {
            debug!("{} {}: attempt {}/{}", spec.method, spec.url, attempt, max);

            let failure = match self.execute(spec).await? {
                RequestOutcome::Failure(failure) => failure,
                outcome => {
                    if attempt > 1 && outcome.is_success() {
                        debug!("{} {}: succeeded on attempt {}", spec.method, spec.url, attempt);
                    }
                    return Ok(outcome);
                }
            };

            if !policy.retry_client_errors && failure.kind.is_client_error() {
                warn!(
                    "{} {}: not retrying client error ({})",
                    spec.method, spec.url, failure.kind
                );
                return Ok(RequestOutcome::Failure(failure));
            }

            if attempt >= max {
                warn!(
                    "{} {}: all {} attempts exhausted, last error: {}",
                    spec.method, spec.url, max, failure
                );
                return Ok(RequestOutcome::Failure(failure));
            }

            if failure.kind.is_timeout() {
                warn!("Request timeout (attempt {}/{})", attempt, max);
            } else {
                warn!("Request failed (attempt {}/{}): {}", attempt, max, failure);
            }

            if !self.wait_and_rotate(policy.retry_delay).await {
                debug!("{} {}: cancelled before attempt {}", spec.method, spec.url, attempt + 1);
                return Ok(RequestOutcome::Cancelled);
            }
            attempt += 1;
        }
    }

    /// Sleeps, then rotates the circuit. Returns false if cancelled while
    /// waiting; a failed rotation still returns true.
    async fn wait_and_rotate(&self, delay: Duration) -> bool {
        if !delay.is_zero() {
            debug!("Waiting {:?} before rotating circuit", delay);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => return false,
            }
        } else if self.cancel.is_cancelled() {
            return false;
        }

        self.change_ip().await;
        true
    }

    /// Applies [`execute_with_retry`](Self::execute_with_retry) to each spec
    /// in order. One entry's failure never stops the rest.
    pub async fn batch<I>(&mut self, specs: I, policy: &RetryPolicy) -> Result<Vec<BatchEntry>>
    where
        I: IntoIterator<Item = RequestSpec>,
    {
        policy.validate()?;

        let mut results = Vec::new();
        for spec in specs {
            let outcome = self.execute_with_retry(&spec, policy).await;
            if let Err(e) = &outcome {
                warn!("Batch request failed for {}: {}", spec.url, e);
            }
            results.push(BatchEntry {
                url: spec.url,
                outcome,
            });
        }
        Ok(results)
    }

    pub async fn batch_requests<I, S>(
        &mut self,
        urls: I,
        method: Method,
        policy: &RetryPolicy,
    ) -> Result<Vec<BatchEntry>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let specs: Vec<RequestSpec> = urls
            .into_iter()
            .map(|url| RequestSpec::new(method, url))
            .collect();
        self.batch(specs, policy).await
    }
}
