//! Waiting for asynchronous provider work to converge.
//!
//! Every remote mutation is submit-then-poll: the API accepts the request
//! and hands back a tracking handle; the [`Poller`] samples the request
//! status until it is terminal. The same loop also waits for a resource's
//! own state (snapshot availability) and for a resource to disappear.
//!
//! A wait ends in exactly one of: success, remote failure, timeout at or
//! after the deadline, or cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout_at, Instant};
use tracing::debug;

use super::cancel::CancelToken;
use super::error::BuildError;
use crate::adapters::{ClientResult, ResourceClient};
use crate::config::PollConfig;
use crate::domain::{TrackingHandle, REQUEST_DONE, REQUEST_FAILED, STATE_AVAILABLE};

/// Snapshot states that will never turn into AVAILABLE
const SNAPSHOT_FAILED_STATES: [&str; 2] = ["FAILED", "ERROR"];

/// Interval, backoff and deadline for a wait
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Delay before the second sample
    pub interval: Duration,

    /// Upper bound for the backed-off delay
    pub max_interval: Duration,

    /// Delay multiplier after each sample (1.0 = fixed interval)
    pub backoff_multiplier: f64,

    /// Deadline for the whole wait, measured from its start
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollConfig::default())
    }
}

impl From<&PollConfig> for PollSettings {
    fn from(config: &PollConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms.max(config.interval_ms)),
            backoff_multiplier: if config.backoff_multiplier.is_finite() {
                config.backoff_multiplier.max(1.0)
            } else {
                1.0
            },
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }
}

impl PollSettings {
    /// Fixed interval with a deadline
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff_multiplier: 1.0,
            timeout,
        }
    }

    /// Delay to use after `current`
    pub fn next_interval(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

/// One sample of the thing being waited on
#[derive(Debug)]
pub enum Probe<T> {
    /// Terminal success
    Ready(T),
    /// Not there yet; carries the observed state for logging
    Pending(String),
}

/// Samples a probe until it is terminal, the deadline passes, or the token
/// is cancelled
#[derive(Debug, Clone)]
pub struct Poller {
    settings: PollSettings,
    cancel: CancelToken,
}

impl Poller {
    pub fn new(settings: PollSettings, cancel: CancelToken) -> Self {
        Self { settings, cancel }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Same settings, fresh token. Compensating deletes run after a
    /// cancellation and must not be cut short by it.
    pub fn detached(&self) -> Self {
        Self::new(self.settings.clone(), CancelToken::new())
    }

    /// Drive `fut` to completion unless the token is cancelled first.
    /// Dropping `fut` is how an in-flight call or command is abandoned.
    pub async fn guard<F: Future>(&self, what: &str, fut: F) -> Result<F::Output, BuildError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(BuildError::cancelled(what)),
            output = fut => Ok(output),
        }
    }

    /// Provider call under [`guard`](Self::guard), failures mapped to `Remote`
    pub async fn call<T, F>(&self, operation: &str, fut: F) -> Result<T, BuildError>
    where
        F: Future<Output = ClientResult<T>>,
    {
        self.guard(operation, fut)
            .await?
            .map_err(|e| BuildError::remote(operation, e))
    }

    /// Core loop. A probe error ends the wait with that error.
    pub async fn poll_until<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<T, BuildError>
    where
        T: Send,
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = Result<Probe<T>, BuildError>> + Send,
    {
        let started = Instant::now();
        let deadline = started + self.settings.timeout;
        let mut interval = self.settings.interval;
        let mut samples = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(BuildError::cancelled(what));
            }

            let sample = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BuildError::cancelled(what)),
                result = timeout_at(deadline, probe()) => match result {
                    Ok(sample) => sample?,
                    Err(_) => return Err(self.timed_out(what, started)),
                },
            };
            samples += 1;

            match sample {
                Probe::Ready(value) => {
                    debug!(what, samples, elapsed = ?started.elapsed(), "Wait finished");
                    return Ok(value);
                }
                Probe::Pending(state) => {
                    debug!(what, %state, samples, "Still waiting");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(what, started));
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(BuildError::cancelled(what)),
                _ = sleep(interval.min(deadline - now)) => {}
            }
            interval = self.settings.next_interval(interval);
        }
    }

    fn timed_out(&self, what: &str, started: Instant) -> BuildError {
        BuildError::Timeout {
            what: what.to_string(),
            waited: started.elapsed(),
        }
    }

    /// Wait for a provider request to reach DONE. FAILED is a remote failure
    /// carrying the provider's message.
    pub async fn await_request(
        &self,
        client: &dyn ResourceClient,
        handle: &TrackingHandle,
    ) -> Result<(), BuildError> {
        let what = format!("request {}", handle);
        self.poll_until(&what, move || async move {
            let status = client
                .get_request_status(handle)
                .await
                .map_err(|e| BuildError::remote("get request status", e))?;

            match status.status() {
                REQUEST_DONE => Ok(Probe::Ready(())),
                REQUEST_FAILED => Err(BuildError::RemoteFailed {
                    handle: handle.to_string(),
                    reason: status
                        .metadata
                        .message
                        .clone()
                        .unwrap_or_else(|| "no reason given".to_string()),
                }),
                other => Ok(Probe::Pending(other.to_string())),
            }
        })
        .await
    }

    /// Wait for a snapshot's own state to become AVAILABLE
    pub async fn await_snapshot_available(
        &self,
        client: &dyn ResourceClient,
        snapshot_id: &str,
    ) -> Result<(), BuildError> {
        let what = format!("snapshot {} to become available", snapshot_id);
        self.poll_until(&what, move || async move {
            let snapshot = client
                .get_snapshot(snapshot_id)
                .await
                .map_err(|e| BuildError::remote("get snapshot", e))?;

            match snapshot.state() {
                Some(STATE_AVAILABLE) => Ok(Probe::Ready(())),
                Some(state) if SNAPSHOT_FAILED_STATES.contains(&state) => {
                    Err(BuildError::RemoteFailed {
                        handle: format!("snapshot {}", snapshot_id),
                        reason: format!("snapshot entered state {}", state),
                    })
                }
                state => Ok(Probe::Pending(state.unwrap_or("unknown").to_string())),
            }
        })
        .await
    }

    /// Wait until the datacenter is gone (the API answers 404)
    pub async fn await_datacenter_deleted(
        &self,
        client: &dyn ResourceClient,
        datacenter_id: &str,
    ) -> Result<(), BuildError> {
        let what = format!("datacenter {} to be deleted", datacenter_id);
        self.poll_until(&what, move || async move {
            match client.get_datacenter(datacenter_id).await {
                Ok(_) => Ok(Probe::Pending("present".to_string())),
                Err(e) if e.is_not_found() => Ok(Probe::Ready(())),
                Err(e) => Err(BuildError::remote("get datacenter", e)),
            }
        })
        .await
    }
}
