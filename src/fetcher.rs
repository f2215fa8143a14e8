//! Background polling with a cache-first refresh policy.
//!
//! A `DataFetcher` repeatedly calls a fetch function, publishing the result as
//! a [`QueryState`] on a `tokio::sync::watch` channel. Failed refreshes keep
//! the last good data in place, so consumers can keep showing stale content
//! while the backend is unreachable.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use tokio::sync::watch;

use super::errors::{ApiError, FetchFailure};
use super::network::NetworkStatus;

/// Poll and retry timings for one resource.
#[derive(Clone, Debug, PartialEq)]
pub struct RefreshPolicy {
    /// Delay before the next poll after a successful refresh.
    pub interval: Duration,
    /// Delay before the next poll after a failed refresh.
    pub error_interval: Duration,
    /// Immediate retries allowed after the first failure of a refresh.
    pub max_retries: u32,
    pub retry_base: Duration,
    pub retry_cap: Duration,
    /// Whether network-class failures are retried immediately or left to the next poll.
    pub retry_network_errors: bool,
}

impl RefreshPolicy {
    /// The aggregate `/display` resource: 30s nominal, 60s while failing.
    pub fn display() -> Self {
        Self {
            interval: Duration::from_secs(30),
            error_interval: Duration::from_secs(60),
            max_retries: 2,
            retry_base: Duration::from_secs(1),
            retry_cap: Duration::from_secs(30),
            retry_network_errors: false,
        }
    }

    pub fn weather() -> Self {
        Self::fixed(Duration::from_secs(5 * 60))
    }

    pub fn birthdays() -> Self {
        Self::fixed(Duration::from_secs(60 * 60))
    }

    pub fn media() -> Self {
        Self::fixed(Duration::from_secs(60))
    }

    fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            error_interval: interval,
            retry_network_errors: true,
            ..Self::display()
        }
    }

    pub fn next_interval(&self, last_errored: bool) -> Duration {
        if last_errored { self.error_interval } else { self.interval }
    }

    /// `failure_index` counts failures of the current refresh, starting at 0.
    pub fn should_retry(&self, failure_index: u32, err: &ApiError) -> bool {
        if err.is_network() && !self.retry_network_errors {
            return false;
        }
        failure_index < self.max_retries
    }

    /// `min(retry_base * 2^attempt, retry_cap)`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.retry_base.checked_mul(factor))
            .map_or(self.retry_cap, |d| d.min(self.retry_cap))
    }
}

/// What consumers see of a polled resource.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryState<T> {
    /// Last good data, kept across failed refreshes.
    pub data: Option<T>,
    /// Failure of the most recent refresh, cleared by the next success.
    pub error: Option<FetchFailure>,
    /// True until the first refresh finishes, unless seeded with data.
    pub is_loading: bool,
    /// Consecutive failed attempts of the most recent refresh.
    pub failure_count: u32,
    pub last_updated: Option<DateTime<Local>>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self { data: None, error: None, is_loading: true, failure_count: 0, last_updated: None }
    }
}

impl<T> QueryState<T> {
    /// Starts from previously persisted data instead of a blank loading state.
    pub fn seeded(data: T) -> Self {
        Self { data: Some(data), is_loading: false, ..Self::default() }
    }
}

pub struct DataFetcher<T> {
    name: &'static str,
    policy: RefreshPolicy,
    state_tx: watch::Sender<QueryState<T>>,
}

impl<T> DataFetcher<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, policy: RefreshPolicy, initial: QueryState<T>) -> (Self, watch::Receiver<QueryState<T>>) {
        debug!("Creating fetcher '{}' with {:?}", name, policy);
        let (state_tx, state_rx) = watch::channel(initial);
        (Self { name, policy, state_tx }, state_rx)
    }

    /// Runs one refresh, retrying per policy, and publishes the outcome.
    /// Returns whether the refresh succeeded.
    pub async fn refresh<F, Fut, S>(&self, fetch: &F, on_success: &mut S) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        S: FnMut(&T),
    {
        let mut failures = 0u32;
        loop {
            match fetch().await {
                Ok(data) => {
                    debug!("Fetcher '{}' refreshed successfully.", self.name);
                    on_success(&data);
                    self.state_tx.send_modify(|state| {
                        state.data = Some(data);
                        state.error = None;
                        state.is_loading = false;
                        state.failure_count = 0;
                        state.last_updated = Some(Local::now());
                    });
                    return true;
                }
                Err(e) if self.policy.should_retry(failures, &e) => {
                    let delay = self.policy.retry_delay(failures);
                    warn!("Fetcher '{}' attempt {} failed: {}. Retrying in {:?}.", self.name, failures + 1, e, delay);
                    failures += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    failures += 1;
                    error!("Fetcher '{}' failed after {} attempt(s): {}", self.name, failures, e);
                    let failure = FetchFailure::from(&e);
                    self.state_tx.send_modify(|state| {
                        state.error = Some(failure);
                        state.is_loading = false;
                        state.failure_count = failures;
                    });
                    return false;
                }
            }
        }
    }

    /// Polls forever: refresh, wait the policy interval (or until the network
    /// comes back online), repeat. Stops once every state receiver is dropped.
    pub async fn run<F, Fut, S>(self, fetch: F, mut network: Option<watch::Receiver<NetworkStatus>>, mut on_success: S)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        S: FnMut(&T),
    {
        info!("Starting fetcher '{}'.", self.name);
        loop {
            let ok = self.refresh(&fetch, &mut on_success).await;
            let interval = self.policy.next_interval(!ok);
            debug!("Fetcher '{}' next poll in {:?}.", self.name, interval);

            let sleep = tokio::time::sleep(interval);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    _ = self.state_tx.closed() => {
                        info!("Fetcher '{}' has no subscribers left; stopping.", self.name);
                        return;
                    }
                    back_online = wait_for_reconnect(&mut network) => {
                        if back_online {
                            info!("Fetcher '{}': network restored, refetching now.", self.name);
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Resolves with `true` when the monitor reports a transition to online and
/// `false` for a transition to offline. Never resolves without a monitor.
async fn wait_for_reconnect(network: &mut Option<watch::Receiver<NetworkStatus>>) -> bool {
    match network {
        Some(rx) => {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
            let is_online = rx.borrow_and_update().is_online;
            is_online
        }
        None => std::future::pending().await,
    }
}
