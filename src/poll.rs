//! Waits for a presentation exchange to be verified.
//!
//! A [Poller] repeatedly asks a [StatusSource] whether an exchange is verified, sleeping
//! [PollConfig::interval] between queries, until the exchange is verified or
//! [PollConfig::max_wait] has elapsed. Either way it settles on exactly one [PollOutcome] and
//! issues no further queries. A [StopHandle] cancels the loop from outside; cancellation is
//! checked between iterations.

use std::{
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use crate::{
    core::{
        exchange::{ExchangeId, ExchangeState},
        util::AsyncHttpClient,
    },
    verifier::Verifier,
};

/// Timing of the polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(rename = "intervalMs", with = "millis")]
    pub interval: Duration,
    #[serde(rename = "maxWaitMs", with = "millis")]
    pub max_wait: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            max_wait: Duration::from_millis(60_000),
        }
    }
}

impl PollConfig {
    pub fn from_millis(interval_ms: u64, max_wait_ms: u64) -> Result<Self> {
        if interval_ms == 0 {
            bail!("polling interval must be greater than zero")
        }
        if max_wait_ms < interval_ms {
            bail!("polling budget ({max_wait_ms}ms) is shorter than one interval ({interval_ms}ms)")
        }
        Ok(Self {
            interval: Duration::from_millis(interval_ms),
            max_wait: Duration::from_millis(max_wait_ms),
        })
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Answers "is this exchange verified yet?".
#[async_trait]
pub trait StatusSource: Debug {
    async fn is_verified(&self, exchange_id: &ExchangeId) -> Result<bool>;
}

/// Reads the state straight from the verifier agent.
#[async_trait]
impl StatusSource for Verifier {
    async fn is_verified(&self, exchange_id: &ExchangeId) -> Result<bool> {
        Ok(self.get_record(exchange_id).await?.state.is_verified())
    }
}

/// Queries the `POST /verified` polling endpoint, the way a browser does.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    http_client: Arc<dyn AsyncHttpClient + Send + Sync>,
    endpoint: Url,
}

impl HttpStatusSource {
    pub fn new(http_client: Arc<dyn AsyncHttpClient + Send + Sync>, endpoint: Url) -> Self {
        Self {
            http_client,
            endpoint,
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn is_verified(&self, exchange_id: &ExchangeId) -> Result<bool> {
        #[derive(Deserialize)]
        struct StateOnly {
            state: ExchangeState,
        }

        let request = http::Request::builder()
            .method(http::Method::POST)
            .uri(self.endpoint.as_str())
            .body(exchange_id.as_str().as_bytes().to_vec())
            .context("failed to construct polling request")?;

        let response = self
            .http_client
            .execute(request)
            .await
            .context("polling request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!(
                "polling endpoint responded with {status}: {}",
                String::from_utf8_lossy(response.body())
            )
        }

        let StateOnly { state } = serde_json::from_slice(response.body())
            .context("polling endpoint returned an unexpected body")?;
        Ok(state.is_verified())
    }
}

/// Where the browser goes once polling settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The exchange is verified; `redirect` triggers the authentication handoff.
    Verified { redirect: String },
    /// The budget ran out first.
    TimedOut { redirect: String },
    /// Stopped through a [StopHandle] before either of the above.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("polling cancelled due to API error: {0:#}")]
    Query(anyhow::Error),
}

/// Snapshot of a poller's progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollState {
    pub polling: bool,
    pub timed_out: bool,
    /// `None` until the first query completes.
    pub verified: Option<bool>,
}

/// Stops a [Poller]. Stopping is idempotent; only the first call has an effect.
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: Arc<Mutex<PollState>>,
}

impl StopHandle {
    /// Returns `true` if this call stopped the poller.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.polling {
            info!("Stopping polling...");
            state.polling = false;
            true
        } else {
            debug!("Polling was already stopped...");
            false
        }
    }

    pub fn state(&self) -> PollState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_polling(&self) -> bool {
        self.state().polling
    }

    fn record(&self, verified: bool, timed_out: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.verified = Some(verified);
        state.timed_out = timed_out;
    }
}

#[derive(Debug)]
pub struct Poller<S> {
    source: S,
    exchange_id: ExchangeId,
    config: PollConfig,
    login_path: String,
    handle: StopHandle,
}

impl<S: StatusSource> Poller<S> {
    pub fn new(source: S, exchange_id: ExchangeId, config: PollConfig) -> Self {
        Self {
            source,
            exchange_id,
            config,
            login_path: "/login".into(),
            handle: StopHandle {
                state: Arc::new(Mutex::new(PollState {
                    polling: true,
                    ..Default::default()
                })),
            },
        }
    }

    /// Path the outcome redirects point at.
    pub fn with_login_path(mut self, login_path: impl Into<String>) -> Self {
        self.login_path = login_path.into();
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.clone()
    }

    /// Poll until the exchange is verified, the budget runs out, or the poller is stopped.
    ///
    /// A failed query stops the poller and is returned as [PollError::Query]; it is not retried.
    pub async fn run(self) -> Result<PollOutcome, PollError> {
        let start = Instant::now();

        while self.handle.is_polling() {
            sleep(self.config.interval).await;
            if !self.handle.is_polling() {
                break;
            }

            let verified = match self.source.is_verified(&self.exchange_id).await {
                Ok(verified) => verified,
                Err(e) => {
                    warn!("status query for {} failed: {e:#}", self.exchange_id);
                    self.handle.stop();
                    return Err(PollError::Query(e));
                }
            };
            let timed_out = start.elapsed() >= self.config.max_wait;

            // Stopped from outside while the query was in flight.
            if !self.handle.is_polling() {
                break;
            }

            // A verification reported after the budget ran out still times out.
            if timed_out {
                self.handle.record(verified, true);
                self.handle.stop();
                return Ok(PollOutcome::TimedOut {
                    redirect: self.redirect("timeout", "true"),
                });
            }
            if verified {
                self.handle.record(true, false);
                self.handle.stop();
                return Ok(PollOutcome::Verified {
                    redirect: self.redirect("pres_ex_id", self.exchange_id.as_str()),
                });
            }
            self.handle.record(false, false);
        }

        Ok(PollOutcome::Cancelled)
    }

    fn redirect(&self, key: &str, value: &str) -> String {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(key, value)
            .finish();
        format!("{}?{query}", self.login_path)
    }
}
