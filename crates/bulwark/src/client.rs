//! HTTP client with retry, circuit breaking, timeout, and metrics support
//!
//! One [`HttpClient`] call is a *logical request* that may perform several
//! network attempts. The caller always receives either a decoded body or
//! exactly one typed [`Error`]; intermediate retryable failures are traced
//! and recorded but never surfaced individually.

use std::sync::Arc;
use std::time::{Instant, SystemTime};

pub use reqwest::Method;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::breaker::CircuitBreakerRegistry;
use crate::config::{RequestOptions, RetryConfig};
use crate::error::{Error, Result};
use crate::metrics::{MetricsCollector, MetricsSnapshot, RequestOutcome};
use crate::timeout::TimeoutController;

/// Decoded response payload: JSON when the body parses, raw text otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn from_text(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Text(text),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseBody::Json(_) => None,
            ResponseBody::Text(text) => Some(text),
        }
    }

    /// Deserialize the payload into a caller-supplied type.
    pub fn json<T: DeserializeOwned>(self) -> std::result::Result<T, serde_json::Error> {
        match self {
            ResponseBody::Json(value) => serde_json::from_value(value),
            ResponseBody::Text(text) => serde_json::from_str(&text),
        }
    }
}

/// Classification of one attempt, driving the retry loop as data rather
/// than nested conditionals.
enum AttemptOutcome {
    /// Response with a success status, body decoded
    Success(ResponseBody, StatusCode),
    /// Transient failure worth another attempt if any remain
    Retryable(Error, Option<u16>),
    /// Failure that must not be retried
    Terminal(Error, Option<u16>),
}

/// HTTP client issuing resilient outbound requests.
///
/// Cloning is cheap and shares breaker and metrics state; two separately
/// constructed clients never share state.
#[derive(Clone)]
pub struct HttpClient {
    http: ReqwestClient,
    config: RetryConfig,
    breakers: Option<Arc<CircuitBreakerRegistry>>,
    collector: Arc<MetricsCollector>,
}

impl HttpClient {
    /// Start building a client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Convenience constructor with a custom retry configuration.
    pub fn with_config(config: RetryConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub async fn get(&self, url: &str) -> Result<ResponseBody> {
        self.request(Method::GET, url, None, RequestOptions::default()).await
    }

    pub async fn get_with(&self, url: &str, options: RequestOptions) -> Result<ResponseBody> {
        self.request(Method::GET, url, None, options).await
    }

    pub async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ResponseBody> {
        self.request(Method::POST, url, Some(serde_json::to_value(body)?), RequestOptions::default())
            .await
    }

    pub async fn post_with<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        self.request(Method::POST, url, Some(serde_json::to_value(body)?), options).await
    }

    pub async fn put<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<ResponseBody> {
        self.request(Method::PUT, url, Some(serde_json::to_value(body)?), RequestOptions::default())
            .await
    }

    pub async fn put_with<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        self.request(Method::PUT, url, Some(serde_json::to_value(body)?), options).await
    }

    pub async fn delete(&self, url: &str) -> Result<ResponseBody> {
        self.request(Method::DELETE, url, None, RequestOptions::default()).await
    }

    pub async fn delete_with(&self, url: &str, options: RequestOptions) -> Result<ResponseBody> {
        self.request(Method::DELETE, url, None, options).await
    }

    /// Execute one logical request with breaker admission, the retry loop,
    /// and outcome recording. All verbs delegate here.
    #[instrument(skip(self, body, options), fields(%method, url))]
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<ResponseBody> {
        let started = Instant::now();
        let effective = self.config.merged_with(&options);

        let parsed: Url = url.parse()?;
        let key = options.breaker_key.clone().unwrap_or_else(|| breaker_key(&parsed));

        // Breaker rejection is terminal: no attempt, no backoff, and the
        // rejection does not count against max_retries.
        let breaker = self.breakers.as_ref().map(|registry| registry.breaker(&key));
        if let Some(breaker) = breaker.as_deref() {
            if !breaker.try_admit() {
                debug!(%key, "circuit breaker rejected request");
                self.record_outcome(started, 0, false, None, Some("circuit_open"));
                return Err(Error::CircuitOpen { key });
            }
        }

        let total_attempts = effective.max_retries.saturating_add(1);
        let backoff = BackoffPolicy::from_config(&effective);
        let controller = TimeoutController::new(effective.timeout);
        let mut attempt = 1u32;

        loop {
            debug!(attempt, total_attempts, "sending attempt");
            match self.run_attempt(&method, url, body.as_ref(), &options, &effective, controller).await
            {
                AttemptOutcome::Success(decoded, status) => {
                    if let Some(breaker) = breaker.as_deref() {
                        breaker.record_success();
                    }
                    debug!(attempt, status = status.as_u16(), "request succeeded");
                    self.record_outcome(started, attempt, true, Some(status.as_u16()), None);
                    return Ok(decoded);
                }
                AttemptOutcome::Terminal(error, status) => {
                    // The service answered, so the endpoint is alive; the
                    // breaker must observe the admitted attempt or a
                    // half-open probe slot would leak and wedge the circuit.
                    if let Some(breaker) = breaker.as_deref() {
                        breaker.record_success();
                    }
                    debug!(attempt, error = %error, "terminal failure, not retrying");
                    self.record_outcome(started, attempt, false, status, Some(error.kind()));
                    return Err(error);
                }
                AttemptOutcome::Retryable(error, status) => {
                    if let Some(breaker) = breaker.as_deref() {
                        breaker.record_failure();
                    }

                    if attempt >= total_attempts {
                        warn!(attempts = attempt, error = %error, "retries exhausted");
                        self.record_outcome(started, attempt, false, status, Some(error.kind()));
                        return Err(error);
                    }

                    let delay = backoff.delay(attempt);
                    debug!(attempt, ?delay, error = %error, "retryable failure, backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Aggregate statistics plus the current state of every tracked breaker.
    pub fn metrics(&self) -> MetricsSnapshot {
        let mut snapshot = self.collector.snapshot();
        if let Some(registry) = &self.breakers {
            snapshot.circuit_breaker_states = registry.states();
        }
        snapshot
    }

    /// Empty the outcome log.
    pub fn clear_metrics(&self) {
        self.collector.clear();
    }

    /// Drop all breaker state; every endpoint starts closed on next use.
    pub fn reset_circuit_breakers(&self) {
        if let Some(registry) = &self.breakers {
            registry.clear();
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// One network attempt through the timeout controller, classified for
    /// the retry loop.
    async fn run_attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
        effective: &RetryConfig,
        controller: TimeoutController,
    ) -> AttemptOutcome {
        let mut request = self.http.request(method.clone(), url);
        for (name, value) in &options.headers {
            request = request.header(name, value);
        }
        if let Some(body) = body {
            // Serializes the payload and attaches Content-Type: application/json.
            request = request.json(body);
        }

        // The deadline covers the full attempt: connect, send, and body read.
        let settled = controller
            .run(async move {
                let response =
                    request.send().await.map_err(|source| Error::Network { source })?;
                let status = response.status();
                let text = response.text().await.map_err(|source| Error::Network { source })?;
                Ok((status, text))
            })
            .await;

        match settled {
            // Timeout or transport failure; retryable at the network level.
            Err(error) => AttemptOutcome::Retryable(error, None),
            Ok((status, text)) => {
                if effective.retryable_status_codes.contains(&status.as_u16()) {
                    AttemptOutcome::Retryable(Error::from_status(status), Some(status.as_u16()))
                } else if !status.is_success() {
                    AttemptOutcome::Terminal(Error::from_status(status), Some(status.as_u16()))
                } else {
                    AttemptOutcome::Success(ResponseBody::from_text(text), status)
                }
            }
        }
    }

    /// Record exactly one outcome per logical request. Recording failures
    /// are suppressed inside the collector so they cannot mask the result.
    fn record_outcome(
        &self,
        started: Instant,
        attempts: u32,
        succeeded: bool,
        http_status: Option<u16>,
        error_kind: Option<&'static str>,
    ) {
        self.collector.record(RequestOutcome {
            timestamp: SystemTime::now(),
            duration: started.elapsed(),
            attempts,
            succeeded,
            http_status,
            error_kind,
        });
    }
}

/// Breaker key for a target: host, port, and path, or just the path for
/// relative-ish URLs without a host. The port is part of the key so two
/// services on one host never share breaker state.
fn breaker_key(url: &Url) -> String {
    match (url.host_str(), url.port_or_known_default()) {
        (Some(host), Some(port)) => format!("{host}:{port}{}", url.path()),
        (Some(host), None) => format!("{host}{}", url.path()),
        (None, _) => url.path().to_string(),
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    config: RetryConfig,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl HttpClientBuilder {
    /// Replace the retry configuration wholesale.
    pub fn config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        self.config.validate()?;

        let mut builder = ReqwestClient::builder();
        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }
        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let http = builder.build().map_err(|source| Error::Network { source })?;

        let breakers = self
            .config
            .circuit_breaker
            .clone()
            .map(|breaker_config| Arc::new(CircuitBreakerRegistry::new(breaker_config)));

        Ok(HttpClient {
            http,
            config: self.config,
            breakers,
            collector: Arc::new(MetricsCollector::new()),
        })
    }
}
