//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with timeouts and compression
//! - Attaching the per-run request identity (user agent, consent cookie)
//! - Bounded retry with a randomized inter-attempt delay
//! - Error classification into transient and non-retriable failures

use crate::config::{FetchConfig, UserAgentConfig};
use crate::url::ensure_absolute;
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Terminal failure of a fetch
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt hit a transient failure
    #[error("giving up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    /// A failure that retrying cannot fix (4xx, malformed URL, DNS)
    #[error("non-retriable failure for {url}: {reason}")]
    NonRetriable {
        url: String,
        reason: String,
        status: Option<u16>,
    },
}

impl FetchError {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// HTTP status of a non-retriable response, if there was one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NonRetriable { status, .. } => *status,
            Self::Exhausted { .. } => None,
        }
    }
}

/// Request identity used for every request of one run
///
/// Built once at startup and passed explicitly to [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProfile {
    user_agent: String,
    cookie: String,
}

impl RequestProfile {
    pub fn new(user_agent: impl Into<String>, cookie: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            cookie: cookie.into(),
        }
    }

    /// Picks one user agent at random from the configured pool
    pub fn from_config(config: &UserAgentConfig) -> Self {
        let user_agent = config
            .agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| UserAgentConfig::default().agents[0].clone());
        Self::new(user_agent, config.consent_cookie.clone())
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

/// Attempt ceiling and inter-attempt delay window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay_min: Duration,
    pub delay_max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            delay_min: Duration::from_millis(config.retry_delay_min_ms),
            delay_max: Duration::from_millis(config.retry_delay_max_ms),
        }
    }

    /// Draws the delay before the next attempt from `[delay_min, delay_max]`
    pub fn next_delay(&self) -> Duration {
        if self.delay_max <= self.delay_min {
            return self.delay_min;
        }
        let min = self.delay_min.as_millis() as u64;
        let max = self.delay_max.as_millis() as u64;
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Attempt bookkeeping for a single fetch call
#[derive(Debug, Default)]
pub struct RetryState {
    attempts: u32,
}

impl RetryState {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
    }

    /// Returns the delay before the next attempt, or `None` once the ceiling is reached
    pub fn schedule_retry(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        Some(policy.next_delay())
    }
}

/// Outcome of one attempt
#[derive(Debug)]
enum AttemptError {
    Transient(String),
    Fatal { reason: String, status: Option<u16> },
}

/// Builds the HTTP client shared by all fetches of a run
///
/// Redirects are followed (up to 10 hops); the user agent and cookie are
/// attached per request from the [`RequestProfile`].
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Stateless GET-with-retry over a shared client
///
/// Safe to call from many workers at once; the only state a call touches is its
/// own [`RetryState`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: build_http_client(config)?,
            policy: RetryPolicy::from_config(config),
        })
    }

    pub fn with_client(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetches `url` and returns the document body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | HTTP 5xx, 429 | Retry until the attempt ceiling → `Exhausted` |
    /// | Timeout, connection reset, body read error | Retry → `Exhausted` |
    /// | Other 4xx | Immediate → `NonRetriable` |
    /// | Malformed or relative URL | Immediate → `NonRetriable` |
    /// | DNS failure, redirect limit | Immediate → `NonRetriable` |
    pub async fn fetch(&self, url: &str, profile: &RequestProfile) -> Result<String, FetchError> {
        let target = ensure_absolute(url).map_err(|e| FetchError::NonRetriable {
            url: url.to_string(),
            reason: e.to_string(),
            status: None,
        })?;

        let mut retry = RetryState::default();

        loop {
            retry.begin_attempt();

            match self.attempt(&target, profile).await {
                Ok(body) => {
                    tracing::debug!(url = %target, attempt = retry.attempts(), bytes = body.len(), "fetched");
                    return Ok(body);
                }
                Err(AttemptError::Fatal { reason, status }) => {
                    return Err(FetchError::NonRetriable {
                        url: target.to_string(),
                        reason,
                        status,
                    });
                }
                Err(AttemptError::Transient(reason)) => {
                    let Some(delay) = retry.schedule_retry(&self.policy) else {
                        return Err(FetchError::Exhausted {
                            url: target.to_string(),
                            attempts: retry.attempts(),
                            last_error: reason,
                        });
                    };

                    tracing::warn!(
                        url = %target,
                        attempt = retry.attempts(),
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self, url: &Url, profile: &RequestProfile) -> Result<String, AttemptError> {
        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, profile.user_agent())
            .header(COOKIE, profile.cookie())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(AttemptError::Transient(format!("HTTP {}", status)));
        }

        if !status.is_success() {
            return Err(AttemptError::Fatal {
                reason: format!("HTTP {}", status),
                status: Some(status.as_u16()),
            });
        }

        response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(format!("body read failed: {}", e)))
    }
}

fn classify_request_error(error: reqwest::Error) -> AttemptError {
    if error.is_builder() || error.is_redirect() {
        return AttemptError::Fatal {
            reason: error.to_string(),
            status: None,
        };
    }

    if is_dns_failure(&error) {
        return AttemptError::Fatal {
            reason: format!("DNS resolution failed: {}", error),
            status: None,
        };
    }

    if error.is_timeout() {
        AttemptError::Transient("request timeout".to_string())
    } else {
        AttemptError::Transient(error.to_string())
    }
}

/// Walks the source chain looking for the resolver's error message
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(err) = source {
        let message = err.to_string();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = err.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&FetchConfig::default()).is_ok());
    }

    #[test]
    fn test_profile_picks_from_pool() {
        let config = UserAgentConfig {
            agents: vec!["A/1".to_string(), "B/2".to_string()],
            consent_cookie: "CONSENT=YES+".to_string(),
        };
        for _ in 0..20 {
            let profile = RequestProfile::from_config(&config);
            assert!(config.agents.iter().any(|a| a == profile.user_agent()));
            assert_eq!(profile.cookie(), "CONSENT=YES+");
        }
    }

    #[test]
    fn test_next_delay_within_window() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_min: Duration::from_millis(5_000),
            delay_max: Duration::from_millis(15_000),
        };
        for _ in 0..100 {
            let delay = policy.next_delay();
            assert!(delay >= policy.delay_min && delay <= policy.delay_max);
        }
    }

    #[test]
    fn test_retry_state_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
        };
        let mut state = RetryState::default();

        state.begin_attempt();
        assert_eq!(state.schedule_retry(&policy), Some(Duration::ZERO));
        state.begin_attempt();
        assert!(state.schedule_retry(&policy).is_some());
        state.begin_attempt();
        assert_eq!(state.schedule_retry(&policy), None);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_single_attempt_policy_never_retries() {
        let policy = RetryPolicy {
            max_attempts: 1,
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
        };
        let mut state = RetryState::default();
        state.begin_attempt();
        assert_eq!(state.schedule_retry(&policy), None);
    }

    #[tokio::test]
    async fn test_relative_url_is_non_retriable() {
        let fetcher = Fetcher::new(&FetchConfig::default()).unwrap();
        let profile = RequestProfile::new("Test/1.0", "CONSENT=YES+");
        let result = fetcher.fetch("/d/1", &profile).await;
        assert!(matches!(
            result,
            Err(FetchError::NonRetriable { status: None, .. })
        ));
    }

    // HTTP behavior (5xx retry, 404 fail-fast, header propagation) is covered
    // with wiremock in tests/integration/crawl_tests.rs
}
