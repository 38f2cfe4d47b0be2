//! Resilience patterns for external calls
//!
//! A single [`ResilienceManager`] owns the process-wide [`NetworkStatus`] and
//! wraps every outbound call with a timeout, error-class-aware retries with
//! exponential backoff, and a binary circuit that short-circuits to the
//! fallback after repeated network failures. The circuit closes again on the
//! next successful call or the next successful connectivity probe.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::connectivity::ConnectivityProbe;
use crate::application::errors::{ApiError, SyncError};
use crate::config::ResilienceConfig;
use crate::domain::NetworkStatus;

/// Runtime resilience settings
#[derive(Debug, Clone)]
pub struct ResiliencePolicy {
    /// Number of consecutive network failures that opens the circuit
    pub max_consecutive_failures: u32,
    /// Timeout for each individual attempt
    pub call_timeout: Duration,
    /// Cap applied to the exponential backoff
    pub max_retry_delay: Duration,
    /// Period of the connectivity probe
    pub probe_interval: Duration,
    /// Options used when a caller does not supply its own
    pub default_options: FallbackOptions,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            call_timeout: Duration::from_secs(10),
            max_retry_delay: Duration::from_secs(30),
            probe_interval: Duration::from_secs(30),
            default_options: FallbackOptions::default(),
        }
    }
}

impl From<&ResilienceConfig> for ResiliencePolicy {
    fn from(config: &ResilienceConfig) -> Self {
        Self {
            max_consecutive_failures: config.max_consecutive_failures,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            max_retry_delay: Duration::from_millis(config.max_retry_delay_ms),
            probe_interval: Duration::from_secs(config.probe_interval_seconds),
            default_options: FallbackOptions {
                throw_on_error: false,
                max_retries: config.max_retries,
                retry_delay: Duration::from_millis(config.retry_delay_ms),
            },
        }
    }
}

/// Per-call behaviour of [`ResilienceManager::execute_with_fallback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackOptions {
    /// Return the final error instead of the fallback
    pub throw_on_error: bool,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Base delay, doubled on every retry
    pub retry_delay: Duration,
}

impl Default for FallbackOptions {
    fn default() -> Self {
        Self {
            throw_on_error: false,
            max_retries: 2,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

impl FallbackOptions {
    pub fn throwing(mut self) -> Self {
        self.throw_on_error = true;
        self
    }
}

/// Value returned when a protected call cannot complete
pub enum Fallback<T> {
    Value(T),
    Supplier(Box<dyn FnOnce() -> T + Send>),
}

impl<T> Fallback<T> {
    pub fn value(value: T) -> Self {
        Fallback::Value(value)
    }

    pub fn supplier(supplier: impl FnOnce() -> T + Send + 'static) -> Self {
        Fallback::Supplier(Box::new(supplier))
    }

    fn resolve(self) -> T {
        match self {
            Fallback::Value(value) => value,
            Fallback::Supplier(supplier) => supplier(),
        }
    }
}

/// How a failed attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Connectivity problem: counts toward the circuit and is retried
    Network,
    /// Auth, validation or not-found: never retried, never counted
    Terminal,
    /// Anything else: retried without touching the circuit
    Retryable,
}

const TERMINAL_PATTERNS: &[&str] = &[
    "400",
    "401",
    "403",
    "404",
    "422",
    "bad request",
    "unauthorized",
    "not authorized",
    "forbidden",
    "not found",
    "authentication",
    "authorization",
    "permission",
    "invalid",
    "validation",
];

const NETWORK_PATTERNS: &[&str] = &[
    "fetch",
    "network",
    "timeout",
    "timed out",
    "econnrefused",
    "econnreset",
    "enotfound",
    "etimedout",
    "connection refused",
    "connection reset",
    "dns",
    "err_internet_disconnected",
    "err_network_changed",
    "err_connection",
];

fn message_matches(message: &str, patterns: &[&str]) -> bool {
    let message = message.to_lowercase();
    patterns.iter().any(|pattern| message.contains(pattern))
}

fn classify_status(status: u16) -> ErrorClass {
    match status {
        400 | 401 | 403 | 404 | 422 => ErrorClass::Terminal,
        _ => ErrorClass::Retryable,
    }
}

fn classify_message(message: &str) -> ErrorClass {
    if message_matches(message, TERMINAL_PATTERNS) {
        ErrorClass::Terminal
    } else if message_matches(message, NETWORK_PATTERNS) {
        ErrorClass::Network
    } else {
        ErrorClass::Retryable
    }
}

/// Classify a failed attempt.
///
/// Typed errors are classified structurally; free-form errors fall back to
/// keyword matching on their message. Terminal classification wins over
/// network classification so auth failures never open the circuit.
pub fn classify_error(error: &SyncError) -> ErrorClass {
    match error {
        SyncError::Timeout { .. } => ErrorClass::Network,
        SyncError::Network(e) => {
            if let Some(status) = e.status() {
                classify_status(status.as_u16())
            } else if e.is_decode() {
                ErrorClass::Terminal
            } else if e.is_timeout() || e.is_connect() || e.is_request() {
                ErrorClass::Network
            } else {
                classify_message(&e.to_string())
            }
        }
        SyncError::Api(ApiError::Authentication) => ErrorClass::Terminal,
        SyncError::Api(ApiError::Http { status, .. }) => classify_status(*status),
        SyncError::Api(ApiError::ServiceUnavailable) => ErrorClass::Retryable,
        SyncError::Json(_) | SyncError::InvalidPayload { .. } => ErrorClass::Terminal,
        SyncError::UnsupportedCategory { .. } => ErrorClass::Terminal,
        SyncError::RateLimit { .. } => ErrorClass::Retryable,
        SyncError::Other { message } => classify_message(message),
    }
}

pub fn is_network_error(error: &SyncError) -> bool {
    classify_error(error) == ErrorClass::Network
}

fn is_auth_error(error: &SyncError) -> bool {
    match error {
        SyncError::Api(ApiError::Authentication) => true,
        SyncError::Api(ApiError::Http { status, .. }) => matches!(status, 401 | 403),
        other => message_matches(
            &other.to_string(),
            &["401", "403", "unauthorized", "not authorized", "forbidden", "authentication"],
        ),
    }
}

/// Network-aware guard around every external call
pub struct ResilienceManager {
    policy: ResiliencePolicy,
    status: Mutex<NetworkStatus>,
    probe: Arc<dyn ConnectivityProbe>,
}

impl ResilienceManager {
    pub fn new(policy: ResiliencePolicy, probe: Arc<dyn ConnectivityProbe>) -> Self {
        Self {
            policy,
            status: Mutex::new(NetworkStatus::default()),
            probe,
        }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Options configured as the default for this manager
    pub fn default_options(&self) -> FallbackOptions {
        self.policy.default_options
    }

    /// Snapshot of the current network status
    pub async fn network_status(&self) -> NetworkStatus {
        self.status.lock().await.clone()
    }

    pub async fn is_network_available(&self) -> bool {
        self.status.lock().await.is_online
    }

    /// True while the circuit is open
    pub async fn should_use_fallback(&self) -> bool {
        self.status.lock().await.consecutive_failures >= self.policy.max_consecutive_failures
    }

    /// Online and circuit closed
    pub async fn is_service_available(&self) -> bool {
        let status = self.status.lock().await;
        status.is_online && status.consecutive_failures < self.policy.max_consecutive_failures
    }

    /// Push a connectivity change observed by the host
    pub async fn set_online(&self, online: bool) {
        let mut status = self.status.lock().await;
        status.is_online = online;
        status.last_check = Utc::now();
        if online {
            status.consecutive_failures = 0;
            info!("Network connection restored");
        } else {
            warn!("Network connection lost");
        }
    }

    pub async fn reset_failure_counter(&self) {
        self.status.lock().await.consecutive_failures = 0;
    }

    /// Run the connectivity probe once and fold its outcome into the status
    pub async fn check_network_status(&self) -> bool {
        let online = self.probe.is_reachable().await;

        let mut status = self.status.lock().await;
        let was_online = status.is_online;
        status.is_online = online;
        status.last_check = Utc::now();
        if online {
            status.consecutive_failures = 0;
        }

        match (was_online, online) {
            (false, true) => info!("Network connection restored"),
            (true, false) => warn!("Network connection lost"),
            _ => debug!(online, "Connectivity probe completed"),
        }
        online
    }

    /// Start the periodic connectivity probe.
    ///
    /// The first probe runs one full interval after start. Cancel the token
    /// to stop the task.
    pub fn start_monitoring(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = self.policy.probe_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Connectivity monitor stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        manager.check_network_status().await;
                    }
                }
            }
        })
    }

    /// Execute `call` with fast-fail, timeout, retry and fallback handling.
    ///
    /// With `throw_on_error == false` this never returns `Err`. The fallback
    /// is also returned, regardless of `throw_on_error`, when the call is
    /// skipped because the network is offline or the circuit is open.
    pub async fn execute_with_fallback<T, F, Fut>(
        &self,
        mut call: F,
        fallback: Fallback<T>,
        context: &str,
        options: FallbackOptions,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        if !self.is_network_available().await || self.should_use_fallback().await {
            warn!(context, "Using fallback due to network issues");
            return Ok(fallback.resolve());
        }

        let mut attempt: u32 = 0;
        loop {
            let outcome = match tokio::time::timeout(self.policy.call_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(SyncError::Timeout {
                    millis: self.policy.call_timeout.as_millis() as u64,
                }),
            };

            let error = match outcome {
                Ok(value) => {
                    self.record_success().await;
                    return Ok(value);
                }
                Err(error) => error,
            };

            let class = classify_error(&error);
            if class == ErrorClass::Network {
                self.record_network_failure().await;
            }

            if class == ErrorClass::Terminal {
                if is_auth_error(&error) {
                    debug!(context, "Authentication required, using fallback");
                } else {
                    error!(context, error = %error, "Non-retryable error");
                }
                return if options.throw_on_error {
                    Err(error)
                } else {
                    Ok(fallback.resolve())
                };
            }

            if attempt >= options.max_retries {
                error!(
                    context,
                    attempts = attempt + 1,
                    error = %error,
                    "All retries exhausted, using fallback"
                );
                return if options.throw_on_error {
                    Err(error)
                } else {
                    Ok(fallback.resolve())
                };
            }

            let delay = self.backoff_delay(options.retry_delay, attempt);
            debug!(
                context,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retrying after failure"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// `base * 2^attempt`, capped by the policy
    fn backoff_delay(&self, base: Duration, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        base.checked_mul(factor)
            .unwrap_or(self.policy.max_retry_delay)
            .min(self.policy.max_retry_delay)
    }

    async fn record_success(&self) {
        self.status.lock().await.consecutive_failures = 0;
    }

    async fn record_network_failure(&self) {
        let mut status = self.status.lock().await;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        if status.consecutive_failures == self.policy.max_consecutive_failures {
            warn!(
                failures = status.consecutive_failures,
                "Consecutive network failures reached threshold, short-circuiting calls"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct SwitchProbe(AtomicBool);

    #[async_trait]
    impl ConnectivityProbe for SwitchProbe {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn fast_options(max_retries: u32) -> FallbackOptions {
        FallbackOptions {
            throw_on_error: false,
            max_retries,
            retry_delay: Duration::from_millis(1),
        }
    }

    fn manager_with_probe(probe: Arc<SwitchProbe>) -> ResilienceManager {
        let policy = ResiliencePolicy {
            call_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        ResilienceManager::new(policy, probe)
    }

    fn manager() -> ResilienceManager {
        manager_with_probe(Arc::new(SwitchProbe(AtomicBool::new(true))))
    }

    async fn fail_with_network_error(manager: &ResilienceManager) {
        let result = manager
            .execute_with_fallback(
                || async { Err::<u32, _>(SyncError::other("network unreachable")) },
                Fallback::value(0),
                "test",
                fast_options(0),
            )
            .await;
        assert_eq!(result.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_success_returns_value() {
        let manager = manager();
        let result = manager
            .execute_with_fallback(
                || async { Ok::<_, SyncError>(42) },
                Fallback::value(0),
                "test",
                fast_options(2),
            )
            .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_fallback_after_retries_exhausted() {
        let manager = manager();
        let calls = Arc::new(AtomicU32::new(0));

        let result = manager
            .execute_with_fallback(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<&str, _>(SyncError::other("upstream returned garbage"))
                    }
                },
                Fallback::value("fallback"),
                "test",
                fast_options(2),
            )
            .await;

        assert_eq!(result.unwrap(), "fallback");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // not network-classified, so the circuit is untouched
        assert_eq!(manager.network_status().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_throw_on_error_returns_last_error() {
        let manager = manager();
        let result = manager
            .execute_with_fallback(
                || async { Err::<u32, _>(SyncError::Api(ApiError::ServiceUnavailable)) },
                Fallback::value(0),
                "test",
                fast_options(1).throwing(),
            )
            .await;
        assert!(matches!(
            result,
            Err(SyncError::Api(ApiError::ServiceUnavailable))
        ));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_three_network_failures() {
        let manager = manager();
        for _ in 0..3 {
            fail_with_network_error(&manager).await;
        }
        assert_eq!(manager.network_status().await.consecutive_failures, 3);
        assert!(manager.should_use_fallback().await);

        let calls = Arc::new(AtomicU32::new(0));
        let result = manager
            .execute_with_fallback(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, SyncError>(7)
                    }
                },
                Fallback::value(-1),
                "test",
                fast_options(2),
            )
            .await;

        assert_eq!(result.unwrap(), -1);
        assert_eq!(calls.load(Ordering::SeqCst), 0, "open circuit must skip the call");
    }

    #[tokio::test]
    async fn test_network_failures_within_one_call_count_per_attempt() {
        let manager = manager();
        let result = manager
            .execute_with_fallback(
                || async { Err::<u32, _>(SyncError::other("ECONNREFUSED 10.0.0.1:443")) },
                Fallback::value(0),
                "test",
                fast_options(2),
            )
            .await;
        assert_eq!(result.unwrap(), 0);
        assert_eq!(manager.network_status().await.consecutive_failures, 3);
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let manager = manager();
        fail_with_network_error(&manager).await;
        fail_with_network_error(&manager).await;
        assert_eq!(manager.network_status().await.consecutive_failures, 2);

        let result = manager
            .execute_with_fallback(
                || async { Ok::<_, SyncError>(1) },
                Fallback::value(0),
                "test",
                fast_options(0),
            )
            .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(manager.network_status().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried_or_counted() {
        let manager = manager();
        let calls = Arc::new(AtomicU32::new(0));

        let result = manager
            .execute_with_fallback(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<u32, _>(SyncError::Api(ApiError::Http {
                            status: 401,
                            message: "Unauthorized".to_string(),
                        }))
                    }
                },
                Fallback::value(5),
                "test",
                fast_options(2),
            )
            .await;

        assert_eq!(result.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.network_status().await.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_terminal_error_thrown_when_requested() {
        let manager = manager();
        let result = manager
            .execute_with_fallback(
                || async { Err::<u32, _>(SyncError::other("validation failed: missing field")) },
                Fallback::value(0),
                "test",
                fast_options(2).throwing(),
            )
            .await;
        assert!(matches!(result, Err(SyncError::Other { .. })));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_network_failure() {
        let manager = manager();
        let result = manager
            .execute_with_fallback(
                || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok::<_, SyncError>(1)
                },
                Fallback::value(0),
                "test",
                fast_options(0).throwing(),
            )
            .await;
        assert!(matches!(result, Err(SyncError::Timeout { millis: 200 })));
        assert_eq!(manager.network_status().await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_offline_short_circuits() {
        let manager = manager();
        manager.set_online(false).await;
        assert!(!manager.is_service_available().await);

        let calls = Arc::new(AtomicU32::new(0));
        let result = manager
            .execute_with_fallback(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, SyncError>(1)
                    }
                },
                Fallback::supplier(|| 99),
                "test",
                fast_options(0).throwing(),
            )
            .await;
        assert_eq!(result.unwrap(), 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_probe_updates_status_and_closes_circuit() {
        let probe = Arc::new(SwitchProbe(AtomicBool::new(false)));
        let manager = manager_with_probe(probe.clone());

        assert!(!manager.check_network_status().await);
        assert!(!manager.is_network_available().await);

        for _ in 0..3 {
            manager.record_network_failure().await;
        }
        probe.0.store(true, Ordering::SeqCst);
        assert!(manager.check_network_status().await);
        let status = manager.network_status().await;
        assert!(status.is_online);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_probes_periodically() {
        let probe = Arc::new(SwitchProbe(AtomicBool::new(false)));
        let manager = Arc::new(manager_with_probe(probe));
        let cancel = CancellationToken::new();
        let handle = manager.start_monitoring(cancel.clone());

        assert!(manager.is_network_available().await);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!manager.is_network_available().await);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let manager = manager();
        let base = Duration::from_millis(1000);
        assert_eq!(manager.backoff_delay(base, 0), Duration::from_millis(1000));
        assert_eq!(manager.backoff_delay(base, 1), Duration::from_millis(2000));
        assert_eq!(manager.backoff_delay(base, 2), Duration::from_millis(4000));
        assert_eq!(manager.backoff_delay(base, 10), Duration::from_secs(30));
        assert_eq!(manager.backoff_delay(base, 40), Duration::from_secs(30));
    }

    #[test]
    fn test_classify_error() {
        assert_eq!(
            classify_error(&SyncError::Timeout { millis: 10 }),
            ErrorClass::Network
        );
        assert_eq!(
            classify_error(&SyncError::other("Failed to fetch")),
            ErrorClass::Network
        );
        assert_eq!(
            classify_error(&SyncError::other("getaddrinfo ENOTFOUND api.example")),
            ErrorClass::Network
        );
        assert_eq!(
            classify_error(&SyncError::Api(ApiError::Authentication)),
            ErrorClass::Terminal
        );
        for status in [400u16, 401, 403, 404, 422] {
            assert_eq!(
                classify_error(&SyncError::Api(ApiError::Http {
                    status,
                    message: String::new()
                })),
                ErrorClass::Terminal
            );
        }
        assert_eq!(
            classify_error(&SyncError::Api(ApiError::Http {
                status: 503,
                message: String::new()
            })),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify_error(&SyncError::other("Forbidden")),
            ErrorClass::Terminal
        );
        assert_eq!(
            classify_error(&SyncError::RateLimit {
                source_id: "nvd".to_string()
            }),
            ErrorClass::Retryable
        );
        assert_eq!(
            classify_error(&SyncError::other("something odd happened")),
            ErrorClass::Retryable
        );
    }
}
