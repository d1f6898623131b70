/// Service-level configuration for the guarded enrichment call.
///
/// Controls per-run lookup concurrency and the resilience policy wrapped
/// around each run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of author lookups in flight within a single
    /// enrichment run. `1` issues them sequentially.
    pub lookup_concurrency: usize,
    /// Fault-tolerance settings for the enrichment call.
    pub resilience: ResilienceConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            lookup_concurrency: 1,
            resilience: ResilienceConfig::default(),
        }
    }
}

/// Settings for every layer of the resilience stack.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    /// Upper bound on a single attempt in milliseconds.
    pub attempt_timeout_ms: u64,
    pub bulkhead: BulkheadConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Whether exhausted calls degrade to the plain listing instead of
    /// surfacing the error.
    pub fallback_enabled: bool,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            attempt_timeout_ms: 5000,
            bulkhead: BulkheadConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            fallback_enabled: true,
        }
    }
}

/// Retry with a fixed delay, bounded jitter, and a cumulative budget.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts made after the first failure.
    pub max_retries: u32,
    /// Base wait between attempts in milliseconds.
    pub delay_ms: u64,
    /// Upper bound of the random extra wait added to each delay.
    pub jitter_ms: u64,
    /// Cumulative budget for retrying, measured from the first failure.
    /// A retry whose delay would overrun the budget is not scheduled.
    pub max_duration_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay_ms: 400,
            jitter_ms: 300,
            max_duration_ms: 3000,
        }
    }
}

/// Concurrency limit plus bounded wait queue.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    pub max_concurrent: usize,
    pub max_waiting: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            max_waiting: 10,
        }
    }
}

/// Rolling-window failure-ratio circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Size of the rolling outcome window, and the minimum number of
    /// recorded outcomes before the ratio is evaluated.
    pub request_volume_threshold: usize,
    /// Failure ratio at or above which the circuit opens.
    pub failure_ratio: f64,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: u32,
    /// Time the circuit stays open before admitting trial calls.
    pub delay_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 10,
            failure_ratio: 0.4,
            success_threshold: 3,
            delay_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resilience_defaults() {
        let config = ResilienceConfig::default();
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.retry.delay_ms, 400);
        assert_eq!(config.retry.jitter_ms, 300);
        assert_eq!(config.retry.max_duration_ms, 3000);
        assert_eq!(config.attempt_timeout_ms, 5000);
        assert_eq!(config.bulkhead.max_concurrent, 5);
        assert_eq!(config.bulkhead.max_waiting, 10);
        assert_eq!(config.circuit_breaker.request_volume_threshold, 10);
        assert!((config.circuit_breaker.failure_ratio - 0.4).abs() < f64::EPSILON);
        assert_eq!(config.circuit_breaker.success_threshold, 3);
        assert_eq!(config.circuit_breaker.delay_ms, 5000);
        assert!(config.fallback_enabled);
    }

    #[test]
    fn server_defaults_to_sequential_lookups() {
        assert_eq!(ServerConfig::default().lookup_concurrency, 1);
    }
}
