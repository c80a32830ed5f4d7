//! Engine configuration
//!
//! All knobs can be overridden through environment variables:
//!
//! | Environment variable | Default | Meaning |
//! |----------------------|---------|---------|
//! | `AUTOMATION_WORKERS` | 8 | Action executor worker pool size |
//! | `AUTOMATION_QUEUE_CEILING` | 10000 | Global pending-chain ceiling (action storm guard) |
//! | `AUTOMATION_RETRY_ATTEMPTS` | 3 | Attempts for retryable actions |
//! | `AUTOMATION_RETRY_BACKOFF_MS` | 200 | Backoff base, doubled per attempt |
//! | `AUTOMATION_TICK_INTERVAL_MS` | 500 | Max scheduler sleep between heap checks |
//! | `AUTOMATION_EVENT_BUFFER` | 1024 | Event pump channel capacity |
//! | `AUTOMATION_AUDIT_CAPACITY` | 4096 | Audit broadcast channel capacity |

/// Default executor pool size
const DEFAULT_WORKERS: usize = 8;
/// Default global queue ceiling
const DEFAULT_QUEUE_CEILING: usize = 10_000;
/// Default attempts for retryable actions
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
/// Default retry backoff base (milliseconds)
const DEFAULT_RETRY_BACKOFF_MS: u64 = 200;
/// Default upper bound on scheduler sleep
const DEFAULT_TICK_INTERVAL_MS: u64 = 500;
/// Default event pump buffer
const DEFAULT_EVENT_BUFFER: usize = 1024;
/// Default audit broadcast capacity
const DEFAULT_AUDIT_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Bounded worker pool size for the action executor
    pub worker_pool_size: usize,
    /// Fatal ceiling on queued-but-unfinished chains across all tickets
    pub queue_ceiling: usize,
    /// Max attempts for retryable actions (SendMessage, NotifyManager)
    pub retry_attempts: u32,
    /// Backoff base in milliseconds, doubled per failed attempt
    pub retry_backoff_ms: u64,
    /// Upper bound on how long the scheduler sleeps without checking the heap
    pub tick_interval_ms: u64,
    /// Event pump channel capacity
    pub event_buffer: usize,
    /// Audit broadcast channel capacity
    pub audit_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKERS,
            queue_ceiling: DEFAULT_QUEUE_CEILING,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            event_buffer: DEFAULT_EVENT_BUFFER,
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            worker_pool_size: env_parse("AUTOMATION_WORKERS", defaults.worker_pool_size),
            queue_ceiling: env_parse("AUTOMATION_QUEUE_CEILING", defaults.queue_ceiling),
            retry_attempts: env_parse("AUTOMATION_RETRY_ATTEMPTS", defaults.retry_attempts),
            retry_backoff_ms: env_parse("AUTOMATION_RETRY_BACKOFF_MS", defaults.retry_backoff_ms),
            tick_interval_ms: env_parse("AUTOMATION_TICK_INTERVAL_MS", defaults.tick_interval_ms),
            event_buffer: env_parse("AUTOMATION_EVENT_BUFFER", defaults.event_buffer),
            audit_capacity: env_parse("AUTOMATION_AUDIT_CAPACITY", defaults.audit_capacity),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = EngineConfig::default();
        assert!(cfg.worker_pool_size > 0);
        assert!(cfg.queue_ceiling > cfg.worker_pool_size);
        assert_eq!(cfg.retry_attempts, 3);
    }
}
