use std::time::Duration;

/// Engine tunables. Programmatic only; this library owns no CLI, env file,
/// or process bootstrap.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Unit delay for reconnect backoff. Retry `n` waits `base_delay * n`.
    pub base_delay: Duration,
    /// Subscription attempts per connect sequence before the engine gives
    /// up and degrades to polling.
    pub max_retries: u32,
    /// How long a typing indicator stays up without a refresh signal.
    pub typing_ttl: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 3,
            typing_ttl: Duration::from_secs(3),
        }
    }
}

impl SyncConfig {
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_typing_ttl(mut self, ttl: Duration) -> Self {
        self.typing_ttl = ttl;
        self
    }

    /// Backoff slept after failed attempt `attempt` (1-based), growing
    /// linearly in the attempt number.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_grows_linearly() {
        let config = SyncConfig::default().with_base_delay(Duration::from_millis(100));
        assert_eq!(config.retry_delay(1), Duration::from_millis(100));
        assert_eq!(config.retry_delay(2), Duration::from_millis(200));
        assert_eq!(config.retry_delay(3), Duration::from_millis(300));
    }
}
