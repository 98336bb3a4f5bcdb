use serde::{Deserialize, Serialize};

/// Acknowledgment and retransmission settings of a
/// [`CommunicationInterface`](crate::CommunicationInterface).
///
/// Missing fields take their default value when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfaceOptions {
    /// How many times an unacknowledged request is sent again before giving up.
    pub max_retries: u8,
    /// How long to wait for an acknowledgment before sending again, in milliseconds.
    pub retry_timeout_ms: u64,
}

impl InterfaceOptions {
    pub const DEFAULT_MAX_RETRIES: u8 = 3;
    pub const DEFAULT_RETRY_TIMEOUT_MS: u64 = 1000;

    #[inline(always)]
    pub const fn new(max_retries: u8, retry_timeout_ms: u64) -> Self {
        Self {
            max_retries,
            retry_timeout_ms,
        }
    }

    #[inline(always)]
    pub const fn with_max_retries(mut self, max_retries: u8) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[inline(always)]
    pub const fn with_retry_timeout_ms(mut self, retry_timeout_ms: u64) -> Self {
        self.retry_timeout_ms = retry_timeout_ms;
        self
    }

    #[inline(always)]
    pub const fn retry_timeout(&self) -> core::time::Duration {
        core::time::Duration::from_millis(self.retry_timeout_ms)
    }
}

impl Default for InterfaceOptions {
    #[inline(always)]
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES, Self::DEFAULT_RETRY_TIMEOUT_MS)
    }
}
