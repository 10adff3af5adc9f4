//! Bounded polling for a page whose load has not finished yet.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use tabtrace_core::NavigationTiming;
use tabtrace_settings::CollectSettings;

use crate::error::EngineError;

/// Re-polls a timing source at a fixed delay until it reports a positive
/// duration, giving up after `max_attempts` polls.
#[derive(Clone, Copy, Debug)]
pub struct SnapshotCollector {
    retry_delay: Duration,
    max_attempts: u32,
}

impl SnapshotCollector {
    pub fn new(retry_delay: Duration, max_attempts: u32) -> Self {
        Self {
            retry_delay,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_settings(settings: &CollectSettings) -> Self {
        Self::new(Duration::from_millis(settings.retry_delay_ms), settings.max_attempts)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Poll until a complete snapshot arrives. A poll returning `None`
    /// (snapshot unavailable) counts as an attempt.
    pub async fn collect<F, Fut>(&self, mut poll: F) -> Result<NavigationTiming, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<NavigationTiming>>,
    {
        for attempt in 1..=self.max_attempts {
            if let Some(timing) = poll().await {
                if timing.is_complete() {
                    return Ok(timing);
                }
            }
            if attempt < self.max_attempts {
                debug!(attempt, "snapshot not ready, retrying");
                tokio::time::sleep(self.retry_delay).await;
            }
        }
        Err(EngineError::RetriesExhausted {
            attempts: self.max_attempts,
        })
    }
}

impl Default for SnapshotCollector {
    fn default() -> Self {
        Self::from_settings(&CollectSettings::default())
    }
}
