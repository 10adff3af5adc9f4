//! Eviction on tab close and periodic expiry of durable rows.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tabtrace_core::{now_millis, TabId};
use tabtrace_store::TabDeletion;

use crate::cache::CorrelationCache;
use crate::error::EngineError;
use crate::mirror::StoreMirror;
use crate::registry::TabObservationRegistry;

/// What a tab close removed from each tier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Eviction {
    pub stopped: bool,
    pub evicted: bool,
    pub durable: Option<TabDeletion>,
}

pub struct LifecycleReaper {
    registry: Arc<TabObservationRegistry>,
    cache: Arc<CorrelationCache>,
    mirror: Arc<StoreMirror>,
    expiry: Duration,
}

impl LifecycleReaper {
    pub fn new(
        registry: Arc<TabObservationRegistry>,
        cache: Arc<CorrelationCache>,
        mirror: Arc<StoreMirror>,
        expiry: Duration,
    ) -> Self {
        Self {
            registry,
            cache,
            mirror,
            expiry,
        }
    }

    /// Stop, evict, then delete durable rows. Each step runs even when an
    /// earlier one had nothing to do; a durable failure is logged.
    ///
    /// The cache keeps the tab marked as evicted unless the durable delete
    /// succeeds, so leftover rows are never read back.
    pub async fn on_tab_closed(&self, tab_id: TabId) -> Eviction {
        let stopped = self.registry.stop(tab_id);
        let evicted = self.cache.evict(tab_id);
        let durable = match self.mirror.delete_tab(tab_id).await {
            Ok(deletion) => {
                self.cache.forget_eviction(tab_id);
                Some(deletion)
            }
            Err(EngineError::StoreUnavailable) => None,
            Err(e) => {
                warn!(%tab_id, error = %e, "durable tab delete failed");
                None
            }
        };
        info!(%tab_id, stopped, evicted, "tab evicted");
        Eviction {
            stopped,
            evicted,
            durable,
        }
    }

    /// Remove durable rows older than the expiry window as of `now_ms`.
    pub async fn sweep(&self, now_ms: i64) -> Result<usize, EngineError> {
        let expiry_ms = i64::try_from(self.expiry.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(expiry_ms);
        let removed = self.mirror.delete_expired(cutoff).await?;
        if removed > 0 {
            info!(removed, cutoff, "expired rows removed");
        }
        Ok(removed)
    }

    /// Run [`sweep`](Self::sweep) every `interval` until `cancel` fires.
    /// The first sweep runs immediately.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match self.sweep(now_millis()).await {
                            Ok(_) | Err(EngineError::StoreUnavailable) => {}
                            Err(e) => error!(error = %e, "expiry sweep failed"),
                        }
                    }
                }
            }
        })
    }
}
