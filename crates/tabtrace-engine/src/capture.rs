//! The shared network-completion handler.
//!
//! One handler serves every tab: it looks the session up by the event's own
//! tab id, so events for tabs that are not (or no longer) observed fall
//! through without touching any state.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use tabtrace_core::host::NetworkCompletion;

use crate::cache::{CorrelationCache, RecordOutcome};
use crate::mirror::StoreMirror;
use crate::registry::TabObservationRegistry;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureOutcome {
    Recorded,
    NoSession,
    NoIp,
    Dropped,
}

pub struct EventCapture {
    registry: Arc<TabObservationRegistry>,
    cache: Arc<CorrelationCache>,
    mirror: Arc<StoreMirror>,
}

impl EventCapture {
    pub fn new(
        registry: Arc<TabObservationRegistry>,
        cache: Arc<CorrelationCache>,
        mirror: Arc<StoreMirror>,
    ) -> Self {
        Self {
            registry,
            cache,
            mirror,
        }
    }

    pub fn handle(&self, event: &NetworkCompletion) -> CaptureOutcome {
        let tab_id = event.tab_id;
        if !self.registry.is_observing(tab_id) {
            debug!(%tab_id, url = %event.url, "completion for unobserved tab ignored");
            return CaptureOutcome::NoSession;
        }

        let Some(ip) = event.ip.as_deref().filter(|ip| !ip.is_empty()) else {
            debug!(%tab_id, url = %event.url, "completion without ip ignored");
            return CaptureOutcome::NoIp;
        };

        match self.cache.record(tab_id, &event.url, ip, event.time_stamp) {
            RecordOutcome::Stored(fact) => {
                debug!(%tab_id, url = %fact.url, ip = %fact.ip, "fact recorded");
                self.mirror.put_fact(fact);
                CaptureOutcome::Recorded
            }
            outcome => {
                debug!(%tab_id, url = %event.url, ?outcome, "fact dropped");
                CaptureOutcome::Dropped
            }
        }
    }
}
