//! Which tabs currently have a live network listener.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use tabtrace_core::host::{NetworkEventSource, RequestFilter};
use tabtrace_core::{now_millis, HostError, ListenerHandle, TabId};

/// A live listener registration for one tab.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObservationSession {
    pub tab_id: TabId,
    pub handle: ListenerHandle,
    pub started_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started(ListenerHandle),
    AlreadyActive,
}

/// At most one session per tab. Both entry points are idempotent and run
/// their host call under the session lock, so a concurrent `start`/`stop`
/// pair for the same tab cannot leave a listener without a session.
pub struct TabObservationRegistry {
    source: Arc<dyn NetworkEventSource>,
    sessions: Mutex<HashMap<TabId, ObservationSession>>,
}

impl TabObservationRegistry {
    pub fn new(source: Arc<dyn NetworkEventSource>) -> Self {
        Self {
            source,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Subscribe to network completions for `tab_id`. A registration
    /// failure leaves no session behind.
    pub fn start(&self, tab_id: TabId) -> Result<StartOutcome, HostError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(&tab_id) {
            return Ok(StartOutcome::AlreadyActive);
        }

        let handle = self.source.add_listener(&RequestFilter::for_tab(tab_id))?;
        sessions.insert(
            tab_id,
            ObservationSession {
                tab_id,
                handle,
                started_at: now_millis(),
            },
        );
        info!(%tab_id, %handle, "observation started");
        Ok(StartOutcome::Started(handle))
    }

    /// Remove the listener for `tab_id`. Returns whether a session existed.
    pub fn stop(&self, tab_id: TabId) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.remove(&tab_id) else {
            return false;
        };

        if let Err(e) = self.source.remove_listener(session.handle) {
            warn!(%tab_id, handle = %session.handle, error = %e, "listener removal failed");
        }
        info!(%tab_id, "observation stopped");
        true
    }

    pub fn session(&self, tab_id: TabId) -> Option<ObservationSession> {
        self.sessions.lock().get(&tab_id).cloned()
    }

    pub fn is_observing(&self, tab_id: TabId) -> bool {
        self.sessions.lock().contains_key(&tab_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Stop every session. Used on shutdown.
    pub fn stop_all(&self) -> usize {
        let tabs: Vec<TabId> = self.sessions.lock().keys().copied().collect();
        tabs.into_iter().filter(|tab| self.stop(*tab)).count()
    }
}
