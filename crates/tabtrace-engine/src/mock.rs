use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use tabtrace_core::host::{BadgeSink, NetworkEventSource, RequestFilter};
use tabtrace_core::{HostError, ListenerHandle, TabId};

/// In-process event source that records every subscription change.
#[derive(Default)]
pub struct MockEventSource {
    next_handle: AtomicU64,
    fail_add: AtomicBool,
    added: Mutex<Vec<(ListenerHandle, RequestFilter)>>,
    removed: Mutex<Vec<ListenerHandle>>,
}

impl MockEventSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `add_listener` calls fail with `Unavailable`.
    pub fn fail_next_adds(&self, fail: bool) {
        self.fail_add.store(fail, Ordering::SeqCst);
    }

    pub fn added(&self) -> Vec<(ListenerHandle, RequestFilter)> {
        self.added.lock().clone()
    }

    pub fn removed(&self) -> Vec<ListenerHandle> {
        self.removed.lock().clone()
    }

    /// Listeners added and not yet removed.
    pub fn live_count(&self) -> usize {
        let removed = self.removed.lock();
        self.added
            .lock()
            .iter()
            .filter(|(handle, _)| !removed.contains(handle))
            .count()
    }
}

impl NetworkEventSource for MockEventSource {
    fn add_listener(&self, filter: &RequestFilter) -> Result<ListenerHandle, HostError> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(HostError::Unavailable("mock source offline".into()));
        }
        let handle = ListenerHandle::new(self.next_handle.fetch_add(1, Ordering::SeqCst) + 1);
        self.added.lock().push((handle, filter.clone()));
        Ok(handle)
    }

    fn remove_listener(&self, handle: ListenerHandle) -> Result<(), HostError> {
        self.removed.lock().push(handle);
        Ok(())
    }
}

/// Badge sink that keeps the last text and popup per tab.
#[derive(Default)]
pub struct MockBadgeSink {
    texts: Mutex<Vec<(TabId, String)>>,
    popups: Mutex<Vec<(TabId, String)>>,
    fail: AtomicBool,
}

impl MockBadgeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn texts(&self) -> Vec<(TabId, String)> {
        self.texts.lock().clone()
    }

    pub fn popups(&self) -> Vec<(TabId, String)> {
        self.popups.lock().clone()
    }
}

impl BadgeSink for MockBadgeSink {
    fn set_badge_text(&self, tab_id: TabId, text: &str) -> Result<(), HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("mock badge failure".into()));
        }
        self.texts.lock().push((tab_id, text.to_string()));
        Ok(())
    }

    fn set_popup(&self, tab_id: TabId, popup: &str) -> Result<(), HostError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(HostError::Rejected("mock badge failure".into()));
        }
        self.popups.lock().push((tab_id, popup.to_string()));
        Ok(())
    }
}
