//! Host API calls forwarded to connected bridge clients as frames.
//!
//! The browser side of the bridge owns the real listeners and badge. Each
//! call here becomes one notification frame `{ "method", "params" }`
//! broadcast to every connected client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use tabtrace_core::host::{BadgeSink, NetworkEventSource, RequestFilter};
use tabtrace_core::{HostError, ListenerHandle, TabId};

use crate::client::ClientRegistry;

#[derive(Debug, Serialize)]
struct HostFrame<'a> {
    method: &'a str,
    params: serde_json::Value,
}

pub struct HostChannel {
    clients: Arc<ClientRegistry>,
    next_listener: AtomicU64,
}

impl HostChannel {
    pub fn new(clients: Arc<ClientRegistry>) -> Self {
        Self {
            clients,
            next_listener: AtomicU64::new(1),
        }
    }

    fn emit(&self, method: &str, params: serde_json::Value) -> Result<usize, HostError> {
        let frame = serde_json::to_string(&HostFrame { method, params })
            .map_err(|e| HostError::Rejected(format!("frame encoding: {e}")))?;
        Ok(self.clients.broadcast(&frame))
    }

    /// Emit a frame that at least one bridge must accept.
    fn emit_required(&self, method: &str, params: serde_json::Value) -> Result<(), HostError> {
        match self.emit(method, params)? {
            0 => Err(HostError::Unavailable("no host bridge connected".into())),
            _ => Ok(()),
        }
    }
}

impl NetworkEventSource for HostChannel {
    fn add_listener(&self, filter: &RequestFilter) -> Result<ListenerHandle, HostError> {
        let handle = ListenerHandle::new(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.emit_required(
            "listener.add",
            json!({
                "listenerId": handle,
                "tabId": filter.tab_id,
                "urls": filter.urls,
                "extraInfoSpec": filter.extra_info_spec,
            }),
        )?;
        Ok(handle)
    }

    /// A bridge that is gone took its listeners with it, so removal with
    /// nobody connected still succeeds.
    fn remove_listener(&self, handle: ListenerHandle) -> Result<(), HostError> {
        let delivered = self.emit("listener.remove", json!({ "listenerId": handle }))?;
        if delivered == 0 {
            tracing::debug!(%handle, "no bridge connected for listener removal");
        }
        Ok(())
    }
}

impl BadgeSink for HostChannel {
    fn set_badge_text(&self, tab_id: TabId, text: &str) -> Result<(), HostError> {
        self.emit_required("badge.setText", json!({ "tabId": tab_id, "text": text }))
    }

    fn set_popup(&self, tab_id: TabId, popup: &str) -> Result<(), HostError> {
        self.emit_required("badge.setPopup", json!({ "tabId": tab_id, "popup": popup }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(rx: &mut tokio::sync::mpsc::Receiver<String>) -> serde_json::Value {
        serde_json::from_str(&rx.try_recv().unwrap()).unwrap()
    }

    #[test]
    fn add_listener_without_bridge_fails() {
        let channel = HostChannel::new(Arc::new(ClientRegistry::new(8)));
        let err = channel
            .add_listener(&RequestFilter::for_tab(TabId::new(7)))
            .unwrap_err();
        assert!(matches!(err, HostError::Unavailable(_)));
    }

    #[test]
    fn add_and_remove_listener_emit_frames() {
        let clients = Arc::new(ClientRegistry::new(8));
        let (_id, mut rx) = clients.register();
        let channel = HostChannel::new(clients);

        let handle = channel
            .add_listener(&RequestFilter::for_tab(TabId::new(7)))
            .unwrap();
        let added = frame(&mut rx);
        assert_eq!(added["method"], "listener.add");
        assert_eq!(added["params"]["tabId"], 7);
        assert_eq!(added["params"]["listenerId"], handle.get());
        assert_eq!(added["params"]["urls"][0], "<all_urls>");
        assert_eq!(added["params"]["extraInfoSpec"][0], "responseHeaders");

        channel.remove_listener(handle).unwrap();
        let removed = frame(&mut rx);
        assert_eq!(removed["method"], "listener.remove");
        assert_eq!(removed["params"]["listenerId"], handle.get());
    }

    #[test]
    fn handles_are_unique() {
        let clients = Arc::new(ClientRegistry::new(8));
        let (_id, _rx) = clients.register();
        let channel = HostChannel::new(clients);
        let a = channel.add_listener(&RequestFilter::for_tab(TabId::new(1))).unwrap();
        let b = channel.add_listener(&RequestFilter::for_tab(TabId::new(1))).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn remove_without_bridge_succeeds() {
        let channel = HostChannel::new(Arc::new(ClientRegistry::new(8)));
        assert!(channel.remove_listener(ListenerHandle::new(3)).is_ok());
    }

    #[test]
    fn badge_frames() {
        let clients = Arc::new(ClientRegistry::new(8));
        let (_id, mut rx) = clients.register();
        let channel = HostChannel::new(clients);

        channel.set_badge_text(TabId::new(7), "0.12").unwrap();
        channel.set_popup(TabId::new(7), "/popup.html").unwrap();

        let text = frame(&mut rx);
        assert_eq!(text["method"], "badge.setText");
        assert_eq!(text["params"]["text"], "0.12");
        let popup = frame(&mut rx);
        assert_eq!(popup["method"], "badge.setPopup");
        assert_eq!(popup["params"]["popup"], "/popup.html");
    }
}
