//! Contracts with the host browser.
//!
//! The engine never talks to a browser directly. It registers network
//! listeners through [`NetworkEventSource`], pushes badge updates through
//! [`BadgeSink`], and receives the host's events as plain values.

use serde::{Deserialize, Serialize};

use crate::errors::HostError;
use crate::ids::{FrameId, ListenerHandle, TabId};

/// URL pattern matching every request.
pub const ALL_URLS: &str = "<all_urls>";

/// Popup page activated for a tab once its timing record is saved.
pub const POPUP_PAGE: &str = "/popup.html";

/// Optional data the host attaches to completion events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtraInfoSpec {
    /// Required for the host to expose the responding IP.
    ResponseHeaders,
}

/// Filter applied when subscribing to network-completion events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFilter {
    pub tab_id: TabId,
    pub urls: Vec<String>,
    pub extra_info_spec: Vec<ExtraInfoSpec>,
}

impl RequestFilter {
    /// All URLs for one tab, with response headers visible.
    pub fn for_tab(tab_id: TabId) -> Self {
        Self {
            tab_id,
            urls: vec![ALL_URLS.to_string()],
            extra_info_spec: vec![ExtraInfoSpec::ResponseHeaders],
        }
    }
}

/// Host subsystem delivering network-completion events.
///
/// Both calls are synchronous: once `remove_listener` returns, the host
/// will not start delivering new events for that listener.
pub trait NetworkEventSource: Send + Sync {
    fn add_listener(&self, filter: &RequestFilter) -> Result<ListenerHandle, HostError>;
    fn remove_listener(&self, handle: ListenerHandle) -> Result<(), HostError>;
}

/// Toolbar badge and popup controls.
pub trait BadgeSink: Send + Sync {
    fn set_badge_text(&self, tab_id: TabId, text: &str) -> Result<(), HostError>;
    fn set_popup(&self, tab_id: TabId, popup: &str) -> Result<(), HostError>;
}

/// A completed network request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkCompletion {
    pub url: String,
    #[serde(default)]
    pub ip: Option<String>,
    pub tab_id: TabId,
    /// Host-side completion time in epoch milliseconds.
    #[serde(default)]
    pub time_stamp: Option<f64>,
}

/// A navigation about to start in some frame of a tab.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationStart {
    pub tab_id: TabId,
    pub frame_id: FrameId,
    pub url: String,
}

/// A tab was closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRemoved {
    pub tab_id: TabId,
}
