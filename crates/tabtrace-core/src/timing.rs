//! Navigation and resource timing payloads.
//!
//! These mirror the page-side performance API entries. Only the fields the
//! correlation path reads or rewrites are typed; everything else the page
//! sends is carried through untouched in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::TabId;

/// IP placeholder for resources with no observed network fact.
pub const UNKNOWN_IP: &str = "unknown";

/// Top-level navigation timing snapshot with its resource entries.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub name: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub fetch_start: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_lookup_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_lookup_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_complete: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_interactive: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded_event_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dom_content_loaded_event_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_event_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_event_end: Option<f64>,
    /// `performance.timeOrigin` of the page, when the page sent it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_origin: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_timestamp: Option<f64>,
    #[serde(default, rename = "remoteIPAddress", skip_serializing_if = "Option::is_none")]
    pub remote_ip_address: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NavigationTiming {
    pub fn new(name: impl Into<String>, duration: f64) -> Self {
        Self {
            name: name.into(),
            duration,
            ..Default::default()
        }
    }

    /// The page has finished loading once the duration is positive.
    pub fn is_complete(&self) -> bool {
        self.duration > 0.0
    }

    /// Absolute timestamp fields that shift together when `fetchStart` is
    /// negative. `duration` shifts with them but is not an `Option`, so it is
    /// handled by the caller; `fetchStart` and `startTime` never move.
    pub fn shiftable_fields_mut(&mut self) -> [&mut Option<f64>; 13] {
        [
            &mut self.domain_lookup_start,
            &mut self.domain_lookup_end,
            &mut self.connect_start,
            &mut self.connect_end,
            &mut self.request_start,
            &mut self.response_start,
            &mut self.response_end,
            &mut self.dom_complete,
            &mut self.dom_interactive,
            &mut self.dom_content_loaded_event_start,
            &mut self.dom_content_loaded_event_end,
            &mut self.load_event_start,
            &mut self.load_event_end,
        ]
    }
}

/// A single resource timing entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default)]
    pub entry_type: String,
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub initiator_type: String,
    #[serde(default)]
    pub next_hop_protocol: String,
    #[serde(default)]
    pub transfer_size: u64,
    #[serde(default)]
    pub encoded_body_size: u64,
    #[serde(default)]
    pub decoded_body_size: u64,
    #[serde(default)]
    pub response_status: u16,
    #[serde(default)]
    pub server_timing: Vec<Value>,
    #[serde(default, rename = "remoteIPAddress", skip_serializing_if = "Option::is_none")]
    pub remote_ip_address: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entry_type: "resource".into(),
            ..Default::default()
        }
    }
}

/// The finished, IP-annotated record for one page load in a tab.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingRecord {
    pub tab_id: TabId,
    pub timing: NavigationTiming,
    pub timestamp: i64,
}
