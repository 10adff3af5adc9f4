use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::ids::TabId;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// One observed (URL -> responding IP) pair for a tab.
///
/// Facts are immutable; a later fact for the same URL in the same tab
/// generation replaces the earlier one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub url: String,
    pub ip: String,
    pub tab_id: TabId,
    pub captured_at: i64,
}

impl Fact {
    pub fn new(tab_id: TabId, url: impl Into<String>, ip: impl Into<String>) -> Self {
        Self::captured_at(tab_id, url, ip, now_millis())
    }

    pub fn captured_at(
        tab_id: TabId,
        url: impl Into<String>,
        ip: impl Into<String>,
        captured_at: i64,
    ) -> Self {
        Self {
            url: url.into(),
            ip: ip.into(),
            tab_id,
            captured_at,
        }
    }
}
