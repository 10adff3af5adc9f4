//! Merge a page's timing snapshot with the tab's URL -> IP facts.

use std::collections::HashMap;

use tabtrace_core::{now_millis, NavigationTiming, TabId, TimingRecord, UNKNOWN_IP};

use crate::error::EngineError;

/// Build the finished record for `tab_id` from a raw snapshot.
///
/// Fails with [`EngineError::SnapshotNotReady`] while the page's duration
/// is not positive; nothing is annotated or adjusted in that case.
pub fn assemble(
    tab_id: TabId,
    mut timing: NavigationTiming,
    ips: &HashMap<String, String>,
) -> Result<TimingRecord, EngineError> {
    if !timing.is_complete() {
        return Err(EngineError::SnapshotNotReady {
            duration: timing.duration,
        });
    }

    annotate(&mut timing, ips);
    derive_start(&mut timing);
    adjust_negative_fetch_start(&mut timing);

    Ok(TimingRecord {
        tab_id,
        timing,
        timestamp: now_millis(),
    })
}

/// Exact-URL match only. The document keeps no address on a miss; a
/// resource gets the `unknown` placeholder.
fn annotate(timing: &mut NavigationTiming, ips: &HashMap<String, String>) {
    if let Some(ip) = ips.get(&timing.name) {
        timing.remote_ip_address = Some(ip.clone());
    }
    for entry in &mut timing.resources {
        let ip = ips.get(&entry.name).map(String::as_str).unwrap_or(UNKNOWN_IP);
        entry.remote_ip_address = Some(ip.to_string());
    }
}

fn derive_start(timing: &mut NavigationTiming) {
    timing.start = Some(timing.fetch_start);
    if let Some(origin) = timing.time_origin {
        timing.start_timestamp = Some(origin + timing.fetch_start);
    }
}

/// Some engines report a negative `fetchStart`; shift every absolute field
/// (and the duration) by its magnitude.
fn adjust_negative_fetch_start(timing: &mut NavigationTiming) {
    if timing.fetch_start >= 0.0 {
        return;
    }
    let adjustment = -timing.fetch_start;
    for field in timing.shiftable_fields_mut() {
        if let Some(value) = field.as_mut() {
            *value += adjustment;
        }
    }
    timing.duration += adjustment;
}
