//! Injectable facade over the registry, cache, durable mirror and reaper.
//!
//! Memory is the source of truth: reads consult the cache first and only
//! fall back to the durable mirror when the cache holds nothing for the
//! tab (e.g. after a restart).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use tabtrace_core::host::{
    BadgeSink, NavigationStart, NetworkCompletion, NetworkEventSource, POPUP_PAGE,
};
use tabtrace_core::{now_millis, NavigationTiming, TabId, TimingRecord};
use tabtrace_settings::TabtraceSettings;
use tabtrace_store::StoreStats;

use crate::assembler;
use crate::badge::{format_badge_text, BadgeStyle};
use crate::cache::{CacheStats, CorrelationCache, TabPhase};
use crate::capture::{CaptureOutcome, EventCapture};
use crate::collector::SnapshotCollector;
use crate::error::EngineError;
use crate::mirror::StoreMirror;
use crate::reaper::{Eviction, LifecycleReaper};
use crate::registry::{StartOutcome, TabObservationRegistry};
use crate::url_filter::should_monitor;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub max_urls_per_tab: usize,
    pub ignored_schemes: Vec<String>,
    pub expiry: Duration,
    pub badge_style: BadgeStyle,
    pub collector: SnapshotCollector,
}

impl ServiceConfig {
    pub fn from_settings(settings: &TabtraceSettings) -> Self {
        Self {
            max_urls_per_tab: settings.capture.max_urls_per_tab,
            ignored_schemes: settings.capture.ignored_schemes.clone(),
            expiry: Duration::from_secs(settings.storage.expiry_secs),
            badge_style: BadgeStyle::from_compact(settings.collect.compact_badge),
            collector: SnapshotCollector::from_settings(&settings.collect),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_settings(&TabtraceSettings::default())
    }
}

/// Result of a successful server-side assembly.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub time: String,
    pub record: TimingRecord,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub active_sessions: usize,
    pub cache: CacheStats,
    pub store: StoreStats,
}

pub struct ObservationService {
    config: ServiceConfig,
    registry: Arc<TabObservationRegistry>,
    cache: Arc<CorrelationCache>,
    mirror: Arc<StoreMirror>,
    capture: EventCapture,
    reaper: Arc<LifecycleReaper>,
    badge: Arc<dyn BadgeSink>,
}

impl ObservationService {
    pub fn new(
        config: ServiceConfig,
        source: Arc<dyn NetworkEventSource>,
        badge: Arc<dyn BadgeSink>,
        mirror: StoreMirror,
    ) -> Self {
        let registry = Arc::new(TabObservationRegistry::new(source));
        let cache = Arc::new(CorrelationCache::new(config.max_urls_per_tab));
        let mirror = Arc::new(mirror);
        let capture = EventCapture::new(registry.clone(), cache.clone(), mirror.clone());
        let reaper = Arc::new(LifecycleReaper::new(
            registry.clone(),
            cache.clone(),
            mirror.clone(),
            config.expiry,
        ));
        Self {
            config,
            registry,
            cache,
            mirror,
            capture,
            reaper,
            badge,
        }
    }

    pub fn reaper(&self) -> Arc<LifecycleReaper> {
        self.reaper.clone()
    }

    pub fn mirror(&self) -> &StoreMirror {
        &self.mirror
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // ── Host events ─────────────────────────────────────────────────────

    /// Top-level navigation: clear the tab's facts, then subscribe. Returns
    /// whether the navigation is being observed.
    #[instrument(skip(self, event), fields(tab_id = %event.tab_id))]
    pub fn on_before_navigate(&self, event: &NavigationStart) -> Result<bool, EngineError> {
        if !event.frame_id.is_top_level() {
            return Ok(false);
        }
        if event.tab_id.is_none() || !should_monitor(&event.url, &self.config.ignored_schemes) {
            debug!(url = %event.url, "navigation not monitored");
            return Ok(false);
        }

        info!(url = %event.url, "navigation started");
        self.cache.begin_generation(event.tab_id);
        self.mirror.clear_facts(event.tab_id);
        self.registry.start(event.tab_id)?;
        Ok(true)
    }

    pub fn on_network_completed(&self, event: &NetworkCompletion) -> CaptureOutcome {
        self.capture.handle(event)
    }

    pub async fn on_tab_removed(&self, tab_id: TabId) -> Eviction {
        self.reaper.on_tab_closed(tab_id).await
    }

    // ── Consumer surface ────────────────────────────────────────────────

    /// Explicit start from the page. Opens a generation only when the tab
    /// has none, so facts captured since navigation are kept.
    pub fn start_listening(&self, tab_id: TabId) -> Result<StartOutcome, EngineError> {
        if !self.cache.has_generation(tab_id) {
            self.cache.begin_generation(tab_id);
            self.mirror.clear_facts(tab_id);
        }
        Ok(self.registry.start(tab_id)?)
    }

    pub fn stop_listening(&self, tab_id: TabId) -> bool {
        self.registry.stop(tab_id)
    }

    /// Memory first. Durable rows are consulted only for tabs memory knows
    /// nothing about, never for a tab closed since startup.
    pub async fn get_ip_data(&self, tab_id: TabId) -> Result<HashMap<String, String>, EngineError> {
        if let Some(snapshot) = self.cache.snapshot(tab_id) {
            return Ok(snapshot);
        }
        if self.cache.is_evicted(tab_id) {
            return Ok(HashMap::new());
        }
        self.mirror.facts_for_tab(tab_id).await
    }

    pub async fn get_performance_data(&self, tab_id: TabId) -> Result<Option<TimingRecord>, EngineError> {
        if let Some(record) = self.cache.record_for(tab_id) {
            return Ok(Some(record));
        }
        if self.cache.is_evicted(tab_id) {
            return Ok(None);
        }
        self.mirror.get_record(tab_id).await
    }

    /// Keep the finished timing for the tab, mirror it, and show `time` on
    /// the badge. Durable and badge failures are logged, not returned.
    #[instrument(skip(self, timing), fields(duration = timing.duration))]
    pub async fn save_performance_data(
        &self,
        tab_id: TabId,
        time: &str,
        timing: NavigationTiming,
    ) -> Result<TimingRecord, EngineError> {
        let record = TimingRecord {
            tab_id,
            timing,
            timestamp: now_millis(),
        };
        self.cache.store_record(record.clone());

        match self.mirror.put_record(record.clone()).await {
            Ok(()) => match self.mirror.get_record(tab_id).await {
                Ok(Some(_)) => debug!("durable record verified"),
                Ok(None) => error!("durable record missing after save"),
                Err(e) => error!(error = %e, "durable record verification failed"),
            },
            Err(EngineError::StoreUnavailable) => debug!("durable mirror unavailable, record kept in memory"),
            Err(e) => warn!(error = %e, "durable record save failed"),
        }

        if let Err(e) = self.badge.set_badge_text(tab_id, time) {
            warn!(error = %e, "badge text update failed");
        }
        if let Err(e) = self.badge.set_popup(tab_id, POPUP_PAGE) {
            warn!(error = %e, "popup activation failed");
        }
        info!(time, "performance data saved");
        Ok(record)
    }

    /// Assemble a raw snapshot against the tab's facts, stop observing,
    /// and save. A snapshot whose page has not finished yet is rejected
    /// with a retryable error and leaves observation running.
    pub async fn submit_timing(
        &self,
        tab_id: TabId,
        raw: NavigationTiming,
        style: Option<BadgeStyle>,
    ) -> Result<Submission, EngineError> {
        let ips = self.get_ip_data(tab_id).await?;
        let assembled = assembler::assemble(tab_id, raw, &ips)?;
        self.registry.stop(tab_id);

        let time = format_badge_text(
            assembled.timing.duration,
            style.unwrap_or(self.config.badge_style),
        );
        let record = self
            .save_performance_data(tab_id, &time, assembled.timing)
            .await?;
        Ok(Submission { time, record })
    }

    /// Poll `snapshot` with the configured collector until the page has
    /// finished, then submit it.
    pub async fn collect_and_submit<F, Fut>(
        &self,
        tab_id: TabId,
        style: Option<BadgeStyle>,
        snapshot: F,
    ) -> Result<Submission, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Option<NavigationTiming>>,
    {
        let raw = self.config.collector.collect(snapshot).await?;
        self.submit_timing(tab_id, raw, style).await
    }

    pub fn tab_phase(&self, tab_id: TabId) -> Option<TabPhase> {
        self.cache.phase(tab_id)
    }

    pub async fn stats(&self) -> Result<ServiceStats, EngineError> {
        Ok(ServiceStats {
            active_sessions: self.registry.active_count(),
            cache: self.cache.stats(),
            store: self.mirror.stats().await?,
        })
    }

    /// Remove every listener and let queued durable writes finish.
    pub async fn shutdown(&self) {
        let stopped = self.registry.stop_all();
        self.mirror.flush().await;
        info!(stopped, "observation service shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBadgeSink, MockEventSource};
    use tabtrace_core::{FrameId, ResourceEntry};

    const TAB: TabId = TabId::new(7);

    struct Harness {
        source: Arc<MockEventSource>,
        badge: Arc<MockBadgeSink>,
        service: ObservationService,
    }

    fn harness(mirror: StoreMirror) -> Harness {
        let source = Arc::new(MockEventSource::new());
        let badge = Arc::new(MockBadgeSink::new());
        let service =
            ObservationService::new(ServiceConfig::default(), source.clone(), badge.clone(), mirror);
        Harness {
            source,
            badge,
            service,
        }
    }

    fn navigate(tab: TabId, frame: i64, url: &str) -> NavigationStart {
        NavigationStart {
            tab_id: tab,
            frame_id: FrameId::new(frame),
            url: url.into(),
        }
    }

    fn completion(url: &str, ip: &str) -> NetworkCompletion {
        NetworkCompletion {
            url: url.into(),
            ip: Some(ip.into()),
            tab_id: TAB,
            time_stamp: None,
        }
    }

    #[test]
    fn subframe_and_internal_navigations_are_ignored() {
        let h = harness(StoreMirror::disabled());
        assert!(!h.service.on_before_navigate(&navigate(TAB, 3, "https://a.test/")).unwrap());
        assert!(!h.service.on_before_navigate(&navigate(TAB, 0, "chrome://newtab")).unwrap());
        assert!(h.source.added().is_empty());
        assert!(h.service.tab_phase(TAB).is_none());
    }

    #[tokio::test]
    async fn renavigation_starts_a_clean_generation() {
        let h = harness(StoreMirror::disabled());
        h.service.on_before_navigate(&navigate(TAB, 0, "https://a.test/")).unwrap();
        h.service.on_network_completed(&completion("https://a.test/", "1.1.1.1"));

        h.service.on_before_navigate(&navigate(TAB, 0, "https://b.test/")).unwrap();
        assert!(h.service.get_ip_data(TAB).await.unwrap().is_empty());
        assert_eq!(h.source.added().len(), 1);
        assert_eq!(h.service.tab_phase(TAB), Some(TabPhase::Observing));
    }

    #[tokio::test]
    async fn explicit_start_keeps_existing_generation() {
        let h = harness(StoreMirror::disabled());
        h.service.on_before_navigate(&navigate(TAB, 0, "https://a.test/")).unwrap();
        h.service.on_network_completed(&completion("https://a.test/", "1.1.1.1"));

        assert_eq!(h.service.start_listening(TAB).unwrap(), StartOutcome::AlreadyActive);
        assert_eq!(h.service.get_ip_data(TAB).await.unwrap().len(), 1);
    }

    #[test]
    fn explicit_start_without_navigation_accepts_facts() {
        let h = harness(StoreMirror::disabled());
        h.service.start_listening(TAB).unwrap();
        assert_eq!(
            h.service.on_network_completed(&completion("https://a.test/", "1.1.1.1")),
            CaptureOutcome::Recorded
        );
    }

    #[test]
    fn failed_listener_registration_is_reported() {
        let h = harness(StoreMirror::disabled());
        h.source.fail_next_adds(true);
        let err = h
            .service
            .on_before_navigate(&navigate(TAB, 0, "https://a.test/"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Host(_)));
    }

    #[tokio::test]
    async fn submit_assembles_saves_and_updates_badge() {
        let h = harness(StoreMirror::in_memory());
        h.service.on_before_navigate(&navigate(TAB, 0, "https://a.test/")).unwrap();
        h.service.on_network_completed(&completion("https://a.test/", "1.2.3.4"));
        h.service.on_network_completed(&completion("https://a.test/img.png", "1.2.3.4"));

        let mut raw = NavigationTiming::new("https://a.test/", 120.0);
        raw.resources.push(ResourceEntry::new("https://a.test/img.png"));
        let submission = h.service.submit_timing(TAB, raw, None).await.unwrap();

        assert_eq!(submission.time, "0.12");
        assert_eq!(submission.record.timing.remote_ip_address.as_deref(), Some("1.2.3.4"));
        assert_eq!(h.source.live_count(), 0);
        assert_eq!(h.badge.texts(), vec![(TAB, "0.12".to_string())]);
        assert_eq!(h.badge.popups(), vec![(TAB, POPUP_PAGE.to_string())]);
        assert_eq!(h.service.tab_phase(TAB), Some(TabPhase::Assembled));
        assert!(h.service.mirror().get_record(TAB).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unfinished_snapshot_keeps_observing() {
        let h = harness(StoreMirror::disabled());
        h.service.on_before_navigate(&navigate(TAB, 0, "https://a.test/")).unwrap();
        let raw = NavigationTiming::new("https://a.test/", 0.0);

        let err = h.service.submit_timing(TAB, raw, None).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.source.live_count(), 1);
        assert!(h.badge.texts().is_empty());
    }

    #[tokio::test]
    async fn save_survives_badge_and_store_failures() {
        let h = harness(StoreMirror::disabled());
        h.badge.set_failing(true);
        let timing = NavigationTiming::new("https://a.test/", 50.0);
        h.service.save_performance_data(TAB, "0.05", timing).await.unwrap();
        assert!(h.service.get_performance_data(TAB).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reads_fall_back_to_durable_state() {
        let mirror = StoreMirror::in_memory();
        mirror.put_fact(tabtrace_core::Fact::captured_at(TAB, "https://a.test/", "1.2.3.4", 1));
        mirror
            .put_record(TimingRecord {
                tab_id: TAB,
                timing: NavigationTiming::new("https://a.test/", 80.0),
                timestamp: 1,
            })
            .await
            .unwrap();

        let h = harness(mirror);
        assert_eq!(h.service.get_ip_data(TAB).await.unwrap()["https://a.test/"], "1.2.3.4");
        assert!(h.service.get_performance_data(TAB).await.unwrap().is_some());

        h.service.on_before_navigate(&navigate(TAB, 0, "https://b.test/")).unwrap();
        assert!(h.service.get_ip_data(TAB).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn closed_tab_is_not_read_back_after_failed_durable_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("service.db");
        let h = harness(StoreMirror::open(path.clone()));
        h.service.on_before_navigate(&navigate(TAB, 0, "https://a.test/")).unwrap();
        h.service.on_network_completed(&completion("https://a.test/", "1.2.3.4"));
        h.service.mirror().flush().await;

        let other = tabtrace_store::Database::open(&path).unwrap();
        other
            .with_conn(|conn| Ok(conn.execute_batch("DROP TABLE timing_records")?))
            .unwrap();

        let eviction = h.service.on_tab_removed(TAB).await;
        assert!(eviction.durable.is_none());
        assert_eq!(h.service.mirror().facts_for_tab(TAB).await.unwrap().len(), 1);
        assert!(h.service.get_ip_data(TAB).await.unwrap().is_empty());
        assert!(h.service.get_performance_data(TAB).await.unwrap().is_none());
        assert!(h.service.tab_phase(TAB).is_none());

        h.service.on_before_navigate(&navigate(TAB, 0, "https://b.test/")).unwrap();
        h.service.on_network_completed(&completion("https://b.test/", "5.6.7.8"));
        assert_eq!(h.service.get_ip_data(TAB).await.unwrap()["https://b.test/"], "5.6.7.8");
    }

    #[tokio::test(start_paused = true)]
    async fn collect_and_submit_waits_for_load() {
        let h = harness(StoreMirror::disabled());
        h.service.start_listening(TAB).unwrap();
        let mut polls = 0;
        let submission = h
            .service
            .collect_and_submit(TAB, Some(BadgeStyle::Compact), || {
                polls += 1;
                let duration = if polls < 4 { 0.0 } else { 1_500.0 };
                async move { Some(NavigationTiming::new("https://a.test/", duration)) }
            })
            .await
            .unwrap();
        assert_eq!(submission.time, "1.5");
    }

    #[tokio::test]
    async fn stats_and_shutdown() {
        let h = harness(StoreMirror::in_memory());
        h.service.start_listening(TAB).unwrap();
        h.service.on_network_completed(&completion("https://a.test/", "1.1.1.1"));
        h.service.mirror().flush().await;

        let stats = h.service.stats().await.unwrap();
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.cache.facts, 1);
        assert_eq!(stats.store.ip_fact_count, 1);

        h.service.shutdown().await;
        assert_eq!(h.source.live_count(), 0);
    }
}
