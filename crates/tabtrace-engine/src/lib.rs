//! # tabtrace-engine
//!
//! Tab-scoped network observation and correlation. The
//! [`ObservationService`] owns one registry of listening tabs, one
//! generation-scoped fact cache and one durable mirror, and is handed to
//! whatever drives it (the WebSocket server, or tests with mock hosts).

pub mod assembler;
pub mod badge;
pub mod cache;
pub mod capture;
pub mod collector;
pub mod error;
pub mod mirror;
pub mod mock;
pub mod reaper;
pub mod registry;
pub mod service;
pub mod url_filter;

pub use assembler::assemble;
pub use badge::{format_badge_text, BadgeStyle};
pub use cache::{CacheStats, CorrelationCache, RecordOutcome, TabPhase};
pub use capture::{CaptureOutcome, EventCapture};
pub use collector::SnapshotCollector;
pub use error::EngineError;
pub use mirror::StoreMirror;
pub use reaper::{Eviction, LifecycleReaper};
pub use registry::{ObservationSession, StartOutcome, TabObservationRegistry};
pub use service::{ObservationService, ServiceConfig, ServiceStats, Submission};
pub use url_filter::should_monitor;
