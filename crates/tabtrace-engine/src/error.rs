use tabtrace_core::HostError;
use tabtrace_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("host error: {0}")]
    Host(#[from] HostError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The page has not finished loading; poll again later.
    #[error("timing snapshot not ready (duration {duration})")]
    SnapshotNotReady { duration: f64 },

    #[error("timing snapshot still not ready after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("durable store unavailable")]
    StoreUnavailable,

    #[error("{0}")]
    Internal(String),
}

impl EngineError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            EngineError::Host(e) => e.error_kind(),
            EngineError::Store(_) => "store",
            EngineError::SnapshotNotReady { .. } => "not_ready",
            EngineError::RetriesExhausted { .. } => "retries_exhausted",
            EngineError::StoreUnavailable => "store_unavailable",
            EngineError::Internal(_) => "internal",
        }
    }

    /// Whether the caller should retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SnapshotNotReady { .. })
    }
}
