/// Failures reported by the host browser's APIs (event subscription,
/// badge updates).
#[derive(Clone, Debug, thiserror::Error)]
pub enum HostError {
    /// The host API could not be reached at all (no bridge connected,
    /// channel closed).
    #[error("host unavailable: {0}")]
    Unavailable(String),

    /// The host was reached but refused the call.
    #[error("host rejected request: {0}")]
    Rejected(String),
}

impl HostError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "host_unavailable",
            Self::Rejected(_) => "host_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = HostError::Unavailable("no bridge client".into());
        assert_eq!(err.to_string(), "host unavailable: no bridge client");
        assert_eq!(err.error_kind(), "host_unavailable");
    }

    #[test]
    fn rejected_kind() {
        assert_eq!(HostError::Rejected("bad filter".into()).error_kind(), "host_rejected");
    }
}
