//! The error taxonomy from `spec.md` §7, expressed as kinds rather than
//! exception types. Each variant maps onto exactly one `status.reason`
//! token (`crate::crd::reason`) and one terminal/transient classification.

use std::fmt;

use crate::crd::reason;

/// Kind-based error taxonomy. Deliberately not a `thiserror` derive: the
/// operator's existing error sites use hand-written `Display` impls, so
/// this follows suit.
#[derive(Debug, Clone)]
pub enum LoadTestError {
    /// Malformed or incomplete LoadTest. Terminal `Errored`; never retried.
    BadSpec(String),
    /// Observed pod set smaller than required. Transient; `Initializing`.
    PodsMissing { have: usize, want: usize },
    /// An init container terminated non-zero or crashed. Terminal `Errored`.
    InitContainerError { pod: String, container: String, message: String },
    /// A main container terminated non-zero. Terminal `Failed`/`Errored`.
    ContainerError { pod: String, container: String, message: String },
    /// Transient control-plane error; retried locally with bounded attempts.
    ApiTransient(String),
    /// `timeoutSeconds` exceeded since start. Terminal `Errored`.
    Timeout { elapsed_seconds: u64, limit_seconds: u32 },
}

impl LoadTestError {
    pub fn bad_spec(message: impl Into<String>) -> Self {
        LoadTestError::BadSpec(message.into())
    }

    /// The `status.reason` token this error is surfaced under.
    pub fn reason(&self) -> &'static str {
        match self {
            LoadTestError::BadSpec(_) => reason::BAD_SPEC,
            LoadTestError::PodsMissing { .. } => reason::PODS_MISSING,
            LoadTestError::InitContainerError { .. } => reason::INIT_CONTAINER_ERROR,
            LoadTestError::ContainerError { .. } => reason::CONTAINER_ERROR,
            LoadTestError::ApiTransient(_) => reason::API_TRANSIENT,
            LoadTestError::Timeout { .. } => reason::TIMEOUT,
        }
    }

    /// Whether this error, once surfaced, represents a terminal state
    /// (no amount of retrying will resolve it without a spec or pod
    /// change) as opposed to a transient condition the reconciler should
    /// requeue for.
    pub fn is_terminal(&self) -> bool {
        match self {
            LoadTestError::BadSpec(_)
            | LoadTestError::InitContainerError { .. }
            | LoadTestError::ContainerError { .. }
            | LoadTestError::Timeout { .. } => true,
            LoadTestError::PodsMissing { .. } | LoadTestError::ApiTransient(_) => false,
        }
    }
}

impl fmt::Display for LoadTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadTestError::BadSpec(message) => write!(f, "bad spec: {message}"),
            LoadTestError::PodsMissing { have, want } => {
                write!(f, "pods missing: have {have}, want {want}")
            }
            LoadTestError::InitContainerError { pod, container, message } => {
                write!(f, "init container `{container}` of pod `{pod}` failed: {message}")
            }
            LoadTestError::ContainerError { pod, container, message } => {
                write!(f, "container `{container}` of pod `{pod}` failed: {message}")
            }
            LoadTestError::ApiTransient(message) => write!(f, "transient API error: {message}"),
            LoadTestError::Timeout { elapsed_seconds, limit_seconds } => {
                write!(f, "timeout: {elapsed_seconds}s elapsed, limit {limit_seconds}s")
            }
        }
    }
}

impl std::error::Error for LoadTestError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_spec_is_terminal() {
        assert!(LoadTestError::bad_spec("missing run").is_terminal());
    }

    #[test]
    fn test_pods_missing_is_not_terminal() {
        let err = LoadTestError::PodsMissing { have: 1, want: 3 };
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_reason_tokens_match_taxonomy() {
        assert_eq!(LoadTestError::bad_spec("x").reason(), reason::BAD_SPEC);
        assert_eq!(
            LoadTestError::PodsMissing { have: 0, want: 1 }.reason(),
            reason::PODS_MISSING
        );
        assert_eq!(
            LoadTestError::Timeout { elapsed_seconds: 10, limit_seconds: 5 }.reason(),
            reason::TIMEOUT
        );
    }

    #[test]
    fn test_display_is_human_readable() {
        let err = LoadTestError::bad_spec("missing run");
        assert_eq!(err.to_string(), "bad spec: missing run");
    }
}
