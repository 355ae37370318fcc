//! Audit failure types and retryability classification.

use std::time::Duration;
use thiserror::Error;

/// Why a single audit attempt produced no scores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// The audit process could not be started
    #[error("Failed to launch audit process: {0}")]
    Launch(String),

    /// The audit did not finish before its deadline
    #[error("Audit timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The audit process exited unsuccessfully or reported an error
    #[error("Audit process failed: {0}")]
    Process(String),

    /// The audit finished but its output is unusable
    #[error("Malformed audit report: {0}")]
    Malformed(String),

    /// The target cannot be turned into an auditable URL
    #[error("Invalid target: {0}")]
    InvalidTarget(String),
}

/// How a failure should be handled by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeouts, protocol errors and other transient hiccups
    Transient,
    /// Browser target, session or process went away; needs time to release resources
    SessionClosed,
    /// Connection refused, DNS and other network failures
    Network,
    /// Not worth retrying
    Terminal,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorClass::Terminal)
    }
}

const SESSION_CLOSED_MARKERS: &[&str] = &[
    "target closed",
    "session closed",
    "browser closed",
    "browser has disconnected",
    "process exited",
    "process crashed",
    "websocket is not open",
];

const NETWORK_MARKERS: &[&str] = &[
    "econnrefused",
    "connection refused",
    "econnreset",
    "connection reset",
    "enotfound",
    "eai_again",
    "err_name_not_resolved",
    "dns_probe",
    "err_network_changed",
    "net::err_",
    "network error",
    "network is unreachable",
    "socket hang up",
];

const TRANSIENT_MARKERS: &[&str] = &["timeout", "timed out", "protocol error", "no response"];

/// Match an error message against the retryable vocabulary.
///
/// Session markers are checked first: "Protocol error: Target closed" is a
/// closed session, not a generic protocol error.
pub fn classify_message(message: &str) -> Option<ErrorClass> {
    let lower = message.to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if has(SESSION_CLOSED_MARKERS) {
        Some(ErrorClass::SessionClosed)
    } else if has(NETWORK_MARKERS) {
        Some(ErrorClass::Network)
    } else if has(TRANSIENT_MARKERS) {
        Some(ErrorClass::Transient)
    } else {
        None
    }
}

/// Classify an audit failure.
pub fn classify(error: &AuditError) -> ErrorClass {
    match error {
        AuditError::Timeout(_) => ErrorClass::Transient,
        // A failed launch is always worth another try
        AuditError::Launch(msg) => classify_message(msg).unwrap_or(ErrorClass::Transient),
        AuditError::Process(msg) => classify_message(msg).unwrap_or(ErrorClass::Terminal),
        AuditError::Malformed(_) | AuditError::InvalidTarget(_) => ErrorClass::Terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = AuditError::Timeout(Duration::from_secs(60));
        assert_eq!(err.to_string(), "Audit timed out after 60000ms");
    }

    #[test]
    fn test_classify_message_session_closed() {
        assert_eq!(classify_message("Target closed"), Some(ErrorClass::SessionClosed));
        assert_eq!(
            classify_message("Protocol error (Page.navigate): Target closed."),
            Some(ErrorClass::SessionClosed)
        );
        assert_eq!(classify_message("Browser has disconnected!"), Some(ErrorClass::SessionClosed));
    }

    #[test]
    fn test_classify_message_network() {
        assert_eq!(
            classify_message("connect ECONNREFUSED 127.0.0.1:9222"),
            Some(ErrorClass::Network)
        );
        assert_eq!(classify_message("net::ERR_NAME_NOT_RESOLVED"), Some(ErrorClass::Network));
        assert_eq!(classify_message("getaddrinfo ENOTFOUND a.gov"), Some(ErrorClass::Network));
        assert_eq!(classify_message("DNS_PROBE_FINISHED_NXDOMAIN"), Some(ErrorClass::Network));
        assert_eq!(classify_message("fetch failed: Network error"), Some(ErrorClass::Network));
    }

    #[test]
    fn test_classify_message_ignores_incidental_words() {
        assert_eq!(classify_message("Invalid --throttling network preset"), None);
        assert_eq!(classify_message("unknown flag --skip-dns-prefetch"), None);
    }

    #[test]
    fn test_classify_crash() {
        assert_eq!(
            classify(&AuditError::Process("process crashed (SIGKILL)".into())),
            ErrorClass::SessionClosed
        );
    }

    #[test]
    fn test_classify_message_transient() {
        assert_eq!(classify_message("Protocol error: bad frame"), Some(ErrorClass::Transient));
        assert_eq!(classify_message("Navigation timeout of 30000 ms exceeded"), Some(ErrorClass::Transient));
    }

    #[test]
    fn test_classify_message_unknown() {
        assert_eq!(classify_message("Required TTI gatherer did not run"), None);
    }

    #[test]
    fn test_classify_errors() {
        assert_eq!(classify(&AuditError::Timeout(Duration::from_secs(1))), ErrorClass::Transient);
        assert_eq!(classify(&AuditError::Launch("permission denied".into())), ErrorClass::Transient);
        assert_eq!(classify(&AuditError::Process("exit 1: Target closed".into())), ErrorClass::SessionClosed);
        assert_eq!(classify(&AuditError::Process("exit 1: unknown flag".into())), ErrorClass::Terminal);
        assert_eq!(classify(&AuditError::Malformed("dns".into())), ErrorClass::Terminal);
        assert_eq!(classify(&AuditError::InvalidTarget("".into())), ErrorClass::Terminal);
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorClass::Transient.is_retryable());
        assert!(ErrorClass::SessionClosed.is_retryable());
        assert!(ErrorClass::Network.is_retryable());
        assert!(!ErrorClass::Terminal.is_retryable());
    }
}
