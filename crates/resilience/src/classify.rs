//! Failure classification.
//!
//! In-process failures carry typed [`OrchestrateError`] variants and are
//! classified by downcast. Substring matching exists only for the opaque
//! boundary - agent subprocess stderr and raw HTTP error text - where no
//! structured signal survives the crossing.

use armada_core::OrchestrateError;

/// The classes every failure maps onto, and the retry decision each one
/// implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Input was wrong; retrying cannot help
    Validation,
    /// Upstream throttling; back off and retry
    RateLimit,
    /// Plan or credit limit; needs out-of-band action
    QuotaExceeded,
    /// Deadline exceeded; often transient
    Timeout,
    /// Connection-level fault; often transient
    Network,
    /// Process death; often transient
    Crash,
    /// Unrecognized; retryable, failing open toward recovery
    Unknown,
}

impl ErrorClass {
    /// Whether the boundary may attempt the operation again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorClass::RateLimit
                | ErrorClass::Timeout
                | ErrorClass::Network
                | ErrorClass::Crash
                | ErrorClass::Unknown
        )
    }

    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Validation => "validation",
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::QuotaExceeded => "quota_exceeded",
            ErrorClass::Timeout => "timeout",
            ErrorClass::Network => "network",
            ErrorClass::Crash => "crash",
            ErrorClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify any failure into exactly one [`ErrorClass`].
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    if let Some(e) = error.downcast_ref::<OrchestrateError>() {
        return match e {
            OrchestrateError::Validation(_) => ErrorClass::Validation,
            OrchestrateError::RateLimit(_) => ErrorClass::RateLimit,
            OrchestrateError::QuotaExceeded(_) => ErrorClass::QuotaExceeded,
            OrchestrateError::Timeout(_) => ErrorClass::Timeout,
            OrchestrateError::Network(_) => ErrorClass::Network,
            OrchestrateError::Crash(_) => ErrorClass::Crash,
            // Engine-level stop conditions; never retried.
            OrchestrateError::BudgetExceeded { .. } => ErrorClass::QuotaExceeded,
            OrchestrateError::DependencyCycle(_) => ErrorClass::Validation,
            OrchestrateError::CircuitOpen { .. } => ErrorClass::Validation,
            OrchestrateError::Unknown(_) => ErrorClass::Unknown,
        };
    }
    classify_text(&error.to_string())
}

/// Case-insensitive substring classification for opaque error text,
/// checked in priority order.
pub fn classify_text(text: &str) -> ErrorClass {
    let lower = text.to_lowercase();
    let any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if any(&["validation", "invalid", "malformed", "bad request"]) {
        ErrorClass::Validation
    } else if any(&["rate limit", "rate_limit", "429", "too many requests", "throttl"]) {
        ErrorClass::RateLimit
    } else if any(&["quota", "credit balance", "billing"]) {
        ErrorClass::QuotaExceeded
    } else if any(&["timeout", "timed out", "etimedout", "deadline"]) {
        ErrorClass::Timeout
    } else if any(&["network", "econnrefused", "econnreset", "enotfound", "connection", "socket", "dns"]) {
        ErrorClass::Network
    } else if any(&["crash", "killed", "sigkill", "sigsegv", "panicked", "exit code", "exited with code"]) {
        ErrorClass::Crash
    } else {
        ErrorClass::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_classify_by_variant() {
        let err = anyhow::Error::new(OrchestrateError::RateLimit("slow down".into()));
        assert_eq!(classify(&err), ErrorClass::RateLimit);

        let err = anyhow::Error::new(OrchestrateError::Validation("bad".into()));
        assert_eq!(classify(&err), ErrorClass::Validation);

        let err = anyhow::Error::new(OrchestrateError::Crash("exit 137".into()));
        assert_eq!(classify(&err), ErrorClass::Crash);
    }

    #[test]
    fn opaque_text_classifies_by_substring() {
        assert_eq!(classify_text("HTTP 429 Too Many Requests"), ErrorClass::RateLimit);
        assert_eq!(classify_text("ETIMEDOUT after 300s"), ErrorClass::Timeout);
        assert_eq!(classify_text("ECONNREFUSED 127.0.0.1"), ErrorClass::Network);
        assert_eq!(classify_text("process killed by signal"), ErrorClass::Crash);
        assert_eq!(classify_text("monthly quota exhausted"), ErrorClass::QuotaExceeded);
        assert_eq!(classify_text("invalid prompt"), ErrorClass::Validation);
        assert_eq!(classify_text("something odd happened"), ErrorClass::Unknown);
    }

    #[test]
    fn priority_order_breaks_ties() {
        // Mentions both throttling and a connection; rate limit is checked
        // first.
        assert_eq!(
            classify_text("rate limit hit, connection closed"),
            ErrorClass::RateLimit
        );
        // Validation outranks everything.
        assert_eq!(
            classify_text("invalid request caused a timeout"),
            ErrorClass::Validation
        );
    }

    #[test]
    fn unknown_fails_open_toward_retry() {
        assert!(ErrorClass::Unknown.is_retryable());
        assert!(!ErrorClass::Validation.is_retryable());
        assert!(!ErrorClass::QuotaExceeded.is_retryable());
    }
}
