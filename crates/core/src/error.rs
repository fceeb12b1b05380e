//! Error taxonomy shared across the workspace.

/// Result alias over [`OrchestrateError`].
pub type Result<T> = std::result::Result<T, OrchestrateError>;

/// Errors raised by the orchestration engine and its collaborators.
///
/// The retry layer keys its decisions off these variants: validation,
/// quota, and budget failures are never retried; rate limits, timeouts,
/// network faults, and crashes are.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrateError {
    /// Input was malformed; retrying cannot help
    #[error("validation error: {0}")]
    Validation(String),

    /// The run would exceed its dollar ceiling
    #[error("budget exceeded: spent ${spent:.2} of ${ceiling:.2}, over by ${overage:.2}")]
    BudgetExceeded {
        /// Cumulative spend so far
        spent: f64,
        /// The configured ceiling
        ceiling: f64,
        /// How far past the ceiling the request would land
        overage: f64,
        /// The task whose admission was refused, if any
        task: Option<u64>,
    },

    /// Upstream throttling
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Connection-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Agent subprocess died
    #[error("agent crashed: {0}")]
    Crash(String),

    /// Plan or credit limit on the provider side
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The dependency graph cannot be serialized
    #[error("dependency cycle involving tasks {0:?}")]
    DependencyCycle(Vec<u64>),

    /// A circuit breaker refused the call
    #[error("circuit open for {operation}")]
    CircuitOpen {
        /// Label of the guarded operation
        operation: String,
    },

    /// Unrecognized failure; retryable by default
    #[error("{0}")]
    Unknown(String),
}

impl OrchestrateError {
    /// Whether the retry layer may attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestrateError::RateLimit(_)
                | OrchestrateError::Network(_)
                | OrchestrateError::Timeout(_)
                | OrchestrateError::Crash(_)
                | OrchestrateError::Unknown(_)
        )
    }
}
