use thiserror::Error;

/// Unified error type for the entire portfolio-sync-core library.
/// Every public function returns `Result<T, CoreError>`.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Storage / Snapshot ──────────────────────────────────────────
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u16),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("File I/O error: {0}")]
    FileIO(String),

    #[error("Portfolio for user {user_id} was modified concurrently (expected version {expected}, found {found})")]
    PortfolioConflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    // ── Credentials ─────────────────────────────────────────────────
    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Authentication rejected by {provider}: {message}")]
    Auth {
        provider: String,
        message: String,
    },

    // ── API / Network ───────────────────────────────────────────────
    #[error("API error ({provider}): {message}")]
    Api {
        provider: String,
        message: String,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {seconds}s: {operation}")]
    Timeout {
        operation: String,
        seconds: u64,
    },

    // ── Business Logic ──────────────────────────────────────────────
    #[error("Validation failed: {0}")]
    ValidationError(String),

    #[error("Unsupported {kind} provider: {provider}")]
    UnsupportedProvider {
        kind: String,
        provider: String,
    },

    #[error("Integration already connected: {0}")]
    DuplicateIntegration(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Integration not found: {0}")]
    IntegrationNotFound(String),
}

impl CoreError {
    /// Whether retrying the same call later could plausibly succeed.
    ///
    /// Rejected credentials and bad input are permanent; transport failures,
    /// timeouts and upstream API hiccups are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Network(_)
                | CoreError::Timeout { .. }
                | CoreError::Api { .. }
                | CoreError::PortfolioConflict { .. }
        )
    }
}

// ── Conversion helpers (From impls) ─────────────────────────────────

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::FileIO(e.to_string())
    }
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        // reqwest errors carry the full URL; explorer and exchange URLs hold
        // API keys and signatures in the query string.
        let msg = e.to_string();
        let sanitized = if let Some(idx) = msg.find('?') {
            format!("{}?<query redacted>", &msg[..idx])
        } else {
            msg
        };
        CoreError::Network(sanitized)
    }
}
