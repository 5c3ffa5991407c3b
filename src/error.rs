/*!
 * Error Handling for the Custodian Security Core
 *
 * Provides the typed error taxonomy shared by every component: cipher,
 * audit ledger, attempt guard and rotation coordinator. Errors are always
 * surfaced to the caller as values, never swallowed.
 */

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Comprehensive error type for all security-core operations
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Authentication tag or chain hash did not validate.
    ///
    /// Wrong passphrase and corrupted data are deliberately reported as the
    /// same error so that decryption cannot be used as an oracle.
    #[error("integrity check failed: {context}")]
    Integrity { context: String },

    /// Structurally invalid record: missing or short fields, unknown format
    /// version, undecodable encoding.
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    /// The old passphrase failed the rotation precondition check. Raised
    /// only there, where fast-failing before mutating anything is safe.
    #[error("old passphrase does not decrypt the first record")]
    WrongPassphrase,

    /// Rotation halted; names the first failing record and the step that
    /// failed. Already-migrated data is never corrupted.
    #[error("rotation failed at record '{record}' during {step}: {cause}")]
    Rotation {
        record: String,
        step: String,
        cause: String,
    },

    /// A rotation is in progress and holds the record store exclusively.
    #[error("key rotation in progress; record access is locked")]
    RotationInProgress,

    /// Short-window rate limit hit; retryable after the stated delay.
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Long-window lockout; persists across restarts until the timer lapses
    /// or an operator override clears it.
    #[error("locked out until {until}")]
    LockedOut { until: DateTime<Utc> },

    /// The audit ledger file existed previously but is now gone. This is a
    /// security incident requiring explicit operator acknowledgment, never
    /// auto-repaired.
    #[error("audit ledger file is missing: {path}")]
    LedgerMissing { path: String },

    #[error("invalid parameter: {parameter} - expected {expected}, got {actual}")]
    InvalidParameter {
        parameter: String,
        expected: String,
        actual: String,
    },

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("random number generation failed: {0}")]
    RandomGeneration(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Error code constants for different error categories
pub mod error_codes {
    // Key derivation errors: 1000-1999
    pub const KDF_INVALID_SALT: u32 = 1001;
    pub const KDF_ITERATIONS_BELOW_FLOOR: u32 = 1002;
    pub const KDF_EMPTY_PASSPHRASE: u32 = 1003;

    // Cipher errors: 2000-2999
    pub const CIPHER_ENCRYPTION_FAILED: u32 = 2001;
    pub const CIPHER_AUTHENTICATION_FAILED: u32 = 2002;
    pub const CIPHER_MALFORMED_RECORD: u32 = 2003;
    pub const CIPHER_UNKNOWN_VERSION: u32 = 2004;

    // Ledger errors: 3000-3999
    pub const LEDGER_CHAIN_BROKEN: u32 = 3001;
    pub const LEDGER_TORN_TAIL: u32 = 3002;
    pub const LEDGER_FILE_MISSING: u32 = 3003;

    // Attempt guard errors: 4000-4999
    pub const GUARD_RATE_LIMITED: u32 = 4001;
    pub const GUARD_LOCKED_OUT: u32 = 4002;

    // Rotation errors: 5000-5999
    pub const ROTATION_WRONG_PASSPHRASE: u32 = 5001;
    pub const ROTATION_RECORD_FAILED: u32 = 5002;
    pub const ROTATION_IN_PROGRESS: u32 = 5003;
    pub const ROTATION_NOT_ACKNOWLEDGED: u32 = 5004;
}

impl SecurityError {
    /// Get the numeric error code for this error
    pub fn error_code(&self) -> u32 {
        match self {
            SecurityError::Integrity { .. } => error_codes::CIPHER_AUTHENTICATION_FAILED,
            SecurityError::MalformedRecord { .. } => error_codes::CIPHER_MALFORMED_RECORD,
            SecurityError::WrongPassphrase => error_codes::ROTATION_WRONG_PASSPHRASE,
            SecurityError::Rotation { .. } => error_codes::ROTATION_RECORD_FAILED,
            SecurityError::RotationInProgress => error_codes::ROTATION_IN_PROGRESS,
            SecurityError::RateLimited { .. } => error_codes::GUARD_RATE_LIMITED,
            SecurityError::LockedOut { .. } => error_codes::GUARD_LOCKED_OUT,
            SecurityError::LedgerMissing { .. } => error_codes::LEDGER_FILE_MISSING,
            SecurityError::InvalidParameter { .. } => 9001,
            SecurityError::KeyDerivation(_) => 9002,
            SecurityError::Encryption(_) => error_codes::CIPHER_ENCRYPTION_FAILED,
            SecurityError::RandomGeneration(_) => 9003,
            SecurityError::Cancelled => 9004,
            SecurityError::Serialization(_) => 9005,
            SecurityError::Io(_) => 9006,
        }
    }

    /// Whether the caller may retry the operation after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SecurityError::RateLimited { .. }
                | SecurityError::LockedOut { .. }
                | SecurityError::RotationInProgress
        )
    }
}

/// Convenience constructors for common error types
impl SecurityError {
    pub fn integrity(context: impl Into<String>) -> Self {
        SecurityError::Integrity {
            context: context.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        SecurityError::MalformedRecord {
            reason: reason.into(),
        }
    }

    pub fn rotation(
        record: impl Into<String>,
        step: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        SecurityError::Rotation {
            record: record.into(),
            step: step.into(),
            cause: cause.into(),
        }
    }

    pub fn invalid_parameter(parameter: &str, expected: &str, actual: &str) -> Self {
        SecurityError::InvalidParameter {
            parameter: parameter.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl From<std::io::Error> for SecurityError {
    fn from(err: std::io::Error) -> Self {
        SecurityError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SecurityError {
    fn from(err: serde_json::Error) -> Self {
        SecurityError::Serialization(err.to_string())
    }
}

/// Result type alias for security-core operations
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = SecurityError::integrity("tag mismatch");
        assert_eq!(err.error_code(), error_codes::CIPHER_AUTHENTICATION_FAILED);

        let err = SecurityError::WrongPassphrase;
        assert_eq!(err.error_code(), error_codes::ROTATION_WRONG_PASSPHRASE);
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SecurityError::RateLimited {
            retry_after_secs: 4
        }
        .is_retryable());
        assert!(SecurityError::RotationInProgress.is_retryable());
        assert!(!SecurityError::integrity("x").is_retryable());
    }

    #[test]
    fn test_integrity_message_does_not_distinguish_cause() {
        // Wrong key and tampered data must render identically.
        let a = SecurityError::integrity("record authentication failed");
        let b = SecurityError::integrity("record authentication failed");
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SecurityError = io.into();
        assert!(matches!(err, SecurityError::Io(_)));
    }
}
