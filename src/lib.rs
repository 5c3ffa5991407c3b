/*!
 * Custodian Security Core
 *
 * This crate implements the data-protection core for a local,
 * single-user application: encryption of records at rest, a
 * tamper-evident audit trail, guarded passphrase attempts and safe
 * passphrase rotation.
 *
 * The building blocks are:
 *
 * - PBKDF2-HMAC-SHA256 for passphrase-based key derivation
 * - AES-256-GCM for authenticated encryption of records
 * - A hash-chained append-only ledger for audit events
 *
 * Most applications should hold a [`Vault`], which ties the pieces
 * together over a single on-disk directory; the individual modules are
 * public for callers that need finer control.
 */

/// Passphrase-based key derivation
pub mod kdf;

/// Authenticated encryption of records
pub mod cipher;

/// Tamper-evident audit ledger
pub mod ledger;

/// Rate limiting and lockout for passphrase attempts
pub mod guard;

/// Passphrase strength scoring
pub mod passphrase;

/// Resumable passphrase rotation
pub mod rotation;

/// Durable record storage
pub mod store;

/// Common error types for the security core
pub mod error;

/// Utilities shared across the crate
pub mod utils;

mod vault;

// Re-export main types for convenience
pub use cipher::EncryptedRecord;
pub use error::{SecurityError, SecurityResult};
pub use guard::AttemptGuard;
pub use guard::Decision;
pub use guard::Subject;
pub use kdf::DerivedKey;
pub use ledger::AuditEvent;
pub use ledger::AuditLedger;
pub use ledger::Severity;
pub use rotation::RotationCoordinator;
pub use rotation::RotationResult;
pub use rotation::RotationStatus;
pub use store::DirStore;
pub use store::RecordStore;
pub use vault::Vault;

/// Provides a simplified interface to the most commonly used operations.
///
/// This aims to make the library easier to use with reasonable defaults.
pub mod prelude {
    pub use crate::cipher::decrypt_entry;
    pub use crate::cipher::encrypt_entry;
    pub use crate::cipher::EncryptedRecord;
    pub use crate::guard::Decision;
    pub use crate::guard::Subject;
    pub use crate::kdf::derive_key;
    pub use crate::kdf::generate_salt;
    pub use crate::kdf::DerivedKey;
    pub use crate::kdf::PBKDF2_ITERATIONS;
    pub use crate::ledger::AuditEvent;
    pub use crate::ledger::AuditLedger;
    pub use crate::ledger::Severity;
    pub use crate::passphrase::evaluate;
    pub use crate::passphrase::is_acceptable;
    pub use crate::rotation::RotationResult;
    pub use crate::rotation::RotationStatus;
    pub use crate::utils::CancelFlag;
    pub use crate::SecurityError;
    pub use crate::SecurityResult;
    pub use crate::Vault;
}
