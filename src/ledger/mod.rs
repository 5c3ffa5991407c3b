/*!
 * Audit Ledger
 *
 * Append-only, hash-chained, optionally-encrypted event log. Every append
 * is flushed and synced before it returns; appends serialize behind a
 * single tail lock because chain-hash computation is strictly sequential.
 *
 * The chain covers ciphertext when a payload is encrypted, so tampering
 * with either the chain or the ciphertext is detectable without
 * decryption.
 */

mod ledger;
mod sanitize;


pub use ledger::AuditEvent;
pub use ledger::AuditLedger;
pub use ledger::LedgerEntry;
pub use ledger::LedgerPayload;
pub use ledger::LedgerReport;
pub use ledger::Severity;
pub use ledger::GENESIS_CHAIN_HASH;
pub use sanitize::sanitize_value;
