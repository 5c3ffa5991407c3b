//! Utilities shared across the security core: secure randomness,
//! constant-time comparison, atomic file writes and cancellation
//! signalling.

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{SecurityError, SecurityResult};

/// Write a file atomically: temp file, flush, fsync, rename.
///
/// A crash mid-write leaves either the old contents or the new, never a
/// torn mix.
pub fn write_atomic(path: &Path, data: &[u8]) -> SecurityResult<()> {
    let tmp = path.with_extension("tmp");
    let mut file = std::fs::File::create(&tmp)?;
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Generate random bytes of the specified length
pub fn random_bytes(length: usize) -> SecurityResult<Vec<u8>> {
    let mut bytes = vec![0u8; length];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| SecurityError::RandomGeneration(e.to_string()))?;
    Ok(bytes)
}

/// Constant-time comparison of two byte slices to avoid timing attacks
///
/// Compares in constant time so that the comparison duration leaks nothing
/// about how many leading bytes matched.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Securely zero out sensitive data from memory
///
/// Uses the zeroize crate so the write is not optimized away.
pub fn secure_zero(data: &mut [u8]) {
    data.zeroize();
}

/// Cooperative cancellation signal honored by key derivation and rotation.
///
/// Cloning shares the underlying flag. Cancellation is checked at operation
/// boundaries only; a rotation observed mid-record always finishes that
/// record's atomic swap before parking.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the operations holding this flag
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if cancellation was requested
    pub fn check(&self) -> SecurityResult<()> {
        if self.is_cancelled() {
            Err(SecurityError::Cancelled)
        } else {
            Ok(())
        }
    }
}
