use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{SecurityError, SecurityResult};
use crate::utils::{self, CancelFlag};

/// OWASP-recommended PBKDF2-HMAC-SHA256 iteration count
pub const PBKDF2_ITERATIONS: u32 = 600_000;

/// Floor below which derivation is refused
pub const MIN_ITERATIONS: u32 = 100_000;

/// Derived key length in bytes (256 bits for AES-256)
pub const KEY_LENGTH: usize = 32;

/// Salt length in bytes (128 bits)
pub const SALT_LENGTH: usize = 16;

/// A symmetric key derived from a passphrase
///
/// Owned exclusively by the operation that derived it and zeroed when
/// dropped. Never serialized, never copied into long-lived structures.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct DerivedKey {
    key: Vec<u8>,
    salt: Vec<u8>,
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[redacted]")
            .field("salt", &hex::encode(&self.salt))
            .finish()
    }
}

impl DerivedKey {
    /// Wraps key material that was generated randomly rather than
    /// derived, such as an unwrapped vault subkey.
    pub fn from_raw(key: Vec<u8>, salt: Vec<u8>) -> SecurityResult<DerivedKey> {
        if key.len() != KEY_LENGTH {
            return Err(SecurityError::invalid_parameter(
                "key",
                &format!("{} bytes", KEY_LENGTH),
                &format!("{} bytes", key.len()),
            ));
        }
        if salt.len() < SALT_LENGTH {
            return Err(SecurityError::invalid_parameter(
                "salt",
                &format!("at least {} bytes", SALT_LENGTH),
                &format!("{} bytes", salt.len()),
            ));
        }
        Ok(DerivedKey { key, salt })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

/// Derive an encryption key from a passphrase using PBKDF2-HMAC-SHA256
///
/// Deterministic: the same `(passphrase, salt, iterations)` always yield the
/// same key, so independently-created records with different salts can all
/// be decrypted with one passphrase. Computationally expensive by design to
/// raise the cost of offline guessing.
///
/// # Errors
///
/// Fails only on malformed parameters (empty passphrase, salt shorter than
/// [`SALT_LENGTH`], iterations below [`MIN_ITERATIONS`]) - never due to
/// passphrase content.
pub fn derive_key(passphrase: &str, salt: &[u8], iterations: u32) -> SecurityResult<DerivedKey> {
    if passphrase.is_empty() {
        return Err(SecurityError::invalid_parameter(
            "passphrase",
            "non-empty",
            "empty",
        ));
    }

    if salt.len() < SALT_LENGTH {
        return Err(SecurityError::invalid_parameter(
            "salt",
            &format!("at least {} bytes", SALT_LENGTH),
            &format!("{} bytes", salt.len()),
        ));
    }

    if iterations < MIN_ITERATIONS {
        return Err(SecurityError::invalid_parameter(
            "iterations",
            &format!("at least {}", MIN_ITERATIONS),
            &iterations.to_string(),
        ));
    }

    let mut key = vec![0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, iterations, &mut key);

    Ok(DerivedKey {
        key,
        salt: salt.to_vec(),
    })
}

/// Derive a key, honoring a cancellation signal
///
/// The flag is checked before the expensive derivation starts; a derivation
/// already underway runs to completion.
pub fn derive_key_cancellable(
    passphrase: &str,
    salt: &[u8],
    iterations: u32,
    cancel: &CancelFlag,
) -> SecurityResult<DerivedKey> {
    cancel.check()?;
    derive_key(passphrase, salt, iterations)
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> SecurityResult<Vec<u8>> {
    utils::random_bytes(SALT_LENGTH)
}

/// Short hex fingerprint of a derived key, for rotation bookkeeping
///
/// The fingerprint is a truncated SHA-256 of the key bytes; since the key
/// itself is the output of a salted, slow KDF, the fingerprint reveals
/// nothing useful about the passphrase.
pub fn fingerprint(key: &DerivedKey) -> String {
    let digest = Sha256::digest(key.key());
    hex::encode(&digest[..8])
}

