/*!
 * Key Derivation Unit
 *
 * Turns a passphrase and salt into a symmetric key via PBKDF2-HMAC-SHA256.
 * Derivation is deterministic and deliberately expensive; derived key
 * material is zeroed on drop and never persisted.
 */

mod kdf;

#[cfg(test)]
mod tests;

pub use kdf::derive_key;
pub use kdf::derive_key_cancellable;
pub use kdf::fingerprint;
pub use kdf::generate_salt;
pub use kdf::DerivedKey;
pub use kdf::KEY_LENGTH;
pub use kdf::MIN_ITERATIONS;
pub use kdf::PBKDF2_ITERATIONS;
pub use kdf::SALT_LENGTH;
