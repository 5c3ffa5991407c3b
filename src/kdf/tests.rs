use super::*;
use crate::error::SecurityError;
use crate::utils::CancelFlag;

// The real iteration count makes tests needlessly slow; the floor keeps the
// same code path.
const TEST_ITERATIONS: u32 = MIN_ITERATIONS;

#[test]
fn test_derivation_is_deterministic() {
    let salt = generate_salt().unwrap();

    let a = derive_key("correct horse battery staple", &salt, TEST_ITERATIONS).unwrap();
    let b = derive_key("correct horse battery staple", &salt, TEST_ITERATIONS).unwrap();

    assert_eq!(a.key(), b.key());
    assert_eq!(a.key().len(), KEY_LENGTH);
}

#[test]
fn test_different_salt_different_key() {
    let salt1 = generate_salt().unwrap();
    let salt2 = generate_salt().unwrap();

    let a = derive_key("same passphrase", &salt1, TEST_ITERATIONS).unwrap();
    let b = derive_key("same passphrase", &salt2, TEST_ITERATIONS).unwrap();

    assert_ne!(a.key(), b.key());
}

#[test]
fn test_different_iterations_different_key() {
    let salt = generate_salt().unwrap();

    let a = derive_key("same passphrase", &salt, TEST_ITERATIONS).unwrap();
    let b = derive_key("same passphrase", &salt, TEST_ITERATIONS + 1).unwrap();

    assert_ne!(a.key(), b.key());
}

#[test]
fn test_rejects_empty_passphrase() {
    let salt = generate_salt().unwrap();
    let result = derive_key("", &salt, TEST_ITERATIONS);
    assert!(matches!(
        result,
        Err(SecurityError::InvalidParameter { .. })
    ));
}

#[test]
fn test_rejects_short_salt() {
    let result = derive_key("a valid passphrase", &[0u8; 8], TEST_ITERATIONS);
    assert!(matches!(
        result,
        Err(SecurityError::InvalidParameter { .. })
    ));
}

#[test]
fn test_rejects_iterations_below_floor() {
    let salt = generate_salt().unwrap();
    let result = derive_key("a valid passphrase", &salt, MIN_ITERATIONS - 1);
    assert!(matches!(
        result,
        Err(SecurityError::InvalidParameter { .. })
    ));
}

#[test]
fn test_salt_length() {
    let salt = generate_salt().unwrap();
    assert_eq!(salt.len(), SALT_LENGTH);
}

#[test]
fn test_fingerprint_stable_and_short() {
    let salt = generate_salt().unwrap();
    let key = derive_key("fingerprint me", &salt, TEST_ITERATIONS).unwrap();

    let fp1 = fingerprint(&key);
    let fp2 = fingerprint(&key);

    assert_eq!(fp1, fp2);
    assert_eq!(fp1.len(), 16);
    // Fingerprint must not expose the key bytes
    assert_ne!(fp1.as_bytes(), &key.key()[..8]);
}

#[test]
fn test_debug_redacts_key_material() {
    let salt = generate_salt().unwrap();
    let key = derive_key("do not print me", &salt, TEST_ITERATIONS).unwrap();
    let rendered = format!("{:?}", key);
    assert!(rendered.contains("redacted"));
    assert!(!rendered.contains("do not print me"));
}

#[test]
fn test_cancelled_derivation_never_starts() {
    let salt = generate_salt().unwrap();
    let cancel = CancelFlag::new();
    cancel.cancel();

    let result = derive_key_cancellable("passphrase", &salt, TEST_ITERATIONS, &cancel);
    assert!(matches!(result, Err(SecurityError::Cancelled)));
}
