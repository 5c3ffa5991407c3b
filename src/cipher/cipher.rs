use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{SecurityError, SecurityResult};
use crate::kdf::{self, DerivedKey, KEY_LENGTH, SALT_LENGTH};
use crate::utils;

/// Current record format version; bound into the authentication tag as
/// associated data
pub const FORMAT_VERSION: u8 = 1;

/// Nonce length in bytes (96 bits for GCM)
pub const NONCE_LENGTH: usize = 12;

/// GCM tag length; the minimum possible ciphertext size
const TAG_LENGTH: usize = 16;

mod b64 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        base64::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// An encrypted record as persisted at rest
///
/// The ciphertext includes the GCM authentication tag. The tag must
/// validate under the key derived from `(passphrase, salt)` before any
/// plaintext is released; any single-bit corruption of ciphertext, nonce
/// or tag fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub format_version: u8,
    #[serde(with = "b64")]
    pub salt: Vec<u8>,
    #[serde(with = "b64")]
    pub nonce: Vec<u8>,
    #[serde(with = "b64")]
    pub ciphertext: Vec<u8>,
}

impl EncryptedRecord {
    /// Pack into the wire form `version || salt || nonce || ciphertext+tag`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.salt.len() + self.nonce.len() + self.ciphertext.len());
        out.push(self.format_version);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the wire form, validating field lengths
    pub fn from_bytes(data: &[u8]) -> SecurityResult<Self> {
        let min_length = 1 + SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH;
        if data.len() < min_length {
            return Err(SecurityError::malformed(&format!(
                "encrypted record too short: {} bytes, need at least {}",
                data.len(),
                min_length
            )));
        }

        let format_version = data[0];
        if format_version != FORMAT_VERSION {
            return Err(SecurityError::malformed(&format!(
                "unknown record format version {}",
                format_version
            )));
        }

        let salt = data[1..1 + SALT_LENGTH].to_vec();
        let nonce = data[1 + SALT_LENGTH..1 + SALT_LENGTH + NONCE_LENGTH].to_vec();
        let ciphertext = data[1 + SALT_LENGTH + NONCE_LENGTH..].to_vec();

        Ok(Self {
            format_version,
            salt,
            nonce,
            ciphertext,
        })
    }

    fn validate(&self) -> SecurityResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(SecurityError::malformed(&format!(
                "unknown record format version {}",
                self.format_version
            )));
        }
        if self.salt.len() < SALT_LENGTH {
            return Err(SecurityError::malformed("salt field too short"));
        }
        if self.nonce.len() != NONCE_LENGTH {
            return Err(SecurityError::malformed("nonce field has wrong length"));
        }
        if self.ciphertext.len() < TAG_LENGTH {
            return Err(SecurityError::malformed("ciphertext shorter than tag"));
        }
        Ok(())
    }
}

/// Encrypt plaintext under an already-derived key
///
/// Generates a fresh random nonce per call; a nonce is never reused under
/// the same key. The record's salt is the salt the key was derived with.
pub fn encrypt(plaintext: &[u8], key: &DerivedKey) -> SecurityResult<EncryptedRecord> {
    if key.key().len() != KEY_LENGTH {
        return Err(SecurityError::invalid_parameter(
            "key",
            &format!("{} bytes", KEY_LENGTH),
            &format!("{} bytes", key.key().len()),
        ));
    }

    let nonce_bytes = utils::random_bytes(NONCE_LENGTH)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.key()));
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad: &[FORMAT_VERSION],
    };

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|_| SecurityError::Encryption("AES-GCM encryption failed".to_string()))?;

    Ok(EncryptedRecord {
        format_version: FORMAT_VERSION,
        salt: key.salt().to_vec(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypt a record under an already-derived key
///
/// Verifies the authentication tag before releasing any plaintext. Tag
/// comparison is constant-time inside the AEAD implementation. A wrong key
/// and corrupted data produce the same [`SecurityError::Integrity`] so the
/// failure mode cannot serve as an oracle.
pub fn decrypt(record: &EncryptedRecord, key: &DerivedKey) -> SecurityResult<Vec<u8>> {
    record.validate()?;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.key()));
    let nonce = Nonce::from_slice(&record.nonce);

    let payload = Payload {
        msg: record.ciphertext.as_slice(),
        aad: &[record.format_version],
    };

    cipher
        .decrypt(nonce, payload)
        .map_err(|_| SecurityError::integrity("record authentication failed"))
}

/// Encrypt plaintext under a passphrase, generating a fresh salt
///
/// The derived key lives only for the duration of this call and is zeroed
/// on exit.
pub fn encrypt_entry(
    plaintext: &[u8],
    passphrase: &str,
    iterations: u32,
) -> SecurityResult<EncryptedRecord> {
    let salt = kdf::generate_salt()?;
    let key = kdf::derive_key(passphrase, &salt, iterations)?;
    let record = encrypt(plaintext, &key);
    drop(key);
    record
}

/// Decrypt a record under a passphrase
///
/// Derives the key from the record's own salt; the key is zeroed on exit.
pub fn decrypt_entry(
    record: &EncryptedRecord,
    passphrase: &str,
    iterations: u32,
) -> SecurityResult<Vec<u8>> {
    record.validate()?;
    let key = kdf::derive_key(passphrase, &record.salt, iterations)?;
    let plaintext = decrypt(record, &key);
    drop(key);
    plaintext
}

/// Decrypt and discard, zeroing the plaintext; used for verification passes
pub(crate) fn probe(
    record: &EncryptedRecord,
    passphrase: &str,
    iterations: u32,
) -> SecurityResult<()> {
    let mut plaintext = decrypt_entry(record, passphrase, iterations)?;
    plaintext.zeroize();
    Ok(())
}
