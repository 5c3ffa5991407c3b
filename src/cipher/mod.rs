/*!
 * Record Cipher
 *
 * Authenticated encryption of individual records with AES-256-GCM. Every
 * record carries its own salt and nonce; the format version is bound as
 * associated data so a version rewrite breaks the authentication tag.
 */

mod cipher;


pub use cipher::decrypt;
pub use cipher::decrypt_entry;
pub use cipher::encrypt;
pub use cipher::encrypt_entry;
pub(crate) use cipher::probe;
pub use cipher::EncryptedRecord;
pub use cipher::FORMAT_VERSION;
pub use cipher::NONCE_LENGTH;
