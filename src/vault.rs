/*!
 * Vault
 *
 * The top-level facade tying the pieces together: an on-disk layout, a
 * record store, the audit ledger, the attempt guard and the rotation
 * coordinator. Callers hold a `Vault` and pass passphrases per
 * operation; no passphrase or derived key is retained between calls.
 *
 * Layout under the vault root:
 *
 * ```text
 * vault.json               configuration and the wrapped ledger key
 * records/                 one .enc file per record
 * audit.log                hash-chained event ledger
 * auth_attempts.json       attempt guard state
 * rotation_state.json      rotation checkpoint (only while rotating)
 * rotation_metadata.json   lifetime rotation totals
 * backups/                 optional pre-rotation snapshots
 * ```
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroize;

use crate::cipher::{self, EncryptedRecord};
use crate::error::{SecurityError, SecurityResult};
use crate::guard::{AttemptGuard, Decision, Subject};
use crate::kdf::{self, DerivedKey, KEY_LENGTH, PBKDF2_ITERATIONS};
use crate::ledger::{AuditEvent, AuditLedger, LedgerReport, Severity};
use crate::passphrase;
use crate::rotation::{
    RotationCoordinator, RotationOptions, RotationResult, RotationStatus,
};
use crate::store::{DirStore, RecordStore};
use crate::utils::{self, CancelFlag};

const CONFIG_FILE: &str = "vault.json";
const LEDGER_FILE: &str = "audit.log";
const RECORDS_DIR: &str = "records";
const GUARD_FILE: &str = "auth_attempts.json";
const ROTATION_STATE_FILE: &str = "rotation_state.json";
const ROTATION_METADATA_FILE: &str = "rotation_metadata.json";
const BACKUPS_DIR: &str = "backups";

const CONFIG_VERSION: u32 = 1;

/// Persisted vault configuration.
///
/// The ledger key is a random 32-byte subkey wrapped under the vault
/// passphrase. Rotation re-wraps the same subkey under the new
/// passphrase, so encrypted ledger entries from before a rotation stay
/// readable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VaultConfig {
    format_version: u32,
    created_at: String,
    kdf_iterations: u32,
    wrapped_ledger_key: EncryptedRecord,
}

/// Single-user vault with encrypted records, a tamper-evident audit
/// trail, guarded passphrase attempts and resumable key rotation.
#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
    config: VaultConfig,
    store: DirStore,
    ledger: Arc<AuditLedger>,
    guard: AttemptGuard,
    coordinator: RotationCoordinator,
}

impl Vault {
    /// Creates a new vault at `root`.
    ///
    /// The passphrase must clear the acceptance floor; see
    /// [`passphrase::is_acceptable`]. Refuses to overwrite an existing
    /// vault.
    pub fn create<P: AsRef<Path>>(root: P, passphrase: &str) -> SecurityResult<Vault> {
        let root = root.as_ref().to_path_buf();
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(SecurityError::invalid_parameter(
                "root",
                "a directory without an existing vault",
                "a directory already containing one",
            ));
        }
        if !passphrase::is_acceptable(passphrase) {
            let score = passphrase::evaluate(passphrase);
            return Err(SecurityError::invalid_parameter(
                "passphrase",
                "one clearing the acceptance floor",
                &score.warnings.join("; "),
            ));
        }

        std::fs::create_dir_all(&root)?;
        let mut ledger_key = utils::random_bytes(KEY_LENGTH)?;
        let wrapped_ledger_key =
            cipher::encrypt_entry(&ledger_key, passphrase, PBKDF2_ITERATIONS)?;
        ledger_key.zeroize();

        let config = VaultConfig {
            format_version: CONFIG_VERSION,
            created_at: Utc::now().to_rfc3339(),
            kdf_iterations: PBKDF2_ITERATIONS,
            wrapped_ledger_key,
        };
        utils::write_atomic(&config_path, &serde_json::to_vec_pretty(&config)?)?;

        let vault = Self::assemble(root, config)?;
        vault.ledger.append(
            "vault_created",
            &json!({ "kdf_iterations": vault.config.kdf_iterations }),
            Severity::Info,
            None,
        )?;
        log::info!("Created vault at {}", vault.root.display());
        Ok(vault)
    }

    /// Opens an existing vault.
    ///
    /// A vault whose configuration exists but whose ledger file is gone
    /// fails with [`SecurityError::LedgerMissing`]: a disappeared audit
    /// trail is treated as tampering until an operator explicitly
    /// acknowledges the loss with [`acknowledge_ledger_loss`].
    ///
    /// [`acknowledge_ledger_loss`]: Vault::acknowledge_ledger_loss
    pub fn open<P: AsRef<Path>>(root: P) -> SecurityResult<Vault> {
        let root = root.as_ref().to_path_buf();
        let config = Self::load_config(&root)?;
        let ledger_path = root.join(LEDGER_FILE);
        if !ledger_path.exists() {
            return Err(SecurityError::LedgerMissing {
                path: ledger_path.display().to_string(),
            });
        }
        let vault = Self::assemble(root, config)?;
        log::info!("Opened vault at {}", vault.root.display());
        Ok(vault)
    }

    /// Records that the operator accepts the loss of the previous audit
    /// trail and starts a fresh ledger whose first entry says so. The
    /// vault can be opened normally afterwards.
    pub fn acknowledge_ledger_loss<P: AsRef<Path>>(root: P) -> SecurityResult<()> {
        let root = root.as_ref();
        Self::load_config(root)?;
        let ledger_path = root.join(LEDGER_FILE);
        if ledger_path.exists() {
            return Err(SecurityError::invalid_parameter(
                "ledger",
                "a missing ledger file",
                "one that is present",
            ));
        }
        let ledger = AuditLedger::open(&ledger_path)?;
        ledger.append(
            "ledger_loss_acknowledged",
            &json!({ "note": "previous audit trail lost; chain restarted" }),
            Severity::Critical,
            None,
        )?;
        log::warn!("Audit ledger loss acknowledged; fresh chain started");
        Ok(())
    }

    /// Truncates a torn final ledger entry left by a crash, then the
    /// vault can be opened again. Returns the number of bytes dropped.
    pub fn recover_ledger<P: AsRef<Path>>(root: P) -> SecurityResult<u64> {
        AuditLedger::recover(root.as_ref().join(LEDGER_FILE))
    }

    fn load_config(root: &Path) -> SecurityResult<VaultConfig> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(SecurityError::invalid_parameter(
                "root",
                "a directory containing a vault",
                "one without vault.json",
            ));
        }
        let raw = std::fs::read(&config_path)?;
        serde_json::from_slice(&raw)
            .map_err(|_| SecurityError::malformed("vault.json is not a valid configuration"))
    }

    fn assemble(root: PathBuf, config: VaultConfig) -> SecurityResult<Vault> {
        let store = DirStore::open(&root.join(RECORDS_DIR))?;
        let ledger = Arc::new(AuditLedger::open(root.join(LEDGER_FILE))?);
        let guard = AttemptGuard::open(root.join(GUARD_FILE), Some(Arc::clone(&ledger)))?;
        let coordinator = RotationCoordinator::new(
            root.join(ROTATION_STATE_FILE),
            root.join(ROTATION_METADATA_FILE),
        );
        Ok(Vault {
            root,
            config,
            store,
            ledger,
            guard,
            coordinator,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Iteration count currently protecting new records.
    pub fn kdf_iterations(&self) -> u32 {
        self.config.kdf_iterations
    }

    // ---- records ----

    /// Encrypts `plaintext` under the vault passphrase and stores it as
    /// record `id`, replacing any previous version atomically.
    pub fn store_record(
        &mut self,
        id: &str,
        plaintext: &[u8],
        passphrase: &str,
    ) -> SecurityResult<()> {
        self.ensure_not_rotating()?;
        let record = cipher::encrypt_entry(plaintext, passphrase, self.config.kdf_iterations)?;
        self.store.write_atomic(id, &record.to_bytes())?;
        self.ledger.append(
            "record_written",
            &json!({ "record_id": id }),
            Severity::Info,
            None,
        )?;
        Ok(())
    }

    /// Decrypts record `id`.
    ///
    /// Attempts are rate limited per the decrypt subject. A failed
    /// authentication reports the same [`SecurityError::Integrity`]
    /// whether the passphrase was wrong or the record was tampered with,
    /// and counts against the failure windows.
    pub fn load_record(&self, id: &str, passphrase: &str) -> SecurityResult<Vec<u8>> {
        self.ensure_not_rotating()?;
        self.guard.enforce(Subject::Decrypt)?;
        let raw = self.store.read(id)?;
        let record = EncryptedRecord::from_bytes(&raw)?;
        match cipher::decrypt_entry(&record, passphrase, self.config.kdf_iterations) {
            Ok(plaintext) => {
                self.guard.record_success(Subject::Decrypt)?;
                self.ledger.append(
                    "record_read",
                    &json!({ "record_id": id }),
                    Severity::Info,
                    None,
                )?;
                Ok(plaintext)
            }
            Err(err @ SecurityError::Integrity { .. }) => {
                self.guard.record_failure(Subject::Decrypt)?;
                self.ledger.append(
                    "decrypt_failed",
                    &json!({ "record_id": id }),
                    Severity::Warning,
                    None,
                )?;
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Removes record `id`. The removal is audited; the ciphertext is
    /// not shredded beyond what the filesystem provides.
    pub fn delete_record(&mut self, id: &str) -> SecurityResult<()> {
        self.ensure_not_rotating()?;
        self.store.remove(id)?;
        self.ledger.append(
            "record_deleted",
            &json!({ "record_id": id }),
            Severity::Info,
            None,
        )?;
        Ok(())
    }

    /// Record ids in sorted order.
    pub fn list_records(&self) -> SecurityResult<Vec<String>> {
        self.store.list_ids()
    }

    // ---- audit ----

    /// Appends a clear application event to the audit ledger.
    pub fn log_event(
        &self,
        event_type: &str,
        details: &Value,
        severity: Severity,
    ) -> SecurityResult<u64> {
        self.ledger.append(event_type, details, severity, None)
    }

    /// Appends an event whose details are encrypted under the vault's
    /// ledger subkey. The chain still covers the ciphertext, so the
    /// entry is tamper-evident without the passphrase.
    pub fn log_event_encrypted(
        &self,
        event_type: &str,
        details: &Value,
        severity: Severity,
        passphrase: &str,
    ) -> SecurityResult<u64> {
        self.guard.enforce(Subject::Decrypt)?;
        let key = match self.unwrap_ledger_key(passphrase) {
            Ok(key) => {
                self.guard.record_success(Subject::Decrypt)?;
                key
            }
            Err(err @ SecurityError::Integrity { .. }) => {
                self.guard.record_failure(Subject::Decrypt)?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        self.ledger.append(event_type, details, severity, Some(&key))
    }

    /// Reads audit events with sequence numbers in `[start, end]`.
    ///
    /// With a passphrase, encrypted payloads are decrypted; without one
    /// they come back with null details. Viewing is guarded by its own
    /// subject so decrypt lockouts do not hide the audit trail.
    pub fn read_audit(
        &self,
        start: u64,
        end: u64,
        passphrase: Option<&str>,
    ) -> SecurityResult<Vec<AuditEvent>> {
        self.guard.enforce(Subject::AuditView)?;
        let key = match passphrase {
            Some(passphrase) => match self.unwrap_ledger_key(passphrase) {
                Ok(key) => {
                    self.guard.record_success(Subject::AuditView)?;
                    Some(key)
                }
                Err(err @ SecurityError::Integrity { .. }) => {
                    self.guard.record_failure(Subject::AuditView)?;
                    return Err(err);
                }
                Err(err) => return Err(err),
            },
            None => None,
        };
        self.ledger.read_range(start, end, key.as_ref())
    }

    /// Verifies the audit chain from genesis. A broken chain is itself
    /// recorded as a critical event, which the still-intact tail will
    /// carry forward.
    pub fn verify_audit_chain(&self) -> SecurityResult<(bool, Option<u64>)> {
        let (ok, first_bad) = self.ledger.verify()?;
        if !ok {
            self.ledger.append(
                "audit_chain_broken",
                &json!({ "first_bad_sequence": first_bad }),
                Severity::Critical,
                None,
            )?;
            log::error!(
                "Audit chain verification failed at sequence {:?}",
                first_bad
            );
        }
        Ok((ok, first_bad))
    }

    pub fn audit_report(&self) -> SecurityResult<LedgerReport> {
        self.ledger.report()
    }

    // ---- guard ----

    /// What the guard would say about an attempt right now, without
    /// recording anything.
    pub fn check_rate_limit(&self, subject: Subject) -> SecurityResult<Decision> {
        self.guard.check(subject)
    }

    /// Operator override clearing the attempt history for `subject`.
    pub fn reset_rate_limit(&self, subject: Subject) -> SecurityResult<()> {
        self.guard.operator_reset(subject)
    }

    // ---- rotation ----

    /// Rotates every record from `old_passphrase` to `new_passphrase`,
    /// then re-wraps the ledger subkey and bumps the stored iteration
    /// count to the current default. Resumable: rerun with the same
    /// passphrases after a crash or cancellation.
    ///
    /// The coordinator commits (removing its state file) before the
    /// configuration is rewritten. A crash in that window leaves records
    /// rotated while `vault.json` still names the old iteration count;
    /// record reads fail under both passphrases until `rotate` is rerun,
    /// which recognizes the records as already rewritten and completes
    /// the configuration update. No record data is at risk in the window.
    pub fn rotate(
        &mut self,
        old_passphrase: &str,
        new_passphrase: &str,
        backup: bool,
        cancel: &CancelFlag,
    ) -> SecurityResult<RotationResult> {
        if !passphrase::is_acceptable(new_passphrase) {
            let score = passphrase::evaluate(new_passphrase);
            return Err(SecurityError::invalid_parameter(
                "new_passphrase",
                "one clearing the acceptance floor",
                &score.warnings.join("; "),
            ));
        }

        let options = RotationOptions {
            old_iterations: self.config.kdf_iterations,
            new_iterations: PBKDF2_ITERATIONS,
            backup_dir: backup.then(|| self.root.join(BACKUPS_DIR)),
        };
        let result = self.coordinator.rotate(
            &mut self.store,
            &self.ledger,
            &self.guard,
            old_passphrase,
            new_passphrase,
            &options,
            cancel,
        )?;

        // Records are committed under the new passphrase; move the
        // configuration over as well. The ledger subkey itself does not
        // change, so pre-rotation encrypted events stay readable.
        let mut ledger_key = cipher::decrypt_entry(
            &self.config.wrapped_ledger_key,
            old_passphrase,
            self.config.kdf_iterations,
        )?;
        let rewrapped =
            cipher::encrypt_entry(&ledger_key, new_passphrase, options.new_iterations)?;
        ledger_key.zeroize();
        self.config.kdf_iterations = options.new_iterations;
        self.config.wrapped_ledger_key = rewrapped;
        utils::write_atomic(
            &self.root.join(CONFIG_FILE),
            &serde_json::to_vec_pretty(&self.config)?,
        )?;
        Ok(result)
    }

    pub fn rotation_status(&self) -> SecurityResult<RotationStatus> {
        self.coordinator.status()
    }

    /// Whether the last completed rotation is old enough that a new one
    /// is advisable.
    pub fn rotation_due(&self) -> SecurityResult<bool> {
        self.coordinator.rotation_due()
    }

    /// Clears a failed rotation after operator review.
    pub fn acknowledge_rotation_failure(&self) -> SecurityResult<()> {
        self.coordinator.acknowledge_failure(&self.ledger)
    }

    fn ensure_not_rotating(&self) -> SecurityResult<()> {
        match self.coordinator.status()? {
            RotationStatus::Idle | RotationStatus::Committed => Ok(()),
            _ => Err(SecurityError::RotationInProgress),
        }
    }

    fn unwrap_ledger_key(&self, passphrase: &str) -> SecurityResult<DerivedKey> {
        let key_bytes = cipher::decrypt_entry(
            &self.config.wrapped_ledger_key,
            passphrase,
            self.config.kdf_iterations,
        )?;
        let salt = kdf::generate_salt()?;
        DerivedKey::from_raw(key_bytes, salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::MIN_ITERATIONS;
    use tempfile::tempdir;

    const PASS: &str = "orbit lantern velvet quarry 5!";
    const NEW_PASS: &str = "quarry beacon mossy anvil 8?";

    // Full-strength iteration counts would dominate the suite; point the
    // freshly created config at the floor instead.
    fn create_vault(root: &Path) -> Vault {
        let mut vault = Vault::create(root, PASS).unwrap();
        vault.config.kdf_iterations = MIN_ITERATIONS;
        vault.config.wrapped_ledger_key = {
            let mut ledger_key = cipher::decrypt_entry(
                &Vault::load_config(root).unwrap().wrapped_ledger_key,
                PASS,
                PBKDF2_ITERATIONS,
            )
            .unwrap();
            let rewrapped = cipher::encrypt_entry(&ledger_key, PASS, MIN_ITERATIONS).unwrap();
            ledger_key.zeroize();
            rewrapped
        };
        utils::write_atomic(
            &root.join(CONFIG_FILE),
            &serde_json::to_vec_pretty(&vault.config).unwrap(),
        )
        .unwrap();
        vault
    }

    #[test]
    fn test_create_rejects_weak_passphrase() {
        let dir = tempdir().unwrap();
        assert!(Vault::create(dir.path(), "password").is_err());
        assert!(Vault::create(dir.path(), "short1!").is_err());
    }

    #[test]
    fn test_create_rejects_existing_vault() {
        let dir = tempdir().unwrap();
        Vault::create(dir.path(), PASS).unwrap();
        assert!(Vault::create(dir.path(), PASS).is_err());
    }

    #[test]
    fn test_open_missing_vault_rejected() {
        let dir = tempdir().unwrap();
        assert!(Vault::open(dir.path()).is_err());
    }

    #[test]
    fn test_record_round_trip() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault
            .store_record("note-001", b"the crow flies at midnight", PASS)
            .unwrap();
        assert_eq!(vault.list_records().unwrap(), vec!["note-001"]);

        let plaintext = vault.load_record("note-001", PASS).unwrap();
        assert_eq!(plaintext, b"the crow flies at midnight");

        vault.delete_record("note-001").unwrap();
        assert!(vault.list_records().unwrap().is_empty());

        let report = vault.audit_report().unwrap();
        assert_eq!(report.events_by_type["record_written"], 1);
        assert_eq!(report.events_by_type["record_read"], 1);
        assert_eq!(report.events_by_type["record_deleted"], 1);
    }

    #[test]
    fn test_wrong_passphrase_counts_against_guard() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault.store_record("note-001", b"contents", PASS).unwrap();

        let err = vault.load_record("note-001", "wrong passphrase!").unwrap_err();
        assert!(matches!(err, SecurityError::Integrity { .. }));
        assert_eq!(vault.guard.failure_count(Subject::Decrypt).unwrap(), 1);

        let report = vault.audit_report().unwrap();
        assert_eq!(report.events_by_type["decrypt_failed"], 1);
        assert_eq!(report.events_by_type["auth_failure"], 1);
    }

    #[test]
    fn test_missing_ledger_is_fatal_until_acknowledged() {
        let dir = tempdir().unwrap();
        create_vault(dir.path());
        std::fs::remove_file(dir.path().join(LEDGER_FILE)).unwrap();

        let err = Vault::open(dir.path()).unwrap_err();
        assert!(matches!(err, SecurityError::LedgerMissing { .. }));

        Vault::acknowledge_ledger_loss(dir.path()).unwrap();
        let vault = Vault::open(dir.path()).unwrap();
        let report = vault.audit_report().unwrap();
        assert_eq!(report.events_by_type["ledger_loss_acknowledged"], 1);
        let (ok, _) = vault.verify_audit_chain().unwrap();
        assert!(ok);
    }

    #[test]
    fn test_encrypted_audit_events_survive_rotation() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault
            .log_event_encrypted(
                "journal_entry",
                &json!({ "mood": "wistful" }),
                Severity::Info,
                PASS,
            )
            .unwrap();

        vault.rotate(PASS, NEW_PASS, false, &CancelFlag::new()).unwrap();

        // The old passphrase no longer opens the trail, the new one does.
        assert!(vault.read_audit(0, u64::MAX, Some(PASS)).is_err());
        let events = vault.read_audit(0, u64::MAX, Some(NEW_PASS)).unwrap();
        let entry = events
            .iter()
            .find(|e| e.event_type == "journal_entry")
            .unwrap();
        assert!(entry.encrypted);
        assert_eq!(entry.details["mood"], "wistful");
    }

    #[test]
    fn test_rotation_updates_config_and_records() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault.store_record("note-001", b"before rotation", PASS).unwrap();

        vault.rotate(PASS, NEW_PASS, false, &CancelFlag::new()).unwrap();
        assert_eq!(vault.kdf_iterations(), PBKDF2_ITERATIONS);
        assert_eq!(vault.rotation_status().unwrap(), RotationStatus::Idle);
        assert!(!vault.rotation_due().unwrap());

        let plaintext = vault.load_record("note-001", NEW_PASS).unwrap();
        assert_eq!(plaintext, b"before rotation");
        assert!(vault.load_record("note-001", PASS).is_err());

        // The bumped iteration count survives a reopen.
        drop(vault);
        let vault = Vault::open(dir.path()).unwrap();
        assert_eq!(vault.kdf_iterations(), PBKDF2_ITERATIONS);
    }

    #[test]
    fn test_rerun_completes_config_after_commit_window_crash() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault.store_record("note-001", b"window contents", PASS).unwrap();

        // Drive the coordinator to commit without the configuration
        // rewrite, as a crash between the two would leave things.
        let options = RotationOptions {
            old_iterations: MIN_ITERATIONS,
            new_iterations: PBKDF2_ITERATIONS,
            backup_dir: None,
        };
        vault
            .coordinator
            .rotate(
                &mut vault.store,
                &vault.ledger,
                &vault.guard,
                PASS,
                NEW_PASS,
                &options,
                &CancelFlag::new(),
            )
            .unwrap();
        assert_eq!(vault.kdf_iterations(), MIN_ITERATIONS);
        assert!(vault.load_record("note-001", PASS).is_err());
        assert!(vault.load_record("note-001", NEW_PASS).is_err());

        vault.guard.operator_reset(Subject::Decrypt).unwrap();
        vault.rotate(PASS, NEW_PASS, false, &CancelFlag::new()).unwrap();
        assert_eq!(vault.kdf_iterations(), PBKDF2_ITERATIONS);
        let plaintext = vault.load_record("note-001", NEW_PASS).unwrap();
        assert_eq!(plaintext, b"window contents");
    }

    #[test]
    fn test_operations_blocked_mid_rotation() {
        let dir = tempdir().unwrap();
        let mut vault = create_vault(dir.path());
        vault.store_record("note-001", b"contents", PASS).unwrap();
        vault.store_record("note-002", b"contents", PASS).unwrap();

        // Cancel immediately so the checkpoint parks in progress.
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = vault.rotate(PASS, NEW_PASS, false, &cancel).unwrap_err();
        assert!(matches!(err, SecurityError::Cancelled));
        assert_eq!(
            vault.rotation_status().unwrap(),
            RotationStatus::InProgress
        );

        assert!(matches!(
            vault.load_record("note-001", PASS).unwrap_err(),
            SecurityError::RotationInProgress
        ));
        assert!(matches!(
            vault.store_record("note-003", b"x", PASS).unwrap_err(),
            SecurityError::RotationInProgress
        ));
        assert!(matches!(
            vault.delete_record("note-001").unwrap_err(),
            SecurityError::RotationInProgress
        ));

        // Finishing the rotation unblocks everything.
        vault.rotate(PASS, NEW_PASS, false, &CancelFlag::new()).unwrap();
        vault.load_record("note-001", NEW_PASS).unwrap();
    }

    #[test]
    fn test_torn_ledger_recovery_via_vault() {
        let dir = tempdir().unwrap();
        {
            let vault = create_vault(dir.path());
            vault
                .log_event("event", &json!({}), Severity::Info)
                .unwrap();
        }
        let ledger_path = dir.path().join(LEDGER_FILE);
        let mut contents = std::fs::read(&ledger_path).unwrap();
        contents.extend_from_slice(b"{\"torn");
        std::fs::write(&ledger_path, contents).unwrap();

        assert!(Vault::open(dir.path()).is_err());
        assert!(Vault::recover_ledger(dir.path()).unwrap() > 0);
        let vault = Vault::open(dir.path()).unwrap();
        let (ok, _) = vault.verify_audit_chain().unwrap();
        assert!(ok);
    }
}
