use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::cipher::{self, EncryptedRecord};
use crate::error::{SecurityError, SecurityResult};
use crate::guard::{AttemptGuard, Subject};
use crate::kdf;
use crate::ledger::{AuditLedger, Severity};
use crate::store::RecordStore;
use crate::utils::{self, write_atomic, CancelFlag};

/// Age after which [`RotationCoordinator::rotation_due`] starts
/// reporting true.
pub const ROTATION_DUE_AFTER_DAYS: i64 = 90;

/// Lifecycle of a rotation as persisted in the state file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationStatus {
    /// No rotation underway; the state file is absent.
    Idle,
    /// Records are being re-encrypted.
    InProgress,
    /// All records rewritten, verification pass running.
    Verifying,
    /// Verification passed; terminal success.
    Committed,
    /// A record failed mid-rotation. Stays until an operator
    /// acknowledges.
    Failed,
}

/// Checkpoint file contents. `records_done` counts a prefix of the
/// sorted record id list, so resuming is a matter of skipping that many
/// ids and carrying on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationState {
    pub status: RotationStatus,
    pub started_at: DateTime<Utc>,
    pub records_total: u64,
    pub records_done: u64,
    /// Hex salt used only to fingerprint the two passphrases, so a
    /// resume can refuse mismatched credentials.
    pub fingerprint_salt: String,
    pub old_fingerprint: String,
    pub new_fingerprint: String,
    pub old_iterations: u32,
    pub new_iterations: u32,
    /// Set when the run ended in failure, for the operator.
    pub failure: Option<String>,
}

/// Durable totals across all completed rotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotationMetadata {
    pub rotations_completed: u64,
    /// Cumulative record rewrites over the vault's lifetime.
    pub records_rotated: u64,
    pub last_completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct RotationOptions {
    /// Iteration count that protected the records until now.
    pub old_iterations: u32,
    /// Iteration count for the re-encrypted records.
    pub new_iterations: u32,
    /// When set, every record is copied here (with a hash manifest)
    /// before the first rewrite.
    pub backup_dir: Option<PathBuf>,
}

/// Outcome of a successful rotation run.
#[derive(Debug, Clone)]
pub struct RotationResult {
    pub records_total: u64,
    /// Records rewritten by this run; smaller than `records_total` when
    /// the run resumed an earlier one.
    pub records_rotated_this_run: u64,
    pub resumed: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Drives rotations and owns the state and metadata files.
#[derive(Debug)]
pub struct RotationCoordinator {
    state_path: PathBuf,
    metadata_path: PathBuf,
}

impl RotationCoordinator {
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        state_path: P,
        metadata_path: Q,
    ) -> RotationCoordinator {
        RotationCoordinator {
            state_path: state_path.as_ref().to_path_buf(),
            metadata_path: metadata_path.as_ref().to_path_buf(),
        }
    }

    /// Current status, [`RotationStatus::Idle`] when no state file
    /// exists.
    pub fn status(&self) -> SecurityResult<RotationStatus> {
        Ok(self.load_state()?.map_or(RotationStatus::Idle, |s| s.status))
    }

    /// The persisted checkpoint, if any.
    pub fn state(&self) -> SecurityResult<Option<RotationState>> {
        self.load_state()
    }

    pub fn metadata(&self) -> SecurityResult<RotationMetadata> {
        if !self.metadata_path.exists() {
            return Ok(RotationMetadata::default());
        }
        let raw = std::fs::read(&self.metadata_path)?;
        serde_json::from_slice(&raw)
            .map_err(|_| SecurityError::malformed("rotation metadata file is not valid JSON"))
    }

    /// Whether the last completed rotation is older than
    /// [`ROTATION_DUE_AFTER_DAYS`]. A vault that has never rotated is
    /// due once it is that old, which callers decide; here a missing
    /// timestamp reports due.
    pub fn rotation_due(&self) -> SecurityResult<bool> {
        let metadata = self.metadata()?;
        Ok(match metadata.last_completed_at {
            Some(at) => Utc::now() - at > Duration::days(ROTATION_DUE_AFTER_DAYS),
            None => true,
        })
    }

    /// Rotates every record in `store` from `old_passphrase` to
    /// `new_passphrase`.
    ///
    /// Resumes automatically when an in-progress state file matches the
    /// supplied passphrases. Cancellation via `cancel` is clean: the
    /// checkpoint stays in place and the same call rotated-to-date
    /// resumes later. A failed run parks in [`RotationStatus::Failed`]
    /// and refuses further rotations until
    /// [`acknowledge_failure`] is called.
    ///
    /// [`acknowledge_failure`]: RotationCoordinator::acknowledge_failure
    pub fn rotate(
        &self,
        store: &mut dyn RecordStore,
        ledger: &AuditLedger,
        guard: &AttemptGuard,
        old_passphrase: &str,
        new_passphrase: &str,
        options: &RotationOptions,
        cancel: &CancelFlag,
    ) -> SecurityResult<RotationResult> {
        guard.enforce(Subject::Rotate)?;

        let (mut state, resumed) = match self.load_state()? {
            Some(state) => match state.status {
                RotationStatus::Failed => {
                    return Err(SecurityError::rotation(
                        "",
                        "start",
                        "previous rotation failed and has not been acknowledged",
                    ));
                }
                RotationStatus::InProgress | RotationStatus::Verifying => {
                    self.check_resume_credentials(&state, old_passphrase, new_passphrase)?;
                    log::info!(
                        "Resuming rotation at {}/{} records",
                        state.records_done,
                        state.records_total
                    );
                    (state, true)
                }
                // Committed or Idle on disk means a stale file; start over.
                _ => (self.fresh_state(old_passphrase, new_passphrase, options)?, false),
            },
            None => (self.fresh_state(old_passphrase, new_passphrase, options)?, false),
        };

        let ids = store.list_ids()?;
        if !resumed {
            state.records_total = ids.len() as u64;
            self.persist_state(&state)?;
            ledger.append(
                "rotation_started",
                &json!({
                    "records_total": state.records_total,
                    "new_iterations": state.new_iterations,
                }),
                Severity::Info,
                None,
            )?;
            if let Some(backup_dir) = &options.backup_dir {
                backup_records(store, &ids, backup_dir)?;
            }
        } else {
            ledger.append(
                "rotation_resumed",
                &json!({
                    "records_done": state.records_done,
                    "records_total": state.records_total,
                }),
                Severity::Info,
                None,
            )?;
        }

        if state.records_total != ids.len() as u64 {
            let err = SecurityError::rotation(
                "",
                "resume",
                "record count changed since the rotation started",
            );
            self.mark_failed(&mut state, ledger, &err)?;
            return Err(err);
        }

        let rotated_before_this_run = state.records_done;
        if state.status == RotationStatus::InProgress {
            self.rewrite_records(store, ledger, guard, &mut state, &ids, old_passphrase,
                new_passphrase, options, cancel, resumed)?;
        }

        state.status = RotationStatus::Verifying;
        self.persist_state(&state)?;
        for id in &ids {
            cancel.check()?;
            let record = load_record(store, id)?;
            if let Err(err) = cipher::probe(&record, new_passphrase, options.new_iterations) {
                let err = SecurityError::rotation(id, "verify", &err.to_string());
                self.mark_failed(&mut state, ledger, &err)?;
                return Err(err);
            }
        }

        state.status = RotationStatus::Committed;
        self.persist_state(&state)?;

        let mut metadata = self.metadata()?;
        let completed_at = Utc::now();
        metadata.rotations_completed += 1;
        metadata.records_rotated += state.records_total;
        metadata.last_completed_at = Some(completed_at);
        self.persist_metadata(&metadata)?;

        // Terminal success: the state file's job is done.
        std::fs::remove_file(&self.state_path)?;

        ledger.append(
            "rotation_completed",
            &json!({
                "records_total": state.records_total,
                "resumed": resumed,
                "new_iterations": state.new_iterations,
            }),
            Severity::Info,
            None,
        )?;
        guard.record_success(Subject::Rotate)?;
        log::info!(
            "Rotation committed: {} records now under the new passphrase",
            state.records_total
        );

        Ok(RotationResult {
            records_total: state.records_total,
            records_rotated_this_run: state.records_done - rotated_before_this_run,
            resumed,
            started_at: state.started_at,
            completed_at,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_records(
        &self,
        store: &mut dyn RecordStore,
        ledger: &AuditLedger,
        guard: &AttemptGuard,
        state: &mut RotationState,
        ids: &[String],
        old_passphrase: &str,
        new_passphrase: &str,
        options: &RotationOptions,
        cancel: &CancelFlag,
        resumed: bool,
    ) -> SecurityResult<()> {
        for (index, id) in ids.iter().enumerate().skip(state.records_done as usize) {
            if cancel.is_cancelled() {
                ledger.append(
                    "rotation_cancelled",
                    &json!({
                        "records_done": state.records_done,
                        "records_total": state.records_total,
                    }),
                    Severity::Info,
                    None,
                )?;
                log::info!(
                    "Rotation cancelled at {}/{} records; checkpoint kept",
                    state.records_done,
                    state.records_total
                );
                return Err(SecurityError::Cancelled);
            }

            let record = load_record(store, id)?;
            let plaintext = match cipher::decrypt_entry(&record, old_passphrase, options.old_iterations)
            {
                Ok(plaintext) => Some(plaintext),
                Err(_) => {
                    // A record the new passphrase already opens was
                    // rewritten just before a crash that beat the
                    // checkpoint; count it done and move on.
                    match cipher::probe(&record, new_passphrase, options.new_iterations) {
                        Ok(()) => None,
                        // On a fresh start the very first record failing both
                        // keys means the old passphrase is simply wrong; on a
                        // resume the credentials were already fingerprinted,
                        // so the same failure is record damage.
                        Err(_) if !resumed && index == 0 && state.records_done == 0 => {
                            guard.record_failure(Subject::Rotate)?;
                            ledger.append(
                                "rotation_wrong_passphrase",
                                &json!({}),
                                Severity::Warning,
                                None,
                            )?;
                            // Nothing was touched yet; leave no Failed state
                            // behind.
                            std::fs::remove_file(&self.state_path)?;
                            return Err(SecurityError::WrongPassphrase);
                        }
                        Err(err) => {
                            let err =
                                SecurityError::rotation(id, "decrypt", &err.to_string());
                            self.mark_failed(state, ledger, &err)?;
                            return Err(err);
                        }
                    }
                }
            };

            if let Some(mut plaintext) = plaintext {
                let result =
                    cipher::encrypt_entry(&plaintext, new_passphrase, options.new_iterations);
                utils::secure_zero(&mut plaintext);
                let rewritten =
                    result.map_err(|e| SecurityError::rotation(id, "encrypt", &e.to_string()))?;
                store.write_atomic(id, &rewritten.to_bytes())?;
            }

            state.records_done += 1;
            self.persist_state(state)?;
        }
        Ok(())
    }

    /// Clears a failed rotation so a new attempt may start. The
    /// acknowledgement itself is audited.
    pub fn acknowledge_failure(&self, ledger: &AuditLedger) -> SecurityResult<()> {
        let state = self.load_state()?.ok_or_else(|| {
            SecurityError::invalid_parameter("rotation state", "failed", "idle")
        })?;
        if state.status != RotationStatus::Failed {
            return Err(SecurityError::invalid_parameter(
                "rotation state",
                "failed",
                status_name(state.status),
            ));
        }
        std::fs::remove_file(&self.state_path)?;
        ledger.append(
            "rotation_failure_acknowledged",
            &json!({ "failure": state.failure }),
            Severity::Warning,
            None,
        )?;
        log::info!("Rotation failure acknowledged, state cleared");
        Ok(())
    }

    fn fresh_state(
        &self,
        old_passphrase: &str,
        new_passphrase: &str,
        options: &RotationOptions,
    ) -> SecurityResult<RotationState> {
        if old_passphrase == new_passphrase {
            return Err(SecurityError::invalid_parameter(
                "new_passphrase",
                "different from the old passphrase",
                "identical",
            ));
        }
        let salt = kdf::generate_salt()?;
        let old_key = kdf::derive_key(old_passphrase, &salt, options.old_iterations)?;
        let new_key = kdf::derive_key(new_passphrase, &salt, options.new_iterations)?;
        Ok(RotationState {
            status: RotationStatus::InProgress,
            started_at: Utc::now(),
            records_total: 0,
            records_done: 0,
            old_fingerprint: kdf::fingerprint(&old_key),
            new_fingerprint: kdf::fingerprint(&new_key),
            fingerprint_salt: hex::encode(&salt),
            old_iterations: options.old_iterations,
            new_iterations: options.new_iterations,
            failure: None,
        })
    }

    fn check_resume_credentials(
        &self,
        state: &RotationState,
        old_passphrase: &str,
        new_passphrase: &str,
    ) -> SecurityResult<()> {
        let salt = hex::decode(&state.fingerprint_salt)
            .map_err(|_| SecurityError::malformed("rotation state has an invalid salt"))?;
        let old_key = kdf::derive_key(old_passphrase, &salt, state.old_iterations)?;
        let new_key = kdf::derive_key(new_passphrase, &salt, state.new_iterations)?;
        let old_ok = utils::constant_time_eq(
            kdf::fingerprint(&old_key).as_bytes(),
            state.old_fingerprint.as_bytes(),
        );
        let new_ok = utils::constant_time_eq(
            kdf::fingerprint(&new_key).as_bytes(),
            state.new_fingerprint.as_bytes(),
        );
        if !old_ok || !new_ok {
            return Err(SecurityError::invalid_parameter(
                "passphrases",
                "the pair the rotation started with",
                "a different pair",
            ));
        }
        Ok(())
    }

    fn mark_failed(
        &self,
        state: &mut RotationState,
        ledger: &AuditLedger,
        err: &SecurityError,
    ) -> SecurityResult<()> {
        state.status = RotationStatus::Failed;
        state.failure = Some(err.to_string());
        self.persist_state(state)?;
        ledger.append(
            "rotation_failed",
            &json!({
                "records_done": state.records_done,
                "records_total": state.records_total,
                "failure": err.to_string(),
            }),
            Severity::Error,
            None,
        )?;
        log::error!("Rotation failed: {}", err);
        Ok(())
    }

    fn load_state(&self) -> SecurityResult<Option<RotationState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&self.state_path)?;
        let state = serde_json::from_slice(&raw)
            .map_err(|_| SecurityError::malformed("rotation state file is not valid JSON"))?;
        Ok(Some(state))
    }

    fn persist_state(&self, state: &RotationState) -> SecurityResult<()> {
        write_atomic(&self.state_path, &serde_json::to_vec_pretty(state)?)
    }

    fn persist_metadata(&self, metadata: &RotationMetadata) -> SecurityResult<()> {
        write_atomic(&self.metadata_path, &serde_json::to_vec_pretty(metadata)?)
    }
}

fn status_name(status: RotationStatus) -> &'static str {
    match status {
        RotationStatus::Idle => "idle",
        RotationStatus::InProgress => "in_progress",
        RotationStatus::Verifying => "verifying",
        RotationStatus::Committed => "committed",
        RotationStatus::Failed => "failed",
    }
}

fn load_record(store: &dyn RecordStore, id: &str) -> SecurityResult<EncryptedRecord> {
    let raw = store.read(id)?;
    EncryptedRecord::from_bytes(&raw)
}

/// Copies every record's raw bytes into a timestamped directory under
/// `backup_dir`, alongside a manifest of SHA-256 digests.
fn backup_records(
    store: &dyn RecordStore,
    ids: &[String],
    backup_dir: &Path,
) -> SecurityResult<()> {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let target = backup_dir.join(format!("rotation-{}", stamp));
    std::fs::create_dir_all(&target)?;

    let mut files = Vec::with_capacity(ids.len());
    for id in ids {
        let raw = store.read(id)?;
        let name = format!("{}.enc", id);
        let path = target.join(&name);
        let mut file = File::create(&path)?;
        file.write_all(&raw)?;
        file.flush()?;
        file.sync_all()?;
        files.push(json!({
            "name": name,
            "sha256": hex::encode(Sha256::digest(&raw)),
        }));
    }

    let manifest = json!({
        "created_at": Utc::now().to_rfc3339(),
        "records": files,
    });
    write_atomic(
        &target.join("manifest.json"),
        &serde_json::to_vec_pretty(&manifest)?,
    )?;
    log::info!("Backed up {} records to {}", ids.len(), target.display());
    Ok(())
}

