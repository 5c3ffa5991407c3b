//! End-to-end rotation interruption: a rotation cancelled partway
//! through must resume on the next attempt with no record lost and no
//! record left under the old passphrase.

use std::sync::Arc;

use tempfile::tempdir;

use custodian::cipher;
use custodian::guard::AttemptGuard;
use custodian::kdf::MIN_ITERATIONS;
use custodian::ledger::AuditLedger;
use custodian::rotation::{RotationCoordinator, RotationOptions, RotationStatus};
use custodian::store::{DirStore, RecordStore};
use custodian::utils::CancelFlag;
use custodian::SecurityError;

const OLD_PASS: &str = "ember glacier topaz meridian 3!";
const NEW_PASS: &str = "walnut cascade prism harbor 6?";
const RECORDS: usize = 47;
const CANCEL_AFTER: usize = 30;

/// Store wrapper that trips the cancel flag after a fixed number of
/// rewrites, standing in for a user closing the laptop mid-rotation.
struct InterruptingStore<'a> {
    inner: &'a mut DirStore,
    writes: usize,
    cancel: CancelFlag,
}

impl RecordStore for InterruptingStore<'_> {
    fn list_ids(&self) -> custodian::SecurityResult<Vec<String>> {
        self.inner.list_ids()
    }

    fn read(&self, id: &str) -> custodian::SecurityResult<Vec<u8>> {
        self.inner.read(id)
    }

    fn write_atomic(&mut self, id: &str, data: &[u8]) -> custodian::SecurityResult<()> {
        self.inner.write_atomic(id, data)?;
        self.writes += 1;
        if self.writes >= CANCEL_AFTER {
            self.cancel.cancel();
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> custodian::SecurityResult<()> {
        self.inner.remove(id)
    }
}

#[test]
fn test_interrupted_rotation_resumes_without_loss() {
    let dir = tempdir().unwrap();
    let mut store = DirStore::open(&dir.path().join("records")).unwrap();
    for i in 0..RECORDS {
        let record = cipher::encrypt_entry(
            format!("entry {} written before rotation", i).as_bytes(),
            OLD_PASS,
            MIN_ITERATIONS,
        )
        .unwrap();
        store
            .write_atomic(&format!("entry-{:03}", i), &record.to_bytes())
            .unwrap();
    }

    let ledger = Arc::new(AuditLedger::open(dir.path().join("audit.log")).unwrap());
    let guard = AttemptGuard::open(
        dir.path().join("auth_attempts.json"),
        Some(Arc::clone(&ledger)),
    )
    .unwrap();
    let coordinator = RotationCoordinator::new(
        dir.path().join("rotation_state.json"),
        dir.path().join("rotation_metadata.json"),
    );
    let options = RotationOptions {
        old_iterations: MIN_ITERATIONS,
        new_iterations: MIN_ITERATIONS,
        backup_dir: None,
    };

    // First run: interrupted after 30 records.
    let cancel = CancelFlag::new();
    let err = {
        let mut interrupting = InterruptingStore {
            inner: &mut store,
            writes: 0,
            cancel: cancel.clone(),
        };
        coordinator
            .rotate(
                &mut interrupting,
                &ledger,
                &guard,
                OLD_PASS,
                NEW_PASS,
                &options,
                &cancel,
            )
            .unwrap_err()
    };
    assert!(matches!(err, SecurityError::Cancelled));

    let state = coordinator.state().unwrap().unwrap();
    assert_eq!(state.status, RotationStatus::InProgress);
    assert_eq!(state.records_done, CANCEL_AFTER as u64);
    assert_eq!(state.records_total, RECORDS as u64);

    // Mid-resume the vault is split between the two passphrases, but
    // every single record still opens under exactly one of them.
    for id in store.list_ids().unwrap() {
        let record =
            custodian::EncryptedRecord::from_bytes(&store.read(&id).unwrap()).unwrap();
        let old = cipher::decrypt_entry(&record, OLD_PASS, MIN_ITERATIONS);
        let new = cipher::decrypt_entry(&record, NEW_PASS, MIN_ITERATIONS);
        assert!(old.is_ok() != new.is_ok(), "record {} in limbo", id);
    }

    // Second run: resumes and finishes.
    let result = coordinator
        .rotate(
            &mut store,
            &ledger,
            &guard,
            OLD_PASS,
            NEW_PASS,
            &options,
            &CancelFlag::new(),
        )
        .unwrap();
    assert!(result.resumed);
    assert_eq!(result.records_total, RECORDS as u64);
    assert_eq!(
        result.records_rotated_this_run,
        (RECORDS - CANCEL_AFTER) as u64
    );
    assert_eq!(coordinator.status().unwrap(), RotationStatus::Idle);

    // Every record decrypts under the new passphrase with its original
    // contents, and none under the old one.
    for i in 0..RECORDS {
        let id = format!("entry-{:03}", i);
        let record =
            custodian::EncryptedRecord::from_bytes(&store.read(&id).unwrap()).unwrap();
        let plaintext = cipher::decrypt_entry(&record, NEW_PASS, MIN_ITERATIONS).unwrap();
        assert_eq!(
            plaintext,
            format!("entry {} written before rotation", i).as_bytes()
        );
        assert!(cipher::decrypt_entry(&record, OLD_PASS, MIN_ITERATIONS).is_err());
    }

    // Lifetime totals count every record exactly once.
    let metadata = coordinator.metadata().unwrap();
    assert_eq!(metadata.rotations_completed, 1);
    assert_eq!(metadata.records_rotated, RECORDS as u64);

    // The ledger tells the full story and its chain is intact.
    let report = ledger.report().unwrap();
    assert_eq!(report.events_by_type["rotation_started"], 1);
    assert_eq!(report.events_by_type["rotation_cancelled"], 1);
    assert_eq!(report.events_by_type["rotation_resumed"], 1);
    assert_eq!(report.events_by_type["rotation_completed"], 1);
    let (ok, first_bad) = ledger.verify().unwrap();
    assert!(ok);
    assert_eq!(first_bad, None);
}
