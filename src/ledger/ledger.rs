use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::sanitize::sanitize_value;
use crate::cipher::{self, EncryptedRecord};
use crate::error::{SecurityError, SecurityResult};
use crate::kdf::DerivedKey;

/// Chain hash the first entry links to. All zeroes by convention so a
/// verifier needs no out-of-band state to start walking the chain.
pub const GENESIS_CHAIN_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Event severity recorded alongside every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry payload, either clear JSON details or an encrypted record whose
/// ciphertext the chain hash covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum LedgerPayload {
    Clear(Value),
    Encrypted(EncryptedRecord),
}

/// One line in the ledger file, serialized as compact JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub sequence_no: u64,
    /// RFC 3339 timestamp, stored as the exact string that was hashed.
    pub timestamp: String,
    pub event_type: String,
    pub severity: Severity,
    pub payload: LedgerPayload,
    /// Hex SHA-256 of the serialized payload.
    pub payload_hash: String,
    /// Hex SHA-256 linking this entry to its predecessor.
    pub chain_hash: String,
}

/// A decoded ledger entry returned to callers. `details` is `Null` when
/// the payload was encrypted and no key was supplied.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub sequence_no: u64,
    pub timestamp: String,
    pub event_type: String,
    pub severity: Severity,
    pub details: Value,
    pub encrypted: bool,
}

/// Aggregate counts over a ledger, for operator review.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerReport {
    pub total_entries: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub events_by_severity: BTreeMap<String, u64>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

#[derive(Debug)]
struct Tail {
    next_sequence: u64,
    prev_chain_hash: String,
}

/// Append-only hash-chained audit log backed by a JSON-lines file.
#[derive(Debug)]
pub struct AuditLedger {
    path: PathBuf,
    tail: Mutex<Tail>,
}

impl AuditLedger {
    /// Opens the ledger at `path`, creating an empty file if none exists.
    ///
    /// Fails when the final line is torn (a crash mid-append); the file
    /// can be truncated back to its last good entry with [`recover`].
    ///
    /// [`recover`]: AuditLedger::recover
    pub fn open<P: AsRef<Path>>(path: P) -> SecurityResult<AuditLedger> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            File::create(&path)?.sync_all()?;
            log::info!("Created audit ledger at {}", path.display());
            return Ok(AuditLedger {
                path,
                tail: Mutex::new(Tail {
                    next_sequence: 0,
                    prev_chain_hash: GENESIS_CHAIN_HASH.to_string(),
                }),
            });
        }

        let lines = read_lines(&path)?;
        let mut tail = Tail {
            next_sequence: 0,
            prev_chain_hash: GENESIS_CHAIN_HASH.to_string(),
        };
        for (index, line) in lines.iter().enumerate() {
            match serde_json::from_str::<LedgerEntry>(line) {
                Ok(entry) => {
                    tail.next_sequence = entry.sequence_no + 1;
                    tail.prev_chain_hash = entry.chain_hash;
                }
                Err(_) if index == lines.len() - 1 => {
                    return Err(SecurityError::integrity(
                        "audit ledger ends in a torn entry; recover() truncates it",
                    ));
                }
                Err(_) => {
                    return Err(SecurityError::integrity(format!(
                        "audit ledger line {} is not a valid entry",
                        index
                    )));
                }
            }
        }
        log::info!(
            "Opened audit ledger at {} with {} entries",
            path.display(),
            tail.next_sequence
        );
        Ok(AuditLedger {
            path,
            tail: Mutex::new(tail),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries appended so far.
    pub fn entry_count(&self) -> SecurityResult<u64> {
        Ok(self.lock_tail()?.next_sequence)
    }

    /// Appends one event and returns its sequence number.
    ///
    /// Details are sanitized before leaving memory. When `key` is given
    /// the sanitized details are encrypted and the chain hash covers the
    /// ciphertext. If encryption fails the event still lands, in the
    /// clear, followed by an `encryption_degraded` warning entry, since a
    /// silently dropped audit event is worse than an unencrypted one.
    pub fn append(
        &self,
        event_type: &str,
        details: &Value,
        severity: Severity,
        key: Option<&DerivedKey>,
    ) -> SecurityResult<u64> {
        let sanitized = sanitize_value(details);
        let mut degraded = false;
        let payload = match key {
            Some(key) => {
                let plaintext = serde_json::to_vec(&sanitized)?;
                match cipher::encrypt(&plaintext, key) {
                    Ok(record) => LedgerPayload::Encrypted(record),
                    Err(err) => {
                        log::warn!(
                            "Audit payload encryption failed, writing in the clear: {}",
                            err
                        );
                        degraded = true;
                        LedgerPayload::Clear(sanitized)
                    }
                }
            }
            None => LedgerPayload::Clear(sanitized),
        };

        let mut tail = self.lock_tail()?;
        let sequence_no = self.append_locked(&mut tail, event_type, severity, payload)?;
        if degraded {
            self.append_locked(
                &mut tail,
                "encryption_degraded",
                Severity::Warning,
                LedgerPayload::Clear(json!({ "original_event": event_type })),
            )?;
        }
        Ok(sequence_no)
    }

    fn append_locked(
        &self,
        tail: &mut Tail,
        event_type: &str,
        severity: Severity,
        payload: LedgerPayload,
    ) -> SecurityResult<u64> {
        let sequence_no = tail.next_sequence;
        let timestamp = Utc::now().to_rfc3339();
        let payload_hash = hash_payload(&payload)?;
        let chain_hash = compute_chain_hash(
            &tail.prev_chain_hash,
            sequence_no,
            &timestamp,
            event_type,
            severity,
            &payload_hash,
        );
        let entry = LedgerEntry {
            sequence_no,
            timestamp,
            event_type: event_type.to_string(),
            severity,
            payload,
            payload_hash,
            chain_hash: chain_hash.clone(),
        };

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        file.sync_all()?;

        tail.next_sequence = sequence_no + 1;
        tail.prev_chain_hash = chain_hash;
        Ok(sequence_no)
    }

    /// Walks the whole chain from genesis. Returns `(true, None)` when
    /// every entry checks out, otherwise `(false, Some(n))` where `n` is
    /// the first sequence number that fails.
    pub fn verify(&self) -> SecurityResult<(bool, Option<u64>)> {
        let lines = read_lines(&self.path)?;
        let mut prev = GENESIS_CHAIN_HASH.to_string();
        for (index, line) in lines.iter().enumerate() {
            let index = index as u64;
            let entry: LedgerEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(_) => return Ok((false, Some(index))),
            };
            if entry.sequence_no != index {
                return Ok((false, Some(index)));
            }
            let payload_hash = hash_payload(&entry.payload)?;
            if payload_hash != entry.payload_hash {
                return Ok((false, Some(index)));
            }
            let expected = compute_chain_hash(
                &prev,
                entry.sequence_no,
                &entry.timestamp,
                &entry.event_type,
                entry.severity,
                &entry.payload_hash,
            );
            if expected != entry.chain_hash {
                return Ok((false, Some(index)));
            }
            prev = entry.chain_hash;
        }
        Ok((true, None))
    }

    /// Reads entries with sequence numbers in `[start, end]` inclusive.
    ///
    /// Encrypted payloads are decrypted when `key` is supplied; a key
    /// that fails to authenticate a payload is an integrity error.
    /// Without a key, encrypted events come back with null details.
    pub fn read_range(
        &self,
        start: u64,
        end: u64,
        key: Option<&DerivedKey>,
    ) -> SecurityResult<Vec<AuditEvent>> {
        let mut events = Vec::new();
        for entry in self.read_entries()? {
            if entry.sequence_no < start || entry.sequence_no > end {
                continue;
            }
            events.push(decode_entry(entry, key)?);
        }
        Ok(events)
    }

    /// Reads every entry, decrypting payloads when `key` is supplied.
    pub fn read_all(&self, key: Option<&DerivedKey>) -> SecurityResult<Vec<AuditEvent>> {
        self.read_range(0, u64::MAX, key)
    }

    /// Raw entries as stored, without payload decryption.
    pub fn read_entries(&self) -> SecurityResult<Vec<LedgerEntry>> {
        let lines = read_lines(&self.path)?;
        let mut entries = Vec::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            let entry: LedgerEntry = serde_json::from_str(line).map_err(|_| {
                SecurityError::integrity(format!(
                    "audit ledger line {} is not a valid entry",
                    index
                ))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Aggregate counts by event type and severity.
    pub fn report(&self) -> SecurityResult<LedgerReport> {
        let entries = self.read_entries()?;
        let mut events_by_type = BTreeMap::new();
        let mut events_by_severity = BTreeMap::new();
        for entry in &entries {
            *events_by_type.entry(entry.event_type.clone()).or_insert(0) += 1;
            *events_by_severity
                .entry(entry.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(LedgerReport {
            total_entries: entries.len() as u64,
            events_by_type,
            events_by_severity,
            first_timestamp: entries.first().map(|e| e.timestamp.clone()),
            last_timestamp: entries.last().map(|e| e.timestamp.clone()),
        })
    }

    /// Truncates a torn final entry left by a crash mid-append.
    ///
    /// Only the last line may be dropped. If the damage extends further
    /// back than that, this refuses and leaves the file for forensic
    /// review; earlier entries are never rewritten. Returns the number
    /// of bytes removed.
    pub fn recover<P: AsRef<Path>>(path: P) -> SecurityResult<u64> {
        let path = path.as_ref();
        let mut raw = Vec::new();
        File::open(path)?.read_to_end(&mut raw)?;

        // Byte offset just past the last entry that parses and chains.
        let mut good_end: u64 = 0;
        let mut prev = GENESIS_CHAIN_HASH.to_string();
        let mut expected_seq: u64 = 0;
        let mut bad_lines: u64 = 0;
        let mut offset: u64 = 0;
        for line in raw.split_inclusive(|&b| b == b'\n') {
            let len = line.len() as u64;
            let text = std::str::from_utf8(line.strip_suffix(b"\n").unwrap_or(line))
                .unwrap_or("");
            let valid = match serde_json::from_str::<LedgerEntry>(text) {
                Ok(entry) => {
                    entry.sequence_no == expected_seq
                        && hash_payload(&entry.payload)? == entry.payload_hash
                        && compute_chain_hash(
                            &prev,
                            entry.sequence_no,
                            &entry.timestamp,
                            &entry.event_type,
                            entry.severity,
                            &entry.payload_hash,
                        ) == entry.chain_hash
                        && {
                            prev = entry.chain_hash;
                            expected_seq += 1;
                            true
                        }
                }
                Err(_) => false,
            };
            if valid && bad_lines == 0 {
                good_end = offset + len;
            } else {
                bad_lines += 1;
            }
            offset += len;
        }

        if bad_lines > 1 {
            return Err(SecurityError::integrity(
                "audit ledger damage extends past the final entry; refusing to truncate",
            ));
        }
        let dropped = raw.len() as u64 - good_end;
        if dropped > 0 {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(good_end)?;
            file.sync_all()?;
            log::warn!(
                "Recovered audit ledger at {}: dropped {} torn bytes",
                path.display(),
                dropped
            );
        }
        Ok(dropped)
    }

    fn lock_tail(&self) -> SecurityResult<std::sync::MutexGuard<'_, Tail>> {
        self.tail
            .lock()
            .map_err(|_| SecurityError::Io("audit ledger tail lock poisoned".to_string()))
    }
}

fn decode_entry(entry: LedgerEntry, key: Option<&DerivedKey>) -> SecurityResult<AuditEvent> {
    let (details, encrypted) = match &entry.payload {
        LedgerPayload::Clear(value) => (value.clone(), false),
        LedgerPayload::Encrypted(record) => match key {
            Some(key) => {
                let plaintext = cipher::decrypt(record, key)?;
                (serde_json::from_slice(&plaintext)?, true)
            }
            None => (Value::Null, true),
        },
    };
    Ok(AuditEvent {
        sequence_no: entry.sequence_no,
        timestamp: entry.timestamp,
        event_type: entry.event_type,
        severity: entry.severity,
        details,
        encrypted,
    })
}

fn hash_payload(payload: &LedgerPayload) -> SecurityResult<String> {
    Ok(hex::encode(Sha256::digest(serde_json::to_vec(payload)?)))
}

fn compute_chain_hash(
    prev_chain_hash: &str,
    sequence_no: u64,
    timestamp: &str,
    event_type: &str,
    severity: Severity,
    payload_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prev_chain_hash.as_bytes());
    hasher.update(sequence_no.to_be_bytes());
    hasher.update(timestamp.as_bytes());
    hasher.update(event_type.as_bytes());
    hasher.update(severity.as_str().as_bytes());
    hasher.update(payload_hash.as_bytes());
    hex::encode(hasher.finalize())
}

fn read_lines(path: &Path) -> SecurityResult<Vec<String>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}
