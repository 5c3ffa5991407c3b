use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{SecurityError, SecurityResult};
use crate::ledger::{AuditLedger, Severity};

/// Short window over which repeated failures trigger backoff and, at the
/// limit, a temporary rate limit.
pub const SHORT_WINDOW_SECS: i64 = 15 * 60;
pub const SHORT_WINDOW_LIMIT: usize = 5;

/// Long window over which failures escalate to a hard lockout.
pub const LONG_WINDOW_SECS: i64 = 24 * 60 * 60;
pub const LONG_WINDOW_LIMIT: usize = 10;

/// Ceiling on the exponential backoff delay.
pub const MAX_BACKOFF_SECS: u64 = 60;

/// Operation class the guard tracks independently. A burst of decrypt
/// failures must not block an operator from viewing the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Decrypt,
    Rotate,
    AuditView,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Decrypt => "decrypt",
            Subject::Rotate => "rotate",
            Subject::AuditView => "audit_view",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of consulting the guard before an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Proceed.
    Allowed,
    /// Proceed only after `wait_secs`; the previous failure's backoff has
    /// not elapsed yet.
    Delayed { wait_secs: u64 },
    /// The short window is saturated. Retry once `retry_after_secs` have
    /// passed and the oldest failure ages out.
    RateLimited { retry_after_secs: u64 },
    /// The long window is saturated. Blocked until `until`.
    LockedOut { until: DateTime<Utc> },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct GuardState {
    /// Failure timestamps per subject, oldest first.
    failures: BTreeMap<Subject, Vec<DateTime<Utc>>>,
    /// Successes clear the short window by moving this watermark; the
    /// long window deliberately ignores it.
    cleared_at: BTreeMap<Subject, DateTime<Utc>>,
}

/// Durable failure tracker enforcing backoff, rate limits and lockout.
#[derive(Debug)]
pub struct AttemptGuard {
    path: PathBuf,
    ledger: Option<Arc<AuditLedger>>,
    state: Mutex<GuardState>,
}

impl AttemptGuard {
    /// Opens the guard, loading prior state from `path` if present.
    /// Events are mirrored to `ledger` when one is supplied.
    pub fn open<P: AsRef<Path>>(
        path: P,
        ledger: Option<Arc<AuditLedger>>,
    ) -> SecurityResult<AttemptGuard> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let raw = std::fs::read(&path)?;
            serde_json::from_slice(&raw).map_err(|_| {
                SecurityError::malformed("attempt guard state file is not valid JSON")
            })?
        } else {
            GuardState::default()
        };
        Ok(AttemptGuard {
            path,
            ledger,
            state: Mutex::new(state),
        })
    }

    /// Evaluates whether an attempt against `subject` may proceed now.
    /// Consulting the guard never mutates state.
    pub fn check(&self, subject: Subject) -> SecurityResult<Decision> {
        let state = self.lock_state()?;
        Ok(decide(&state, subject, Utc::now()))
    }

    /// Like [`check`] but maps refusals onto errors, for call sites that
    /// gate an operation with `?`.
    ///
    /// [`check`]: AttemptGuard::check
    pub fn enforce(&self, subject: Subject) -> SecurityResult<()> {
        match self.check(subject)? {
            Decision::Allowed => Ok(()),
            Decision::Delayed { wait_secs } => Err(SecurityError::RateLimited {
                retry_after_secs: wait_secs,
            }),
            Decision::RateLimited { retry_after_secs } => {
                Err(SecurityError::RateLimited { retry_after_secs })
            }
            Decision::LockedOut { until } => Err(SecurityError::LockedOut { until }),
        }
    }

    /// Records a failed attempt and returns the decision a caller would
    /// now face. Escalations are written to the ledger.
    pub fn record_failure(&self, subject: Subject) -> SecurityResult<Decision> {
        self.record_failure_inner(subject, Utc::now())
    }

    /// Test hook for back-dating failures without sleeping through
    /// real windows.
    #[cfg(test)]
    pub fn record_failure_at(
        &self,
        subject: Subject,
        when: DateTime<Utc>,
    ) -> SecurityResult<Decision> {
        self.record_failure_inner(subject, when)
    }

    fn record_failure_inner(
        &self,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> SecurityResult<Decision> {
        let mut state = self.lock_state()?;
        let before = decide(&state, subject, now);
        state.failures.entry(subject).or_default().push(now);
        prune(&mut state, now);
        self.persist(&state)?;
        let after = decide(&state, subject, now);
        drop(state);

        self.log_event(
            "auth_failure",
            json!({ "subject": subject.as_str() }),
            Severity::Warning,
        );
        match (before, after) {
            (Decision::LockedOut { .. }, _) => {}
            (_, Decision::LockedOut { until }) => {
                log::warn!("Subject {} locked out until {}", subject, until);
                self.log_event(
                    "locked_out",
                    json!({ "subject": subject.as_str(), "until": until.to_rfc3339() }),
                    Severity::Critical,
                );
            }
            (Decision::RateLimited { .. }, _) => {}
            (_, Decision::RateLimited { retry_after_secs }) => {
                self.log_event(
                    "rate_limited",
                    json!({
                        "subject": subject.as_str(),
                        "retry_after_secs": retry_after_secs,
                    }),
                    Severity::Warning,
                );
            }
            _ => {}
        }
        Ok(after)
    }

    /// Records a successful attempt. Clears the short window for the
    /// subject; the long window keeps counting so an attacker cannot
    /// launder failures with an occasional success. The success is
    /// appended to the ledger alongside the failures around it.
    pub fn record_success(&self, subject: Subject) -> SecurityResult<()> {
        let mut state = self.lock_state()?;
        let now = Utc::now();
        state.cleared_at.insert(subject, now);
        prune(&mut state, now);
        self.persist(&state)?;
        drop(state);

        self.log_event(
            "auth_success",
            json!({ "subject": subject.as_str() }),
            Severity::Info,
        );
        Ok(())
    }

    /// Operator override clearing all tracked failures for `subject`.
    /// The reset itself is an auditable event.
    pub fn operator_reset(&self, subject: Subject) -> SecurityResult<()> {
        let mut state = self.lock_state()?;
        state.failures.remove(&subject);
        state.cleared_at.remove(&subject);
        self.persist(&state)?;
        drop(state);
        log::info!("Operator reset attempt history for subject {}", subject);
        self.log_event(
            "guard_reset",
            json!({ "subject": subject.as_str() }),
            Severity::Warning,
        );
        Ok(())
    }

    /// Failures currently inside the long window for `subject`.
    pub fn failure_count(&self, subject: Subject) -> SecurityResult<usize> {
        let state = self.lock_state()?;
        let cutoff = Utc::now() - Duration::seconds(LONG_WINDOW_SECS);
        Ok(state
            .failures
            .get(&subject)
            .map(|f| f.iter().filter(|t| **t > cutoff).count())
            .unwrap_or(0))
    }

    fn persist(&self, state: &GuardState) -> SecurityResult<()> {
        crate::utils::write_atomic(&self.path, &serde_json::to_vec_pretty(state)?)
    }

    fn log_event(&self, event_type: &str, details: serde_json::Value, severity: Severity) {
        if let Some(ledger) = &self.ledger {
            if let Err(err) = ledger.append(event_type, &details, severity, None) {
                log::error!("Failed to record {} in audit ledger: {}", event_type, err);
            }
        }
    }

    fn lock_state(&self) -> SecurityResult<MutexGuard<'_, GuardState>> {
        self.state
            .lock()
            .map_err(|_| SecurityError::Io("attempt guard state lock poisoned".to_string()))
    }
}

fn decide(state: &GuardState, subject: Subject, now: DateTime<Utc>) -> Decision {
    let empty = Vec::new();
    let failures = state.failures.get(&subject).unwrap_or(&empty);

    let long_cutoff = now - Duration::seconds(LONG_WINDOW_SECS);
    let long_window: Vec<&DateTime<Utc>> =
        failures.iter().filter(|t| **t > long_cutoff).collect();
    if long_window.len() >= LONG_WINDOW_LIMIT {
        if let Some(first) = long_window.first() {
            let until = **first + Duration::seconds(LONG_WINDOW_SECS);
            if until > now {
                return Decision::LockedOut { until };
            }
        }
    }

    let short_cutoff = now - Duration::seconds(SHORT_WINDOW_SECS);
    let watermark = state.cleared_at.get(&subject);
    let short_window: Vec<&DateTime<Utc>> = failures
        .iter()
        .filter(|t| **t > short_cutoff && watermark.map_or(true, |w| **t > *w))
        .collect();

    if short_window.len() >= SHORT_WINDOW_LIMIT {
        if let Some(oldest) = short_window.first() {
            let retry_at = **oldest + Duration::seconds(SHORT_WINDOW_SECS);
            return Decision::RateLimited {
                retry_after_secs: secs_until(now, retry_at),
            };
        }
    }

    if let Some(last) = short_window.last() {
        let backoff = backoff_secs(short_window.len());
        let ready_at = **last + Duration::seconds(backoff as i64);
        if ready_at > now {
            return Decision::Delayed {
                wait_secs: secs_until(now, ready_at),
            };
        }
    }

    Decision::Allowed
}

/// Seconds from `now` until `at`, rounded up so callers never retry a
/// moment too early.
fn secs_until(now: DateTime<Utc>, at: DateTime<Utc>) -> u64 {
    let ms = (at - now).num_milliseconds().max(0);
    ((ms + 999) / 1000).max(1) as u64
}

/// Backoff after the n-th consecutive short-window failure, in seconds:
/// 1, 2, 4, 8, ... capped at [`MAX_BACKOFF_SECS`].
pub(crate) fn backoff_secs(failures: usize) -> u64 {
    if failures == 0 {
        return 0;
    }
    let exp = (failures - 1).min(63) as u32;
    1u64.checked_shl(exp).unwrap_or(u64::MAX).min(MAX_BACKOFF_SECS)
}

/// Drops failures older than the long window; nothing outside it can
/// ever influence a decision again.
fn prune(state: &mut GuardState, now: DateTime<Utc>) {
    let cutoff = now - Duration::seconds(LONG_WINDOW_SECS);
    for failures in state.failures.values_mut() {
        failures.retain(|t| *t > cutoff);
    }
    state.failures.retain(|_, f| !f.is_empty());
}
