/*!
 * Attempt Guard
 *
 * Rate limiting and lockout for passphrase-bearing operations. Failures
 * are tracked per subject over two windows: a short window that imposes
 * exponential backoff and a temporary rate limit, and a long window that
 * escalates to a hard lockout. State is durable so restarting the
 * process does not reset an attacker's budget.
 */

mod guard;


pub use guard::AttemptGuard;
pub use guard::Decision;
pub use guard::Subject;
pub use guard::LONG_WINDOW_LIMIT;
pub use guard::LONG_WINDOW_SECS;
pub use guard::MAX_BACKOFF_SECS;
pub use guard::SHORT_WINDOW_LIMIT;
pub use guard::SHORT_WINDOW_SECS;
