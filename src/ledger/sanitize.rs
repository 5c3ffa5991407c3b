/*!
 * Detail sanitization
 *
 * Event details written in the clear must not hand an attacker anything
 * beyond what the event type already reveals. The
 * sanitizer redacts filesystem paths under the home directory and
 * truncates oversized strings before anything reaches the ledger file.
 */

use serde_json::Value;

/// Longest string preserved verbatim in a sanitized detail field.
pub const MAX_DETAIL_STRING_LENGTH: usize = 256;

/// Returns a copy of `value` safe to persist in a clear ledger payload.
///
/// Applies recursively to arrays and objects. Object keys are left
/// untouched since event detail keys are produced by this crate, not by
/// callers relaying user content.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn sanitize_string(s: &str) -> String {
    let mut out = redact_home(s);
    if out.chars().count() > MAX_DETAIL_STRING_LENGTH {
        out = out.chars().take(MAX_DETAIL_STRING_LENGTH).collect();
        out.push_str("...[truncated]");
    }
    out
}

/// Replaces occurrences of the user's home directory with `~` so ledger
/// lines never pin a username or mount layout.
fn redact_home(s: &str) -> String {
    match dirs::home_dir() {
        Some(home) => {
            let home = home.to_string_lossy();
            if home.is_empty() || home == "/" {
                s.to_string()
            } else {
                s.replace(home.as_ref(), "~")
            }
        }
        None => s.to_string(),
    }
}
