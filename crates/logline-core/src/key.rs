//! Key handling
//!
//! Backends may return keys padded with NUL bytes (transaction scans in
//! particular prefix every key with an internal marker byte). All keys
//! leaving the repository go through [`sanitize_key`].

use chrono::{DateTime, Utc};

/// Reserved key holding the total-lines counter
pub const COUNTER_KEY: &str = "log_size";

/// Strip NUL padding from a raw backend key
pub fn sanitize_key(raw: &[u8]) -> String {
    let cleaned: Vec<u8> = raw.iter().copied().filter(|b| *b != 0).collect();
    String::from_utf8_lossy(&cleaned).into_owned()
}

/// Whether a raw backend key refers to the reserved counter
pub fn is_counter_key(raw: &[u8]) -> bool {
    sanitize_key(raw) == COUNTER_KEY
}

/// Derive a log-line key as `{source}_{creation nanos}`
///
/// Returns `None` when the timestamp cannot be expressed in nanoseconds
/// since the epoch (roughly outside the years 1677..2262).
pub fn derive_line_key(source: &str, created_at: DateTime<Utc>) -> Option<String> {
    created_at
        .timestamp_nanos_opt()
        .map(|nanos| format!("{source}_{nanos}"))
}
