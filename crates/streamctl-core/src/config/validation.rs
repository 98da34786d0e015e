//! Unknown-key detection for `config.json`.
//!
//! Unknown keys are usually typos (`retry_delay_ms` for `retryDelayMs`) that
//! would otherwise fall back to defaults silently.

use serde_json::Value;
use tracing::warn;

const KNOWN_FIELDS: &[&str] = &["host", "port", "retryDelayMs", "processName"];

/// Log a warning for every top-level key the session does not read.
pub fn warn_unknown_fields(content: &str, source: &str) {
    for key in unknown_fields(content) {
        warn!("Ignoring unknown key '{key}' in {source}");
    }
}

fn unknown_fields(content: &str) -> Vec<String> {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(content) else {
        return Vec::new();
    };

    obj.keys()
        .filter(|key| !KNOWN_FIELDS.contains(&key.as_str()))
        .cloned()
        .collect()
}
