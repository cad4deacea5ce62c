use serde_json::Value;
use sha2::{Digest, Sha256};

/// Computes a stable content fingerprint for a prompt: the hex SHA-256
/// digest of its canonical JSON serialization (keys sorted recursively, no
/// incidental whitespace). Two prompts that are canonically equal always
/// fingerprint the same, regardless of who submitted them — per-user
/// scoping is the dedup key's job, not the fingerprint's.
pub fn fingerprint_prompt(prompt: &Value) -> String {
    let canonical = canonicalize(prompt);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let parts: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{:?}:{}", k, canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}
