use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kv::KvStore;

/// Content-addressed artifact cache, keyed by prompt fingerprint rather
/// than job id: identical prompts from any user share one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub artifact: Value,
}

pub fn cache_key(fingerprint: &str) -> String {
    format!("cache:{fingerprint}")
}

/// Looks up a cached artifact by fingerprint. A malformed stored value is
/// treated as a miss (and logged) rather than surfaced as an error — the
/// caller just falls through to a fresh submission.
pub async fn cache_get(kv: &dyn KvStore, fingerprint: &str) -> Option<Value> {
    let bytes = match kv.get(&cache_key(fingerprint)).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, fingerprint, "cache lookup failed");
            return None;
        }
    };

    match serde_json::from_slice::<CacheEntry>(&bytes) {
        Ok(entry) => Some(entry.artifact),
        Err(e) => {
            tracing::warn!(error = %e, fingerprint, "malformed cache entry, treating as miss");
            None
        }
    }
}

/// Writes an artifact under its fingerprint. Idempotent: writing the same
/// fingerprint twice with the same (content-equivalent) artifact is a
/// no-op in effect.
pub async fn cache_put(kv: &dyn KvStore, fingerprint: &str, artifact: &Value, ttl: Duration) {
    let entry = CacheEntry {
        artifact: artifact.clone(),
    };
    let Ok(bytes) = serde_json::to_vec(&entry) else {
        return;
    };
    if let Err(e) = kv.set(&cache_key(fingerprint), bytes, ttl).await {
        tracing::warn!(error = %e, fingerprint, "cache write failed");
    }
}
