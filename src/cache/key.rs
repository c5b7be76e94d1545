//! Deterministic cache key derivation
//!
//! Keys look like `cache:{region}:{model}:{hash}` where `hash` is the first
//! 32 hex chars of a SHA-256 over the region, the model and the canonical
//! JSON of the request. Canonical JSON sorts object keys at every depth, so
//! two requests differing only in key order map to the same entry.

use crate::cache::types::{CacheKey, Channel};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest (128 bits)
pub const HASH_HEX_LEN: usize = 32;

/// An assistant request as seen by the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub region: String,
    pub model: String,
    pub prompt: String,
    /// Conversation context sent with the prompt
    #[serde(default)]
    pub context: Value,
    /// Only used for usage accounting, not part of the key
    #[serde(default)]
    pub channel: Channel,
}

impl RequestDescriptor {
    pub fn new(region: impl Into<String>, model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            model: model.into(),
            prompt: prompt.into(),
            context: Value::Null,
            channel: Channel::Web,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = channel;
        self
    }

    /// The part of the request that determines the answer
    pub fn canonical_request(&self) -> Value {
        json!({
            "prompt": self.prompt,
            "context": self.context,
        })
    }

    pub fn cache_key(&self) -> CacheKey {
        derive_key(&self.region, &self.model, &self.canonical_request())
    }
}

/// Derive the cache key for a request
pub fn derive_key(region: &str, model: &str, request: &Value) -> CacheKey {
    let region = region.to_uppercase();
    let canonical = canonical_json(request);

    let mut hasher = Sha256::new();
    for part in [region.as_str(), model, canonical.as_str()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    format!("cache:{}:{}:{}", region, model, &digest[..HASH_HEX_LEN])
}

/// Serialize `value` with object keys sorted at every level
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
