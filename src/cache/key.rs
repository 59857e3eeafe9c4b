//! Cache key generation.
//!
//! A request's identity is the SHA-256 of its canonical JSON body. The same
//! key addresses both the response cache and the in-flight registry.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Hex-encoded SHA-256 digest identifying one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex chars, for log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Serialize `value` as compact JSON with object keys sorted at every depth.
///
/// Two bodies that differ only in key order canonicalize identically, whether
/// or not `serde_json` was built with `preserve_order`.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // cannot fail for a plain string
                match serde_json::to_string(key) {
                    Ok(quoted) => out.push_str(&quoted),
                    Err(_) => {
                        let _ = write!(out, "{:?}", key);
                    }
                }
                out.push(':');
                if let Some(v) = map.get(key.as_str()) {
                    write_canonical(v, out);
                }
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

/// Hashes canonical request bodies into [`CacheKey`]s.
///
/// An optional salt partitions the key space, e.g. per tenant or per
/// deployment, without touching the request bodies themselves.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    salt: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = Some(salt.into());
        self
    }

    /// Key for an already-canonical body.
    pub fn generate(&self, canonical_body: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        if let Some(ref salt) = self.salt {
            hasher.update(salt.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(canonical_body.as_bytes());
        let digest = hasher.finalize();
        let mut hash = String::with_capacity(64);
        for b in digest.iter() {
            let _ = write!(hash, "{:02x}", b);
        }
        CacheKey::new(hash)
    }

    pub fn generate_from_json(&self, body: &Value) -> CacheKey {
        self.generate(&canonical_json(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_keys_recursively() {
        let a = json!({"model": "m", "messages": [{"role": "user", "content": "hi"}], "temperature": 0.5});
        let b = json!({"temperature": 0.5, "messages": [{"content": "hi", "role": "user"}], "model": "m"});
        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            canonical_json(&a),
            r#"{"messages":[{"content":"hi","role":"user"}],"model":"m","temperature":0.5}"#
        );
    }

    #[test]
    fn test_canonical_json_keeps_array_order() {
        let a = json!([1, 2, 3]);
        let b = json!([3, 2, 1]);
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let v = json!({"q\"k": "line\nbreak"});
        assert_eq!(canonical_json(&v), r#"{"q\"k":"line\nbreak"}"#);
    }

    #[test]
    fn test_key_is_stable_hex_sha256() {
        let gen = CacheKeyGenerator::new();
        let k1 = gen.generate(r#"{"a":1}"#);
        let k2 = gen.generate(r#"{"a":1}"#);
        let k3 = gen.generate(r#"{"a":2}"#);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1.as_str().len(), 64);
        assert!(k1.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        // sha256("abc")
        assert_eq!(
            gen.generate("abc").as_str(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_salt_partitions_keys() {
        let plain = CacheKeyGenerator::new().generate("body");
        let salted = CacheKeyGenerator::new().with_salt("tenant-a").generate("body");
        let other = CacheKeyGenerator::new().with_salt("tenant-b").generate("body");
        assert_ne!(plain, salted);
        assert_ne!(salted, other);
    }

    #[test]
    fn test_short_prefix() {
        let key = CacheKeyGenerator::new().generate("abc");
        assert_eq!(key.short(), "ba7816bf8f01");
        assert_eq!(CacheKey::from("ab").short(), "ab");
    }
}
