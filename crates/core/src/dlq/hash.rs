use sha2::{Digest, Sha256};

/// SHA-256 hex digest of a payload's canonical JSON form.
///
/// Object keys serialize in sorted order, so two payloads that differ only
/// in key order hash the same.
pub fn payload_hash(payload: &serde_json::Value) -> String {
    let canonical = payload.to_string();
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_hex_sha256() {
        let hash = payload_hash(&json!({ "run_id": "r1" }));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_ignores_key_order() {
        let a: serde_json::Value = serde_json::from_str(r#"{"a":1,"b":{"x":1,"y":2}}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"b":{"y":2,"x":1},"a":1}"#).unwrap();
        assert_eq!(payload_hash(&a), payload_hash(&b));
        assert_ne!(payload_hash(&a), payload_hash(&json!({ "a": 2 })));
    }
}
