// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Serialize `value` to canonical JSON bytes: object keys recursively
/// sorted, array order preserved, compact separators.
pub fn canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    let raw = serde_json::to_value(value)?;
    serde_json::to_vec(&sort_object_keys(raw))
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Canonical bytes followed by SHA-256, hex encoded.
pub fn canonical_json_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = canonical_json_bytes(value)?;
    Ok(sha256_hex(&bytes))
}

fn sort_object_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map
                .into_iter()
                .map(|(k, v)| (k, sort_object_keys(v)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, v);
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_object_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::{canonical_json_bytes, canonical_json_hash};
    use serde_json::json;

    #[test]
    fn canonical_json_orders_object_keys_recursively() {
        let value = json!({
            "z": 1,
            "a": {"d": 4, "b": 2},
            "arr": [{"k2": 2, "k1": 1}],
        });

        let bytes = canonical_json_bytes(&value).expect("canonical bytes");
        let text = String::from_utf8(bytes).expect("utf8 json");
        assert_eq!(text, r#"{"a":{"b":2,"d":4},"arr":[{"k1":1,"k2":2}],"z":1}"#);
    }

    #[test]
    fn canonical_hash_ignores_input_key_order() {
        let h1 = canonical_json_hash(&json!({"b": 2, "a": 1})).expect("hash 1");
        let h2 = canonical_json_hash(&json!({"a": 1, "b": 2})).expect("hash 2");
        assert_eq!(h1, h2);
    }

    #[test]
    fn canonical_hash_preserves_array_order() {
        let h1 = canonical_json_hash(&json!(["a", "b"])).expect("hash 1");
        let h2 = canonical_json_hash(&json!(["b", "a"])).expect("hash 2");
        assert_ne!(h1, h2);
    }
}
