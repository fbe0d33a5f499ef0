//! Cache keys derived from an operation name and its parameters.

use std::fmt::{self, Write};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::FlowError;

/// Deterministic cache key for one `(operation, params)` pair
///
/// Two fingerprints are equal iff the operation names are identical and the
/// parameters are deep-equal irrespective of object key order. The operation
/// name is part of both the hashed material and the equality check, so
/// distinct operations never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    operation: Arc<str>,
    hash: [u8; 32],
}

impl Fingerprint {
    /// Fingerprints any value that serializes to JSON
    pub fn new<P>(operation: &str, params: &P) -> Result<Self, FlowError>
    where
        P: Serialize + ?Sized,
    {
        let value =
            serde_json::to_value(params).map_err(|e| FlowError::InvalidParams(e.to_string()))?;
        Self::from_value(operation, &value)
    }

    /// Fingerprints an already built JSON value
    pub fn from_value(operation: &str, params: &Value) -> Result<Self, FlowError> {
        if operation.is_empty() {
            return Err(FlowError::InvalidOperation);
        }

        let mut hasher = Sha256::new();
        hasher.update(operation.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(operation.as_bytes());
        hasher.update(b"\n");
        hasher.update(canonical_json(params).as_bytes());

        let mut hash = [0u8; 32];
        hash.copy_from_slice(&hasher.finalize());

        Ok(Fingerprint {
            operation: operation.into(),
            hash,
        })
    }

    /// The operation this key belongs to
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Lower-case hex of the SHA-256 digest
    pub fn digest_hex(&self) -> String {
        let mut hex = String::with_capacity(64);
        for b in &self.hash {
            // writing into a String cannot fail
            let _ = write!(hex, "{b:02x}");
        }
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.operation, self.digest_hex())
    }
}

/// Serializes a JSON value with object keys sorted at every level
///
/// Arrays keep their order and scalars use serde_json's own formatting, so
/// the output is stable regardless of how the map was built.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
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

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({
            "b": 2,
            "a": {"z": [3, {"y": true, "x": null}], "c": "text"},
        });

        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"text","z":[3,{"x":null,"y":true}]},"b":2}"#
        );
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let mut first = serde_json::Map::new();
        first.insert("a".to_string(), json!(1));
        first.insert("b".to_string(), json!(2));
        let mut second = serde_json::Map::new();
        second.insert("b".to_string(), json!(2));
        second.insert("a".to_string(), json!(1));

        let first = Fingerprint::from_value("op", &Value::Object(first)).unwrap();
        let second = Fingerprint::from_value("op", &Value::Object(second)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_array_order_matters() {
        let first = Fingerprint::new("op", &json!([1, 2])).unwrap();
        let second = Fingerprint::new("op", &json!([2, 1])).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_operations_never_collide() {
        let params = json!({"x": 1});
        let a = Fingerprint::new("opA", &params).unwrap();
        let b = Fingerprint::new("opB", &params).unwrap();
        assert_ne!(a, b);
        assert_ne!(a.digest_hex(), b.digest_hex());

        // length-delimiting keeps "ab" + "c..." apart from "a" + "bc..."
        let c = Fingerprint::new("ab", &json!("c")).unwrap();
        let d = Fingerprint::new("a", &json!("bc")).unwrap();
        assert_ne!(c.digest_hex(), d.digest_hex());
    }

    #[test]
    fn test_display_and_digest_shape() {
        let fingerprint = Fingerprint::new("dailyVerse", &json!({})).unwrap();
        let rendered = fingerprint.to_string();

        assert!(rendered.starts_with("dailyVerse:"));
        assert_eq!(fingerprint.digest_hex().len(), 64);
        assert!(fingerprint
            .digest_hex()
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(fingerprint.operation(), "dailyVerse");
    }

    #[test]
    fn test_digest_matches_documented_construction() {
        let params = json!({"b": [1, "two"], "a": 0.5});
        let fingerprint = Fingerprint::new("extract", &params).unwrap();

        let expected = Sha256::digest(br#"7:extract
{"a":0.5,"b":[1,"two"]}"#);
        let expected: String = expected.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(fingerprint.digest_hex(), expected);
    }

    #[test]
    fn test_empty_operation_is_rejected() {
        assert!(matches!(
            Fingerprint::new("", &json!({})),
            Err(FlowError::InvalidOperation)
        ));
    }

    #[test]
    fn test_unserializable_params_are_rejected() {
        let mut params = std::collections::HashMap::new();
        params.insert((1, 2), "tuple keys are not valid JSON object keys");

        assert!(matches!(
            Fingerprint::new("op", &params),
            Err(FlowError::InvalidParams(_))
        ));
    }
}
