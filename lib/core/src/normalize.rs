//! Fingerprint normalisation
//!
//! Turns an untrusted JSON attribute bag into a [`FeatureVector`] and computes
//! the [`ContentHash`] of the raw submission.

use crate::feature::{Feature, FeatureKind, FeatureVector, INTRANET_IP_SEPARATOR};
use crate::{Error, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

const LIST_SEPARATOR: &str = ", ";

/// Digest of a raw submission, used only as a cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// SHA-256 over the canonical serialization of `raw`
    pub fn of(raw: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(raw, &mut canonical);
        Self(format!("{:x}", Sha256::digest(canonical.as_bytes())))
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }

    /// Key under which the cache indexes this hash
    pub fn cache_key(&self) -> String {
        format!("fp:{}", self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compact JSON with object keys sorted at every level
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
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
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

/// Output of [`Normalizer::normalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub features: FeatureVector,
    pub hash: ContentHash,
}

/// Schema-driven coercion of raw attribute bags
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalise a raw submission.
    ///
    /// Fails with [`Error::InvalidInput`] when `raw` is not an object or
    /// carries none of the recognised keys. Unknown keys are ignored for the
    /// feature vector but still take part in the hash.
    pub fn normalize(&self, raw: &Value) -> Result<Normalized> {
        let map = raw
            .as_object()
            .ok_or_else(|| Error::InvalidInput("body must be a JSON object".to_string()))?;

        let mut features = FeatureVector::default();
        let mut recognised = 0usize;

        for feature in Feature::ALL {
            let Some(value) = feature.wire_keys().iter().find_map(|k| map.get(*k)) else {
                continue;
            };
            recognised += 1;

            match feature.kind() {
                FeatureKind::Flag => features.set_flag(feature, coerce_flag(value)),
                _ => {
                    let text = match feature {
                        Feature::Fonts | Feature::Plugins => coerce_list(value, LIST_SEPARATOR),
                        Feature::IntranetIp => coerce_list(value, INTRANET_IP_SEPARATOR),
                        _ => coerce_text(value),
                    };
                    features.set_text(feature, text);
                }
            }
        }

        if recognised == 0 {
            return Err(Error::InvalidInput(
                "no recognised fingerprint attributes".to_string(),
            ));
        }

        Ok(Normalized {
            features,
            hash: ContentHash::of(raw),
        })
    }
}

fn coerce_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Object(_) | Value::Array(_) => String::new(),
    }
}

fn coerce_list(value: &Value, separator: &str) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_array() && !item.is_object())
            .map(coerce_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(separator),
        other => coerce_text(other),
    }
}

fn coerce_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => {
            let s = s.trim();
            s.eq_ignore_ascii_case("true") || s == "1" || s.eq_ignore_ascii_case("yes")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerces_declared_types() {
        let raw = json!({
            "userAgent": "Mozilla/5.0 (X11; Linux x86_64)",
            "platform": "Linux x86_64",
            "color_depth": 24,
            "screen_resolution": "1920x1080",
            "fonts": ["Arial", "DejaVu Sans", 12],
            "plugins": "PDF Viewer",
            "intranet_ip": ["10.0.0.2", "192.168.1.4"],
            "local_storage": true,
            "indexed_db": "1",
            "open_database": 0,
            "do_not_track": null
        });

        let n = Normalizer::new().normalize(&raw).unwrap();
        let f = &n.features;
        assert_eq!(f.user_agent, "Mozilla/5.0 (X11; Linux x86_64)");
        assert_eq!(f.color_depth, "24");
        assert_eq!(f.fonts, "Arial, DejaVu Sans, 12");
        assert_eq!(f.plugins, "PDF Viewer");
        assert_eq!(f.intranet_ip, "10.0.0.2||192.168.1.4");
        assert!(f.local_storage);
        assert!(f.indexed_db);
        assert!(!f.open_database);
        assert_eq!(f.do_not_track, "");
        assert_eq!(f.timezone, "");
    }

    #[test]
    fn test_snake_case_user_agent_wins() {
        let raw = json!({"userAgent": "camel", "user_agent": "snake"});
        let n = Normalizer::new().normalize(&raw).unwrap();
        assert_eq!(n.features.user_agent, "snake");
    }

    #[test]
    fn test_unexpected_shapes_become_empty() {
        let raw = json!({"platform": {"os": "linux"}, "timezone": ["UTC"], "language": "en-US"});
        let n = Normalizer::new().normalize(&raw).unwrap();
        assert_eq!(n.features.platform, "");
        assert_eq!(n.features.timezone, "");
        assert_eq!(n.features.language, "en-US");
    }

    #[test]
    fn test_rejects_non_objects_and_empty_bags() {
        let normalizer = Normalizer::new();
        assert!(matches!(normalizer.normalize(&json!([1, 2])), Err(Error::InvalidInput(_))));
        assert!(matches!(normalizer.normalize(&json!("ua")), Err(Error::InvalidInput(_))));
        assert!(matches!(normalizer.normalize(&json!({})), Err(Error::InvalidInput(_))));
        assert!(matches!(
            normalizer.normalize(&json!({"battery": 0.5})),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_hash_is_order_independent() {
        let a: Value = serde_json::from_str(r#"{"platform":"Win32","timezone":"UTC","x":{"b":1,"a":2}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"x":{"a":2,"b":1},"timezone":"UTC","platform":"Win32"}"#).unwrap();
        assert_eq!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn test_hash_covers_unknown_keys() {
        let a = json!({"platform": "Win32"});
        let b = json!({"platform": "Win32", "battery": 0.5});
        assert_ne!(ContentHash::of(&a), ContentHash::of(&b));
    }

    #[test]
    fn test_cache_key_format() {
        let hash = ContentHash::of(&json!({"platform": "Win32"}));
        let key = hash.cache_key();
        assert!(key.starts_with("fp:"));
        assert_eq!(key.len(), 3 + 64);
        assert!(hash.as_hex().chars().all(|c| c.is_ascii_hexdigit()));
    }
}
