//! Recursive walker over JSON-shaped data.
//!
//! Strings are redacted through the stage-1 pattern engine; arrays and
//! objects recurse. Object keys are never redacted and keep their insertion
//! order. All other leaves pass through unchanged.

use serde_json::Value;

use veil_types::redaction::RedactionSummary;

use crate::patterns::PatternEngine;

impl PatternEngine {
    /// Walk `value`, masking every string it contains.
    ///
    /// Counts accumulate across the walk; types union. The output value has
    /// the same shape as the input: same object keys in the same order, same
    /// array lengths, same non-string leaves.
    pub fn redact_value(&self, value: Value) -> (Value, RedactionSummary) {
        let mut summary = RedactionSummary::new();
        let redacted = self.walk(value, &mut summary);
        (redacted, summary)
    }

    fn walk(&self, value: Value, summary: &mut RedactionSummary) -> Value {
        match value {
            Value::String(text) => {
                let (masked, part) = self.redact_string(&text);
                summary.absorb(part);
                Value::String(masked)
            }
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item, summary))
                    .collect(),
            ),
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, item)| (key, self.walk(item, summary)))
                    .collect(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn engine() -> PatternEngine {
        PatternEngine::new()
    }

    #[test]
    fn test_nested_strings_redacted() {
        let input = json!({
            "customer": {
                "email": "john@example.com",
                "notes": ["ssn is 123-45-6789", "clean"]
            },
            "total": 42
        });
        let (redacted, summary) = engine().redact_value(input);
        assert_eq!(
            redacted,
            json!({
                "customer": {
                    "email": "j***@example.com",
                    "notes": ["ssn is ***-**-****", "clean"]
                },
                "total": 42
            })
        );
        assert_eq!(summary.count, 2);
        assert!(summary.types.contains("email"));
        assert!(summary.types.contains("ssn"));
    }

    #[test]
    fn test_object_keys_never_redacted() {
        let input = json!({"john@example.com": "john@example.com"});
        let (redacted, summary) = engine().redact_value(input);
        let map = redacted.as_object().unwrap();
        assert!(map.contains_key("john@example.com"));
        assert_eq!(map["john@example.com"], "j***@example.com");
        assert_eq!(summary.count, 1);
    }

    #[test]
    fn test_key_order_preserved() {
        let input = json!({"zeta": "a@x.io", "alpha": 1, "mid": [true, null]});
        let (redacted, _) = engine().redact_value(input);
        let keys: Vec<&String> = redacted.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_non_string_leaves_untouched() {
        let input = json!([1, 2.5, true, null, {"n": 123456789}]);
        let (redacted, summary) = engine().redact_value(input.clone());
        assert_eq!(redacted, input);
        assert!(summary.is_empty());
    }

    // ── Property tests ────────────────────────────────────────

    fn arbitrary_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[ a-zA-Z0-9@.+\\-]{0,20}".prop_map(Value::from),
            Just(Value::from("john@example.com")),
            Just(Value::from("4111 1111 1111 1111")),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                proptest::collection::vec(("[a-z]{1,8}", inner), 0..4).prop_map(|pairs| {
                    let map: serde_json::Map<String, Value> = pairs.into_iter().collect();
                    Value::Object(map)
                }),
            ]
        })
    }

    /// Shape equality: same structure everywhere, string leaves allowed to
    /// differ.
    fn same_shape(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Object(left), Value::Object(right)) => {
                left.len() == right.len()
                    && left
                        .iter()
                        .zip(right.iter())
                        .all(|((lk, lv), (rk, rv))| lk == rk && same_shape(lv, rv))
            }
            (Value::Array(left), Value::Array(right)) => {
                left.len() == right.len()
                    && left.iter().zip(right.iter()).all(|(l, r)| same_shape(l, r))
            }
            (Value::String(_), Value::String(_)) => true,
            (left, right) => left == right,
        }
    }

    proptest! {
        #[test]
        fn prop_walk_preserves_shape(input in arbitrary_json()) {
            let engine = PatternEngine::new();
            let (redacted, _) = engine.redact_value(input.clone());
            prop_assert!(same_shape(&input, &redacted));
        }

        #[test]
        fn prop_walk_is_idempotent(input in arbitrary_json()) {
            let engine = PatternEngine::new();
            let (once, _) = engine.redact_value(input);
            let (twice, summary) = engine.redact_value(once.clone());
            prop_assert_eq!(twice, once);
            prop_assert_eq!(summary.count, 0);
        }
    }
}
