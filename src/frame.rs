//! Response frame classification.
//!
//! The gateway interleaves human-readable prefixes before the JSON body on
//! error and transaction replies, and sometimes returns nothing at all.
//! [`parse_frame`] normalizes every reply shape into a JSON object the
//! higher layers can introspect uniformly. Status and result frames are
//! heterogeneous, sparse, and change with PED firmware, so there is no
//! closed schema; the accessors below do optional, multi-spelling field
//! lookups over the dynamic tree.

use serde_json::{json, Map, Value};
use tracing::warn;

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Classify and normalize a raw gateway reply into a JSON object.
///
/// Rules, in order: empty/whitespace becomes `{}`; a leading `error` token
/// yields the embedded object when one parses, `{error: raw}` otherwise; a
/// leading `transaction` token is stripped up to the first `{`; anything
/// left is parsed as a JSON object, falling back to `{parseError, raw}`.
pub fn parse_frame(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Map::new());
    }

    if leading_token_is(trimmed, "error") {
        warn!(payload = %trimmed, "PED replied with an error frame");
        return match trimmed.find('{') {
            Some(pos) => match parse_object(&trimmed[pos..]) {
                Ok(frame) => frame,
                Err(message) => json!({ "error": trimmed, "parseError": message }),
            },
            None => json!({ "error": trimmed }),
        };
    }

    let body = if leading_token_is(trimmed, "transaction") {
        match trimmed.find('{') {
            Some(pos) => &trimmed[pos..],
            None => trimmed,
        }
    } else {
        trimmed
    };

    match parse_object(body) {
        Ok(frame) => frame,
        Err(message) => json!({ "parseError": message, "raw": raw }),
    }
}

fn leading_token_is(text: &str, token: &str) -> bool {
    text.split_whitespace().next() == Some(token)
}

fn parse_object(text: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("reply is valid JSON but not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Field accessors
// ---------------------------------------------------------------------------

/// First string value found under any of `keys`.
pub fn field_str<'a>(frame: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|key| frame.get(*key).and_then(Value::as_str))
}

/// First boolean value found under any of `keys`.
pub fn field_bool(frame: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| frame.get(*key).and_then(Value::as_bool))
}

/// True for `{}` and for anything that is not an object at all.
pub fn frame_is_empty(frame: &Value) -> bool {
    frame.as_object().map(Map::is_empty).unwrap_or(true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_become_empty_object() {
        assert_eq!(parse_frame(""), json!({}));
        assert_eq!(parse_frame("   \r\n"), json!({}));
    }

    #[test]
    fn test_error_prefix_with_embedded_object() {
        assert_eq!(parse_frame("error {\"x\":1}"), json!({"x": 1}));
    }

    #[test]
    fn test_error_prefix_without_object() {
        assert_eq!(parse_frame("error oops"), json!({"error": "error oops"}));
    }

    #[test]
    fn test_error_prefix_with_broken_object() {
        let frame = parse_frame("error {\"x\":");
        assert_eq!(frame["error"], "error {\"x\":");
        assert!(frame["parseError"].as_str().is_some());
    }

    #[test]
    fn test_transaction_prefix_is_stripped() {
        assert_eq!(parse_frame("transaction {\"y\":2}"), json!({"y": 2}));
    }

    #[test]
    fn test_plain_object_passes_through() {
        assert_eq!(parse_frame("{\"z\":3}"), json!({"z": 3}));
    }

    #[test]
    fn test_unparseable_reply_keeps_raw() {
        let frame = parse_frame("garbage <>");
        assert!(frame["parseError"].as_str().is_some());
        assert_eq!(frame["raw"], "garbage <>");
    }

    #[test]
    fn test_non_object_json_is_a_parse_failure() {
        let frame = parse_frame("42");
        assert!(frame["parseError"].as_str().is_some());
        assert_eq!(frame["raw"], "42");
    }

    #[test]
    fn test_field_str_accepts_either_spelling() {
        let frame = json!({"sourceId": "20240101000000001"});
        assert_eq!(
            field_str(&frame, &["sourceid", "sourceId"]),
            Some("20240101000000001")
        );
        let frame = json!({"sourceid": "20240101000000002"});
        assert_eq!(
            field_str(&frame, &["sourceid", "sourceId"]),
            Some("20240101000000002")
        );
    }

    #[test]
    fn test_field_bool_ignores_wrong_types() {
        let frame = json!({"complete": "true"});
        assert_eq!(field_bool(&frame, &["complete"]), None);
        let frame = json!({"complete": true});
        assert_eq!(field_bool(&frame, &["complete"]), Some(true));
    }

    #[test]
    fn test_frame_is_empty() {
        assert!(frame_is_empty(&json!({})));
        assert!(frame_is_empty(&json!(null)));
        assert!(!frame_is_empty(&json!({"inProgress": true})));
    }
}
