//! Uniform `{status_code, json|text}` envelope for upstream responses.

use crate::http::RawResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Text cap for data-fetch endpoints
pub const DATA_TEXT_LIMIT: usize = 2000;
/// Text cap for human-inspection (debug) endpoints
pub const DEBUG_TEXT_LIMIT: usize = 800;

/// Exactly one of `json` / `text` is set; the other is left out when serialized.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ResponseEnvelope {
    pub fn json(status_code: u16, value: Value) -> Self {
        Self {
            status_code,
            json: Some(value),
            text: None,
        }
    }

    pub fn text(status_code: u16, text: String) -> Self {
        Self {
            status_code,
            json: None,
            text: Some(text),
        }
    }
}

/// Never fails: a body that is not JSON becomes truncated text. Any JSON
/// value lands in `json`, including a bare `null`.
pub fn normalize(raw: &RawResponse, text_limit: usize) -> ResponseEnvelope {
    let status_code = raw.status.as_u16();
    match serde_json::from_slice::<Value>(&raw.body) {
        Ok(value) => ResponseEnvelope::json(status_code, value),
        Err(_) => ResponseEnvelope::text(status_code, truncate_chars(&raw.text(), text_limit)),
    }
}

/// First `limit` characters of `s` (characters, not bytes).
pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::raw_response;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let envelope = normalize(&raw_response(200, r#"{"a":1}"#), DATA_TEXT_LIMIT);
        assert_eq!(envelope, ResponseEnvelope::json(200, json!({"a": 1})));

        // The text field is left out entirely
        let serialized = serde_json::to_value(&envelope).unwrap();
        assert_eq!(serialized, json!({"status_code": 200, "json": {"a": 1}}));
    }

    #[test]
    fn test_text_body() {
        let envelope = normalize(&raw_response(502, "hello"), DATA_TEXT_LIMIT);
        assert_eq!(envelope, ResponseEnvelope::text(502, "hello".into()));

        let serialized = serde_json::to_value(&envelope).unwrap();
        assert_eq!(serialized, json!({"status_code": 502, "text": "hello"}));
    }

    #[test]
    fn test_null_body_is_json() {
        let envelope = normalize(&raw_response(200, "null"), DATA_TEXT_LIMIT);
        assert_eq!(envelope, ResponseEnvelope::json(200, Value::Null));

        let serialized = serde_json::to_string(&envelope).unwrap();
        assert_eq!(serialized, r#"{"status_code":200,"json":null}"#);

        let scalar = normalize(&raw_response(200, "42"), DATA_TEXT_LIMIT);
        assert_eq!(scalar, ResponseEnvelope::json(200, json!(42)));
    }

    #[test]
    fn test_empty_body_is_text() {
        let envelope = normalize(&raw_response(204, ""), DATA_TEXT_LIMIT);
        assert_eq!(envelope, ResponseEnvelope::text(204, String::new()));
    }

    #[test]
    fn test_truncation_limits() {
        let body = "x".repeat(2500);

        let data = normalize(&raw_response(200, &body), DATA_TEXT_LIMIT);
        assert_eq!(data.text.unwrap().len(), 2000);

        let debug = normalize(&raw_response(200, &body), DEBUG_TEXT_LIMIT);
        assert_eq!(debug.text.unwrap().len(), 800);
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("", 3), "");
    }
}
