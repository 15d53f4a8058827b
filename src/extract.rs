// src/extract.rs

use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Markdown code fence some models wrap their JSON in despite instructions.
const FENCE: &str = "```";

/// Key under which unparseable model output is kept.
pub const FALLBACK_KEY: &str = "description";

/// Outcome of reading one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// The response decoded to a JSON object.
    Structured(Map<String, Value>),
    /// The response was not a JSON object. Holds the raw text, untouched.
    Fallback(String),
}

impl Extraction {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback(_))
    }

    /// Object view of the extraction. A fallback becomes `{"description": <raw text>}`
    /// so the model's answer is never thrown away.
    pub fn to_raw_object(&self) -> Map<String, Value> {
        match self {
            Extraction::Structured(obj) => obj.clone(),
            Extraction::Fallback(text) => {
                let mut obj = Map::new();
                obj.insert(FALLBACK_KEY.to_string(), Value::String(text.clone()));
                obj
            }
        }
    }
}

/// Decode a model response into a JSON object, stripping a surrounding code fence.
///
/// Single attempt: anything that is not a JSON object after fence stripping is
/// returned as [`Extraction::Fallback`].
pub fn extract(raw_text: &str) -> Extraction {
    let body = strip_fences(raw_text);

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(obj)) => {
            debug!(keys = obj.len(), "Model response decoded as JSON object");
            Extraction::Structured(obj)
        }
        Ok(other) => {
            warn!(kind = json_kind(&other), "Model returned JSON that is not an object, keeping raw text");
            Extraction::Fallback(raw_text.to_string())
        }
        Err(e) => {
            warn!(error = %e, chars = raw_text.len(), "Model response is not JSON, keeping raw text");
            Extraction::Fallback(raw_text.to_string())
        }
    }
}

/// Strip a leading fence (with its optional language tag) and a trailing fence.
/// Text without fences comes back trimmed but otherwise unchanged.
fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();

    if let Some(rest) = body.strip_prefix(FENCE) {
        // language tag, e.g. ```json
        let tag_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        body = &rest[tag_len..];
    }

    if let Some(rest) = body.strip_suffix(FENCE) {
        body = rest;
    }

    body.trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(obj) => obj,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_bare_json_object() {
        let text = r#"{"vendor_name": "Acme Co", "total_amount": "12.00"}"#;
        assert_eq!(
            extract(text),
            Extraction::Structured(object(json!({"vendor_name": "Acme Co", "total_amount": "12.00"})))
        );
    }

    #[test]
    fn test_json_fence_is_stripped() {
        let text = "```json\n{\"invoice_number\": \"INV-1\"}\n```";
        assert_eq!(
            extract(text),
            Extraction::Structured(object(json!({"invoice_number": "INV-1"})))
        );
    }

    #[test]
    fn test_plain_and_uppercase_fences() {
        for text in [
            "```\n{\"a\": 1}\n```",
            "```JSON\n{\"a\": 1}\n```",
            "  ```json {\"a\": 1}```  \n",
        ] {
            assert_eq!(extract(text), Extraction::Structured(object(json!({"a": 1}))), "{text:?}");
        }
    }

    #[test]
    fn test_one_sided_fence() {
        assert_eq!(
            extract("```json\n{\"a\": 1}"),
            Extraction::Structured(object(json!({"a": 1})))
        );
        assert_eq!(
            extract("{\"a\": 1}\n```"),
            Extraction::Structured(object(json!({"a": 1})))
        );
    }

    #[test]
    fn test_prose_falls_back_to_raw_text() {
        let text = "Sorry, I could not read this bill.";
        let extraction = extract(text);
        assert!(extraction.is_fallback());
        assert_eq!(extraction.to_raw_object(), object(json!({"description": text})));
    }

    #[test]
    fn test_fallback_keeps_untrimmed_text() {
        let text = "  ```json\nnot json at all\n```  ";
        assert_eq!(extract(text), Extraction::Fallback(text.to_string()));
    }

    #[test]
    fn test_json_inside_prose_is_not_hunted_for() {
        let text = "Here you go: {\"a\": 1}";
        assert_eq!(extract(text), Extraction::Fallback(text.to_string()));
    }

    #[test]
    fn test_non_object_json_falls_back() {
        for text in ["[1, 2, 3]", "\"just a string\"", "42", "null"] {
            assert_eq!(extract(text), Extraction::Fallback(text.to_string()), "{text:?}");
        }
    }

    #[test]
    fn test_empty_and_bare_fence() {
        assert_eq!(extract(""), Extraction::Fallback(String::new()));
        assert_eq!(extract("```"), Extraction::Fallback("```".to_string()));
    }
}
