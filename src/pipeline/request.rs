//! Inbound request decoding.
//!
//! Accepts a bare request object or a proxy envelope whose `body` holds the
//! request as a JSON string, optionally base64-encoded.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value as Json;

use crate::error::{Result, TripSqlError};
use crate::query::{Question, QuestionFilters};

#[derive(Debug, Default, Deserialize)]
struct RequestBody {
    question: Option<String>,
    /// Short form of `question`.
    q: Option<String>,
    #[serde(default)]
    filters: Option<QuestionFilters>,
    request_id: Option<String>,
}

/// Decodes a raw request into a [`Question`].
///
/// Fails with `InvalidRequest` for malformed JSON, an undecodable envelope,
/// bad filters, or a missing question.
pub fn parse_request(raw: &str) -> Result<Question> {
    let value: Json = serde_json::from_str(raw)
        .map_err(|e| TripSqlError::invalid_request(format!("Request is not valid JSON: {}", e)))?;
    let body = unwrap_envelope(value)?;

    let body: RequestBody = serde_json::from_value(body)
        .map_err(|e| TripSqlError::invalid_request(format!("Malformed request: {}", e)))?;

    let text = body
        .question
        .or(body.q)
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| TripSqlError::invalid_request("Missing 'question' field"))?;

    let question = Question::with_filters(text, body.filters.unwrap_or_default())?;
    Ok(match body.request_id {
        Some(id) if !id.trim().is_empty() => question.with_request_id(id),
        _ => question,
    })
}

/// Returns the request object, decoding a proxy `body` if present.
fn unwrap_envelope(value: Json) -> Result<Json> {
    let Some(body) = value.get("body") else {
        return Ok(value);
    };

    let text = match body {
        Json::String(s) => s.clone(),
        Json::Object(_) => return Ok(body.clone()),
        Json::Null => return Ok(Json::Object(Default::default())),
        _ => return Err(TripSqlError::invalid_request("Envelope 'body' must be a string")),
    };

    let encoded = value
        .get("isBase64Encoded")
        .and_then(Json::as_bool)
        .unwrap_or(false);
    let text = if encoded {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| TripSqlError::invalid_request(format!("Invalid base64 body: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|_| TripSqlError::invalid_request("Base64 body is not UTF-8"))?
    } else {
        text
    };

    if text.trim().is_empty() {
        return Ok(Json::Object(Default::default()));
    }
    serde_json::from_str(&text)
        .map_err(|e| TripSqlError::invalid_request(format!("Envelope body is not valid JSON: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_bare_request() {
        let q = parse_request(r#"{"question": "trips by borough"}"#).unwrap();
        assert_eq!(q.text, "trips by borough");
        assert!(q.filters.is_empty());
        assert!(q.request_id.starts_with("req-"));
    }

    #[test]
    fn test_short_form_and_filters() {
        let q = parse_request(
            r#"{"q": "revenue by hour", "request_id": "abc",
                "filters": {"borough": "Manhattan", "date_range": {"start": "2024-08-01", "end": "2024-08-01"}}}"#,
        )
        .unwrap();
        assert_eq!(q.text, "revenue by hour");
        assert_eq!(q.request_id, "abc");
        assert_eq!(q.filters.borough.as_deref(), Some("Manhattan"));
        assert!(q.filters.date_range.unwrap().is_single_day());
    }

    #[test]
    fn test_string_envelope() {
        let q = parse_request(r#"{"body": "{\"question\": \"tips by borough\"}"}"#).unwrap();
        assert_eq!(q.text, "tips by borough");
    }

    #[test]
    fn test_base64_envelope() {
        let body = STANDARD.encode(r#"{"question": "tips by borough"}"#);
        let raw = serde_json::json!({"body": body, "isBase64Encoded": true}).to_string();
        let q = parse_request(&raw).unwrap();
        assert_eq!(q.text, "tips by borough");
    }

    #[test]
    fn test_missing_question() {
        for raw in [r#"{}"#, r#"{"question": "  "}"#, r#"{"body": ""}"#, r#"{"body": null}"#] {
            let err = parse_request(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{}", raw);
            assert_eq!(err.message(), "Missing 'question' field");
        }
    }

    #[test]
    fn test_malformed_input() {
        let cases = [
            "not json",
            r#"{"body": "%%%", "isBase64Encoded": true}"#,
            r#"{"question": "x", "filters": {"date_range": {"start": "2024-13-01", "end": "2024-12-01"}}}"#,
            r#"{"body": 42}"#,
        ];
        for raw in cases {
            let err = parse_request(raw).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidRequest, "{}", raw);
        }
    }
}
