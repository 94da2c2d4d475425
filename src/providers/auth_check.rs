//! In-band auth failure detection.
//!
//! The dashboard API can answer HTTP 200 with an error payload when the
//! session has expired. This is a keyword heuristic: a message that merely
//! mentions "login" will also match.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static AUTH_ISSUE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)token|unauthorized|forbidden|auth|login|expired")
        .expect("auth issue pattern is valid")
});

const MESSAGE_FIELDS: &[&str] = &["error", "message", "detail", "errorMessage"];

/// Returns the offending message when a 2xx body looks like an auth failure
pub fn detect_auth_issue(body: &Value) -> Option<String> {
    let object = body.as_object()?;

    let top_level = MESSAGE_FIELDS
        .iter()
        .filter_map(|field| object.get(*field).and_then(Value::as_str));

    let listed = object
        .get("errors")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| match entry {
            Value::String(text) => Some(text.as_str()),
            Value::Object(fields) => fields.get("message").and_then(Value::as_str),
            _ => None,
        });

    top_level
        .chain(listed)
        .find(|text| AUTH_ISSUE_PATTERN.is_match(text))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn detects_unauthorized_error_field() {
        assert_eq!(
            detect_auth_issue(&json!({"error": "Unauthorized access"})).as_deref(),
            Some("Unauthorized access")
        );
    }

    #[test]
    fn checks_all_message_fields_case_insensitively() {
        assert!(detect_auth_issue(&json!({"message": "Session EXPIRED"})).is_some());
        assert!(detect_auth_issue(&json!({"detail": "please LOGIN again"})).is_some());
        assert!(detect_auth_issue(&json!({"errorMessage": "Forbidden"})).is_some());
    }

    #[test]
    fn inspects_errors_array_strings_and_objects() {
        assert_eq!(
            detect_auth_issue(&json!({"errors": ["rate limited", "bad token"]})).as_deref(),
            Some("bad token")
        );
        assert_eq!(
            detect_auth_issue(&json!({"errors": [{"code": 1}, {"message": "Not authenticated"}]}))
                .as_deref(),
            Some("Not authenticated")
        );
    }

    #[test]
    fn ignores_non_matching_and_non_object_bodies() {
        assert_eq!(detect_auth_issue(&json!({"error": "rate limited"})), None);
        assert_eq!(detect_auth_issue(&json!({"teamMemberSpend": []})), None);
        assert_eq!(detect_auth_issue(&json!(["unauthorized"])), None);
        assert_eq!(detect_auth_issue(&json!("token expired")), None);
        // Only string values count
        assert_eq!(detect_auth_issue(&json!({"error": {"auth": true}})), None);
    }

    #[test]
    fn nested_fields_are_not_inspected() {
        assert_eq!(
            detect_auth_issue(&json!({"data": {"error": "unauthorized"}})),
            None
        );
    }
}
