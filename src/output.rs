//! JSON result envelope printed by every command
//!
//! `{"success": true, "data": ...}` on success,
//! `{"success": false, "error": "...", "code": "...", "hint": "..."}` on failure.

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Error;

/// Process exit code for a successful command
pub const EXIT_OK: i32 = 0;
/// Process exit code for any failure
pub const EXIT_FAILURE: i32 = 1;

/// Command outcome rendered as a JSON envelope
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
            hint: None,
        }
    }

    pub fn failure(err: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(err.to_string()),
            code: Some(err.code()),
            hint: err.hint(),
        }
    }

    /// Failure that never reached the typed error layer (bad config file, etc.)
    pub fn message(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: None,
            hint: None,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.success {
            EXIT_OK
        } else {
            EXIT_FAILURE
        }
    }

    /// Pretty JSON; falls back to a hand-built object if serialization fails
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            json!({ "success": false, "error": format!("Failed to render output: {}", e) })
                .to_string()
        })
    }
}

impl From<crate::error::Result<Value>> for Envelope {
    fn from(result: crate::error::Result<Value>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(e) => Envelope::failure(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_shape() {
        let env = Envelope::ok(json!({ "address": "EQabc" }));
        let value: Value = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["data"]["address"], "EQabc");
        assert!(value.get("error").is_none());
        assert_eq!(env.exit_code(), 0);
    }

    #[test]
    fn test_failure_envelope_shape() {
        let env = Envelope::failure(&Error::DuplicateLabel("bob".into()));
        let value: Value = serde_json::from_str(&env.render()).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["code"], "duplicate_label");
        assert!(value["error"].as_str().unwrap().contains("bob"));
        assert!(value.get("data").is_none());
        assert_eq!(env.exit_code(), 1);
    }
}
