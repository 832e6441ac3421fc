//! Device validation: the hard gate.
//!
//! The authority's `allowed` field is the only thing that can open the gate,
//! and only a literal JSON `true` counts. Missing, null, non-boolean values
//! and every failure to obtain an answer produce a deny.

use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use crate::config::{DeviceIdentity, GateConfig, OrgCredential, ValidateMethod};
use crate::error::GateError;
use crate::redaction::Redactor;
use crate::transport::{org_headers, AuthorityClient, RequestPayload};

/// Result of one validation call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationDecision {
    pub allowed: bool,
    /// Decision code (`code`, falling back to `reason`).
    pub code: Option<String>,
    /// Authority correlation ID for audit.
    pub request_id: Option<String>,
    /// Machine-readable failure class when no decision was obtained.
    pub error_code: Option<&'static str>,
    pub error_detail: Option<String>,
}

impl ValidationDecision {
    /// Interpret a parsed validate response body.
    pub fn from_body(body: &Value) -> Self {
        let allowed = matches!(body.get("allowed"), Some(Value::Bool(true)));
        let code = string_field(body, &["code", "reason"]);
        let request_id = string_field(body, &["request_id", "requestId"]);
        let error_detail = body
            .get("error")
            .and_then(Value::as_str)
            .map(|e| Redactor::new().redact_string(e));

        Self {
            allowed,
            code,
            request_id,
            error_code: None,
            error_detail,
        }
    }

    /// A fail-closed decision for a call that produced no answer.
    ///
    /// The server's `code`/`reason` and `request_id` are kept when an error
    /// body carried them, but `allowed` is always false.
    pub fn from_error(err: &GateError) -> Self {
        let (code, request_id) = match err {
            GateError::Server {
                body: Some(body), ..
            } => (
                string_field(body, &["code", "reason"]),
                string_field(body, &["request_id", "requestId"]),
            ),
            _ => (None, None),
        };

        Self {
            allowed: false,
            code: code.or_else(|| Some(err.error_code().to_string())),
            request_id,
            error_code: Some(err.error_code()),
            error_detail: Some(err.to_string()),
        }
    }
}

fn string_field(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| body.get(*k).and_then(Value::as_str))
        .map(str::to_string)
}

/// Validate `device_id` with the authority.
///
/// Never fails: errors are folded into a deny decision. Transient failures
/// are retried according to `config.validate_retry`; a decision, allowed or
/// not, is returned as soon as one is received.
pub async fn validate(
    client: &AuthorityClient,
    config: &GateConfig,
    credential: &OrgCredential,
    device_id: &DeviceIdentity,
) -> ValidationDecision {
    let (method, payload, json_body) = match config.validate_method {
        ValidateMethod::Post => (
            Method::POST,
            RequestPayload::Json(serde_json::json!({ "deviceId": device_id.as_str() })),
            true,
        ),
        ValidateMethod::Get => (
            Method::GET,
            RequestPayload::Query(vec![("deviceId".to_string(), device_id.to_string())]),
            false,
        ),
    };

    let headers = match org_headers(credential, json_body) {
        Ok(headers) => headers,
        Err(e) => return ValidationDecision::from_error(&e),
    };
    let url = config.validate_url();

    let result = config
        .validate_retry
        .execute("validate", || {
            client.send(method.clone(), &url, headers.clone(), payload.clone())
        })
        .await;

    let decision = match result {
        Ok(resp) => ValidationDecision::from_body(&resp.body),
        Err(e) => ValidationDecision::from_error(&e),
    };

    debug!(
        device_id = %device_id,
        method = %config.validate_method,
        allowed = decision.allowed,
        code = decision.code.as_deref(),
        request_id = decision.request_id.as_deref(),
        "validation classified"
    );
    decision
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_allowed_true() {
        let d = ValidationDecision::from_body(&json!({
            "allowed": true,
            "code": "ok",
            "request_id": "r1"
        }));
        assert!(d.allowed);
        assert_eq!(d.code.as_deref(), Some("ok"));
        assert_eq!(d.request_id.as_deref(), Some("r1"));
        assert!(d.error_code.is_none());
    }

    #[test]
    fn test_reason_used_when_code_missing() {
        let d = ValidationDecision::from_body(&json!({"allowed": false, "reason": "revoked"}));
        assert!(!d.allowed);
        assert_eq!(d.code.as_deref(), Some("revoked"));
        assert!(d.request_id.is_none());
    }

    #[test]
    fn test_code_preferred_over_reason() {
        let d = ValidationDecision::from_body(&json!({
            "allowed": false,
            "code": "device_revoked",
            "reason": "revoked by admin"
        }));
        assert_eq!(d.code.as_deref(), Some("device_revoked"));
    }

    #[test]
    fn test_fail_closed_on_non_boolean_allowed() {
        for body in [
            json!({}),
            json!({"allowed": null}),
            json!({"allowed": "true"}),
            json!({"allowed": 1}),
            json!({"allowed": [true]}),
            json!({"allowed": {"value": true}}),
            json!({"status": "ok"}),
            json!([true]),
            json!(true),
            json!(null),
        ] {
            let d = ValidationDecision::from_body(&body);
            assert!(!d.allowed, "body {body} must not allow");
        }
    }

    #[test]
    fn test_from_error_is_deny() {
        let errors = [
            GateError::TransportTimeout(Duration::from_secs(10)),
            GateError::Transport("connection refused".into()),
            GateError::MalformedResponse {
                status: 200,
                body: "<html>".into(),
            },
            GateError::Server {
                status: 500,
                message: "HTTP 500".into(),
                body: None,
            },
        ];
        for err in &errors {
            let d = ValidationDecision::from_error(err);
            assert!(!d.allowed);
            assert_eq!(d.error_code, Some(err.error_code()));
            assert!(d.error_detail.is_some());
            assert_eq!(d.code.as_deref(), Some(err.error_code()));
        }
    }

    #[test]
    fn test_from_error_keeps_server_decision_fields() {
        // Even a 4xx body that claims allowed=true stays denied.
        let err = GateError::Server {
            status: 403,
            message: "forbidden".into(),
            body: Some(json!({"allowed": true, "code": "org_suspended", "request_id": "r9"})),
        };
        let d = ValidationDecision::from_error(&err);
        assert!(!d.allowed);
        assert_eq!(d.code.as_deref(), Some("org_suspended"));
        assert_eq!(d.request_id.as_deref(), Some("r9"));
    }
}
