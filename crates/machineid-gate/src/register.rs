//! Device registration.
//!
//! Registration is idempotent on the authority side: registering an already
//! known device answers `exists` and does not consume another plan slot. This
//! step sends exactly one request per call and never retries.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::config::{DeviceIdentity, GateConfig, OrgCredential};
use crate::error::GateError;
use crate::redaction::Redactor;
use crate::transport::{org_headers, AuthorityClient, RequestPayload};

/// Classified registration status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationStatus {
    /// Newly registered.
    Ok,
    /// Already registered; no plan slot consumed.
    Exists,
    /// The organization's plan has no free device slot.
    LimitReached,
    /// Anything else, including transport and parse failures.
    Error,
}

impl RegistrationStatus {
    /// Classify the wire `status` field.
    pub fn from_wire(status: Option<&str>) -> Self {
        match status {
            Some("ok") => Self::Ok,
            Some("exists") => Self::Exists,
            Some("limit_reached") => Self::LimitReached,
            _ => Self::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Exists => "exists",
            Self::LimitReached => "limit_reached",
            Self::Error => "error",
        }
    }

    /// Whether the gate may move on to validation.
    pub fn is_proceed_eligible(&self) -> bool {
        matches!(self, Self::Ok | Self::Exists)
    }
}

impl std::fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Register endpoint response body.
///
/// Every field is lenient: a value of the wrong type reads as absent, so an
/// odd summary field never changes how `status` is classified.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    #[serde(default, deserialize_with = "lenient")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    plan_tier: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    limit: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    devices_used: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    remaining: Option<u64>,
    #[serde(default, deserialize_with = "lenient")]
    handler: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    error: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Result of one registration call. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationOutcome {
    pub status: RegistrationStatus,
    /// The `status` string exactly as the authority sent it.
    pub raw_status: Option<String>,
    pub plan_tier: Option<String>,
    pub limit: Option<u64>,
    pub devices_used: Option<u64>,
    pub remaining: Option<u64>,
    pub handler: Option<String>,
    /// Machine-readable failure class when the call itself failed.
    pub error_code: Option<&'static str>,
    pub error_detail: Option<String>,
    /// HTTP status of a failed call, when the authority answered at all.
    pub http_status: Option<u16>,
}

impl RegistrationOutcome {
    /// Interpret a parsed register response body.
    ///
    /// Only a JSON object can confirm a registration.
    pub fn from_body(body: &Value) -> Self {
        if !body.is_object() {
            return Self::failed(
                "malformed_response",
                "register response is not a JSON object".to_string(),
                None,
            );
        }
        match serde_json::from_value::<RegisterResponse>(body.clone()) {
            Ok(resp) => Self::from_response(resp),
            Err(e) => Self::failed(
                "malformed_response",
                format!("unexpected register response shape: {e}"),
                None,
            ),
        }
    }

    /// Interpret a failed register call.
    ///
    /// A server error whose JSON body still reports `limit_reached` is
    /// classified as a plan-limit stop rather than a failure.
    pub fn from_error(err: &GateError) -> Self {
        if let GateError::Server {
            body: Some(body), ..
        } = err
        {
            let outcome = Self::from_body(body);
            if outcome.status == RegistrationStatus::LimitReached {
                return outcome;
            }
        }
        Self::failed(err.error_code(), err.to_string(), err.http_status())
    }

    fn from_response(resp: RegisterResponse) -> Self {
        let status = RegistrationStatus::from_wire(resp.status.as_deref());
        let error_detail = match status {
            RegistrationStatus::Error => Some(match (&resp.error, &resp.status) {
                (Some(message), _) => Redactor::new().redact_string(message),
                (None, Some(raw)) => format!("unexpected register status '{raw}'"),
                (None, None) => "register response has no status".to_string(),
            }),
            _ => None,
        };
        Self {
            status,
            raw_status: resp.status,
            plan_tier: resp.plan_tier,
            limit: resp.limit,
            devices_used: resp.devices_used,
            remaining: resp.remaining,
            handler: resp.handler,
            error_code: (status == RegistrationStatus::Error).then_some("registration_rejected"),
            error_detail,
            http_status: None,
        }
    }

    fn failed(code: &'static str, detail: String, http_status: Option<u16>) -> Self {
        Self {
            status: RegistrationStatus::Error,
            raw_status: None,
            plan_tier: None,
            limit: None,
            devices_used: None,
            remaining: None,
            handler: None,
            error_code: Some(code),
            error_detail: Some(detail),
            http_status,
        }
    }

    pub fn is_proceed_eligible(&self) -> bool {
        self.status.is_proceed_eligible()
    }
}

/// Register `device_id` with the authority.
///
/// Never fails: transport, server and parse errors are folded into an
/// outcome with [`RegistrationStatus::Error`].
pub async fn register(
    client: &AuthorityClient,
    config: &GateConfig,
    credential: &OrgCredential,
    device_id: &DeviceIdentity,
) -> RegistrationOutcome {
    let headers = match org_headers(credential, true) {
        Ok(headers) => headers,
        Err(e) => return RegistrationOutcome::from_error(&e),
    };
    let payload = RequestPayload::Json(serde_json::json!({ "deviceId": device_id.as_str() }));

    let outcome = match client
        .send(Method::POST, &config.register_url(), headers, payload)
        .await
    {
        Ok(resp) => RegistrationOutcome::from_body(&resp.body),
        Err(e) => RegistrationOutcome::from_error(&e),
    };

    debug!(
        device_id = %device_id,
        status = %outcome.status,
        error_code = outcome.error_code,
        "registration classified"
    );
    outcome
}
