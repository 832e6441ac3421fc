//! Mock device authority using wiremock for integration testing.
//!
//! Simulates the register and validate endpoints, including idempotent
//! registration against a plan device limit.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use machineid_gate::config::{REGISTER_PATH, VALIDATE_PATH};
use machineid_gate::{
    DeviceIdentity, Gate, GateConfig, GateObserver, GateSettings, GateState, GateVerdict,
    OrgCredential, RegistrationOutcome, ValidationDecision,
};

pub const TEST_ORG_KEY: &str = "org_test_0123456789abcdef";
pub const TEST_DEVICE_ID: &str = "worker:test-01";

/// Registry state shared with the idempotent register responder.
#[derive(Debug, Default)]
struct Registry {
    devices: BTreeSet<String>,
}

/// Register responder that behaves like the real authority: new devices
/// consume a slot, known devices answer `exists`, a full plan answers
/// `limit_reached`.
struct IdempotentRegister {
    registry: Arc<Mutex<Registry>>,
    limit: usize,
}

impl Respond for IdempotentRegister {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let device_id = serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|b| b.get("deviceId").and_then(Value::as_str).map(str::to_string));
        let Some(device_id) = device_id else {
            return ResponseTemplate::new(400).set_body_json(json!({"error": "deviceId required"}));
        };

        let mut registry = self.registry.lock().unwrap();
        let status = if registry.devices.contains(&device_id) {
            "exists"
        } else if registry.devices.len() >= self.limit {
            "limit_reached"
        } else {
            registry.devices.insert(device_id);
            "ok"
        };
        let used = registry.devices.len();

        ResponseTemplate::new(200).set_body_json(json!({
            "status": status,
            "planTier": "free",
            "limit": self.limit,
            "devicesUsed": used,
            "remaining": self.limit.saturating_sub(used),
            "handler": "register"
        }))
    }
}

/// A mock authority server.
pub struct MockAuthority {
    pub server: MockServer,
    registry: Arc<Mutex<Registry>>,
}

impl MockAuthority {
    pub async fn new() -> Self {
        Self {
            server: MockServer::start().await,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Settings pointing at this server, with no register/validate delay.
    pub fn settings(&self) -> GateSettings {
        GateSettings {
            credential: OrgCredential::parse(TEST_ORG_KEY).unwrap(),
            device_id: DeviceIdentity::new(TEST_DEVICE_ID).unwrap(),
            config: GateConfig {
                validate_delay: Duration::ZERO,
                ..GateConfig::with_base_url(self.uri())
            },
        }
    }

    pub fn gate(&self) -> Gate {
        Gate::new(self.settings()).unwrap()
    }

    /// Number of devices the idempotent register mock has accepted.
    pub fn registered_devices(&self) -> usize {
        self.registry.lock().unwrap().devices.len()
    }

    // =========================================================================
    // Register mocks
    // =========================================================================

    /// Mount the stateful, idempotent register endpoint.
    pub async fn mock_register_registry(&self, limit: usize) {
        Mock::given(method("POST"))
            .and(path(REGISTER_PATH))
            .and(header("x-org-key", TEST_ORG_KEY))
            .respond_with(IdempotentRegister {
                registry: Arc::clone(&self.registry),
                limit,
            })
            .mount(&self.server)
            .await;
    }

    /// Mount a register endpoint with a fixed response.
    pub async fn mock_register(&self, response: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path(REGISTER_PATH))
            .respond_with(response)
            .expect(1)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_register_json(&self, body: Value) {
        self.mock_register(ResponseTemplate::new(200).set_body_json(body))
            .await;
    }

    // =========================================================================
    // Validate mocks
    // =========================================================================

    /// Mount a POST validate endpoint with a fixed response, expected `times` times.
    pub async fn mock_validate(&self, response: ResponseTemplate, times: u64) {
        Mock::given(method("POST"))
            .and(path(VALIDATE_PATH))
            .respond_with(response)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    pub async fn mock_validate_json(&self, body: Value) {
        self.mock_validate(ResponseTemplate::new(200).set_body_json(body), 1)
            .await;
    }

    /// Assert validate is never called.
    pub async fn forbid_validate(&self) {
        Mock::given(path(VALIDATE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&self.server)
            .await;
    }

    /// Paths of all received requests, in arrival order.
    pub async fn request_paths(&self) -> Vec<String> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .map(|r| r.url.path().to_string())
            .collect()
    }
}

/// Observer that records every callback for assertions.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub transitions: Mutex<Vec<(GateState, GateState)>>,
    pub registrations: Mutex<Vec<RegistrationOutcome>>,
    pub validations: Mutex<Vec<ValidationDecision>>,
    pub verdicts: Mutex<Vec<GateVerdict>>,
}

impl GateObserver for RecordingObserver {
    fn on_transition(&self, from: GateState, to: GateState) {
        self.transitions.lock().unwrap().push((from, to));
    }

    fn on_registration(&self, _device_id: &DeviceIdentity, outcome: &RegistrationOutcome) {
        self.registrations.lock().unwrap().push(outcome.clone());
    }

    fn on_validation(&self, _device_id: &DeviceIdentity, decision: &ValidationDecision) {
        self.validations.lock().unwrap().push(decision.clone());
    }

    fn on_verdict(&self, _device_id: &DeviceIdentity, verdict: &GateVerdict) {
        self.verdicts.lock().unwrap().push(*verdict);
    }
}
