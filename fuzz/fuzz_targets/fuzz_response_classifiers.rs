//! Fuzz target for the register and validate response classifiers.
//!
//! Arbitrary response bodies must never panic, and validation must only
//! allow execution when the body literally carries `"allowed": true`.
//!
//! Run with:
//! cargo +nightly fuzz run fuzz_response_classifiers -- -max_total_time=600

#![no_main]

use libfuzzer_sys::fuzz_target;
use machineid_gate::{RegistrationOutcome, RegistrationStatus, ValidationDecision};
use serde_json::Value;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let decision = ValidationDecision::from_body(&body);
    let literally_allowed = matches!(body.get("allowed"), Some(Value::Bool(true)));
    assert_eq!(decision.allowed, literally_allowed);

    let outcome = RegistrationOutcome::from_body(&body);
    if outcome.is_proceed_eligible() {
        let status = body.get("status").and_then(Value::as_str);
        assert!(matches!(status, Some("ok") | Some("exists")));
    }
    if outcome.status == RegistrationStatus::Error {
        assert!(outcome.error_code.is_some());
    }
});
