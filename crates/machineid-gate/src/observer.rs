//! Observation hooks for gate progress.
//!
//! The gate controller reports every state transition and payload through a
//! [`GateObserver`]; rendering (log lines, console output, metrics) belongs to
//! the observer, not the protocol.

use tracing::{info, warn};

use crate::config::DeviceIdentity;
use crate::gate::{DenyReason, GateState, GateVerdict};
use crate::register::RegistrationOutcome;
use crate::validate::ValidationDecision;

/// Receives gate progress notifications. All methods default to no-ops.
pub trait GateObserver: Send + Sync {
    fn on_transition(&self, _from: GateState, _to: GateState) {}

    fn on_registration(&self, _device_id: &DeviceIdentity, _outcome: &RegistrationOutcome) {}

    fn on_validation(&self, _device_id: &DeviceIdentity, _decision: &ValidationDecision) {}

    fn on_verdict(&self, _device_id: &DeviceIdentity, _verdict: &GateVerdict) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl GateObserver for NoopObserver {}

/// Observer that emits `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl GateObserver for TracingObserver {
    fn on_transition(&self, from: GateState, to: GateState) {
        tracing::debug!(from = %from, to = %to, "gate transition");
    }

    fn on_registration(&self, device_id: &DeviceIdentity, outcome: &RegistrationOutcome) {
        if outcome.status.is_proceed_eligible()
            || outcome.status == crate::register::RegistrationStatus::LimitReached
        {
            info!(
                device_id = %device_id,
                status = %outcome.status,
                plan_tier = outcome.plan_tier.as_deref(),
                limit = outcome.limit,
                devices_used = outcome.devices_used,
                remaining = outcome.remaining,
                "registration summary"
            );
        } else {
            warn!(
                device_id = %device_id,
                status = %outcome.status,
                raw_status = outcome.raw_status.as_deref(),
                error_code = outcome.error_code,
                http_status = outcome.http_status,
                error = outcome.error_detail.as_deref(),
                "registration did not succeed"
            );
        }
    }

    fn on_validation(&self, device_id: &DeviceIdentity, decision: &ValidationDecision) {
        info!(
            device_id = %device_id,
            allowed = decision.allowed,
            code = decision.code.as_deref(),
            request_id = decision.request_id.as_deref(),
            error = decision.error_detail.as_deref(),
            "validation summary"
        );
    }

    fn on_verdict(&self, device_id: &DeviceIdentity, verdict: &GateVerdict) {
        match verdict {
            GateVerdict::Allowed => info!(device_id = %device_id, "execution allowed"),
            GateVerdict::Denied(DenyReason::LimitReached) => warn!(
                device_id = %device_id,
                "device limit reached for this plan, stopping"
            ),
            GateVerdict::Denied(DenyReason::ValidationDenied) => warn!(
                device_id = %device_id,
                "execution denied by hard gate, stopping"
            ),
            GateVerdict::Denied(DenyReason::RegistrationFailed) => tracing::error!(
                device_id = %device_id,
                "registration could not be confirmed, stopping"
            ),
        }
    }
}
