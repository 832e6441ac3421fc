//! Gate controller: register, wait, validate, decide.
//!
//! ```text
//! START -> REGISTERING -> REGISTERED -> [WAITING] -> VALIDATING -> ALLOWED -> END
//!               |                                        |
//!               +----------------> DENIED <--------------+-------> END
//! ```
//!
//! Each [`Gate::run`] is a fresh, strictly sequential invocation. Nothing is
//! cached between runs and no state is re-entered within a run.

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::config::{DeviceIdentity, GateConfig, GateSettings, OrgCredential};
use crate::error::GateResult;
use crate::observer::{GateObserver, TracingObserver};
use crate::register::{register, RegistrationOutcome, RegistrationStatus};
use crate::transport::AuthorityClient;
use crate::validate::{validate, ValidationDecision};

/// Exit code for an expected stop (allowed, limit reached, denied).
pub const EXIT_OK: i32 = 0;

/// Exit code when registration could not be confirmed.
pub const EXIT_FATAL: i32 = 1;

/// Gate controller states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateState {
    Start,
    Registering,
    Registered,
    Waiting,
    Validating,
    Allowed,
    Denied,
    End,
}

impl GateState {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: GateState) -> bool {
        use GateState::*;
        matches!(
            (self, next),
            (Start, Registering)
                | (Registering, Registered)
                | (Registering, Denied)
                | (Registered, Waiting)
                | (Registered, Validating)
                | (Waiting, Validating)
                | (Validating, Allowed)
                | (Validating, Denied)
                | (Allowed, End)
                | (Denied, End)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Registering => "REGISTERING",
            Self::Registered => "REGISTERED",
            Self::Waiting => "WAIT",
            Self::Validating => "VALIDATING",
            Self::Allowed => "ALLOWED",
            Self::Denied => "DENIED",
            Self::End => "END",
        }
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the gate denied execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Plan device limit reached. Expected stop.
    LimitReached,
    /// Registration failed or returned an unknown status. Fatal.
    RegistrationFailed,
    /// Validation answered deny or could not be completed. Expected stop.
    ValidationDenied,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LimitReached => "limit_reached",
            Self::RegistrationFailed => "registration_failed",
            Self::ValidationDenied => "validation_denied",
        }
    }
}

/// Final gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Allowed,
    Denied(DenyReason),
}

impl GateVerdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Whether the stop is an error rather than an expected outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Denied(DenyReason::RegistrationFailed))
    }

    /// Process exit code for this verdict when no workload runs.
    pub fn exit_code(&self) -> i32 {
        if self.is_fatal() {
            EXIT_FATAL
        } else {
            EXIT_OK
        }
    }
}

impl fmt::Display for GateVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allowed => f.write_str("allowed"),
            Self::Denied(reason) => write!(f, "denied ({})", reason.as_str()),
        }
    }
}

/// Everything one gate run produced.
#[derive(Debug, Clone)]
pub struct GateReport {
    pub verdict: GateVerdict,
    /// Visited states in order, from `Start` to `End`.
    pub trace: Vec<GateState>,
    pub registration: RegistrationOutcome,
    /// Present only when validation was attempted.
    pub validation: Option<ValidationDecision>,
}

impl GateReport {
    /// `Allowed` or `Denied`.
    pub fn final_state(&self) -> GateState {
        if self.verdict.is_allowed() {
            GateState::Allowed
        } else {
            GateState::Denied
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.verdict.exit_code()
    }
}

/// Tracks the current state and reports transitions.
struct StateTracker<'a> {
    observer: &'a dyn GateObserver,
    trace: Vec<GateState>,
}

impl<'a> StateTracker<'a> {
    fn new(observer: &'a dyn GateObserver) -> Self {
        Self {
            observer,
            trace: vec![GateState::Start],
        }
    }

    fn current(&self) -> GateState {
        self.trace.last().copied().unwrap_or(GateState::Start)
    }

    fn advance(&mut self, to: GateState) {
        let from = self.current();
        debug_assert!(
            from.can_transition_to(to),
            "illegal gate transition {from} -> {to}"
        );
        self.trace.push(to);
        self.observer.on_transition(from, to);
    }
}

/// The device gate.
pub struct Gate {
    client: AuthorityClient,
    config: GateConfig,
    credential: OrgCredential,
    device_id: DeviceIdentity,
    observer: Arc<dyn GateObserver>,
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("config", &self.config)
            .field("credential", &self.credential)
            .field("device_id", &self.device_id)
            .finish_non_exhaustive()
    }
}

impl Gate {
    /// Build a gate from loaded settings, logging through `tracing`.
    pub fn new(settings: GateSettings) -> GateResult<Self> {
        let client = AuthorityClient::new(settings.config.request_timeout)?;
        Ok(Self::with_client(client, settings))
    }

    /// Build a gate around an existing client.
    #[must_use]
    pub fn with_client(client: AuthorityClient, settings: GateSettings) -> Self {
        Self {
            client,
            config: settings.config,
            credential: settings.credential,
            device_id: settings.device_id,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn GateObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn device_id(&self) -> &DeviceIdentity {
        &self.device_id
    }

    /// Run one full gate invocation.
    pub async fn run(&self) -> GateReport {
        let observer = self.observer.as_ref();
        let mut states = StateTracker::new(observer);

        info!(
            device_id = %self.device_id,
            base_url = %self.config.base_url,
            org_key = %self.credential.display_prefix(),
            "starting device gate"
        );

        states.advance(GateState::Registering);
        let registration = register(
            &self.client,
            &self.config,
            &self.credential,
            &self.device_id,
        )
        .await;
        observer.on_registration(&self.device_id, &registration);

        if !registration.is_proceed_eligible() {
            let reason = match registration.status {
                RegistrationStatus::LimitReached => DenyReason::LimitReached,
                _ => DenyReason::RegistrationFailed,
            };
            return self.finish(states, GateVerdict::Denied(reason), registration, None);
        }
        states.advance(GateState::Registered);

        if !self.config.validate_delay.is_zero() {
            states.advance(GateState::Waiting);
            tokio::time::sleep(self.config.validate_delay).await;
        }

        states.advance(GateState::Validating);
        let decision = validate(
            &self.client,
            &self.config,
            &self.credential,
            &self.device_id,
        )
        .await;
        observer.on_validation(&self.device_id, &decision);

        let verdict = if decision.allowed {
            GateVerdict::Allowed
        } else {
            GateVerdict::Denied(DenyReason::ValidationDenied)
        };
        self.finish(states, verdict, registration, Some(decision))
    }

    fn finish(
        &self,
        mut states: StateTracker<'_>,
        verdict: GateVerdict,
        registration: RegistrationOutcome,
        validation: Option<ValidationDecision>,
    ) -> GateReport {
        states.advance(if verdict.is_allowed() {
            GateState::Allowed
        } else {
            GateState::Denied
        });
        self.observer.on_verdict(&self.device_id, &verdict);
        states.advance(GateState::End);

        GateReport {
            verdict,
            trace: states.trace,
            registration,
            validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use GateState::*;
        assert!(Start.can_transition_to(Registering));
        assert!(Registering.can_transition_to(Registered));
        assert!(Registering.can_transition_to(Denied));
        assert!(Registered.can_transition_to(Waiting));
        assert!(Registered.can_transition_to(Validating));
        assert!(Waiting.can_transition_to(Validating));
        assert!(Validating.can_transition_to(Allowed));
        assert!(Validating.can_transition_to(Denied));
        assert!(Allowed.can_transition_to(End));
        assert!(Denied.can_transition_to(End));
    }

    #[test]
    fn test_illegal_transitions() {
        use GateState::*;
        // No shortcut to validation or to allowed.
        assert!(!Start.can_transition_to(Validating));
        assert!(!Registering.can_transition_to(Validating));
        assert!(!Registering.can_transition_to(Allowed));
        assert!(!Registered.can_transition_to(Allowed));
        // No re-entry.
        assert!(!Validating.can_transition_to(Registering));
        assert!(!Denied.can_transition_to(Validating));
        assert!(!Allowed.can_transition_to(Validating));
        assert!(!End.can_transition_to(Start));
    }

    #[test]
    fn test_exit_code_partition() {
        assert_eq!(GateVerdict::Allowed.exit_code(), 0);
        assert_eq!(GateVerdict::Denied(DenyReason::LimitReached).exit_code(), 0);
        assert_eq!(
            GateVerdict::Denied(DenyReason::ValidationDenied).exit_code(),
            0
        );
        assert_eq!(
            GateVerdict::Denied(DenyReason::RegistrationFailed).exit_code(),
            1
        );
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(GateVerdict::Allowed.to_string(), "allowed");
        assert_eq!(
            GateVerdict::Denied(DenyReason::LimitReached).to_string(),
            "denied (limit_reached)"
        );
    }

    #[test]
    fn test_state_tracker_records_trace() {
        let observer = crate::observer::NoopObserver;
        let mut tracker = StateTracker::new(&observer);
        tracker.advance(GateState::Registering);
        tracker.advance(GateState::Denied);
        tracker.advance(GateState::End);
        assert_eq!(
            tracker.trace,
            vec![
                GateState::Start,
                GateState::Registering,
                GateState::Denied,
                GateState::End
            ]
        );
    }
}
