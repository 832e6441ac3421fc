//! Device-identity gate for machineid-controlled workers.
//!
//! Before a worker runs its workload it registers a stable device identifier
//! with the authority and then asks for an explicit allow decision. Only an
//! explicit `allowed: true` opens the gate; every other outcome, including
//! errors, keeps it closed.
//!
//! ```rust,ignore
//! use machineid_gate::{Gate, GateSettings};
//!
//! let gate = Gate::new(GateSettings::from_env()?)?;
//! let report = gate.run().await;
//! if !report.verdict.is_allowed() {
//!     std::process::exit(report.exit_code());
//! }
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod observer;
pub mod redaction;
pub mod register;
pub mod retry;
pub mod transport;
pub mod validate;

pub use config::{
    ConfigError, DeviceIdentity, GateConfig, GateSettings, OrgCredential, ValidateMethod,
};
pub use error::{GateError, GateResult};
pub use gate::{DenyReason, Gate, GateReport, GateState, GateVerdict, EXIT_FATAL, EXIT_OK};
pub use observer::{GateObserver, NoopObserver, TracingObserver};
pub use register::{RegistrationOutcome, RegistrationStatus};
pub use retry::RetryPolicy;
pub use transport::{AuthorityClient, NormalizedResponse, RequestPayload};
pub use validate::ValidationDecision;
