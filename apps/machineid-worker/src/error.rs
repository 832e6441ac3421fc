//! Worker error types and exit codes

use machineid_gate::{ConfigError, GateError};
use thiserror::Error;

/// Exit codes for the worker
/// - 0: Expected stop (allowed, limit reached, validation denied)
/// - 1: Registration or transport failure
/// - 2: Configuration error
///
/// When a workload runs, its own exit status is propagated instead.
pub type WorkerResult<T> = Result<T, WorkerError>;

/// Exit code for configuration errors.
pub const EXIT_CONFIG: i32 = 2;

/// Exit code when the workload was interrupted by Ctrl-C.
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Failed to start workload '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to wait for workload '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkerError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::Config(_) => EXIT_CONFIG,
            WorkerError::Gate(GateError::Config(_)) => EXIT_CONFIG,
            WorkerError::Gate(_) => machineid_gate::EXIT_FATAL,
            WorkerError::Spawn { .. } | WorkerError::Wait { .. } => machineid_gate::EXIT_FATAL,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {}", self);
        } else {
            eprintln!("Error: {}", self);
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {}", suggestion);
            } else {
                eprintln!("\nSuggestion: {}", suggestion);
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            WorkerError::Config(ConfigError::MissingVar(_)) => {
                Some("Set MACHINEID_ORG_KEY in the environment or in a .env file.")
            }
            WorkerError::Spawn { .. } => Some("Check that the workload command is on PATH."),
            _ => None,
        }
    }
}
