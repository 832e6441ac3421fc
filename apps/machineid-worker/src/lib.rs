//! machineid-worker library: argument parsing, logging setup and the
//! gate-then-run workflow used by the `machineid-worker` binary.

pub mod cli;
pub mod error;
pub mod logging;
pub mod runner;

pub use cli::Args;
pub use error::{WorkerError, WorkerResult, EXIT_CONFIG};
pub use runner::{execute, run_gated};
