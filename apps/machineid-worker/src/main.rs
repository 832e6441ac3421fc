//! machineid-worker - device-gated workload launcher
//!
//! Registers this worker's device identifier with the authority, asks for an
//! explicit allow decision, and only then runs the workload given after `--`.
//!
//! Exit codes: 0 expected stop, 1 registration failure, 2 configuration
//! error, otherwise the workload's own exit status.

use clap::Parser;

use machineid_worker::{logging, Args};

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    logging::init();

    let args = Args::parse();

    match machineid_worker::execute(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            e.print();
            std::process::exit(e.exit_code());
        }
    }
}
