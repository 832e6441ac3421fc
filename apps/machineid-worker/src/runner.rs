//! Gate-then-run: drive the device gate and launch the workload on ALLOWED.

use std::process::ExitStatus;

use machineid_gate::{Gate, GateSettings, EXIT_OK};
use tokio::process::Command;
use tracing::{info, warn};

use crate::cli::Args;
use crate::error::{WorkerError, WorkerResult, EXIT_INTERRUPTED};

/// Run the worker and return the process exit code.
pub async fn execute(args: Args) -> WorkerResult<i32> {
    let settings = args.load_settings(|key| std::env::var(key))?;

    if args.check_config {
        print_settings(&settings);
        return Ok(EXIT_OK);
    }

    let gate = Gate::new(settings)?;
    run_gated(&gate, &args.command).await
}

/// Run one gate invocation, then the workload if execution is allowed.
pub async fn run_gated(gate: &Gate, command: &[String]) -> WorkerResult<i32> {
    let report = gate.run().await;

    if !report.verdict.is_allowed() {
        info!(
            device_id = %gate.device_id(),
            verdict = %report.verdict,
            exit_code = report.exit_code(),
            "execution stopped by device gate"
        );
        return Ok(report.exit_code());
    }

    match command.split_first() {
        Some((program, args)) => run_workload(program, args).await,
        None => Ok(EXIT_OK),
    }
}

/// Spawn the workload and wait for it, forwarding Ctrl-C as a kill.
async fn run_workload(program: &str, args: &[String]) -> WorkerResult<i32> {
    info!(program, args = ?args, "starting workload");

    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| WorkerError::Spawn {
            program: program.to_string(),
            source,
        })?;

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|source| WorkerError::Wait {
                program: program.to_string(),
                source,
            })?;
            let code = exit_code_of(status);
            info!(program, exit_code = code, "workload finished");
            Ok(code)
        }
        _ = tokio::signal::ctrl_c() => {
            warn!(program, "interrupted, stopping workload");
            let _ = child.kill().await;
            Ok(EXIT_INTERRUPTED)
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(machineid_gate::EXIT_FATAL)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(machineid_gate::EXIT_FATAL)
}

/// Print the effective settings. The credential is shown by prefix only.
fn print_settings(settings: &GateSettings) {
    let config = &settings.config;
    println!("Configuration OK");
    println!("  org key:          {}", settings.credential.display_prefix());
    println!("  device id:        {}", settings.device_id);
    println!("  register URL:     {}", config.register_url());
    println!("  validate URL:     {}", config.validate_url());
    println!("  validate method:  {}", config.validate_method);
    println!("  validate delay:   {}ms", config.validate_delay.as_millis());
    println!("  request timeout:  {}s", config.request_timeout.as_secs());
    println!("  validate retries: {}", config.validate_retry.max_retries);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_workload_exit_code_propagates() {
        assert_eq!(run_workload("sh", &sh("exit 0")).await.unwrap(), 0);
        assert_eq!(run_workload("sh", &sh("exit 3")).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_workload_killed_by_signal() {
        let code = run_workload("sh", &sh("kill -9 $$")).await.unwrap();
        assert_eq!(code, 128 + 9);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_workload("machineid-worker-no-such-program", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Spawn { .. }));
        assert_eq!(err.exit_code(), 1);
    }
}
