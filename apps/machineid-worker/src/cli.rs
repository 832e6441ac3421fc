//! Command-line arguments.
//!
//! Every flag overrides the matching `MACHINEID_*` environment variable. The
//! org credential is only read from the environment so it never shows up in
//! process listings.

use std::env::VarError;

use clap::Parser;
use machineid_gate::config::{
    ENV_BASE_URL, ENV_DEVICE_ID, ENV_TIMEOUT_SECS, ENV_VALIDATE_DELAY_MS, ENV_VALIDATE_METHOD,
    ENV_VALIDATE_RETRIES,
};
use machineid_gate::{ConfigError, GateSettings};

/// machineid-worker - run a workload only after the device gate allows it
#[derive(Debug, Parser)]
#[command(name = "machineid-worker")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Device identifier to register and validate
    #[arg(long)]
    pub device_id: Option<String>,

    /// Authority base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Validate request shape: post or get
    #[arg(long, value_name = "METHOD")]
    pub validate_method: Option<String>,

    /// Wait between register and validate, in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Validate immediately after registering
    #[arg(long, conflicts_with = "delay_ms")]
    pub skip_delay: bool,

    /// Per-request timeout, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Retries for transient validation failures
    #[arg(long, value_name = "N")]
    pub validate_retries: Option<u32>,

    /// Validate configuration and print the effective settings, then exit
    #[arg(long)]
    pub check_config: bool,

    /// Workload to run once the gate allows execution
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Args {
    /// Flag values as environment-variable overrides.
    pub fn env_overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(id) = &self.device_id {
            overrides.push((ENV_DEVICE_ID, id.clone()));
        }
        if let Some(url) = &self.base_url {
            overrides.push((ENV_BASE_URL, url.clone()));
        }
        if let Some(method) = &self.validate_method {
            overrides.push((ENV_VALIDATE_METHOD, method.clone()));
        }
        if self.skip_delay {
            overrides.push((ENV_VALIDATE_DELAY_MS, "0".to_string()));
        } else if let Some(ms) = self.delay_ms {
            overrides.push((ENV_VALIDATE_DELAY_MS, ms.to_string()));
        }
        if let Some(secs) = self.timeout_secs {
            overrides.push((ENV_TIMEOUT_SECS, secs.to_string()));
        }
        if let Some(retries) = self.validate_retries {
            overrides.push((ENV_VALIDATE_RETRIES, retries.to_string()));
        }
        overrides
    }

    /// Load gate settings from `env`, with flags taking precedence.
    pub fn load_settings<F>(&self, env: F) -> Result<GateSettings, ConfigError>
    where
        F: Fn(&str) -> Result<String, VarError>,
    {
        let overrides = self.env_overrides();
        GateSettings::from_reader(|key| {
            match overrides.iter().find(|(name, _)| *name == key) {
                Some((_, value)) => Ok(value.clone()),
                None => env(key),
            }
        })
    }
}
