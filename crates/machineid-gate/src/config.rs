//! Gate configuration: authority endpoints, credentials and timing.

use std::fmt;
use std::time::Duration;

use reqwest::header::HeaderValue;

use crate::retry::RetryPolicy;

/// Default authority base URL.
pub const DEFAULT_BASE_URL: &str = "https://machineid.io";

/// Deterministic, non-identifying device identifier used when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "langchain:agent-01";

/// Register endpoint path, relative to the base URL.
pub const REGISTER_PATH: &str = "/api/v1/devices/register";

/// Validate endpoint path, relative to the base URL.
pub const VALIDATE_PATH: &str = "/api/v1/devices/validate";

/// Required prefix for organization keys.
pub const ORG_KEY_PREFIX: &str = "org_";

/// Number of leading credential characters that may be shown to operators.
const DISPLAY_PREFIX_LEN: usize = 12;

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Organization credential sent as `x-org-key` on every request.
///
/// Never printed in full: `Debug` is redacted and [`OrgCredential::display_prefix`]
/// shows only a short leading slice.
#[derive(Clone, PartialEq, Eq)]
pub struct OrgCredential(String);

impl OrgCredential {
    /// Parse a credential, requiring the `org_` prefix and a value that can be
    /// sent as an HTTP header.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ConfigError::MissingVar(ENV_ORG_KEY.into()));
        }
        if !raw.starts_with(ORG_KEY_PREFIX) {
            return Err(ConfigError::InvalidValue(
                ENV_ORG_KEY.into(),
                format!("must start with {ORG_KEY_PREFIX}"),
            ));
        }
        if HeaderValue::from_str(raw).is_err() {
            return Err(ConfigError::InvalidValue(
                ENV_ORG_KEY.into(),
                "contains characters not allowed in an HTTP header".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// The raw secret, for the request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First few characters followed by an ellipsis.
    pub fn display_prefix(&self) -> String {
        let prefix: String = self.0.chars().take(DISPLAY_PREFIX_LEN).collect();
        format!("{prefix}…")
    }
}

impl fmt::Debug for OrgCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrgCredential({})", self.display_prefix())
    }
}

/// Caller-chosen identifier naming one worker instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidValue(
                ENV_DEVICE_ID.into(),
                "device identifier must not be empty".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self(DEFAULT_DEVICE_ID.to_string())
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the validate endpoint is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidateMethod {
    /// `POST` with a JSON body (canonical).
    #[default]
    Post,
    /// `GET` with `deviceId` as a query parameter.
    Get,
}

impl std::str::FromStr for ValidateMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "post" => Ok(Self::Post),
            "get" => Ok(Self::Get),
            other => Err(ConfigError::InvalidValue(
                ENV_VALIDATE_METHOD.into(),
                format!("expected 'post' or 'get', got '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ValidateMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => f.write_str("POST"),
            Self::Get => f.write_str("GET"),
        }
    }
}

/// Endpoint and timing configuration for one gate.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Authority base URL, without a trailing slash.
    pub base_url: String,

    /// Register endpoint path.
    pub register_path: String,

    /// Validate endpoint path.
    pub validate_path: String,

    /// Request shape for the validate call.
    pub validate_method: ValidateMethod,

    /// Deadline applied to every HTTP request.
    pub request_timeout: Duration,

    /// Wait between a successful register and the validate call.
    /// `Duration::ZERO` skips the wait.
    pub validate_delay: Duration,

    /// Retry policy for the validate call only.
    pub validate_retry: RetryPolicy,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            register_path: REGISTER_PATH.to_string(),
            validate_path: VALIDATE_PATH.to_string(),
            validate_method: ValidateMethod::Post,
            request_timeout: Duration::from_secs(10),
            validate_delay: Duration::from_secs(1),
            validate_retry: RetryPolicy::disabled(),
        }
    }
}

impl GateConfig {
    /// Default configuration pointed at another authority.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base_url(&base_url.into()),
            ..Self::default()
        }
    }

    pub fn register_url(&self) -> String {
        format!("{}{}", self.base_url, self.register_path)
    }

    pub fn validate_url(&self) -> String {
        format!("{}{}", self.base_url, self.validate_path)
    }
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

pub const ENV_ORG_KEY: &str = "MACHINEID_ORG_KEY";
pub const ENV_DEVICE_ID: &str = "MACHINEID_DEVICE_ID";
pub const ENV_BASE_URL: &str = "MACHINEID_BASE_URL";
pub const ENV_VALIDATE_METHOD: &str = "MACHINEID_VALIDATE_METHOD";
pub const ENV_VALIDATE_DELAY_MS: &str = "MACHINEID_VALIDATE_DELAY_MS";
pub const ENV_TIMEOUT_SECS: &str = "MACHINEID_TIMEOUT_SECS";
pub const ENV_VALIDATE_RETRIES: &str = "MACHINEID_VALIDATE_RETRIES";

/// Everything a worker needs to run the gate.
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub credential: OrgCredential,
    pub device_id: DeviceIdentity,
    pub config: GateConfig,
}

impl GateSettings {
    /// Load settings from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load settings from a custom variable reader.
    ///
    /// Values are trimmed and blank values count as unset.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let read = |key: &str| -> Option<String> {
            reader(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let credential = read(ENV_ORG_KEY)
            .ok_or_else(|| ConfigError::MissingVar(ENV_ORG_KEY.into()))
            .and_then(|raw| OrgCredential::parse(&raw))?;

        let device_id = match read(ENV_DEVICE_ID) {
            Some(id) => DeviceIdentity::new(id)?,
            None => DeviceIdentity::default(),
        };

        let base_url = read(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base_url(&base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                ENV_BASE_URL.into(),
                format!("expected an http(s) URL, got '{base_url}'"),
            ));
        }

        let validate_method = read(ENV_VALIDATE_METHOD)
            .map(|v| v.parse::<ValidateMethod>())
            .transpose()?
            .unwrap_or_default();

        let validate_delay_ms = parse_number(&read, ENV_VALIDATE_DELAY_MS, 1000)?;
        let timeout_secs = parse_number(&read, ENV_TIMEOUT_SECS, 10)?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                ENV_TIMEOUT_SECS.into(),
                "timeout must be at least 1 second".into(),
            ));
        }
        let validate_retries = parse_number(&read, ENV_VALIDATE_RETRIES, 0)?;
        let validate_retries = u32::try_from(validate_retries).map_err(|e| {
            ConfigError::InvalidValue(ENV_VALIDATE_RETRIES.into(), e.to_string())
        })?;

        Ok(Self {
            credential,
            device_id,
            config: GateConfig {
                base_url,
                validate_method,
                request_timeout: Duration::from_secs(timeout_secs),
                validate_delay: Duration::from_millis(validate_delay_ms),
                validate_retry: RetryPolicy::new(validate_retries),
                ..GateConfig::default()
            },
        })
    }
}

fn parse_number<F>(read: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match read(key) {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue(key.into(), e.to_string())),
        None => Ok(default),
    }
}
