//! HTTP transport to the device authority (reqwest-based).
//!
//! Every request carries the org credential in `x-org-key` and is bounded by
//! the configured deadline. Responses are normalized: a JSON body on a
//! success status is returned as-is, any status >= 400 becomes
//! [`GateError::Server`], and an unparseable success body becomes
//! [`GateError::MalformedResponse`]. Nothing is retried here.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use tracing::debug;

use crate::config::{ConfigError, OrgCredential, ENV_ORG_KEY};
use crate::error::{GateError, GateResult};
use crate::redaction::Redactor;

/// Header carrying the organization credential.
pub const ORG_KEY_HEADER: &str = "x-org-key";

/// Longest slice of a raw body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 2048;

/// Request payload: a JSON body or query parameters.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Json(serde_json::Value),
    Query(Vec<(String, String)>),
}

/// A successful (status < 400) JSON response.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Build the authentication headers for one request.
///
/// `Content-Type: application/json` is added only when a JSON body is sent.
pub fn org_headers(credential: &OrgCredential, json_body: bool) -> GateResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    let mut value = HeaderValue::from_str(credential.expose()).map_err(|_| {
        ConfigError::InvalidValue(
            ENV_ORG_KEY.into(),
            "contains characters not allowed in an HTTP header".into(),
        )
    })?;
    value.set_sensitive(true);
    headers.insert(ORG_KEY_HEADER, value);
    if json_body {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(headers)
}

/// HTTP client for the device authority.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http_client: Client,
    timeout: Duration,
    redactor: Redactor,
}

impl AuthorityClient {
    /// Create a client whose requests are bounded by `timeout`.
    pub fn new(timeout: Duration) -> GateResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("machineid-gate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GateError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_http_client(http_client, timeout))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    ///
    /// `timeout` is only used to label timeout errors; the deadline itself is
    /// whatever `http_client` was built with.
    #[must_use]
    pub fn with_http_client(http_client: Client, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
            redactor: Redactor::new(),
        }
    }

    /// Send one request and normalize the response.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        payload: RequestPayload,
    ) -> GateResult<NormalizedResponse> {
        debug!(%method, url, "authority request");
        let started = Instant::now();

        let builder = self.http_client.request(method.clone(), url).headers(headers);
        let builder = match &payload {
            RequestPayload::Json(body) => builder.json(body),
            RequestPayload::Query(params) => builder.query(params),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| GateError::from_reqwest(e, self.timeout))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GateError::from_reqwest(e, self.timeout))?;

        debug!(
            %method,
            url,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "authority response"
        );

        self.normalize(status, &text)
    }

    fn normalize(&self, status: u16, text: &str) -> GateResult<NormalizedResponse> {
        let parsed = serde_json::from_str::<serde_json::Value>(text);

        if status >= 400 {
            let body = parsed.ok();
            let message = body
                .as_ref()
                .and_then(|b| b.get("error"))
                .and_then(serde_json::Value::as_str)
                .map(|m| self.redactor.redact_string(m))
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(GateError::Server {
                status,
                message,
                body,
            });
        }

        parsed
            .map(|body| NormalizedResponse { status, body })
            .map_err(|_| GateError::MalformedResponse {
                status,
                body: self.diagnostic_body(text),
            })
    }

    fn diagnostic_body(&self, text: &str) -> String {
        let clipped: String = text.chars().take(MAX_DIAGNOSTIC_BODY).collect();
        self.redactor.redact_string(&clipped)
    }
}
