//! Credential redaction for server-supplied text.
//!
//! Error bodies from the authority are surfaced to operators. Some backends
//! echo request headers back, so anything that looks like an org key is
//! masked before it reaches a log line or an `error_detail` field.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

/// The replacement string used for redacted values.
pub const REDACTED: &str = "[REDACTED]";

/// Built-in redaction patterns.
static REDACTION_PATTERNS: LazyLock<Vec<RedactionPattern>> = LazyLock::new(|| {
    vec![
        // x-org-key header or field, any value shape
        RedactionPattern::new(
            r#"(?i)(x-org-key["']?\s*[:=]\s*["']?)[^\s"',}]+"#,
            |caps| format!("{}{REDACTED}", &caps[1]),
        ),
        // orgKey / org_key JSON fields
        RedactionPattern::new(r#"(?i)("org_?key"\s*:\s*")[^"]*""#, |caps| {
            format!("{}{REDACTED}\"", &caps[1])
        }),
        // Bare organization keys anywhere in free text
        RedactionPattern::new(r"\borg_[A-Za-z0-9_\-]{4,}", |_| {
            format!("org_{REDACTED}")
        }),
    ]
});

/// A pattern for detecting and redacting sensitive data.
struct RedactionPattern {
    regex: Regex,
    replacer: Box<dyn Fn(&regex::Captures) -> String + Send + Sync>,
}

impl RedactionPattern {
    #[allow(clippy::expect_used)]
    fn new<F>(pattern: &str, replacer: F) -> Self
    where
        F: Fn(&regex::Captures) -> String + Send + Sync + 'static,
    {
        Self {
            regex: Regex::new(pattern).expect("invalid redaction pattern"),
            replacer: Box::new(replacer),
        }
    }

    fn apply<'a>(&self, input: &'a str) -> Cow<'a, str> {
        self.regex
            .replace_all(input, |caps: &regex::Captures| (self.replacer)(caps))
    }
}

/// Redactor for org credentials in strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    /// Apply every built-in pattern to `input`.
    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result: Cow<'a, str> = Cow::Borrowed(input);

        for pattern in REDACTION_PATTERNS.iter() {
            let changed = match pattern.apply(&result) {
                Cow::Owned(owned) => Some(owned),
                Cow::Borrowed(_) => None,
            };
            if let Some(owned) = changed {
                result = Cow::Owned(owned);
            }
        }

        result
    }

    /// Redact and return an owned String.
    pub fn redact_string(&self, input: &str) -> String {
        self.redact(input).into_owned()
    }
}
