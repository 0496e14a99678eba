//! **Error taxonomy**: the fixed kinds and severities every reported failure is mapped onto.
//!
//! The kind → severity → recoverable/retryable table is fixed; `ClassifiedError` records are
//! only ever built by the classifier so these fields never disagree with the table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form context attached to a reported failure (request ids, status codes, ...).
pub type ErrorContext = BTreeMap<String, serde_json::Value>;

/// Category of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ConnectionError,
    LlmError,
    TtsError,
    AsrError,
    AuthenticationError,
    RateLimitError,
    SystemError,
}

impl ErrorKind {
    /// Every kind, in table order.
    pub const ALL: [ErrorKind; 7] = [
        ErrorKind::ConnectionError,
        ErrorKind::LlmError,
        ErrorKind::TtsError,
        ErrorKind::AsrError,
        ErrorKind::AuthenticationError,
        ErrorKind::RateLimitError,
        ErrorKind::SystemError,
    ];

    /// Severity assigned when the reporter does not override it.
    pub fn default_severity(self) -> Severity {
        match self {
            ErrorKind::ConnectionError | ErrorKind::LlmError => Severity::High,
            ErrorKind::TtsError => Severity::Low,
            ErrorKind::AsrError | ErrorKind::RateLimitError | ErrorKind::SystemError => {
                Severity::Medium
            }
            ErrorKind::AuthenticationError => Severity::Critical,
        }
    }

    /// Whether the application can get back to a working state without the user.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, ErrorKind::AuthenticationError)
    }

    /// Whether repeating the failed operation may succeed.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::AuthenticationError | ErrorKind::SystemError)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "CONNECTION_ERROR",
            ErrorKind::LlmError => "LLM_ERROR",
            ErrorKind::TtsError => "TTS_ERROR",
            ErrorKind::AsrError => "ASR_ERROR",
            ErrorKind::AuthenticationError => "AUTHENTICATION_ERROR",
            ErrorKind::RateLimitError => "RATE_LIMIT_ERROR",
            ErrorKind::SystemError => "SYSTEM_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How badly a failure affects the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Component a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Connection,
    Llm,
    Tts,
    Asr,
    Auth,
    Ui,
    System,
}

impl Subsystem {
    /// Kind implied by the subsystem alone, used when no keyword matches.
    pub fn implied_kind(self) -> Option<ErrorKind> {
        match self {
            Subsystem::Connection => Some(ErrorKind::ConnectionError),
            Subsystem::Llm => Some(ErrorKind::LlmError),
            Subsystem::Tts => Some(ErrorKind::TtsError),
            Subsystem::Asr => Some(ErrorKind::AsrError),
            Subsystem::Auth => Some(ErrorKind::AuthenticationError),
            Subsystem::Ui | Subsystem::System => None,
        }
    }
}

/// A failure as raised by application code, before classification.
///
/// Set `kind` when the reporter already knows the category; the record then bypasses
/// keyword matching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawError {
    pub message: String,
    #[serde(default)]
    pub stack: Option<String>,
    #[serde(default)]
    pub subsystem: Option<Subsystem>,
    #[serde(default)]
    pub kind: Option<ErrorKind>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl RawError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Structured error with a known kind.
    pub fn typed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(kind),
            ..Default::default()
        }
    }

    pub fn with_subsystem(mut self, subsystem: Subsystem) -> Self {
        self.subsystem = Some(subsystem);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }
}

impl<E: std::error::Error> From<&E> for RawError {
    fn from(err: &E) -> Self {
        RawError::new(err.to_string())
    }
}

/// A classified failure. Immutable once built; fields are private so only the classifier
/// can produce one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub(crate) id: String,
    pub(crate) kind: ErrorKind,
    pub(crate) severity: Severity,
    pub(crate) message: String,
    pub(crate) context: ErrorContext,
    pub(crate) originating_subsystem: Option<Subsystem>,
    pub(crate) timestamp_ms: i64,
    pub(crate) recoverable: bool,
    pub(crate) retryable: bool,
}

impl ClassifiedError {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Raw failure text. Never shown to users; see [`crate::messages`].
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn originating_subsystem(&self) -> Option<Subsystem> {
        self.originating_subsystem
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_flags_match_kinds() {
        assert!(!ErrorKind::AuthenticationError.is_recoverable());
        assert!(!ErrorKind::AuthenticationError.is_retryable());
        assert!(ErrorKind::SystemError.is_recoverable());
        assert!(!ErrorKind::SystemError.is_retryable());
        for kind in [
            ErrorKind::ConnectionError,
            ErrorKind::LlmError,
            ErrorKind::TtsError,
            ErrorKind::AsrError,
            ErrorKind::RateLimitError,
        ] {
            assert!(kind.is_recoverable(), "{kind}");
            assert!(kind.is_retryable(), "{kind}");
        }
    }

    #[test]
    fn kinds_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorKind::RateLimitError).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_ERROR\"");
        let sev = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(sev, "\"critical\"");
    }

    #[test]
    fn classified_errors_export_flags_from_the_table() {
        let error = crate::classifier::ErrorClassifier::new()
            .classify(&RawError::new("Unauthorized access"), ErrorContext::new());
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["kind"], "AUTHENTICATION_ERROR");
        assert_eq!(json["severity"], "critical");
        assert_eq!(json["recoverable"], false);
        assert_eq!(json["retryable"], false);
    }
}
