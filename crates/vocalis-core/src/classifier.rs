//! **Classifier**: maps a raw failure onto the fixed taxonomy.
//!
//! Keyword rules are checked in a fixed precedence order, most specific first:
//!
//! | precedence | kind | keywords |
//! |---|---|---|
//! | 1 | AUTHENTICATION_ERROR | unauthorized, authentication |
//! | 2 | RATE_LIMIT_ERROR | rate limit, 429 |
//! | 3 | LLM_ERROR | openai, api request failed, llm |
//! | 4 | TTS_ERROR | tts, synthesis |
//! | 5 | ASR_ERROR | microphone, speech recognition |
//! | 6 | CONNECTION_ERROR | connection, websocket, network, timeout |
//!
//! A message such as "timeout while refreshing unauthorized token" is therefore an
//! authentication failure, not a connection failure.

use crate::taxonomy::{ClassifiedError, ErrorContext, ErrorKind, RawError};
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::RegexSet;
use tracing::debug;

const RULES: &[(ErrorKind, &[&str])] = &[
    (ErrorKind::AuthenticationError, &["unauthorized", "authentication"]),
    (ErrorKind::RateLimitError, &["rate limit", "429"]),
    (ErrorKind::LlmError, &["openai", "api request failed", "llm"]),
    (ErrorKind::TtsError, &["tts", "synthesis"]),
    (ErrorKind::AsrError, &["microphone", "speech recognition"]),
    (
        ErrorKind::ConnectionError,
        &["connection", "websocket", "network", "timeout"],
    ),
];

/// One case-insensitive pattern per rule; pattern index == rule index == precedence.
static RULE_SET: Lazy<RegexSet> = Lazy::new(|| {
    let patterns = RULES.iter().map(|(_, keywords)| {
        let alternation = keywords
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        format!("(?i)(?:{alternation})")
    });
    RegexSet::new(patterns).expect("static keyword table compiles")
});

/// Keyword-based kind for a message, or `None` when nothing in the table matches.
pub fn match_keywords(message: &str) -> Option<ErrorKind> {
    RULE_SET
        .matches(message)
        .iter()
        .next()
        .map(|index| RULES[index].0)
}

/// Kind for a non-2xx HTTP status; `fallback` covers statuses with no specific meaning.
pub fn kind_for_http_status(status: u16, fallback: ErrorKind) -> ErrorKind {
    match status {
        401 | 403 => ErrorKind::AuthenticationError,
        429 => ErrorKind::RateLimitError,
        408 | 500..=599 => ErrorKind::ConnectionError,
        _ => fallback,
    }
}

/// Stateless classifier. Total: every input produces a record.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw failure. Structured input (explicit `kind`) skips keyword matching;
    /// otherwise keywords, then the originating subsystem, then `SYSTEM_ERROR`.
    pub fn classify(&self, raw: &RawError, context: ErrorContext) -> ClassifiedError {
        let kind = raw
            .kind
            .or_else(|| match_keywords(&raw.message))
            .or_else(|| raw.subsystem.and_then(|s| s.implied_kind()))
            .unwrap_or(ErrorKind::SystemError);
        let severity = raw.severity.unwrap_or_else(|| kind.default_severity());

        let mut context = context;
        if let Some(stack) = &raw.stack {
            context
                .entry("stack".to_string())
                .or_insert_with(|| serde_json::Value::String(stack.clone()));
        }

        debug!(kind = %kind, severity = %severity, "classified error");

        ClassifiedError {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity,
            message: raw.message.clone(),
            context,
            originating_subsystem: raw.subsystem,
            timestamp_ms: Utc::now().timestamp_millis(),
            recoverable: kind.is_recoverable(),
            retryable: kind.is_retryable(),
        }
    }
}
