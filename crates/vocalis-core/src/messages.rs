//! User-facing text for classified errors. Raw failure messages never reach the user.

use crate::taxonomy::{ErrorKind, Severity};

/// Toast title for a kind.
pub fn title(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ConnectionError => "Connection problem",
        ErrorKind::LlmError => "Assistant unavailable",
        ErrorKind::TtsError => "Voice output problem",
        ErrorKind::AsrError => "Microphone problem",
        ErrorKind::AuthenticationError => "Signed out",
        ErrorKind::RateLimitError => "Too many requests",
        ErrorKind::SystemError => "Something went wrong",
    }
}

/// Body text for a kind at a given severity.
pub fn user_message(kind: ErrorKind, severity: Severity) -> &'static str {
    match (kind, severity) {
        (ErrorKind::ConnectionError, Severity::Critical) => {
            "The connection to the server was lost and could not be restored."
        }
        (ErrorKind::ConnectionError, _) => "Connection lost. Trying to reconnect…",
        (ErrorKind::LlmError, Severity::Critical) => {
            "The assistant is not responding. Please try again later."
        }
        (ErrorKind::LlmError, _) => "The assistant had trouble answering. Retrying…",
        (ErrorKind::TtsError, Severity::Low) => "Voice playback failed; the reply is shown as text.",
        (ErrorKind::TtsError, _) => "Voice output is unavailable. Replies will be shown as text.",
        (ErrorKind::AsrError, Severity::Low | Severity::Medium) => {
            "We couldn't hear you. Check your microphone and try again."
        }
        (ErrorKind::AsrError, _) => {
            "Speech recognition is unavailable. You can type your message instead."
        }
        (ErrorKind::AuthenticationError, _) => "Your session has expired. Please sign in again.",
        (ErrorKind::RateLimitError, _) => "You're sending requests too quickly. Please wait a moment.",
        (ErrorKind::SystemError, Severity::Critical | Severity::High) => {
            "An unexpected error occurred. Reloading may help."
        }
        (ErrorKind::SystemError, _) => "Something went wrong. Please try again.",
    }
}
