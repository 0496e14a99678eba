//! Recovery plans: ordered remediation steps produced for a classified error.

use crate::taxonomy::{ClassifiedError, ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Something the application (or the user) can do about a failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RetryConnection,
    CheckNetwork,
    RetryRequest,
    SwitchModel,
    RetrySynthesis,
    FallbackToText,
    RestartRecognition,
    CheckMicrophonePermission,
    UseTextInput,
    Reauthenticate,
    WaitAndRetry,
    ReloadApplication,
    ReportIssue,
    /// Application-defined action from a custom handler.
    Custom(String),
}

impl RecoveryAction {
    /// Short button label for toast actions.
    pub fn label(&self) -> &str {
        match self {
            RecoveryAction::RetryConnection => "Reconnect",
            RecoveryAction::CheckNetwork => "Check network",
            RecoveryAction::RetryRequest => "Retry",
            RecoveryAction::SwitchModel => "Switch model",
            RecoveryAction::RetrySynthesis => "Retry speech",
            RecoveryAction::FallbackToText => "Show as text",
            RecoveryAction::RestartRecognition => "Restart microphone",
            RecoveryAction::CheckMicrophonePermission => "Allow microphone",
            RecoveryAction::UseTextInput => "Type instead",
            RecoveryAction::Reauthenticate => "Sign in",
            RecoveryAction::WaitAndRetry => "Retry later",
            RecoveryAction::ReloadApplication => "Reload",
            RecoveryAction::ReportIssue => "Report issue",
            RecoveryAction::Custom(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStep {
    pub action: RecoveryAction,
    pub description: String,
    pub auto_execute: bool,
    pub priority: i32,
}

impl RecoveryStep {
    pub fn new(action: RecoveryAction, description: impl Into<String>, priority: i32) -> Self {
        Self {
            action,
            description: description.into(),
            auto_execute: true,
            priority,
        }
    }

    /// Step the user has to perform or confirm.
    pub fn manual(action: RecoveryAction, description: impl Into<String>, priority: i32) -> Self {
        Self {
            auto_execute: false,
            ..Self::new(action, description, priority)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    pub steps: Vec<RecoveryStep>,
    pub auto_execute: bool,
    #[serde(default, with = "opt_millis")]
    pub estimated_time: Option<Duration>,
    #[serde(default)]
    pub user_action: Option<String>,
}

impl RecoveryPlan {
    /// Built-in plan used when no registered handler accepts the error.
    pub fn default_for(error: &ClassifiedError) -> Self {
        Self::default_for_kind(error.kind())
    }

    pub fn default_for_kind(kind: ErrorKind) -> Self {
        use RecoveryAction::*;
        match kind {
            ErrorKind::ConnectionError => Self {
                steps: vec![
                    RecoveryStep::new(RetryConnection, "Re-establish the connection", 1),
                    RecoveryStep::new(CheckNetwork, "Verify network connectivity", 2),
                ],
                auto_execute: true,
                estimated_time: None,
                user_action: None,
            },
            ErrorKind::LlmError => Self {
                steps: vec![
                    RecoveryStep::new(RetryRequest, "Send the request again", 1),
                    RecoveryStep::new(SwitchModel, "Fall back to an alternate model", 2),
                ],
                auto_execute: true,
                estimated_time: Some(Duration::from_secs(5)),
                user_action: None,
            },
            ErrorKind::TtsError => Self {
                steps: vec![
                    RecoveryStep::new(RetrySynthesis, "Retry speech synthesis", 1),
                    RecoveryStep::new(FallbackToText, "Show the reply as text", 2),
                ],
                auto_execute: true,
                estimated_time: None,
                user_action: None,
            },
            ErrorKind::AsrError => Self {
                steps: vec![
                    RecoveryStep::new(RestartRecognition, "Restart speech recognition", 1),
                    RecoveryStep::manual(
                        CheckMicrophonePermission,
                        "Make sure the microphone is connected and access is allowed",
                        2,
                    ),
                    RecoveryStep::manual(UseTextInput, "Type your message instead", 3),
                ],
                auto_execute: true,
                estimated_time: None,
                user_action: Some("Check microphone permissions".to_string()),
            },
            ErrorKind::AuthenticationError => Self {
                steps: vec![RecoveryStep::manual(
                    Reauthenticate,
                    "Sign in again to continue",
                    1,
                )],
                auto_execute: false,
                estimated_time: None,
                user_action: Some("Sign in again".to_string()),
            },
            ErrorKind::RateLimitError => Self {
                steps: vec![RecoveryStep::new(
                    WaitAndRetry,
                    "Wait for the rate limit window to reset, then retry",
                    1,
                )],
                auto_execute: true,
                estimated_time: Some(Duration::from_secs(30)),
                user_action: None,
            },
            ErrorKind::SystemError => Self {
                steps: vec![
                    RecoveryStep::manual(ReloadApplication, "Reload the application", 1),
                    RecoveryStep::manual(ReportIssue, "Report the problem", 2),
                ],
                auto_execute: false,
                estimated_time: None,
                user_action: Some("Reload the application".to_string()),
            },
        }
    }

    /// Clears every auto-execute flag. Applied to plans for non-recoverable errors.
    pub fn into_manual(mut self) -> Self {
        self.auto_execute = false;
        for step in &mut self.steps {
            step.auto_execute = false;
        }
        self
    }

    /// Steps that need a user decision, in plan order.
    pub fn manual_steps(&self) -> impl Iterator<Item = &RecoveryStep> {
        self.steps.iter().filter(|s| !s.auto_execute)
    }
}

mod opt_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
