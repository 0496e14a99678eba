//! # Vocalis Core - Error Recovery Engine
//!
//! Every failure in a Vocalis session (connection drops, model errors, speech in or out,
//! expired credentials, throttling) flows through one engine that classifies it, logs it,
//! picks a recovery plan, and tells the user what happened in plain language.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ErrorEngine                           │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │  Classifier  │ → │  ErrorStore  │   │ HandlerRegistry  │  │
//! │  │ (keywords,   │   │ (bounded log │   │ (priority order, │  │
//! │  │  subsystem)  │   │  + metrics)  │   │  default plans)  │  │
//! │  └──────────────┘   └──────────────┘   └──────────────────┘  │
//! │          │                                      ↓             │
//! │          └──────────────→ NotificationDispatcher (toasts)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod notify;
pub mod recovery;
pub mod registry;
pub mod settings;
pub mod store;
pub mod taxonomy;
pub mod timing;

pub use classifier::{kind_for_http_status, match_keywords, ErrorClassifier};
pub use config::CoreConfig;
pub use engine::{ActionRequest, ErrorEngine, Reported};
pub use error::{CoreError, CoreResult};
pub use notify::{
    NotificationDispatcher, Subscription, ToastAction, ToastEvent, ToastId, ToastNotification,
    ToastType,
};
pub use recovery::{RecoveryAction, RecoveryPlan, RecoveryStep};
pub use registry::{ErrorHandler, FnHandler, HandlerRegistry};
pub use settings::{FileSettings, MemorySettings, SettingsStore};
pub use store::{ErrorStore, Metrics};
pub use taxonomy::{ClassifiedError, ErrorContext, ErrorKind, RawError, Severity, Subsystem};
pub use timing::{KeyedThrottle, Throttle};
