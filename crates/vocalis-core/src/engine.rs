//! **ErrorEngine**: the one service every subsystem reports failures into.
//!
//! ```text
//! RawError ─► Classifier ─► ErrorStore (log + metrics)
//!                  │
//!                  └─► HandlerRegistry ─► RecoveryPlan ─► NotificationDispatcher ─► toasts
//! ```
//!
//! Construct it once with [`ErrorEngine::create`] and pass the `Arc` to whoever needs it.
//! Subsystem-local failures that are retried or absorbed go through [`ErrorEngine::record`]
//! (logged, no toast); failures with no recovery left go through [`ErrorEngine::report`].

use crate::classifier::ErrorClassifier;
use crate::config::CoreConfig;
use crate::messages;
use crate::notify::{NotificationDispatcher, ToastAction, ToastNotification, ToastType};
use crate::recovery::{RecoveryAction, RecoveryPlan};
use crate::registry::{ErrorHandler, HandlerRegistry};
use crate::settings::SettingsStore;
use crate::store::ErrorStore;
use crate::taxonomy::{ClassifiedError, ErrorContext, ErrorKind, RawError, Severity};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// A reported error together with the plan produced for it.
#[derive(Debug, Clone)]
pub struct Reported {
    pub error: ClassifiedError,
    pub plan: RecoveryPlan,
}

/// A recovery action the user picked from a toast.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub error_id: String,
    pub kind: ErrorKind,
    pub action: RecoveryAction,
}

pub struct ErrorEngine {
    classifier: ErrorClassifier,
    registry: HandlerRegistry,
    store: ErrorStore,
    notifier: NotificationDispatcher,
    action_tx: mpsc::UnboundedSender<ActionRequest>,
    action_rx: Mutex<Option<mpsc::UnboundedReceiver<ActionRequest>>>,
    disposed: AtomicBool,
}

impl ErrorEngine {
    pub fn create(config: &CoreConfig, settings: Arc<dyn SettingsStore>) -> Arc<Self> {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        info!(
            log_capacity = config.error_log_capacity,
            max_toasts = config.max_visible_toasts,
            "error engine created"
        );
        Arc::new(Self {
            classifier: ErrorClassifier::new(),
            registry: HandlerRegistry::new(),
            store: ErrorStore::new(config.error_log_capacity),
            notifier: NotificationDispatcher::new(
                settings,
                config.max_visible_toasts,
                config.toast_rate_limit(),
            ),
            action_tx,
            action_rx: Mutex::new(Some(action_rx)),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn classify(&self, raw: &RawError, context: ErrorContext) -> ClassifiedError {
        self.classifier.classify(raw, context)
    }

    /// Classify and log without notifying anyone.
    pub fn record(&self, raw: &RawError, context: ErrorContext) -> ClassifiedError {
        let classified = self.classifier.classify(raw, context);
        warn!(
            kind = %classified.kind(),
            severity = %classified.severity(),
            subsystem = ?classified.originating_subsystem(),
            "{}",
            classified.message()
        );
        self.store.record(classified.clone());
        classified
    }

    /// Classify, log, plan, and surface the error to the user.
    pub async fn report(&self, raw: &RawError, context: ErrorContext) -> Reported {
        let classified = self.record(raw, context);
        let plan = self.registry.handle(&classified).await;
        if self.disposed.load(Ordering::Acquire) {
            return Reported {
                error: classified,
                plan,
            };
        }
        if classified.severity() == Severity::Critical {
            error!(kind = %classified.kind(), id = classified.id(), "critical error surfaced");
        }
        self.notifier.emit(self.toast_for(&classified, &plan));
        Reported {
            error: classified,
            plan,
        }
    }

    pub fn register_handler(&self, kind: ErrorKind, handler: Arc<dyn ErrorHandler>) {
        self.registry.register(kind, handler);
    }

    pub fn store(&self) -> &ErrorStore {
        &self.store
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Receiver of actions picked from error toasts. Can only be taken once.
    pub fn take_action_receiver(&self) -> Option<mpsc::UnboundedReceiver<ActionRequest>> {
        self.action_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Tear down notifications and handlers. Later reports are still logged.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notifier.dispose();
        self.registry.clear();
        info!("error engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Toast for a surfaced error: catalog text, one button per manual step.
    fn toast_for(&self, error: &ClassifiedError, plan: &RecoveryPlan) -> ToastNotification {
        let toast_type = match error.severity() {
            Severity::Critical | Severity::High => ToastType::Error,
            Severity::Medium => ToastType::Warning,
            Severity::Low => ToastType::Info,
        };
        let mut toast = ToastNotification::new(
            toast_type,
            messages::title(error.kind()),
            messages::user_message(error.kind(), error.severity()),
        );
        if error.severity() == Severity::Critical {
            toast = toast.persistent();
        }
        for (index, step) in plan.manual_steps().enumerate() {
            let tx = self.action_tx.clone();
            let request = ActionRequest {
                error_id: error.id().to_string(),
                kind: error.kind(),
                action: step.action.clone(),
            };
            let mut action = ToastAction::new(step.action.label(), move || {
                let _ = tx.send(request.clone());
            });
            if index == 0 {
                action = action.primary();
            }
            toast = toast.with_action(action);
        }
        toast
    }
}
