//! Recovery handler registry: pluggable, priority-ordered handlers per error kind.
//!
//! Exactly one handler runs per error. Handlers are consulted highest priority first;
//! among equal priorities the one registered first wins. When no handler accepts (or the
//! accepting handler fails) the built-in plan for the kind is returned.

use crate::error::{CoreError, CoreResult};
use crate::recovery::RecoveryPlan;
use crate::taxonomy::{ClassifiedError, ErrorKind};
use dashmap::DashMap;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces a recovery plan for errors it accepts.
#[async_trait::async_trait]
pub trait ErrorHandler: Send + Sync {
    /// Higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    fn can_handle(&self, kind: ErrorKind) -> bool;

    async fn handle(&self, error: &ClassifiedError) -> CoreResult<RecoveryPlan>;
}

type CanHandleFn = dyn Fn(ErrorKind) -> bool + Send + Sync;
type HandleFn = dyn Fn(&ClassifiedError) -> CoreResult<RecoveryPlan> + Send + Sync;

/// Handler built from closures.
pub struct FnHandler {
    priority: i32,
    can_handle: Box<CanHandleFn>,
    handle: Box<HandleFn>,
}

impl FnHandler {
    pub fn new<C, H>(priority: i32, can_handle: C, handle: H) -> Self
    where
        C: Fn(ErrorKind) -> bool + Send + Sync + 'static,
        H: Fn(&ClassifiedError) -> CoreResult<RecoveryPlan> + Send + Sync + 'static,
    {
        Self {
            priority,
            can_handle: Box::new(can_handle),
            handle: Box::new(handle),
        }
    }

    /// Accepts every kind it is registered under.
    pub fn always<H>(priority: i32, handle: H) -> Self
    where
        H: Fn(&ClassifiedError) -> CoreResult<RecoveryPlan> + Send + Sync + 'static,
    {
        Self::new(priority, |_| true, handle)
    }
}

#[async_trait::async_trait]
impl ErrorHandler for FnHandler {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn can_handle(&self, kind: ErrorKind) -> bool {
        (self.can_handle)(kind)
    }

    async fn handle(&self, error: &ClassifiedError) -> CoreResult<RecoveryPlan> {
        (self.handle)(error)
    }
}

/// Registry of handlers keyed by error kind.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<ErrorKind, Vec<Arc<dyn ErrorHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`. The per-kind list stays sorted by descending priority;
    /// the sort is stable so equal priorities keep registration order.
    pub fn register(&self, kind: ErrorKind, handler: Arc<dyn ErrorHandler>) {
        let mut list = self.handlers.entry(kind).or_default();
        list.push(handler);
        list.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// Number of handlers registered for `kind`.
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.handlers.get(&kind).map(|l| l.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        self.handlers.clear();
    }

    /// Produce a plan for `error`. Never fails: handler errors and panics degrade to the
    /// default plan. Plans for non-recoverable errors never auto-execute.
    pub async fn handle(&self, error: &ClassifiedError) -> RecoveryPlan {
        // Snapshot so no map guard is held across the await.
        let candidates: Vec<Arc<dyn ErrorHandler>> = self
            .handlers
            .get(&error.kind())
            .map(|l| l.value().clone())
            .unwrap_or_default();

        let chosen = candidates.into_iter().find(|h| h.can_handle(error.kind()));

        let plan = match chosen {
            Some(handler) => match run_handler(handler.as_ref(), error).await {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(kind = %error.kind(), error = %e, "recovery handler failed, using default plan");
                    RecoveryPlan::default_for(error)
                }
            },
            None => {
                debug!(kind = %error.kind(), "no custom handler, using default plan");
                RecoveryPlan::default_for(error)
            }
        };

        if error.is_recoverable() {
            plan
        } else {
            plan.into_manual()
        }
    }
}

async fn run_handler(handler: &dyn ErrorHandler, error: &ClassifiedError) -> CoreResult<RecoveryPlan> {
    match AssertUnwindSafe(handler.handle(error)).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            Err(CoreError::Handler(reason))
        }
    }
}
