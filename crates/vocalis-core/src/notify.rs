//! **Notification dispatcher**: turns errors and events into toast notifications.
//!
//! Queue rules:
//! - at most `max_visible` toasts, ordered by descending type priority (newest first on ties);
//! - a toast with the same type and title as a visible one replaces it;
//! - the same type and title emitted again inside the rate-limit window is dropped, unless
//!   the earlier one is still visible (then it is replaced as above);
//! - categories dismissed permanently stay muted (persisted through [`SettingsStore`]) until
//!   unmuted.
//!
//! Non-persistent toasts close themselves after their duration. `pause`/`resume` freeze and
//! restart that countdown while the pointer hovers or the toast has focus.

use crate::error::CoreResult;
use crate::settings::{load_json, save_json, SettingsStore};
use crate::timing::KeyedThrottle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Settings key holding the muted `type:title` keys as a JSON array.
pub const MUTED_TOASTS_KEY: &str = "vocalis.muted_toasts";

pub const DEFAULT_MAX_VISIBLE: usize = 5;
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(500);

pub type ToastId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastType {
    Success,
    Info,
    Warning,
    Error,
}

impl ToastType {
    pub fn priority(self) -> u8 {
        match self {
            ToastType::Success => 1,
            ToastType::Info => 2,
            ToastType::Warning => 3,
            ToastType::Error => 4,
        }
    }

    pub fn default_duration(self) -> Duration {
        match self {
            ToastType::Success => Duration::from_secs(3),
            ToastType::Info => Duration::from_secs(4),
            ToastType::Warning => Duration::from_secs(6),
            ToastType::Error => Duration::from_secs(8),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ToastType::Success => "success",
            ToastType::Info => "info",
            ToastType::Warning => "warning",
            ToastType::Error => "error",
        }
    }
}

pub type ActionCallback = Arc<dyn Fn() + Send + Sync>;

/// A button on a toast.
#[derive(Clone)]
pub struct ToastAction {
    pub label: String,
    pub action: ActionCallback,
    pub primary: bool,
    /// When false the toast is dismissed after the action runs.
    pub keep_open: bool,
}

impl ToastAction {
    pub fn new(label: impl Into<String>, action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            label: label.into(),
            action: Arc::new(action),
            primary: false,
            keep_open: false,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }
}

impl fmt::Debug for ToastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToastAction")
            .field("label", &self.label)
            .field("primary", &self.primary)
            .field("keep_open", &self.keep_open)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct ToastNotification {
    /// Assigned by the dispatcher on emit.
    pub id: ToastId,
    pub toast_type: ToastType,
    pub title: String,
    pub message: String,
    pub actions: Vec<ToastAction>,
    /// `None` means persistent: stays until dismissed.
    pub duration: Option<Duration>,
}

impl ToastNotification {
    pub fn new(toast_type: ToastType, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            toast_type,
            title: title.into(),
            message: message.into(),
            actions: Vec::new(),
            duration: Some(toast_type.default_duration()),
        }
    }

    pub fn persistent(mut self) -> Self {
        self.duration = None;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_action(mut self, action: ToastAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.duration.is_none()
    }

    /// Identity used for de-duplication and muting.
    pub fn category_key(&self) -> String {
        category_key(self.toast_type, &self.title)
    }
}

pub fn category_key(toast_type: ToastType, title: &str) -> String {
    format!("{}:{}", toast_type.as_str(), title)
}

#[derive(Debug, Clone)]
pub enum ToastEvent {
    Shown(ToastNotification),
    Dismissed(ToastId),
}

type Subscriber = Arc<dyn Fn(&ToastEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy)]
enum Countdown {
    Persistent,
    Running { deadline: Instant, epoch: u64 },
    Paused { remaining: Duration, epoch: u64 },
}

struct ActiveToast {
    toast: ToastNotification,
    seq: u64,
    countdown: Countdown,
}

struct DispatcherState {
    visible: Vec<ActiveToast>,
    subscribers: Vec<(u64, Subscriber)>,
    muted: BTreeSet<String>,
    throttle: KeyedThrottle,
    next_id: ToastId,
    next_seq: u64,
    next_subscriber: u64,
    disposed: bool,
}

impl DispatcherState {
    fn position(&self, id: ToastId) -> Option<usize> {
        self.visible.iter().position(|t| t.toast.id == id)
    }
}

struct DispatcherInner {
    max_visible: usize,
    settings: Arc<dyn SettingsStore>,
    state: Mutex<DispatcherState>,
}

impl DispatcherInner {
    fn state(&self) -> MutexGuard<'_, DispatcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; clones share one queue.
#[derive(Clone)]
pub struct NotificationDispatcher {
    inner: Arc<DispatcherInner>,
}

/// Returned by [`NotificationDispatcher::subscribe`].
pub struct Subscription {
    id: u64,
    inner: Weak<DispatcherInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.state().subscribers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl NotificationDispatcher {
    /// Create a dispatcher, restoring the persisted mute-set from `settings`.
    pub fn new(settings: Arc<dyn SettingsStore>, max_visible: usize, rate_limit: Duration) -> Self {
        let muted: BTreeSet<String> = load_json::<Vec<String>>(settings.as_ref(), MUTED_TOASTS_KEY)
            .unwrap_or_default()
            .into_iter()
            .collect();
        if !muted.is_empty() {
            debug!(count = muted.len(), "restored muted toast categories");
        }
        Self {
            inner: Arc::new(DispatcherInner {
                max_visible: max_visible.max(1),
                settings,
                state: Mutex::new(DispatcherState {
                    visible: Vec::new(),
                    subscribers: Vec::new(),
                    muted,
                    throttle: KeyedThrottle::new(rate_limit),
                    next_id: 1,
                    next_seq: 0,
                    next_subscriber: 0,
                    disposed: false,
                }),
            }),
        }
    }

    pub fn subscribe(&self, callback: impl Fn(&ToastEvent) + Send + Sync + 'static) -> Subscription {
        let mut state = self.inner.state();
        let id = state.next_subscriber;
        state.next_subscriber += 1;
        state.subscribers.push((id, Arc::new(callback)));
        Subscription {
            id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Queue a toast. Returns its id, or `None` when it was muted, rate-limited, or did not
    /// make the visible cut.
    pub fn emit(&self, toast: ToastNotification) -> Option<ToastId> {
        let mut toast = toast;
        let key = toast.category_key();
        let mut events = Vec::new();

        let (id, countdown, subscribers) = {
            let mut state = self.inner.state();
            if state.disposed {
                return None;
            }
            if state.muted.contains(&key) {
                debug!(key = %key, "toast muted");
                return None;
            }
            // A visible duplicate is collapsed to the newest; the rate limit only holds back
            // re-emits of toasts that have already gone.
            let duplicate = state.visible.iter().position(|t| t.toast.category_key() == key);
            if !state.throttle.try_acquire(&key) && duplicate.is_none() {
                debug!(key = %key, "toast rate-limited");
                return None;
            }

            if let Some(pos) = duplicate {
                let replaced = state.visible.remove(pos);
                events.push(ToastEvent::Dismissed(replaced.toast.id));
            }

            let id = state.next_id;
            state.next_id += 1;
            let seq = state.next_seq;
            state.next_seq += 1;
            toast.id = id;

            let countdown = match toast.duration {
                Some(d) => Countdown::Running {
                    deadline: Instant::now() + d,
                    epoch: 0,
                },
                None => Countdown::Persistent,
            };
            state.visible.push(ActiveToast {
                toast: toast.clone(),
                seq,
                countdown,
            });
            state.visible.sort_by(|a, b| {
                b.toast
                    .toast_type
                    .priority()
                    .cmp(&a.toast.toast_type.priority())
                    .then(b.seq.cmp(&a.seq))
            });
            let dropped: Vec<ActiveToast> = if state.visible.len() > self.inner.max_visible {
                let cut = self.inner.max_visible;
                state.visible.split_off(cut)
            } else {
                Vec::new()
            };

            let kept = !dropped.iter().any(|t| t.toast.id == id);
            events.extend(
                dropped
                    .iter()
                    .filter(|t| t.toast.id != id)
                    .map(|t| ToastEvent::Dismissed(t.toast.id)),
            );
            if !kept {
                debug!(key = %key, "toast below visible cut");
                let subscribers = snapshot(&state);
                drop(state);
                publish(&subscribers, &events);
                return None;
            }
            events.push(ToastEvent::Shown(toast));
            (id, countdown, snapshot(&state))
        };

        if let Countdown::Running { deadline, epoch } = countdown {
            self.schedule_close(id, deadline, epoch);
        }
        publish(&subscribers, &events);
        Some(id)
    }

    /// Close a toast. Returns false when it is not visible.
    pub fn dismiss(&self, id: ToastId) -> bool {
        let subscribers = {
            let mut state = self.inner.state();
            match state.position(id) {
                Some(pos) => {
                    state.visible.remove(pos);
                    snapshot(&state)
                }
                None => return false,
            }
        };
        publish(&subscribers, &[ToastEvent::Dismissed(id)]);
        true
    }

    /// Close a toast and mute its category across restarts.
    pub fn dismiss_permanently(&self, id: ToastId) -> CoreResult<bool> {
        let muted = {
            let mut state = self.inner.state();
            let Some(pos) = state.position(id) else {
                return Ok(false);
            };
            let key = state.visible[pos].toast.category_key();
            state.muted.insert(key);
            state.muted.iter().cloned().collect::<Vec<_>>()
        };
        self.dismiss(id);
        save_json(self.inner.settings.as_ref(), MUTED_TOASTS_KEY, &muted)?;
        Ok(true)
    }

    pub fn is_muted(&self, toast_type: ToastType, title: &str) -> bool {
        self.inner.state().muted.contains(&category_key(toast_type, title))
    }

    pub fn unmute(&self, toast_type: ToastType, title: &str) -> CoreResult<()> {
        let muted = {
            let mut state = self.inner.state();
            state.muted.remove(&category_key(toast_type, title));
            state.muted.iter().cloned().collect::<Vec<_>>()
        };
        save_json(self.inner.settings.as_ref(), MUTED_TOASTS_KEY, &muted)
    }

    pub fn unmute_all(&self) -> CoreResult<()> {
        self.inner.state().muted.clear();
        self.inner.settings.remove(MUTED_TOASTS_KEY)
    }

    /// Visible toasts, highest priority first.
    pub fn visible(&self) -> Vec<ToastNotification> {
        self.inner
            .state()
            .visible
            .iter()
            .map(|t| t.toast.clone())
            .collect()
    }

    /// Freeze the auto-close countdown (pointer entered / focus gained).
    pub fn pause(&self, id: ToastId) {
        let mut state = self.inner.state();
        let Some(pos) = state.position(id) else { return };
        let toast = &mut state.visible[pos];
        if let Countdown::Running { deadline, epoch } = toast.countdown {
            toast.countdown = Countdown::Paused {
                remaining: deadline.saturating_duration_since(Instant::now()),
                epoch: epoch + 1,
            };
        }
    }

    /// Restart the countdown with the time that was left when paused.
    pub fn resume(&self, id: ToastId) {
        let scheduled = {
            let mut state = self.inner.state();
            let Some(pos) = state.position(id) else { return };
            let toast = &mut state.visible[pos];
            match toast.countdown {
                Countdown::Paused { remaining, epoch } => {
                    let deadline = Instant::now() + remaining;
                    let epoch = epoch + 1;
                    toast.countdown = Countdown::Running { deadline, epoch };
                    Some((deadline, epoch))
                }
                _ => None,
            }
        };
        if let Some((deadline, epoch)) = scheduled {
            self.schedule_close(id, deadline, epoch);
        }
    }

    /// Run action `index` of toast `id`. Returns false when either does not exist.
    pub fn invoke_action(&self, id: ToastId, index: usize) -> bool {
        let action = {
            let state = self.inner.state();
            let Some(pos) = state.position(id) else {
                return false;
            };
            match state.visible[pos].toast.actions.get(index) {
                Some(a) => a.clone(),
                None => return false,
            }
        };
        (action.action)();
        if !action.keep_open {
            self.dismiss(id);
        }
        true
    }

    /// Drop every toast and subscriber; later emits are ignored.
    pub fn dispose(&self) {
        let mut state = self.inner.state();
        state.disposed = true;
        state.visible.clear();
        state.subscribers.clear();
    }

    fn schedule_close(&self, id: ToastId, deadline: Instant, epoch: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(id, "no async runtime, toast will not auto-close");
            return;
        };
        let inner = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(inner) = inner.upgrade() else { return };
            let subscribers = {
                let mut state = inner.state();
                let Some(pos) = state.position(id) else { return };
                match state.visible[pos].countdown {
                    Countdown::Running { epoch: current, .. } if current == epoch => {
                        state.visible.remove(pos);
                        snapshot(&state)
                    }
                    _ => return,
                }
            };
            publish(&subscribers, &[ToastEvent::Dismissed(id)]);
        });
    }
}

fn snapshot(state: &DispatcherState) -> Vec<Subscriber> {
    state.subscribers.iter().map(|(_, s)| s.clone()).collect()
}

fn publish(subscribers: &[Subscriber], events: &[ToastEvent]) {
    for event in events {
        for subscriber in subscribers {
            subscriber(event);
        }
    }
}
