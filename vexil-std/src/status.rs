//! # Status Tracker
//!
//! Keeps one [`ProviderStatus`] per named provider and reduces them to an
//! aggregate by precedence (`FATAL > NOT_READY > ERROR > STALE > RECONCILING >
//! READY`). An aggregate event is emitted only when the aggregate actually
//! changes.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};
use vexil_core::{
    ErrorCode, EventDetails, EventEmitter, EventHandler, ProviderEventKind, ProviderStatus,
    Subscription,
};

/// The status a provider event moves its provider to, if any.
///
/// An `Error` event carrying `PROVIDER_FATAL` means `FATAL`.
/// Configuration changes do not affect status.
pub fn status_for_event(kind: ProviderEventKind, details: &EventDetails) -> Option<ProviderStatus> {
    match kind {
        ProviderEventKind::Ready | ProviderEventKind::ContextChanged => Some(ProviderStatus::Ready),
        ProviderEventKind::Error if details.error_code == Some(ErrorCode::ProviderFatal) => {
            Some(ProviderStatus::Fatal)
        }
        ProviderEventKind::Error => Some(ProviderStatus::Error),
        ProviderEventKind::Stale => Some(ProviderStatus::Stale),
        ProviderEventKind::Reconciling => Some(ProviderStatus::Reconciling),
        ProviderEventKind::ConfigurationChanged => None,
    }
}

/// The event announcing a move to `status`. `NOT_READY` is never announced.
pub fn event_for_status(status: ProviderStatus) -> Option<ProviderEventKind> {
    match status {
        ProviderStatus::Ready => Some(ProviderEventKind::Ready),
        ProviderStatus::Error | ProviderStatus::Fatal => Some(ProviderEventKind::Error),
        ProviderStatus::Stale => Some(ProviderEventKind::Stale),
        ProviderStatus::Reconciling => Some(ProviderEventKind::Reconciling),
        ProviderStatus::NotReady => None,
    }
}

#[derive(Default)]
struct TrackerState {
    statuses: Vec<(String, ProviderStatus)>,
    aggregate: ProviderStatus,
}

impl TrackerState {
    fn recompute(&mut self) -> ProviderStatus {
        self.aggregate = ProviderStatus::aggregate(self.statuses.iter().map(|(_, s)| *s));
        self.aggregate
    }
}

struct TrackerShared {
    state: Mutex<TrackerState>,
    emitter: EventEmitter,
    subscriptions: Mutex<Vec<Subscription>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TrackerShared {
    fn update(&self, name: &str, status: ProviderStatus, details: &EventDetails) -> bool {
        let changed_to = {
            let mut state = lock(&self.state);
            let previous = state.aggregate;
            match state.statuses.iter_mut().find(|(n, _)| n == name) {
                Some((_, current)) => *current = status,
                None => state.statuses.push((name.to_owned(), status)),
            }
            let aggregate = state.recompute();
            (aggregate != previous).then_some(aggregate)
        };

        let Some(aggregate) = changed_to else {
            return false;
        };
        tracing::debug!(provider = name, %status, %aggregate, "aggregate status changed");
        if let Some(kind) = event_for_status(aggregate) {
            let mut details = details.clone();
            if aggregate == ProviderStatus::Fatal {
                details.error_code = Some(ErrorCode::ProviderFatal);
            }
            self.emitter.emit(kind, &details);
        }
        true
    }
}

/// Per-provider status bookkeeping with change-only aggregate events.
///
/// Cloning yields another handle to the same tracker.
#[derive(Clone)]
pub struct StatusTracker {
    shared: Arc<TrackerShared>,
}

impl fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.shared.state);
        f.debug_struct("StatusTracker")
            .field("statuses", &state.statuses)
            .field("aggregate", &state.aggregate)
            .finish()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(EventEmitter::new())
    }
}

impl StatusTracker {
    /// Creates an empty tracker announcing aggregate changes on `emitter`.
    pub fn new(emitter: EventEmitter) -> Self {
        Self {
            shared: Arc::new(TrackerShared {
                state: Mutex::new(TrackerState::default()),
                emitter,
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Starts tracking `name` with an initial status. Emits nothing.
    pub fn register(&self, name: impl Into<String>, status: ProviderStatus) {
        let name = name.into();
        let mut state = lock(&self.shared.state);
        match state.statuses.iter_mut().find(|(n, _)| *n == name) {
            Some((_, current)) => *current = status,
            None => state.statuses.push((name, status)),
        }
        state.recompute();
    }

    /// Records a transition of `name`. Returns whether the aggregate changed,
    /// in which case the matching event was emitted with `details`.
    pub fn update(&self, name: &str, status: ProviderStatus, details: &EventDetails) -> bool {
        self.shared.update(name, status, details)
    }

    /// The tracked status of `name`.
    pub fn status_of(&self, name: &str) -> Option<ProviderStatus> {
        lock(&self.shared.state)
            .statuses
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| *s)
    }

    /// The aggregate status.
    pub fn aggregate(&self) -> ProviderStatus {
        lock(&self.shared.state).aggregate
    }

    /// The bus aggregate events are emitted on.
    pub fn emitter(&self) -> &EventEmitter {
        &self.shared.emitter
    }

    /// Follows the events of provider `name`.
    ///
    /// Status events update the tracker; configuration changes are forwarded
    /// as they are.
    pub fn attach(&self, name: impl Into<String>, events: &EventEmitter) {
        let name: Arc<str> = Arc::from(name.into());
        let subscriptions = ProviderEventKind::ALL.map(|kind| {
            let weak: Weak<TrackerShared> = Arc::downgrade(&self.shared);
            let name = name.clone();
            let handler: EventHandler = Arc::new(move |details: &EventDetails| {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match status_for_event(kind, details) {
                    Some(status) => {
                        shared.update(&name, status, details);
                    }
                    None => shared.emitter.emit(kind, details),
                }
            });
            events.add_handler(kind, handler)
        });
        lock(&self.shared.subscriptions).extend(subscriptions);
    }

    /// Stops following every attached provider.
    pub fn detach_all(&self) {
        let subscriptions = std::mem::take(&mut *lock(&self.shared.subscriptions));
        for subscription in subscriptions {
            subscription.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(emitter: &EventEmitter, kind: ProviderEventKind) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = count.clone();
        emitter.add_handler(
            kind,
            Arc::new(move |_: &EventDetails| {
                handle.fetch_add(1, Ordering::SeqCst);
            }),
        );
        count
    }

    #[test]
    fn test_aggregate_follows_precedence() {
        let tracker = StatusTracker::default();
        tracker.register("a", ProviderStatus::Ready);
        tracker.register("b", ProviderStatus::Stale);
        assert_eq!(tracker.aggregate(), ProviderStatus::Stale);

        tracker.update("a", ProviderStatus::Error, &EventDetails::for_provider("a"));
        assert_eq!(tracker.aggregate(), ProviderStatus::Error);

        tracker.register("c", ProviderStatus::NotReady);
        assert_eq!(tracker.aggregate(), ProviderStatus::NotReady);

        tracker.update("b", ProviderStatus::Fatal, &EventDetails::for_provider("b"));
        assert_eq!(tracker.aggregate(), ProviderStatus::Fatal);
    }

    #[test]
    fn test_repeated_event_emits_once() {
        let emitter = EventEmitter::new();
        let tracker = StatusTracker::new(emitter.clone());
        let stale = counter(&emitter, ProviderEventKind::Stale);
        tracker.register("a", ProviderStatus::Ready);
        tracker.register("b", ProviderStatus::Ready);

        let provider_events = EventEmitter::new();
        tracker.attach("a", &provider_events);
        provider_events.emit(ProviderEventKind::Stale, &EventDetails::for_provider("a"));
        provider_events.emit(ProviderEventKind::Stale, &EventDetails::for_provider("a"));

        assert_eq!(stale.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.status_of("a"), Some(ProviderStatus::Stale));
    }

    #[test]
    fn test_no_event_when_aggregate_unchanged() {
        let emitter = EventEmitter::new();
        let tracker = StatusTracker::new(emitter.clone());
        let errors = counter(&emitter, ProviderEventKind::Error);
        tracker.register("a", ProviderStatus::Error);
        tracker.register("b", ProviderStatus::Ready);

        // `b` erroring does not change an aggregate that is already ERROR.
        assert!(!tracker.update("b", ProviderStatus::Error, &EventDetails::for_provider("b")));
        assert_eq!(errors.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fatal_is_announced_as_error_with_fatal_code() {
        let emitter = EventEmitter::new();
        let tracker = StatusTracker::new(emitter.clone());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        emitter.add_handler(
            ProviderEventKind::Error,
            Arc::new(move |details: &EventDetails| sink.lock().unwrap().push(details.error_code)),
        );
        tracker.register("a", ProviderStatus::Ready);

        let provider_events = EventEmitter::new();
        tracker.attach("a", &provider_events);
        provider_events.emit(
            ProviderEventKind::Error,
            &EventDetails::for_provider("a").error_code(ErrorCode::ProviderFatal),
        );

        assert_eq!(tracker.aggregate(), ProviderStatus::Fatal);
        assert_eq!(*seen.lock().unwrap(), vec![Some(ErrorCode::ProviderFatal)]);
    }

    #[test]
    fn test_configuration_changes_are_forwarded_and_detach_stops_them() {
        let emitter = EventEmitter::new();
        let tracker = StatusTracker::new(emitter.clone());
        let changes = counter(&emitter, ProviderEventKind::ConfigurationChanged);
        tracker.register("a", ProviderStatus::Ready);

        let provider_events = EventEmitter::new();
        tracker.attach("a", &provider_events);
        provider_events.emit(
            ProviderEventKind::ConfigurationChanged,
            &EventDetails::for_provider("a").flags_changed(["f"]),
        );
        tracker.detach_all();
        provider_events.emit(
            ProviderEventKind::ConfigurationChanged,
            &EventDetails::for_provider("a"),
        );

        assert_eq!(changes.load(Ordering::SeqCst), 1);
        assert!(provider_events.is_empty());
    }
}
