//! # Typed Event Bus
//!
//! Providers announce lifecycle changes through an [`EventEmitter`]; the registry
//! and every client scope own one as well. Handlers are plain callbacks keyed by
//! [`ProviderEventKind`].
//!
//! Registration returns a [`Subscription`]. Cancelling it removes exactly that
//! registration, and cancelling twice is a no-op, so it doubles as an abort
//! signal for the handler.
//!
//! Handlers run after the emitter's lock is released: a handler may add or
//! remove handlers, including itself, while being called.

use crate::{details::MetadataValue, error::ErrorCode};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

/// The kinds of provider events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProviderEventKind {
    /// The provider became ready.
    Ready,
    /// The provider entered an error state.
    Error,
    /// The provider's cached values may be outdated.
    Stale,
    /// Flag configuration changed.
    ConfigurationChanged,
    /// The provider is reconciling with a new context.
    Reconciling,
    /// The provider finished reconciling with a new context.
    ContextChanged,
}

impl ProviderEventKind {
    /// Every event kind.
    pub const ALL: [ProviderEventKind; 6] = [
        ProviderEventKind::Ready,
        ProviderEventKind::Error,
        ProviderEventKind::Stale,
        ProviderEventKind::ConfigurationChanged,
        ProviderEventKind::Reconciling,
        ProviderEventKind::ContextChanged,
    ];
}

impl fmt::Display for ProviderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProviderEventKind::Ready => "PROVIDER_READY",
            ProviderEventKind::Error => "PROVIDER_ERROR",
            ProviderEventKind::Stale => "PROVIDER_STALE",
            ProviderEventKind::ConfigurationChanged => "PROVIDER_CONFIGURATION_CHANGED",
            ProviderEventKind::Reconciling => "PROVIDER_RECONCILING",
            ProviderEventKind::ContextChanged => "PROVIDER_CONTEXT_CHANGED",
        })
    }
}

/// Payload of a provider event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDetails {
    /// Name of the provider that emitted the event.
    pub provider_name: String,
    /// Domain the event was delivered for; `None` for the default scope.
    pub domain: Option<String>,
    /// Keys of flags that changed (configuration-changed events).
    pub flags_changed: Vec<String>,
    /// Human-readable message.
    pub message: Option<String>,
    /// Error code (error events).
    pub error_code: Option<ErrorCode>,
    /// Provider-specific metadata.
    pub metadata: BTreeMap<String, MetadataValue>,
}

impl EventDetails {
    /// Details naming only the provider.
    pub fn for_provider(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            ..Self::default()
        }
    }

    /// Sets the message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the error code.
    pub fn error_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Sets the changed flag keys.
    pub fn flags_changed<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags_changed = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// An event callback.
pub type EventHandler = Arc<dyn Fn(&EventDetails) + Send + Sync>;

/// Identifies one handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    kind: ProviderEventKind,
    handler: EventHandler,
}

#[derive(Default)]
struct EmitterState {
    next_id: u64,
    registrations: Vec<Registration>,
}

fn lock(state: &Mutex<EmitterState>) -> MutexGuard<'_, EmitterState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A typed publish/subscribe bus for provider events.
///
/// Cloning yields another handle to the same bus.
#[derive(Clone, Default)]
pub struct EventEmitter {
    state: Arc<Mutex<EmitterState>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &lock(&self.state).registrations.len())
            .finish()
    }
}

impl EventEmitter {
    /// Creates a bus with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for one kind of event.
    pub fn add_handler(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription {
        let mut state = lock(&self.state);
        let id = HandlerId(state.next_id);
        state.next_id += 1;
        state.registrations.push(Registration { id, kind, handler });
        Subscription {
            id,
            kind,
            state: Arc::downgrade(&self.state),
        }
    }

    /// Removes a registration. Returns `false` if it was already gone.
    pub fn remove_handler(&self, subscription: &Subscription) -> bool {
        remove(&self.state, subscription.id)
    }

    /// The handlers registered for `kind`, in registration order.
    pub fn handlers(&self, kind: ProviderEventKind) -> Vec<EventHandler> {
        lock(&self.state)
            .registrations
            .iter()
            .filter(|r| r.kind == kind)
            .map(|r| r.handler.clone())
            .collect()
    }

    /// Number of registrations across all kinds.
    pub fn len(&self) -> usize {
        lock(&self.state).registrations.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler registered for `kind`.
    pub fn emit(&self, kind: ProviderEventKind, details: &EventDetails) {
        for handler in self.handlers(kind) {
            handler(details);
        }
    }

    /// Removes every registration.
    pub fn clear(&self) {
        lock(&self.state).registrations.clear();
    }
}

fn remove(state: &Mutex<EmitterState>, id: HandlerId) -> bool {
    let mut state = lock(state);
    let before = state.registrations.len();
    state.registrations.retain(|r| r.id != id);
    state.registrations.len() != before
}

/// A handler registration on an [`EventEmitter`].
///
/// Dropping a subscription does not remove the handler; call
/// [`cancel`](Subscription::cancel).
#[derive(Clone)]
pub struct Subscription {
    id: HandlerId,
    kind: ProviderEventKind,
    state: Weak<Mutex<EmitterState>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Subscription {
    /// The registration id.
    pub fn id(&self) -> HandlerId {
        self.id
    }

    /// The event kind the handler listens to.
    pub fn kind(&self) -> ProviderEventKind {
        self.kind
    }

    /// Removes the handler. Idempotent; returns whether this call removed it.
    pub fn cancel(&self) -> bool {
        match self.state.upgrade() {
            Some(state) => remove(&state, self.id),
            None => false,
        }
    }

    /// Whether the handler is still registered.
    pub fn is_active(&self) -> bool {
        self.state
            .upgrade()
            .is_some_and(|state| lock(&state).registrations.iter().any(|r| r.id == self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = counter.clone();
        Arc::new(move |_: &EventDetails| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_emit_only_reaches_matching_kind() {
        let emitter = EventEmitter::new();
        let ready = Arc::new(AtomicUsize::new(0));
        let stale = Arc::new(AtomicUsize::new(0));
        emitter.add_handler(ProviderEventKind::Ready, counting(&ready));
        emitter.add_handler(ProviderEventKind::Stale, counting(&stale));

        emitter.emit(ProviderEventKind::Ready, &EventDetails::for_provider("p"));

        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(stale.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancel_is_idempotent_and_exact() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let first = emitter.add_handler(ProviderEventKind::Ready, counting(&count));
        let _second = emitter.add_handler(ProviderEventKind::Ready, counting(&count));

        assert!(first.cancel());
        assert!(!first.cancel());
        assert!(!emitter.remove_handler(&first));
        assert!(!first.is_active());

        emitter.emit(ProviderEventKind::Ready, &EventDetails::default());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.handlers(ProviderEventKind::Ready).len(), 1);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let emitter = EventEmitter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let handler: EventHandler = {
            let count = count.clone();
            let slot = slot.clone();
            Arc::new(move |_: &EventDetails| {
                count.fetch_add(1, Ordering::SeqCst);
                if let Some(sub) = slot.lock().unwrap().as_ref() {
                    sub.cancel();
                }
            })
        };
        let sub = emitter.add_handler(ProviderEventKind::Ready, handler);
        *slot.lock().unwrap() = Some(sub);

        emitter.emit(ProviderEventKind::Ready, &EventDetails::default());
        emitter.emit(ProviderEventKind::Ready, &EventDetails::default());

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(emitter.is_empty());
    }

    #[test]
    fn test_cancel_after_emitter_dropped() {
        let emitter = EventEmitter::new();
        let sub = emitter.add_handler(ProviderEventKind::Error, Arc::new(|_: &EventDetails| {}));
        drop(emitter);
        assert!(!sub.cancel());
    }
}
