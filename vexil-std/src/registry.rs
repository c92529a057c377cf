//! # Provider Transition Manager
//!
//! [`ProviderRegistry`] binds providers to scopes: the default scope and any
//! number of named domains. A domain without its own binding falls back to the
//! default provider.
//!
//! Handlers are never registered on providers directly. Every scope owns an
//! [`EventEmitter`], and the registry bridges the bound provider's events onto
//! it. Replacing a provider moves the bridge, so handlers keep their identity
//! and never hear the retired provider again.
//!
//! A retired provider is closed only once no scope references it anymore.

use crate::{providers::NoopProvider, status::status_for_event};
use futures::future::{BoxFuture, join_all};
use std::{
    collections::HashMap,
    fmt,
    future::Future,
    iter,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    task::{Context, Poll},
};
use vexil_core::{
    ErrorCode, EvaluationContext, EvaluationError, EventDetails, EventEmitter, EventHandler,
    Provider, ProviderCapabilities, ProviderEventKind, ProviderMetadata, ProviderStatus,
    SharedProvider, Subscription,
};

struct Binding {
    id: u64,
    provider: SharedProvider,
    status: ProviderStatus,
    bridge: Vec<Subscription>,
}

impl Binding {
    fn effective_status(&self) -> ProviderStatus {
        self.provider.status().unwrap_or(self.status)
    }

    fn detach(&self) {
        for subscription in &self.bridge {
            subscription.cancel();
        }
    }
}

/// Events to deliver once the registry lock is released.
struct Emission {
    kind: ProviderEventKind,
    details: EventDetails,
    audience: Vec<EventEmitter>,
}

struct RegistryState {
    next_binding: u64,
    default: Binding,
    domains: HashMap<String, Binding>,
    default_events: EventEmitter,
    domain_events: HashMap<String, EventEmitter>,
}

impl RegistryState {
    fn next_id(&mut self) -> u64 {
        let id = self.next_binding;
        self.next_binding += 1;
        id
    }

    /// The binding serving `domain`, falling back to the default.
    fn binding(&self, domain: Option<&str>) -> &Binding {
        domain
            .and_then(|d| self.domains.get(d))
            .unwrap_or(&self.default)
    }

    /// The binding owned by `domain`, without fallback.
    fn own_binding(&self, domain: Option<&str>) -> Option<&Binding> {
        match domain {
            None => Some(&self.default),
            Some(d) => self.domains.get(d),
        }
    }

    fn own_binding_mut(&mut self, domain: Option<&str>) -> Option<&mut Binding> {
        match domain {
            None => Some(&mut self.default),
            Some(d) => self.domains.get_mut(d),
        }
    }

    fn bindings(&self) -> impl Iterator<Item = &Binding> {
        iter::once(&self.default).chain(self.domains.values())
    }

    fn references(&self, provider: &SharedProvider) -> bool {
        self.bindings().any(|b| Arc::ptr_eq(&b.provider, provider))
    }

    fn unique_providers(&self) -> Vec<SharedProvider> {
        let mut providers: Vec<SharedProvider> = Vec::new();
        for binding in self.bindings() {
            if !providers.iter().any(|p| Arc::ptr_eq(p, &binding.provider)) {
                providers.push(binding.provider.clone());
            }
        }
        providers
    }

    /// The scope buses that hear the binding owned by `domain`. Default-scope
    /// events also reach every domain without its own binding.
    fn audience(&self, domain: Option<&str>) -> Vec<EventEmitter> {
        match domain {
            Some(d) => self.domain_events.get(d).cloned().into_iter().collect(),
            None => iter::once(self.default_events.clone())
                .chain(
                    self.domain_events
                        .iter()
                        .filter(|(d, _)| !self.domains.contains_key(*d))
                        .map(|(_, events)| events.clone()),
                )
                .collect(),
        }
    }

    fn emission(
        &self,
        domain: Option<&str>,
        kind: ProviderEventKind,
        details: &EventDetails,
    ) -> Emission {
        let mut details = details.clone();
        details.domain = domain.map(str::to_owned);
        if details.provider_name.is_empty() {
            details.provider_name = self.binding(domain).provider.metadata().name;
        }
        Emission {
            kind,
            details,
            audience: self.audience(domain),
        }
    }
}

struct RegistryShared {
    state: Mutex<RegistryState>,
    api_events: EventEmitter,
}

impl RegistryShared {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, emissions: Vec<Emission>) {
        for emission in emissions {
            tracing::trace!(
                kind = %emission.kind,
                provider = %emission.details.provider_name,
                domain = ?emission.details.domain,
                "provider event"
            );
            for events in &emission.audience {
                events.emit(emission.kind, &emission.details);
            }
            self.api_events.emit(emission.kind, &emission.details);
        }
    }

    fn on_provider_event(
        &self,
        binding_id: u64,
        domain: Option<&str>,
        kind: ProviderEventKind,
        details: &EventDetails,
    ) {
        let emission = {
            let mut state = self.lock();
            let Some(binding) = state.own_binding_mut(domain) else {
                return;
            };
            if binding.id != binding_id {
                return;
            }
            if let Some(status) = status_for_event(kind, details) {
                binding.status = status;
            }
            state.emission(domain, kind, details)
        };
        self.dispatch(vec![emission]);
    }

    /// Moves every binding of `provider` to `status` and announces it with
    /// `kind`. With `on_change_only`, bindings already in `status` are left
    /// alone and hear nothing.
    fn transition(
        &self,
        provider: &SharedProvider,
        status: ProviderStatus,
        kind: ProviderEventKind,
        details: &EventDetails,
        on_change_only: bool,
    ) {
        let emissions = {
            let mut state = self.lock();
            let RegistryState {
                default, domains, ..
            } = &mut *state;
            let mut touched: Vec<Option<String>> = Vec::new();
            let all = iter::once((None, default))
                .chain(domains.iter_mut().map(|(d, b)| (Some(d.clone()), b)));
            for (domain, binding) in all {
                if !Arc::ptr_eq(&binding.provider, provider) {
                    continue;
                }
                if on_change_only && binding.status == status {
                    continue;
                }
                binding.status = status;
                touched.push(domain);
            }
            touched
                .iter()
                .map(|domain| state.emission(domain.as_deref(), kind, details))
                .collect::<Vec<_>>()
        };
        self.dispatch(emissions);
    }

    fn settle_initialization(
        &self,
        provider: &SharedProvider,
        result: &Result<(), EvaluationError>,
    ) {
        let name = provider.metadata().name;
        match result {
            Ok(()) => {
                tracing::debug!(provider = %name, "provider initialized");
                self.transition(
                    provider,
                    ProviderStatus::Ready,
                    ProviderEventKind::Ready,
                    &EventDetails::for_provider(name),
                    true,
                );
            }
            Err(error) => {
                tracing::warn!(provider = %name, %error, "provider initialization failed");
                self.transition(
                    provider,
                    status_for_error(error),
                    ProviderEventKind::Error,
                    &error_details(name, error),
                    true,
                );
            }
        }
    }
}

fn status_for_error(error: &EvaluationError) -> ProviderStatus {
    if error.code() == ErrorCode::ProviderFatal {
        ProviderStatus::Fatal
    } else {
        ProviderStatus::Error
    }
}

fn error_details(provider_name: String, error: &EvaluationError) -> EventDetails {
    let details = EventDetails::for_provider(provider_name).error_code(error.code());
    match error.message() {
        Some(message) => details.message(message),
        None => details,
    }
}

/// Subscribes the registry to every event kind of `provider`, on behalf of
/// binding `binding_id`.
fn bridge(
    shared: &Arc<RegistryShared>,
    binding_id: u64,
    domain: Option<String>,
    provider: &SharedProvider,
) -> Vec<Subscription> {
    let Some(events) = provider.events() else {
        return Vec::new();
    };
    ProviderEventKind::ALL
        .iter()
        .map(|&kind| {
            let weak: Weak<RegistryShared> = Arc::downgrade(shared);
            let domain = domain.clone();
            let handler: EventHandler = Arc::new(move |details: &EventDetails| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_provider_event(binding_id, domain.as_deref(), kind, details);
                }
            });
            events.add_handler(kind, handler)
        })
        .collect()
}

async fn close_provider(provider: &dyn Provider) {
    if !provider.capabilities().contains(ProviderCapabilities::CLOSE) {
        return;
    }
    if let Err(err) = provider.on_close().await {
        tracing::warn!(
            provider = %provider.metadata().name,
            error = %err,
            "provider failed to close"
        );
    }
}

/// The pending part of a provider replacement: closing the retired provider
/// and initializing the new one.
///
/// The binding itself is swapped as soon as
/// [`ProviderRegistry::set_provider`] returns; until this future completes, a
/// provider that needs initialization is `NOT_READY`. Resolves to the
/// initialization result.
#[must_use = "a provider transition does nothing unless awaited or spawned"]
pub struct ProviderTransition {
    inner: BoxFuture<'static, Result<(), EvaluationError>>,
}

impl fmt::Debug for ProviderTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTransition").finish_non_exhaustive()
    }
}

impl ProviderTransition {
    fn new(future: impl Future<Output = Result<(), EvaluationError>> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(future),
        }
    }

    fn settled() -> Self {
        Self::new(futures::future::ready(Ok(())))
    }
}

impl Future for ProviderTransition {
    type Output = Result<(), EvaluationError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().inner.as_mut().poll(cx)
    }
}

/// Binds providers to the default scope and to named domains.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct ProviderRegistry {
    shared: Arc<RegistryShared>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ProviderRegistry")
            .field("default", &state.default.provider.metadata().name)
            .field("domains", &state.domains.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    /// A registry whose default scope is bound to a [`NoopProvider`].
    pub fn new() -> Self {
        let noop: SharedProvider = Arc::new(NoopProvider::new());
        Self {
            shared: Arc::new(RegistryShared {
                state: Mutex::new(RegistryState {
                    next_binding: 1,
                    default: Binding {
                        id: 0,
                        provider: noop,
                        status: ProviderStatus::Ready,
                        bridge: Vec::new(),
                    },
                    domains: HashMap::new(),
                    default_events: EventEmitter::new(),
                    domain_events: HashMap::new(),
                }),
                api_events: EventEmitter::new(),
            }),
        }
    }

    /// Binds `provider` to `domain` (`None` for the default scope).
    ///
    /// The swap happens immediately. The returned transition closes the
    /// retired provider if no scope references it anymore and initializes
    /// `provider` with `context` if it advertises
    /// [`ProviderCapabilities::INITIALIZE`]. Providers without initialization
    /// are `READY` at once.
    ///
    /// Binding the provider a scope already holds is a no-op. A provider
    /// already bound to another scope is not initialized again; the new scope
    /// inherits its status.
    pub fn set_provider(
        &self,
        domain: Option<&str>,
        provider: SharedProvider,
        context: EvaluationContext,
    ) -> ProviderTransition {
        let (needs_init, retired, emission) = {
            let mut state = self.shared.lock();
            if state
                .own_binding(domain)
                .is_some_and(|b| Arc::ptr_eq(&b.provider, &provider))
            {
                return ProviderTransition::settled();
            }

            let inherited = state
                .bindings()
                .find(|b| Arc::ptr_eq(&b.provider, &provider))
                .map(|b| b.status);
            let initializes = provider
                .capabilities()
                .contains(ProviderCapabilities::INITIALIZE);
            let (status, needs_init) = match inherited {
                Some(status) => (status, false),
                None if initializes => (ProviderStatus::NotReady, true),
                None => (ProviderStatus::Ready, false),
            };

            let id = state.next_id();
            let binding = Binding {
                id,
                provider: provider.clone(),
                status,
                bridge: bridge(&self.shared, id, domain.map(str::to_owned), &provider),
            };
            let old = match domain {
                None => Some(std::mem::replace(&mut state.default, binding)),
                Some(d) => state.domains.insert(d.to_owned(), binding),
            };
            let retired = old.and_then(|old| {
                old.detach();
                (!state.references(&old.provider)).then_some(old.provider)
            });

            tracing::debug!(
                domain = ?domain,
                provider = %provider.metadata().name,
                %status,
                "provider bound"
            );
            let emission = (status == ProviderStatus::Ready).then(|| {
                state.emission(
                    domain,
                    ProviderEventKind::Ready,
                    &EventDetails::for_provider(provider.metadata().name),
                )
            });
            (needs_init, retired, emission)
        };
        self.shared.dispatch(emission.into_iter().collect());

        let shared = self.shared.clone();
        ProviderTransition::new(async move {
            if let Some(retired) = retired {
                close_provider(retired.as_ref()).await;
            }
            if !needs_init {
                return Ok(());
            }
            let result = provider.initialize(&context).await;
            shared.settle_initialization(&provider, &result);
            result
        })
    }

    /// The provider serving `domain`.
    pub fn provider(&self, domain: Option<&str>) -> SharedProvider {
        self.shared.lock().binding(domain).provider.clone()
    }

    /// The status of the provider serving `domain`.
    ///
    /// A status maintained by the provider itself takes precedence.
    pub fn status(&self, domain: Option<&str>) -> ProviderStatus {
        self.shared.lock().binding(domain).effective_status()
    }

    /// The provider serving `domain` together with its status, read at once.
    pub fn snapshot(&self, domain: Option<&str>) -> (SharedProvider, ProviderStatus) {
        let state = self.shared.lock();
        let binding = state.binding(domain);
        (binding.provider.clone(), binding.effective_status())
    }

    /// Metadata of the provider serving `domain`.
    pub fn metadata(&self, domain: Option<&str>) -> ProviderMetadata {
        self.shared.lock().binding(domain).provider.metadata()
    }

    /// Domains with their own binding.
    pub fn domains(&self) -> Vec<String> {
        self.shared.lock().domains.keys().cloned().collect()
    }

    /// The event bus of a scope. Created on first use for domains.
    pub fn scope_events(&self, domain: Option<&str>) -> EventEmitter {
        let mut state = self.shared.lock();
        match domain {
            None => state.default_events.clone(),
            Some(d) => state.domain_events.entry(d.to_owned()).or_default().clone(),
        }
    }

    /// The bus hearing the events of every scope.
    pub fn api_events(&self) -> &EventEmitter {
        &self.shared.api_events
    }

    /// Reconciles every bound provider that supports context changes with a
    /// new static context.
    ///
    /// Affected scopes move to `RECONCILING` at once. The returned future
    /// awaits every provider; each scope then moves to `READY` with a
    /// context-changed event, or to `ERROR` with an error event.
    pub fn reconcile(
        &self,
        old_context: EvaluationContext,
        new_context: EvaluationContext,
    ) -> impl Future<Output = ()> + Send + 'static {
        let providers: Vec<SharedProvider> = self
            .shared
            .lock()
            .unique_providers()
            .into_iter()
            .filter(|p| p.capabilities().contains(ProviderCapabilities::CONTEXT_CHANGE))
            .collect();
        for provider in &providers {
            self.shared.transition(
                provider,
                ProviderStatus::Reconciling,
                ProviderEventKind::Reconciling,
                &EventDetails::for_provider(provider.metadata().name),
                false,
            );
        }

        let shared = self.shared.clone();
        async move {
            let (shared, old_context, new_context) = (&shared, &old_context, &new_context);
            join_all(providers.iter().map(|provider| async move {
                let name = provider.metadata().name;
                match provider.on_context_change(old_context, new_context).await {
                    Ok(()) => shared.transition(
                        provider,
                        ProviderStatus::Ready,
                        ProviderEventKind::ContextChanged,
                        &EventDetails::for_provider(name),
                        false,
                    ),
                    Err(error) => {
                        tracing::warn!(provider = %name, %error, "provider failed to reconcile");
                        shared.transition(
                            provider,
                            status_for_error(&error),
                            ProviderEventKind::Error,
                            &error_details(name, &error),
                            false,
                        );
                    }
                }
            }))
            .await;
        }
    }

    /// Unbinds every provider, closes each one once and rebinds the default
    /// scope to a [`NoopProvider`]. Scope handlers stay registered.
    pub async fn close(&self) {
        let providers = {
            let mut state = self.shared.lock();
            let providers = state.unique_providers();
            for binding in state.bindings() {
                binding.detach();
            }
            state.domains.clear();
            let id = state.next_id();
            state.default = Binding {
                id,
                provider: Arc::new(NoopProvider::new()),
                status: ProviderStatus::Ready,
                bridge: Vec::new(),
            };
            providers
        };
        for provider in providers {
            close_provider(provider.as_ref()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProvider;

    type Log = Arc<Mutex<Vec<(ProviderEventKind, String, Option<String>)>>>;

    fn record(events: &EventEmitter, kinds: &[ProviderEventKind]) -> Log {
        let log: Log = Arc::default();
        for &kind in kinds {
            let sink = log.clone();
            events.add_handler(
                kind,
                Arc::new(move |details: &EventDetails| {
                    sink.lock().unwrap().push((
                        kind,
                        details.provider_name.clone(),
                        details.domain.clone(),
                    ));
                }),
            );
        }
        log
    }

    #[test]
    fn test_default_scope_is_noop_and_ready() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.status(None), ProviderStatus::Ready);
        assert_eq!(registry.metadata(None).name, "No-op Provider");
        assert_eq!(registry.metadata(Some("unbound")).name, "No-op Provider");
    }

    #[tokio::test]
    async fn test_provider_without_initialize_is_ready_at_once() {
        let registry = ProviderRegistry::new();
        let log = record(&registry.scope_events(None), &[ProviderEventKind::Ready]);
        let api_log = record(registry.api_events(), &[ProviderEventKind::Ready]);

        let transition =
            registry.set_provider(None, Arc::new(ScriptedProvider::new("plain")), EvaluationContext::new());
        assert_eq!(registry.status(None), ProviderStatus::Ready);
        transition.await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(api_log.lock().unwrap()[0].1, "plain");
    }

    #[tokio::test]
    async fn test_initialization_moves_scope_to_ready_once() {
        let registry = ProviderRegistry::new();
        let (provider, gate) = ScriptedProvider::new("slow")
            .announcing_ready()
            .with_initialization_gate();
        let provider = Arc::new(provider);
        let log = record(&registry.scope_events(None), &[ProviderEventKind::Ready]);

        let transition = registry.set_provider(None, provider.clone(), EvaluationContext::new());
        assert_eq!(registry.status(None), ProviderStatus::NotReady);

        gate.open();
        transition.await.unwrap();

        assert_eq!(registry.status(None), ProviderStatus::Ready);
        assert_eq!(provider.init_count(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_initialization_failure_moves_scope_to_error() {
        let registry = ProviderRegistry::new();
        let log = record(&registry.scope_events(Some("billing")), &[ProviderEventKind::Error]);
        let provider = Arc::new(
            ScriptedProvider::new("broken")
                .with_initialization(Err(EvaluationError::general("no credentials"))),
        );

        let err = registry
            .set_provider(Some("billing"), provider, EvaluationContext::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::General);
        assert_eq!(registry.status(Some("billing")), ProviderStatus::Error);
        assert_eq!(registry.status(None), ProviderStatus::Ready);
        assert_eq!(
            *log.lock().unwrap(),
            vec![(ProviderEventKind::Error, "broken".to_string(), Some("billing".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_fatal_initialization() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(
            ScriptedProvider::new("doomed").with_initialization(Err(EvaluationError::provider_fatal())),
        );
        let _ = registry.set_provider(None, provider, EvaluationContext::new()).await;
        assert_eq!(registry.status(None), ProviderStatus::Fatal);
    }

    #[tokio::test]
    async fn test_replaced_provider_events_are_not_forwarded() {
        let registry = ProviderRegistry::new();
        let log = record(
            &registry.scope_events(Some("x")),
            &[ProviderEventKind::Ready, ProviderEventKind::Stale],
        );
        let old = Arc::new(ScriptedProvider::new("old"));
        let new = Arc::new(ScriptedProvider::new("new"));

        registry
            .set_provider(Some("x"), old.clone(), EvaluationContext::new())
            .await
            .unwrap();
        registry
            .set_provider(Some("x"), new.clone(), EvaluationContext::new())
            .await
            .unwrap();
        old.emit(ProviderEventKind::Stale);
        new.emit(ProviderEventKind::Stale);

        let providers: Vec<_> = log.lock().unwrap().iter().map(|e| e.1.clone()).collect();
        assert_eq!(providers, vec!["old", "new", "new"]);
        assert_eq!(registry.status(Some("x")), ProviderStatus::Stale);
        assert_eq!(old.close_count(), 1);
    }

    #[tokio::test]
    async fn test_shared_provider_is_closed_only_when_unreferenced() {
        let registry = ProviderRegistry::new();
        let shared = Arc::new(ScriptedProvider::new("shared").with_initialization(Ok(())));

        registry
            .set_provider(None, shared.clone(), EvaluationContext::new())
            .await
            .unwrap();
        registry
            .set_provider(Some("a"), shared.clone(), EvaluationContext::new())
            .await
            .unwrap();
        assert_eq!(shared.init_count(), 1);
        assert_eq!(registry.status(Some("a")), ProviderStatus::Ready);

        registry
            .set_provider(None, Arc::new(ScriptedProvider::new("other")), EvaluationContext::new())
            .await
            .unwrap();
        assert_eq!(shared.close_count(), 0);

        registry
            .set_provider(Some("a"), Arc::new(ScriptedProvider::new("other")), EvaluationContext::new())
            .await
            .unwrap();
        assert_eq!(shared.close_count(), 1);
    }

    #[tokio::test]
    async fn test_setting_same_provider_is_noop() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(ScriptedProvider::new("p").with_initialization(Ok(())));
        registry
            .set_provider(None, provider.clone(), EvaluationContext::new())
            .await
            .unwrap();
        registry
            .set_provider(None, provider.clone(), EvaluationContext::new())
            .await
            .unwrap();
        assert_eq!(provider.init_count(), 1);
        assert_eq!(provider.close_count(), 0);
    }

    #[tokio::test]
    async fn test_default_events_reach_unbound_domains_only() {
        let registry = ProviderRegistry::new();
        let unbound = record(&registry.scope_events(Some("unbound")), &[ProviderEventKind::Stale]);
        let bound = record(&registry.scope_events(Some("bound")), &[ProviderEventKind::Stale]);
        let default_provider = Arc::new(ScriptedProvider::new("default"));
        registry
            .set_provider(None, default_provider.clone(), EvaluationContext::new())
            .await
            .unwrap();
        registry
            .set_provider(Some("bound"), Arc::new(ScriptedProvider::new("own")), EvaluationContext::new())
            .await
            .unwrap();

        default_provider.emit(ProviderEventKind::Stale);

        assert_eq!(unbound.lock().unwrap().len(), 1);
        assert!(bound.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(ScriptedProvider::new("p"));
        let log = record(
            &registry.scope_events(None),
            &[ProviderEventKind::Reconciling, ProviderEventKind::ContextChanged],
        );
        registry
            .set_provider(None, provider.clone(), EvaluationContext::new())
            .await
            .unwrap();

        let reconciliation = registry.reconcile(
            EvaluationContext::new(),
            EvaluationContext::new().with_targeting_key("user-2"),
        );
        assert_eq!(registry.status(None), ProviderStatus::Reconciling);
        reconciliation.await;

        assert_eq!(registry.status(None), ProviderStatus::Ready);
        assert_eq!(provider.context_change_count(), 1);
        let kinds: Vec<_> = log.lock().unwrap().iter().map(|e| e.0).collect();
        assert_eq!(
            kinds,
            vec![ProviderEventKind::Reconciling, ProviderEventKind::ContextChanged]
        );
    }

    #[tokio::test]
    async fn test_reconcile_failure() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(
            ScriptedProvider::new("p").failing_context_change(EvaluationError::general("stale")),
        );
        registry
            .set_provider(None, provider, EvaluationContext::new())
            .await
            .unwrap();

        registry
            .reconcile(EvaluationContext::new(), EvaluationContext::new())
            .await;

        assert_eq!(registry.status(None), ProviderStatus::Error);
    }

    #[tokio::test]
    async fn test_close_closes_each_provider_once() {
        let registry = ProviderRegistry::new();
        let provider = Arc::new(ScriptedProvider::new("p"));
        registry
            .set_provider(None, provider.clone(), EvaluationContext::new())
            .await
            .unwrap();
        registry
            .set_provider(Some("a"), provider.clone(), EvaluationContext::new())
            .await
            .unwrap();

        registry.close().await;

        assert_eq!(provider.close_count(), 1);
        assert!(registry.domains().is_empty());
        assert_eq!(registry.metadata(None).name, "No-op Provider");
    }
}
