//! # Flag API
//!
//! [`FeatureFlags`] owns everything shared by the clients of one application:
//! the provider registry, global hooks, the global (static) context and the
//! transaction context propagator. It is an ordinary value; construct one at
//! startup and hand it (or its clients) to whatever needs flags.

use crate::client::Client;
use std::{
    fmt,
    future::Future,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};
use vexil_core::{
    EvaluationContext, EventDetails, EventHandler, Hook, ProviderEventKind, ProviderMetadata,
    ProviderStatus, SharedHook, SharedProvider, Subscription, VexilError,
};
use vexil_std::{
    ProviderRegistry, ProviderTransition,
    propagation::{NoopTransactionContextPropagator, TransactionContextPropagator},
};

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the API object and every client it created.
pub(crate) struct ApiShared {
    pub(crate) registry: ProviderRegistry,
    hooks: RwLock<Vec<SharedHook>>,
    context: RwLock<EvaluationContext>,
    propagator: RwLock<Arc<dyn TransactionContextPropagator>>,
}

impl ApiShared {
    pub(crate) fn hooks(&self) -> Vec<SharedHook> {
        read(&self.hooks).clone()
    }

    pub(crate) fn context(&self) -> EvaluationContext {
        read(&self.context).clone()
    }

    pub(crate) fn transaction_context(&self) -> EvaluationContext {
        let propagator = read(&self.propagator).clone();
        propagator.transaction_context()
    }
}

/// The feature-flag API of one application.
///
/// Cloning yields another handle to the same API.
///
/// # Example
///
/// ```rust,ignore
/// let flags = FeatureFlags::builder()
///     .hook(LoggingHook::new())
///     .context(EvaluationContext::new().with_field("region", "eu"))
///     .build();
///
/// flags.set_provider_and_wait(Arc::new(my_provider)).await?;
///
/// let client = flags.client();
/// let enabled = client.get_boolean_value("new-checkout", false, None, None).await;
/// ```
#[derive(Clone)]
pub struct FeatureFlags {
    shared: Arc<ApiShared>,
}

impl fmt::Debug for FeatureFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureFlags")
            .field("registry", &self.shared.registry)
            .field("hooks", &read(&self.shared.hooks).len())
            .field("context", &*read(&self.shared.context))
            .finish()
    }
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureFlags {
    /// An API with no hooks, an empty context and the no-op provider bound.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder.
    pub fn builder() -> FeatureFlagsBuilder {
        FeatureFlagsBuilder::default()
    }

    // ------------------------------------------------------------------------
    // Providers
    // ------------------------------------------------------------------------

    /// Binds the default provider. Returns the transition to drive; the
    /// provider is `NOT_READY` until it completes (if it initializes at all).
    pub fn set_provider(&self, provider: SharedProvider) -> ProviderTransition {
        self.shared
            .registry
            .set_provider(None, provider, self.shared.context())
    }

    /// Binds the provider of `domain`.
    pub fn set_domain_provider(
        &self,
        domain: &str,
        provider: SharedProvider,
    ) -> ProviderTransition {
        self.shared
            .registry
            .set_provider(Some(domain), provider, self.shared.context())
    }

    /// Binds the default provider and waits for its initialization.
    pub async fn set_provider_and_wait(&self, provider: SharedProvider) -> Result<(), VexilError> {
        self.set_provider(provider).await.map_err(VexilError::from)
    }

    /// Binds the provider of `domain` and waits for its initialization.
    pub async fn set_domain_provider_and_wait(
        &self,
        domain: &str,
        provider: SharedProvider,
    ) -> Result<(), VexilError> {
        self.set_domain_provider(domain, provider)
            .await
            .map_err(VexilError::from)
    }

    /// Status of the provider serving `domain` (`None` for the default).
    pub fn provider_status(&self, domain: Option<&str>) -> ProviderStatus {
        self.shared.registry.status(domain)
    }

    /// Metadata of the provider serving `domain` (`None` for the default).
    pub fn provider_metadata(&self, domain: Option<&str>) -> ProviderMetadata {
        self.shared.registry.metadata(domain)
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.shared.registry
    }

    // ------------------------------------------------------------------------
    // Clients
    // ------------------------------------------------------------------------

    /// A client of the default scope.
    pub fn client(&self) -> Client {
        Client::new(self.shared.clone(), None)
    }

    /// A client of `domain`. Served by the default provider until the domain
    /// gets its own.
    pub fn domain_client(&self, domain: impl Into<String>) -> Client {
        Client::new(self.shared.clone(), Some(domain.into()))
    }

    // ------------------------------------------------------------------------
    // Hooks
    // ------------------------------------------------------------------------

    /// Adds a global hook.
    pub fn add_hook<H: Hook>(&self, hook: H) {
        self.add_hooks([Arc::new(hook) as SharedHook]);
    }

    /// Adds global hooks, keeping their order.
    pub fn add_hooks<I: IntoIterator<Item = SharedHook>>(&self, hooks: I) {
        write(&self.shared.hooks).extend(hooks);
    }

    /// The global hooks, in registration order.
    pub fn hooks(&self) -> Vec<SharedHook> {
        self.shared.hooks()
    }

    /// Removes every global hook.
    pub fn clear_hooks(&self) {
        write(&self.shared.hooks).clear();
    }

    // ------------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------------

    /// Replaces the global context.
    ///
    /// Providers that support context changes move to `RECONCILING` at once;
    /// the returned future reconciles them with the new context.
    pub fn set_context(
        &self,
        context: EvaluationContext,
    ) -> impl Future<Output = ()> + Send + 'static {
        let old = std::mem::replace(&mut *write(&self.shared.context), context.clone());
        self.shared.registry.reconcile(old, context)
    }

    /// The global context.
    pub fn context(&self) -> EvaluationContext {
        self.shared.context()
    }

    /// Replaces the transaction context propagator.
    pub fn set_transaction_context_propagator<P: TransactionContextPropagator>(
        &self,
        propagator: P,
    ) {
        *write(&self.shared.propagator) = Arc::new(propagator);
    }

    /// The transaction context of the current unit of work.
    pub fn transaction_context(&self) -> EvaluationContext {
        self.shared.transaction_context()
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Registers a handler hearing `kind` events of every scope.
    ///
    /// Runs the handler at once for every scope whose provider is already in
    /// the matching state.
    pub fn add_handler(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription {
        let registry = &self.shared.registry;
        let subscription = registry.api_events().add_handler(kind, handler.clone());

        let domains = registry.domains();
        let scopes = std::iter::once(None).chain(domains.iter().map(|d| Some(d.as_str())));
        for domain in scopes {
            let (provider, status) = registry.snapshot(domain);
            if status.matches_event(kind) {
                let mut details = EventDetails::for_provider(provider.metadata().name);
                details.domain = domain.map(str::to_owned);
                handler(&details);
            }
        }
        subscription
    }

    /// Removes an API-level handler. Returns `false` if it was already gone.
    pub fn remove_handler(&self, subscription: &Subscription) -> bool {
        self.shared.registry.api_events().remove_handler(subscription)
    }

    /// The API-level handlers for `kind`.
    pub fn handlers(&self, kind: ProviderEventKind) -> Vec<EventHandler> {
        self.shared.registry.api_events().handlers(kind)
    }

    // ------------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------------

    /// Closes every bound provider once and rebinds the default scope to the
    /// no-op provider. Hooks, context and handlers are kept.
    pub async fn close(&self) {
        self.shared.registry.close().await;
    }
}

/// Builder for [`FeatureFlags`].
#[derive(Default)]
pub struct FeatureFlagsBuilder {
    hooks: Vec<SharedHook>,
    context: EvaluationContext,
    propagator: Option<Arc<dyn TransactionContextPropagator>>,
}

impl FeatureFlagsBuilder {
    /// Adds a global hook.
    pub fn hook<H: Hook>(mut self, hook: H) -> Self {
        self.hooks.push(Arc::new(hook));
        self
    }

    /// Adds an already shared global hook.
    pub fn shared_hook(mut self, hook: SharedHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Sets the global context.
    pub fn context(mut self, context: EvaluationContext) -> Self {
        self.context = context;
        self
    }

    /// Sets the transaction context propagator.
    pub fn transaction_context_propagator<P: TransactionContextPropagator>(
        mut self,
        propagator: P,
    ) -> Self {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    /// Builds the API.
    pub fn build(self) -> FeatureFlags {
        let propagator = self
            .propagator
            .unwrap_or_else(|| Arc::new(NoopTransactionContextPropagator));
        FeatureFlags {
            shared: Arc::new(ApiShared {
                registry: ProviderRegistry::new(),
                hooks: RwLock::new(self.hooks),
                context: RwLock::new(self.context),
                propagator: RwLock::new(propagator),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vexil_core::Provider;
    use vexil_std::{providers::NoopProvider, testing::ScriptedProvider};

    struct FixedPropagator(EvaluationContext);

    impl TransactionContextPropagator for FixedPropagator {
        fn transaction_context(&self) -> EvaluationContext {
            self.0.clone()
        }
    }

    #[test]
    fn test_defaults_to_noop_provider() {
        let flags = FeatureFlags::new();
        assert_eq!(flags.provider_status(None), ProviderStatus::Ready);
        assert_eq!(
            flags.provider_metadata(Some("unbound")).name,
            NoopProvider::new().metadata().name
        );
    }

    #[test]
    fn test_builder_sets_context_and_propagator() {
        let flags = FeatureFlags::builder()
            .context(EvaluationContext::new().with_field("region", "eu"))
            .transaction_context_propagator(FixedPropagator(
                EvaluationContext::new().with_targeting_key("request-user"),
            ))
            .build();

        assert!(flags.context().get("region").is_some());
        assert_eq!(
            flags.transaction_context().targeting_key(),
            Some("request-user")
        );
    }

    #[tokio::test]
    async fn test_set_provider_and_wait_reports_initialization_failure() {
        let flags = FeatureFlags::new();
        let provider = Arc::new(ScriptedProvider::new("broken").with_initialization(Err(
            vexil_core::EvaluationError::general("backend unreachable"),
        )));

        let err = flags.set_provider_and_wait(provider).await.unwrap_err();

        assert!(matches!(err, VexilError::Evaluation(_)));
        assert_eq!(flags.provider_status(None), ProviderStatus::Error);
    }

    #[tokio::test]
    async fn test_api_handler_fires_for_every_ready_scope() {
        let flags = FeatureFlags::new();
        flags
            .set_domain_provider_and_wait("billing", Arc::new(ScriptedProvider::new("billing")))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        flags.add_handler(
            ProviderEventKind::Ready,
            Arc::new(move |_: &EventDetails| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        // default scope (no-op) and "billing"
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
