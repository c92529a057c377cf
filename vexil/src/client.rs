//! # Client
//!
//! A [`Client`] evaluates flags for one scope. Every evaluation:
//!
//! 1. snapshots the scope's provider and status,
//! 2. merges context layers: global, transaction, client, invocation,
//! 3. runs the hook pipeline with global, client, invocation, then provider
//!    hooks.
//!
//! Evaluation never fails: errors come back as details carrying the default
//! value, an error code and reason `ERROR`.

use crate::{
    api::{ApiShared, read, write},
    options::EvaluationOptions,
};
use std::{
    fmt,
    sync::{Arc, RwLock},
};
use vexil_core::{
    ClientMetadata, EvaluationContext, EvaluationDetails, EventDetails, EventHandler, FlagType,
    Hook, HookContext, HookHints, ProviderCapabilities, ProviderEventKind, ProviderMetadata,
    ProviderStatus, SharedHook, Subscription, TrackingEventDetails, Value, merge_contexts,
};
use vexil_std::HookPipeline;

/// Evaluates flags for one scope.
///
/// Cloning yields another handle to the same client: hooks and context set
/// through one clone are seen by all.
#[derive(Clone)]
pub struct Client {
    api: Arc<ApiShared>,
    metadata: ClientMetadata,
    hooks: Arc<RwLock<Vec<SharedHook>>>,
    context: Arc<RwLock<EvaluationContext>>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("domain", &self.metadata.domain)
            .field("hooks", &read(&self.hooks).len())
            .field("context", &*read(&self.context))
            .finish()
    }
}

impl Client {
    pub(crate) fn new(api: Arc<ApiShared>, domain: Option<String>) -> Self {
        Self {
            api,
            metadata: ClientMetadata::new(domain),
            hooks: Arc::default(),
            context: Arc::default(),
        }
    }

    /// Describes this client.
    pub fn metadata(&self) -> &ClientMetadata {
        &self.metadata
    }

    /// The domain this client is bound to; `None` for the default scope.
    pub fn domain(&self) -> Option<&str> {
        self.metadata.domain.as_deref()
    }

    /// Status of the provider serving this client.
    pub fn provider_status(&self) -> ProviderStatus {
        self.api.registry.status(self.domain())
    }

    /// Metadata of the provider serving this client.
    pub fn provider_metadata(&self) -> ProviderMetadata {
        self.api.registry.metadata(self.domain())
    }

    // ------------------------------------------------------------------------
    // Hooks and context
    // ------------------------------------------------------------------------

    /// Adds a client hook.
    pub fn add_hook<H: Hook>(&self, hook: H) {
        self.add_hooks([Arc::new(hook) as SharedHook]);
    }

    /// Adds client hooks, keeping their order.
    pub fn add_hooks<I: IntoIterator<Item = SharedHook>>(&self, hooks: I) {
        write(&self.hooks).extend(hooks);
    }

    /// The client hooks, in registration order.
    pub fn hooks(&self) -> Vec<SharedHook> {
        read(&self.hooks).clone()
    }

    /// Removes every client hook.
    pub fn clear_hooks(&self) {
        write(&self.hooks).clear();
    }

    /// Replaces the client context.
    pub fn set_context(&self, context: EvaluationContext) {
        *write(&self.context) = context;
    }

    /// The client context.
    pub fn context(&self) -> EvaluationContext {
        read(&self.context).clone()
    }

    fn merged_context(&self, invocation: Option<&EvaluationContext>) -> EvaluationContext {
        let global = self.api.context();
        let transaction = self.api.transaction_context();
        let client = self.context();
        merge_contexts([&global, &transaction, &client].into_iter().chain(invocation))
    }

    // ------------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------------

    /// Evaluates a flag of any [`FlagType`], returning full details.
    pub async fn get_details<T: FlagType>(
        &self,
        flag_key: &str,
        default_value: T,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> EvaluationDetails<T> {
        let (provider, status) = self.api.registry.snapshot(self.domain());
        let context = self.merged_context(context);

        let mut hooks = self.api.hooks();
        hooks.extend(self.hooks());
        if let Some(options) = options {
            hooks.extend(options.hooks.iter().cloned());
        }
        hooks.extend(provider.hooks());

        let no_hints = HookHints::new();
        let hints = options.map_or(&no_hints, |o| &o.hook_hints);

        let hook_context = HookContext::new(
            flag_key,
            default_value.clone().into_flag_value(),
            context,
            self.metadata.clone(),
            provider.metadata(),
        );
        HookPipeline::new(&hooks, hints)
            .evaluate(provider.as_ref(), status, hook_context, default_value)
            .await
    }

    /// Evaluates a flag of any [`FlagType`], returning only the value.
    pub async fn get_value<T: FlagType>(
        &self,
        flag_key: &str,
        default_value: T,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> T {
        self.get_details(flag_key, default_value, context, options)
            .await
            .value
    }

    /// Evaluates a boolean flag.
    pub async fn get_boolean_value(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> bool {
        self.get_value(flag_key, default_value, context, options)
            .await
    }

    /// Evaluates a boolean flag with details.
    pub async fn get_boolean_details(
        &self,
        flag_key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> EvaluationDetails<bool> {
        self.get_details(flag_key, default_value, context, options)
            .await
    }

    /// Evaluates a string flag.
    pub async fn get_string_value(
        &self,
        flag_key: &str,
        default_value: impl Into<String>,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> String {
        self.get_value(flag_key, default_value.into(), context, options)
            .await
    }

    /// Evaluates a string flag with details.
    pub async fn get_string_details(
        &self,
        flag_key: &str,
        default_value: impl Into<String>,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> EvaluationDetails<String> {
        self.get_details(flag_key, default_value.into(), context, options)
            .await
    }

    /// Evaluates a number flag.
    pub async fn get_number_value(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> f64 {
        self.get_value(flag_key, default_value, context, options)
            .await
    }

    /// Evaluates a number flag with details.
    pub async fn get_number_details(
        &self,
        flag_key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> EvaluationDetails<f64> {
        self.get_details(flag_key, default_value, context, options)
            .await
    }

    /// Evaluates an object flag.
    pub async fn get_object_value(
        &self,
        flag_key: &str,
        default_value: Value,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> Value {
        self.get_value(flag_key, default_value, context, options)
            .await
    }

    /// Evaluates an object flag with details.
    pub async fn get_object_details(
        &self,
        flag_key: &str,
        default_value: Value,
        context: Option<&EvaluationContext>,
        options: Option<&EvaluationOptions>,
    ) -> EvaluationDetails<Value> {
        self.get_details(flag_key, default_value, context, options)
            .await
    }

    // ------------------------------------------------------------------------
    // Tracking
    // ------------------------------------------------------------------------

    /// Records a tracking event with the provider serving this client.
    ///
    /// Skipped while the provider is `NOT_READY` or `FATAL`. Provider failures
    /// are logged, never returned.
    pub fn track(
        &self,
        event_name: &str,
        context: Option<&EvaluationContext>,
        details: Option<&TrackingEventDetails>,
    ) {
        let (provider, status) = self.api.registry.snapshot(self.domain());
        if status.blocks_evaluation() {
            tracing::debug!(event = event_name, %status, "tracking skipped, provider not usable");
            return;
        }
        if !provider.capabilities().contains(ProviderCapabilities::TRACK) {
            return;
        }

        let context = self.merged_context(context);
        let details = details.cloned().unwrap_or_default();
        if let Err(error) = provider.track(event_name, &context, &details) {
            tracing::warn!(
                provider = %provider.metadata().name,
                event = event_name,
                %error,
                "tracking failed"
            );
        }
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Registers a handler for `kind` events of this client's scope.
    ///
    /// The handler stays attached across provider swaps. It runs at once when
    /// the provider is already in the matching state.
    pub fn add_handler(&self, kind: ProviderEventKind, handler: EventHandler) -> Subscription {
        let domain = self.domain();
        let subscription = self
            .api
            .registry
            .scope_events(domain)
            .add_handler(kind, handler.clone());

        let (provider, status) = self.api.registry.snapshot(domain);
        if status.matches_event(kind) {
            let mut details = EventDetails::for_provider(provider.metadata().name);
            details.domain = domain.map(str::to_owned);
            handler(&details);
        }
        subscription
    }

    /// Removes a handler. Returns `false` if it was already gone.
    pub fn remove_handler(&self, subscription: &Subscription) -> bool {
        self.api
            .registry
            .scope_events(self.domain())
            .remove_handler(subscription)
    }

    /// The handlers registered for `kind` on this client's scope.
    pub fn handlers(&self, kind: ProviderEventKind) -> Vec<EventHandler> {
        self.api.registry.scope_events(self.domain()).handlers(kind)
    }
}

#[cfg(test)]
mod tests {
    use crate::FeatureFlags;
    use std::sync::Arc;
    use vexil_core::{EvaluationContext, ResolutionDetails};
    use vexil_std::testing::ScriptedProvider;

    #[tokio::test]
    async fn test_context_layers_merge_by_precedence() {
        let flags = FeatureFlags::builder()
            .context(
                EvaluationContext::new()
                    .with_field("layer", "global")
                    .with_field("region", "eu"),
            )
            .build();
        let provider = Arc::new(
            ScriptedProvider::new("scripted").with_boolean("f", Ok(ResolutionDetails::new(true))),
        );
        flags.set_provider_and_wait(provider.clone()).await.unwrap();

        let client = flags.client();
        client.set_context(
            EvaluationContext::new()
                .with_field("layer", "client")
                .with_field("tier", "gold"),
        );
        let invocation = EvaluationContext::new().with_field("layer", "invocation");
        client
            .get_boolean_value("f", false, Some(&invocation), None)
            .await;

        let seen = provider.last_context().unwrap();
        assert_eq!(seen.get("layer").and_then(|v| v.as_str()), Some("invocation"));
        assert_eq!(seen.get("region").and_then(|v| v.as_str()), Some("eu"));
        assert_eq!(seen.get("tier").and_then(|v| v.as_str()), Some("gold"));
    }

    #[tokio::test]
    async fn test_clones_share_hooks_and_context() {
        let flags = FeatureFlags::new();
        let client = flags.domain_client("checkout");
        let other = client.clone();

        other.set_context(EvaluationContext::new().with_targeting_key("user-1"));
        other.add_hook(vexil_std::hooks::LoggingHook::new());

        assert_eq!(client.context().targeting_key(), Some("user-1"));
        assert_eq!(client.hooks().len(), 1);
        assert_eq!(client.domain(), Some("checkout"));
    }
}
