//! The multi-provider aggregator.

use super::{
    entry::{NamedProvider, ProviderEntry, assign_names},
    first_match::FirstMatchStrategy,
    strategy::{
        EvaluationStrategy, FinalResult, ProviderResolution, RunMode, StrategyEvaluationContext,
        StrategyProviderContext,
    },
};
use crate::{pipeline::HookPipeline, status::StatusTracker};
use futures::future::join_all;
use std::{fmt, sync::Arc};
use vexil_core::{
    AggregateError, BoxError, ClientMetadata, ConfigError, ErrorCode, EvaluationContext,
    EvaluationError, EventDetails, EventEmitter, FlagType, FlagValue, FlagValueType, HookContext,
    HookHints, Provider, ProviderCapabilities, ProviderFailure, ProviderMetadata, ProviderStatus,
    ResolutionDetails, SharedProvider, TrackingEventDetails, Value, async_trait,
};

/// The name every multi-provider reports in its metadata.
pub const MULTI_PROVIDER_NAME: &str = "multiprovider";

/// A multi-provider evaluation result, with the entry that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiResolution<T> {
    /// The entry whose result was chosen.
    pub provider_name: String,
    /// The chosen resolution.
    pub details: ResolutionDetails<T>,
}

/// Fans one evaluation out to several providers and reduces the results with
/// an [`EvaluationStrategy`].
///
/// Each provider is evaluated through its own hook pipeline, with its own
/// hooks and a private copy of the shared hook context, so one provider's
/// `before` hooks never affect another provider's evaluation.
///
/// The multi-provider is itself a [`Provider`]: its status is the aggregate of
/// its providers' statuses, and its events announce aggregate changes.
///
/// # Example
///
/// ```rust,ignore
/// let multi = MultiProvider::builder()
///     .named("primary", primary)
///     .named("legacy", legacy)
///     .strategy(ComparisonStrategy::new("primary").on_mismatch(|r| warn!(?r)))
///     .build()?;
/// ```
pub struct MultiProvider {
    providers: Vec<NamedProvider>,
    strategy: Arc<dyn EvaluationStrategy>,
    tracker: StatusTracker,
    metadata: ProviderMetadata,
}

impl fmt::Debug for MultiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiProvider")
            .field("providers", &self.provider_names().collect::<Vec<_>>())
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl MultiProvider {
    /// Starts building a multi-provider.
    pub fn builder() -> MultiProviderBuilder {
        MultiProviderBuilder::default()
    }

    /// The entry names, in registration order.
    pub fn provider_names(&self) -> impl Iterator<Item = &str> {
        self.providers.iter().map(|p| p.name.as_str())
    }

    /// The provider registered as `name`.
    pub fn provider(&self, name: &str) -> Option<&SharedProvider> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.provider)
    }

    /// The status tracker following the providers.
    pub fn status_tracker(&self) -> &StatusTracker {
        &self.tracker
    }

    fn status_of(&self, entry: &NamedProvider) -> ProviderStatus {
        entry
            .provider
            .status()
            .or_else(|| self.tracker.status_of(&entry.name))
            .unwrap_or_default()
    }

    /// Evaluates a flag against the providers.
    ///
    /// `shared` is the caller's hook context; every provider receives a fork of
    /// it carrying the same evaluation id.
    pub async fn evaluate<T: FlagType>(
        &self,
        shared: &HookContext,
        default_value: T,
        hints: &HookHints,
    ) -> Result<MultiResolution<T>, AggregateError> {
        let evaluation = StrategyEvaluationContext {
            flag_key: shared.flag_key(),
            flag_type: T::TYPE,
            context: shared.context(),
        };

        let eligible: Vec<(&NamedProvider, ProviderStatus)> = self
            .providers
            .iter()
            .map(|entry| (entry, self.status_of(entry)))
            .filter(|(entry, status)| {
                self.strategy
                    .should_evaluate_this_provider(&strategy_provider(entry, *status), &evaluation)
            })
            .collect();
        if eligible.is_empty() {
            return Err(self.no_eligible_provider());
        }

        let resolutions = match self.strategy.run_mode() {
            RunMode::Sequential => {
                let mut resolutions = Vec::with_capacity(eligible.len());
                for (entry, status) in eligible {
                    let resolution = self
                        .evaluate_provider(entry, status, shared, default_value.clone(), hints)
                        .await;
                    let proceed = self.strategy.should_evaluate_next_provider(
                        &strategy_provider(entry, status),
                        &evaluation,
                        &resolution,
                    );
                    resolutions.push(resolution);
                    if !proceed {
                        break;
                    }
                }
                resolutions
            }
            RunMode::Parallel => {
                join_all(eligible.iter().map(|(entry, status)| {
                    self.evaluate_provider(entry, *status, shared, default_value.clone(), hints)
                }))
                .await
            }
        };

        match self.strategy.determine_final_result(&evaluation, &resolutions) {
            FinalResult::Resolved(resolution) => {
                let provider_name = resolution.provider_name;
                match resolution.details.into_resolution::<T>() {
                    Ok(details) => Ok(MultiResolution {
                        provider_name,
                        details,
                    }),
                    Err(error) => Err(AggregateError::from_failures(vec![ProviderFailure {
                        source: provider_name,
                        error,
                    }])),
                }
            }
            FinalResult::Failed(aggregate) => {
                for failure in aggregate.failures() {
                    tracing::debug!(
                        source = %failure.source,
                        error = %failure.error,
                        "provider failed during multi-provider evaluation"
                    );
                }
                Err(aggregate)
            }
        }
    }

    async fn evaluate_provider<T: FlagType>(
        &self,
        entry: &NamedProvider,
        status: ProviderStatus,
        shared: &HookContext,
        default_value: T,
        hints: &HookHints,
    ) -> ProviderResolution {
        let hooks = entry.provider.hooks();
        let hook_context = shared.fork(entry.provider.metadata());
        let details = HookPipeline::new(&hooks, hints)
            .evaluate(entry.provider.as_ref(), status, hook_context, default_value)
            .await;
        ProviderResolution {
            provider_name: entry.name.clone(),
            details: details.map_value(FlagType::into_flag_value),
        }
    }

    fn no_eligible_provider(&self) -> AggregateError {
        if self
            .providers
            .iter()
            .any(|entry| self.status_of(entry) == ProviderStatus::Fatal)
        {
            AggregateError::new(
                ErrorCode::ProviderFatal,
                "no provider can evaluate: a provider is in an irrecoverable error state",
            )
        } else {
            AggregateError::new(
                ErrorCode::ProviderNotReady,
                "no provider can evaluate: providers have not yet initialized",
            )
        }
    }

    async fn resolve_forked<T: FlagType>(
        &self,
        shared: &HookContext,
        hints: &HookHints,
    ) -> Result<ResolutionDetails<FlagValue>, EvaluationError> {
        let default_value = T::from_flag_value(shared.default_value().clone()).ok_or_else(|| {
            EvaluationError::type_mismatch(format!(
                "default value of `{}` is not a {} value",
                shared.flag_key(),
                T::TYPE
            ))
        })?;
        self.evaluate(shared, default_value, hints)
            .await
            .map(|resolution| resolution.details.map_value(FlagType::into_flag_value))
            .map_err(EvaluationError::from)
    }

    /// Typed resolver entry for callers outside a pipeline, which have no hook
    /// context to share.
    async fn resolve_as<T: FlagType>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<T>, EvaluationError> {
        let shared = HookContext::new(
            flag_key,
            default_value.clone().into_flag_value(),
            context.clone(),
            ClientMetadata::default(),
            self.metadata.clone(),
        );
        self.evaluate(&shared, default_value, &HookHints::new())
            .await
            .map(|resolution| resolution.details)
            .map_err(EvaluationError::from)
    }

    fn providers_with(
        &self,
        capability: ProviderCapabilities,
    ) -> impl Iterator<Item = &NamedProvider> {
        self.providers
            .iter()
            .filter(move |entry| entry.provider.capabilities().contains(capability))
    }
}

fn strategy_provider(entry: &NamedProvider, status: ProviderStatus) -> StrategyProviderContext<'_> {
    StrategyProviderContext {
        provider_name: &entry.name,
        provider: entry.provider.as_ref(),
        status,
    }
}

fn error_event(name: &str, error: &EvaluationError) -> EventDetails {
    let details = EventDetails::for_provider(name).error_code(error.code());
    match error.message() {
        Some(message) => details.message(message),
        None => details,
    }
}

fn status_for_error(error: &EvaluationError) -> ProviderStatus {
    if error.code() == ErrorCode::ProviderFatal {
        ProviderStatus::Fatal
    } else {
        ProviderStatus::Error
    }
}

#[async_trait]
impl Provider for MultiProvider {
    fn metadata(&self) -> ProviderMetadata {
        self.metadata.clone()
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::all()
    }

    fn status(&self) -> Option<ProviderStatus> {
        Some(self.tracker.aggregate())
    }

    fn events(&self) -> Option<&EventEmitter> {
        Some(self.tracker.emitter())
    }

    async fn resolve_in_hook_context(
        &self,
        hook_context: &HookContext,
        hints: &HookHints,
    ) -> Option<Result<ResolutionDetails<FlagValue>, EvaluationError>> {
        let resolution = match hook_context.flag_type() {
            FlagValueType::Boolean => self.resolve_forked::<bool>(hook_context, hints).await,
            FlagValueType::String => self.resolve_forked::<String>(hook_context, hints).await,
            FlagValueType::Number => self.resolve_forked::<f64>(hook_context, hints).await,
            FlagValueType::Object => self.resolve_forked::<Value>(hook_context, hints).await,
        };
        Some(resolution)
    }

    async fn initialize(&self, context: &EvaluationContext) -> Result<(), EvaluationError> {
        let results = join_all(self.providers.iter().map(|entry| async move {
            let result = if entry
                .provider
                .capabilities()
                .contains(ProviderCapabilities::INITIALIZE)
            {
                entry.provider.initialize(context).await
            } else {
                Ok(())
            };
            (entry, result)
        }))
        .await;

        let mut failures = Vec::new();
        for (entry, result) in results {
            match result {
                Ok(()) => {
                    self.tracker.update(
                        &entry.name,
                        ProviderStatus::Ready,
                        &EventDetails::for_provider(&entry.name),
                    );
                }
                Err(error) => {
                    self.tracker.update(
                        &entry.name,
                        status_for_error(&error),
                        &error_event(&entry.name, &error),
                    );
                    failures.push(ProviderFailure {
                        source: entry.name.clone(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            let aggregate = AggregateError::from_failures(failures);
            tracing::debug!(error = %aggregate, "multi-provider initialization failed");
            Err(aggregate.into())
        }
    }

    async fn on_close(&self) -> Result<(), BoxError> {
        self.tracker.detach_all();
        let results = join_all(
            self.providers_with(ProviderCapabilities::CLOSE)
                .map(|entry| async move { (entry, entry.provider.on_close().await) }),
        )
        .await;

        let failures: Vec<ProviderFailure> = results
            .into_iter()
            .filter_map(|(entry, result)| {
                result.err().map(|err| ProviderFailure {
                    source: entry.name.clone(),
                    error: EvaluationError::from(err),
                })
            })
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Box::new(AggregateError::from_failures(failures)))
        }
    }

    async fn on_context_change(
        &self,
        old_context: &EvaluationContext,
        new_context: &EvaluationContext,
    ) -> Result<(), EvaluationError> {
        let results = join_all(
            self.providers_with(ProviderCapabilities::CONTEXT_CHANGE)
                .map(|entry| async move {
                    let result = entry
                        .provider
                        .on_context_change(old_context, new_context)
                        .await;
                    (entry, result)
                }),
        )
        .await;

        let mut failures = Vec::new();
        for (entry, result) in results {
            if let Err(error) = result {
                self.tracker.update(
                    &entry.name,
                    status_for_error(&error),
                    &error_event(&entry.name, &error),
                );
                failures.push(ProviderFailure {
                    source: entry.name.clone(),
                    error,
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::from_failures(failures).into())
        }
    }

    fn track(
        &self,
        event_name: &str,
        context: &EvaluationContext,
        details: &TrackingEventDetails,
    ) -> Result<(), BoxError> {
        for entry in self.providers_with(ProviderCapabilities::TRACK) {
            let provider = strategy_provider(entry, self.status_of(entry));
            if !self
                .strategy
                .should_track_with_this_provider(&provider, event_name, context)
            {
                continue;
            }
            if let Err(err) = entry.provider.track(event_name, context, details) {
                tracing::warn!(
                    provider = %entry.name,
                    event = event_name,
                    error = %err,
                    "provider failed to track event"
                );
            }
        }
        Ok(())
    }

    async fn resolve_boolean_evaluation(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError> {
        self.resolve_as(flag_key, default_value, context).await
    }

    async fn resolve_string_evaluation(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        self.resolve_as(flag_key, default_value, context).await
    }

    async fn resolve_number_evaluation(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError> {
        self.resolve_as(flag_key, default_value, context).await
    }

    async fn resolve_object_evaluation(
        &self,
        flag_key: &str,
        default_value: Value,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<Value>, EvaluationError> {
        self.resolve_as(flag_key, default_value, context).await
    }
}

/// Builder for [`MultiProvider`].
#[derive(Default)]
pub struct MultiProviderBuilder {
    entries: Vec<ProviderEntry>,
    strategy: Option<Arc<dyn EvaluationStrategy>>,
}

impl MultiProviderBuilder {
    /// Adds an entry.
    pub fn entry(mut self, entry: ProviderEntry) -> Self {
        self.entries.push(entry);
        self
    }

    /// Adds a provider named after its metadata.
    pub fn provider(self, provider: SharedProvider) -> Self {
        self.entry(ProviderEntry::new(provider))
    }

    /// Adds a provider under an explicit name.
    pub fn named(self, name: impl Into<String>, provider: SharedProvider) -> Self {
        self.entry(ProviderEntry::named(name, provider))
    }

    /// Sets the strategy. Defaults to [`FirstMatchStrategy`].
    pub fn strategy<S: EvaluationStrategy>(mut self, strategy: S) -> Self {
        self.strategy = Some(Arc::new(strategy));
        self
    }

    /// Validates the configuration and builds the multi-provider.
    pub fn build(self) -> Result<MultiProvider, ConfigError> {
        let providers = assign_names(self.entries)?;
        let strategy = self
            .strategy
            .unwrap_or_else(|| Arc::new(FirstMatchStrategy::new()));
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        strategy.validate(&names)?;

        let tracker = StatusTracker::default();
        for entry in &providers {
            let initial = entry.provider.status().unwrap_or_else(|| {
                if entry
                    .provider
                    .capabilities()
                    .contains(ProviderCapabilities::INITIALIZE)
                {
                    ProviderStatus::NotReady
                } else {
                    ProviderStatus::Ready
                }
            });
            tracker.register(entry.name.clone(), initial);
            if let Some(events) = entry.provider.events() {
                tracker.attach(entry.name.clone(), events);
            }
        }

        Ok(MultiProvider {
            providers,
            strategy,
            tracker,
            metadata: ProviderMetadata::new(MULTI_PROVIDER_NAME),
        })
    }
}
