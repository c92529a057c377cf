//! A provider serving flags from memory.
//!
//! Useful for tests, demos and local development. Each flag has named variants
//! and a default variant; an optional context evaluator picks a variant per
//! evaluation context.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::{Arc, PoisonError, RwLock},
};
use vexil_core::{
    EvaluationContext, EvaluationError, EventDetails, EventEmitter, FlagMetadata, FlagType,
    FlagValue, Provider, ProviderCapabilities, ProviderEventKind, ProviderMetadata, Reason,
    ResolutionDetails, Value, async_trait,
};

/// Picks a variant for a context; `None` falls back to the default variant.
pub type ContextEvaluator = Arc<dyn Fn(&EvaluationContext) -> Option<String> + Send + Sync>;

/// One in-memory flag.
#[derive(Clone)]
pub struct InMemoryFlag {
    variants: BTreeMap<String, FlagValue>,
    default_variant: String,
    disabled: bool,
    context_evaluator: Option<ContextEvaluator>,
    metadata: FlagMetadata,
}

impl fmt::Debug for InMemoryFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryFlag")
            .field("variants", &self.variants)
            .field("default_variant", &self.default_variant)
            .field("disabled", &self.disabled)
            .field("context_evaluator", &self.context_evaluator.is_some())
            .finish()
    }
}

impl InMemoryFlag {
    /// A flag with no variants yet, defaulting to `default_variant`.
    pub fn new(default_variant: impl Into<String>) -> Self {
        Self {
            variants: BTreeMap::new(),
            default_variant: default_variant.into(),
            disabled: false,
            context_evaluator: None,
            metadata: FlagMetadata::default(),
        }
    }

    /// A flag with a single variant, `"default"`, holding `value`.
    pub fn constant<T: FlagType>(value: T) -> Self {
        Self::new("default").variant("default", value)
    }

    /// A boolean flag with variants `"on"` and `"off"`.
    pub fn toggle(enabled: bool) -> Self {
        Self::new(if enabled { "on" } else { "off" })
            .variant("on", true)
            .variant("off", false)
    }

    /// Adds a variant.
    pub fn variant<T: FlagType>(mut self, name: impl Into<String>, value: T) -> Self {
        self.variants.insert(name.into(), value.into_flag_value());
        self
    }

    /// Disables the flag: evaluations return the caller's default.
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets the context evaluator.
    pub fn context_evaluator<F>(mut self, evaluator: F) -> Self
    where
        F: Fn(&EvaluationContext) -> Option<String> + Send + Sync + 'static,
    {
        self.context_evaluator = Some(Arc::new(evaluator));
        self
    }

    /// Sets the flag metadata.
    pub fn metadata(mut self, metadata: FlagMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    fn same_definition(&self, other: &InMemoryFlag) -> bool {
        let same_evaluator = match (&self.context_evaluator, &other.context_evaluator) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_evaluator
            && self.variants == other.variants
            && self.default_variant == other.default_variant
            && self.disabled == other.disabled
            && self.metadata == other.metadata
    }

    fn resolve<T: FlagType>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<T>, EvaluationError> {
        if self.disabled {
            return Ok(ResolutionDetails::with_reason(default_value, Reason::Disabled)
                .metadata(self.metadata.clone()));
        }

        let (variant, reason) = match self.context_evaluator.as_ref().and_then(|f| f(context)) {
            Some(variant) => (variant, Reason::TargetingMatch),
            None => (self.default_variant.clone(), Reason::Static),
        };
        let value = self.variants.get(&variant).ok_or_else(|| {
            EvaluationError::general(format!(
                "variant '{variant}' is not defined for flag '{flag_key}'"
            ))
        })?;
        let value = T::from_flag_value(value.clone()).ok_or_else(|| {
            EvaluationError::type_mismatch(format!(
                "flag '{flag_key}' holds a {} value, not {}",
                value.value_type(),
                T::TYPE
            ))
        })?;

        Ok(ResolutionDetails::with_reason(value, reason)
            .variant(variant)
            .metadata(self.metadata.clone()))
    }
}

/// Serves flags from an in-memory configuration.
///
/// # Example
///
/// ```rust,ignore
/// let provider = InMemoryProvider::new([
///     ("new-checkout", InMemoryFlag::toggle(true)),
///     ("banner", InMemoryFlag::constant("Welcome".to_string())),
/// ]);
/// ```
#[derive(Default)]
pub struct InMemoryProvider {
    flags: RwLock<BTreeMap<String, InMemoryFlag>>,
    events: EventEmitter,
}

impl fmt::Debug for InMemoryProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InMemoryProvider")
            .field("flags", &flags.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl InMemoryProvider {
    /// Creates a provider serving `flags`.
    pub fn new<I, K>(flags: I) -> Self
    where
        I: IntoIterator<Item = (K, InMemoryFlag)>,
        K: Into<String>,
    {
        Self {
            flags: RwLock::new(flags.into_iter().map(|(k, v)| (k.into(), v)).collect()),
            events: EventEmitter::new(),
        }
    }

    /// Replaces the whole configuration and announces the changed keys with a
    /// configuration-changed event.
    pub fn put_configuration<I, K>(&self, flags: I)
    where
        I: IntoIterator<Item = (K, InMemoryFlag)>,
        K: Into<String>,
    {
        let next: BTreeMap<String, InMemoryFlag> =
            flags.into_iter().map(|(k, v)| (k.into(), v)).collect();
        let changed: BTreeSet<String> = {
            let mut current = self.flags.write().unwrap_or_else(PoisonError::into_inner);
            let changed = current
                .keys()
                .chain(next.keys())
                .filter(|key| match (current.get(*key), next.get(*key)) {
                    (Some(a), Some(b)) => !a.same_definition(b),
                    _ => true,
                })
                .cloned()
                .collect();
            *current = next;
            changed
        };

        tracing::debug!(changed = changed.len(), "in-memory flag configuration replaced");
        self.events.emit(
            ProviderEventKind::ConfigurationChanged,
            &EventDetails::for_provider(self.metadata().name).flags_changed(changed),
        );
    }

    fn resolve<T: FlagType>(
        &self,
        flag_key: &str,
        default_value: T,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<T>, EvaluationError> {
        let flags = self.flags.read().unwrap_or_else(PoisonError::into_inner);
        let flag = flags
            .get(flag_key)
            .ok_or_else(|| EvaluationError::flag_not_found(flag_key))?;
        flag.resolve(flag_key, default_value, context)
    }
}

#[async_trait]
impl Provider for InMemoryProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("In-Memory Provider")
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::EVENTS
    }

    fn events(&self) -> Option<&EventEmitter> {
        Some(&self.events)
    }

    async fn resolve_boolean_evaluation(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError> {
        self.resolve(flag_key, default_value, context)
    }

    async fn resolve_string_evaluation(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        self.resolve(flag_key, default_value, context)
    }

    async fn resolve_number_evaluation(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError> {
        self.resolve(flag_key, default_value, context)
    }

    async fn resolve_object_evaluation(
        &self,
        flag_key: &str,
        default_value: Value,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<Value>, EvaluationError> {
        self.resolve(flag_key, default_value, context)
    }
}
