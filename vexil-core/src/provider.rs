//! # Provider Contract
//!
//! A provider is the pluggable backend that resolves flag values. The pipeline
//! depends only on this trait, never on concrete provider types.
//!
//! Required: the four typed resolvers and [`Provider::metadata`]. Everything else
//! is optional and advertised through [`ProviderCapabilities`], so the registry
//! knows, without calling anything, whether to await `initialize`, whether
//! `track` is meaningful and whether the provider reconciles on context changes.

use crate::{
    context::EvaluationContext,
    details::ResolutionDetails,
    error::{BoxError, EvaluationError},
    events::EventEmitter,
    hook::{HookContext, HookHints, SharedHook},
    metadata::ProviderMetadata,
    status::ProviderStatus,
    value::{FlagValue, Value},
};
use async_trait::async_trait;
use bitflags::bitflags;
use std::{collections::BTreeMap, sync::Arc};

bitflags! {
    /// Optional capabilities a provider implements.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProviderCapabilities: u8 {
        /// `initialize` must be awaited before the provider is ready.
        const INITIALIZE = 1 << 0;
        /// `on_close` releases resources.
        const CLOSE = 1 << 1;
        /// `on_context_change` reconciles with a new static context.
        const CONTEXT_CHANGE = 1 << 2;
        /// `track` records tracking events.
        const TRACK = 1 << 3;
        /// `events` returns an emitter.
        const EVENTS = 1 << 4;
    }
}

/// Payload of a tracking event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingEventDetails {
    /// Optional numeric value (revenue, duration, ...).
    pub value: Option<f64>,
    /// Additional attributes.
    pub attributes: BTreeMap<String, Value>,
}

impl TrackingEventDetails {
    /// Details with a numeric value.
    pub fn with_value(value: f64) -> Self {
        Self {
            value: Some(value),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds an attribute.
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A provider shared between scopes.
pub type SharedProvider = Arc<dyn Provider>;

/// A flag-resolution backend.
///
/// # Capabilities
///
/// Override [`capabilities`](Provider::capabilities) to advertise which optional
/// methods are implemented. A provider that overrides `initialize` without
/// advertising [`ProviderCapabilities::INITIALIZE`] is treated as ready at once
/// and never initialized.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Describes the provider.
    fn metadata(&self) -> ProviderMetadata;

    /// The optional capabilities implemented.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::empty()
    }

    /// A status maintained by the provider itself. When `None`, the registry
    /// derives the status from initialization and events.
    fn status(&self) -> Option<ProviderStatus> {
        None
    }

    /// Hooks run around every evaluation against this provider, after all
    /// caller-registered hooks.
    fn hooks(&self) -> Vec<SharedHook> {
        Vec::new()
    }

    /// The provider's event source.
    fn events(&self) -> Option<&EventEmitter> {
        None
    }

    /// Prepares the provider. Returning an error with code `PROVIDER_FATAL`
    /// makes the status `FATAL`, any other error makes it `ERROR`.
    async fn initialize(&self, context: &EvaluationContext) -> Result<(), EvaluationError> {
        let _ = context;
        Ok(())
    }

    /// Releases resources. Called once no scope references the provider.
    async fn on_close(&self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Reconciles with a new static context.
    async fn on_context_change(
        &self,
        old_context: &EvaluationContext,
        new_context: &EvaluationContext,
    ) -> Result<(), EvaluationError> {
        let _ = (old_context, new_context);
        Ok(())
    }

    /// Records a tracking event.
    fn track(
        &self,
        event_name: &str,
        context: &EvaluationContext,
        details: &TrackingEventDetails,
    ) -> Result<(), BoxError> {
        let _ = (event_name, context, details);
        Ok(())
    }

    /// Resolves with the caller's frozen hook context and hints.
    ///
    /// The pipeline calls this before the typed resolvers; returning `None`
    /// falls back to them. Providers that run hooks of their own, such as an
    /// aggregating provider, override it so the evaluation id, client metadata
    /// and hints reach those hooks.
    async fn resolve_in_hook_context(
        &self,
        hook_context: &HookContext,
        hints: &HookHints,
    ) -> Option<Result<ResolutionDetails<FlagValue>, EvaluationError>> {
        let _ = (hook_context, hints);
        None
    }

    /// Resolves a boolean flag.
    async fn resolve_boolean_evaluation(
        &self,
        flag_key: &str,
        default_value: bool,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError>;

    /// Resolves a string flag.
    async fn resolve_string_evaluation(
        &self,
        flag_key: &str,
        default_value: String,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError>;

    /// Resolves a number flag.
    async fn resolve_number_evaluation(
        &self,
        flag_key: &str,
        default_value: f64,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError>;

    /// Resolves an object flag.
    async fn resolve_object_evaluation(
        &self,
        flag_key: &str,
        default_value: Value,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<Value>, EvaluationError>;
}
