//! Testing utilities for Vexil.
//!
//! This module provides doubles that make testing pipelines, strategies and
//! registries easier.
//!
//! # Features
//!
//! - [`RecordingHook`]: A hook that records every stage it sees
//! - [`ScriptedProvider`]: A provider with scripted results and call counters
//! - [`InitGate`]: Holds a [`ScriptedProvider`]'s initialization until opened

use futures::channel::oneshot;
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};
use vexil_core::{
    BoxError, EvaluationContext, EvaluationDetails, EvaluationError, EvaluationId, EventDetails,
    EventEmitter, FlagType, FlagValue, Hook, HookContext, HookHints, HookStage, Provider,
    ProviderCapabilities, ProviderEventKind, ProviderMetadata, ProviderStatus, ResolutionDetails,
    SharedHook, TrackingEventDetails, Value, async_trait,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Recording Hook
// ============================================================================

/// What a [`RecordingHook`] saw at one stage.
#[derive(Debug, Clone)]
pub struct Observation {
    /// The stage.
    pub stage: HookStage,
    /// The evaluation the stage belonged to.
    pub evaluation_id: EvaluationId,
    /// The evaluating client's domain.
    pub domain: Option<String>,
    /// The evaluation context at that stage.
    pub context: EvaluationContext,
    /// Whether the hook context was frozen.
    pub frozen: bool,
    /// The hints passed to the stage.
    pub hints: HookHints,
    /// The details (`after` and `finally`).
    pub details: Option<EvaluationDetails<FlagValue>>,
    /// The error (`error`).
    pub error: Option<EvaluationError>,
}

/// A hook that records every stage it sees.
///
/// Useful for verifying stage order, context merging and freezing.
///
/// # Example
///
/// ```rust,ignore
/// let outer = RecordingHook::named("outer");
/// let inner = RecordingHook::named("inner").sharing_log_with(&outer);
///
/// // Register both, evaluate...
/// assert_eq!(outer.log(), vec!["outer:before", "inner:before", ...]);
/// ```
#[derive(Clone)]
pub struct RecordingHook {
    name: String,
    log: Arc<Mutex<Vec<String>>>,
    observations: Arc<Mutex<Vec<Observation>>>,
    fail_at: Option<HookStage>,
    before_context: Option<EvaluationContext>,
}

impl Default for RecordingHook {
    fn default() -> Self {
        Self::named("recording")
    }
}

impl RecordingHook {
    /// Create a new recording hook. Log entries read `"{name}:{stage}"`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Arc::default(),
            observations: Arc::default(),
            fail_at: None,
            before_context: None,
        }
    }

    /// Writes to the same stage log as `other`, to check ordering across hooks.
    pub fn sharing_log_with(mut self, other: &RecordingHook) -> Self {
        self.log = other.log.clone();
        self
    }

    /// Fails at `stage`.
    pub fn failing_at(mut self, stage: HookStage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    /// Returns `context` from `before`.
    pub fn returning_context(mut self, context: EvaluationContext) -> Self {
        self.before_context = Some(context);
        self
    }

    /// The shared stage log.
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }

    /// Everything this hook observed, in order.
    pub fn observations(&self) -> Vec<Observation> {
        lock(&self.observations).clone()
    }

    /// The stages this hook ran, in order.
    pub fn stages(&self) -> Vec<HookStage> {
        lock(&self.observations).iter().map(|o| o.stage).collect()
    }

    /// The evaluation context at each stage.
    pub fn contexts_seen(&self) -> Vec<EvaluationContext> {
        lock(&self.observations)
            .iter()
            .map(|o| o.context.clone())
            .collect()
    }

    /// The evaluation id at each stage.
    pub fn evaluation_ids(&self) -> Vec<EvaluationId> {
        lock(&self.observations)
            .iter()
            .map(|o| o.evaluation_id)
            .collect()
    }

    /// The errors seen by the `error` stage.
    pub fn errors_seen(&self) -> Vec<EvaluationError> {
        lock(&self.observations)
            .iter()
            .filter_map(|o| o.error.clone())
            .collect()
    }

    /// Whether every stage after `before` saw a frozen context.
    pub fn frozen_after_before(&self) -> bool {
        lock(&self.observations)
            .iter()
            .filter(|o| o.stage != HookStage::Before)
            .all(|o| o.frozen)
    }

    /// Clear the recorded log and observations.
    pub fn clear(&self) {
        lock(&self.log).clear();
        lock(&self.observations).clear();
    }

    fn record(
        &self,
        stage: HookStage,
        context: &HookContext,
        hints: &HookHints,
        details: Option<&EvaluationDetails<FlagValue>>,
        error: Option<&EvaluationError>,
    ) -> Result<(), BoxError> {
        lock(&self.log).push(format!("{}:{stage}", self.name));
        lock(&self.observations).push(Observation {
            stage,
            evaluation_id: context.evaluation_id(),
            domain: context.client_metadata().domain.clone(),
            context: context.context().clone(),
            frozen: context.is_frozen(),
            hints: hints.clone(),
            details: details.cloned(),
            error: error.cloned(),
        });
        if self.fail_at == Some(stage) {
            return Err(format!("{} failed at {stage}", self.name).into());
        }
        Ok(())
    }
}

impl Hook for RecordingHook {
    async fn before(
        &self,
        context: &HookContext,
        hints: &HookHints,
    ) -> Result<Option<EvaluationContext>, BoxError> {
        self.record(HookStage::Before, context, hints, None, None)?;
        Ok(self.before_context.clone())
    }

    async fn after(
        &self,
        context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
        hints: &HookHints,
    ) -> Result<(), BoxError> {
        self.record(HookStage::After, context, hints, Some(details), None)
    }

    async fn error(
        &self,
        context: &HookContext,
        error: &EvaluationError,
        hints: &HookHints,
    ) -> Result<(), BoxError> {
        self.record(HookStage::Error, context, hints, None, Some(error))
    }

    async fn finally(
        &self,
        context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
        hints: &HookHints,
    ) -> Result<(), BoxError> {
        self.record(HookStage::Finally, context, hints, Some(details), None)
    }
}

// ============================================================================
// Scripted Provider
// ============================================================================

type ScriptedResult = Result<ResolutionDetails<FlagValue>, EvaluationError>;

/// Releases a [`ScriptedProvider`]'s pending initialization.
#[derive(Debug)]
pub struct InitGate {
    sender: oneshot::Sender<()>,
}

impl InitGate {
    /// Lets `initialize` finish.
    pub fn open(self) {
        let _ = self.sender.send(());
    }
}

/// A provider with scripted results.
///
/// Unscripted flags fail with `FLAG_NOT_FOUND`. Advertises close, context
/// change, tracking and events; initialization only when scripted.
///
/// # Example
///
/// ```rust,ignore
/// let provider = Arc::new(
///     ScriptedProvider::new("primary")
///         .with_boolean("new-checkout", Ok(ResolutionDetails::new(true))),
/// );
/// // Evaluate...
/// assert_eq!(provider.resolve_count(), 1);
/// ```
pub struct ScriptedProvider {
    name: String,
    capabilities: ProviderCapabilities,
    results: HashMap<String, ScriptedResult>,
    hooks: Vec<SharedHook>,
    init_result: Result<(), EvaluationError>,
    init_gate: Mutex<Option<oneshot::Receiver<()>>>,
    announce_ready: bool,
    track_error: Option<String>,
    context_change_result: Result<(), EvaluationError>,
    status: Mutex<Option<ProviderStatus>>,
    events: EventEmitter,
    resolve_count: AtomicUsize,
    init_count: AtomicUsize,
    close_count: AtomicUsize,
    context_change_count: AtomicUsize,
    last_context: Mutex<Option<EvaluationContext>>,
    tracked: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    /// A provider named `name` with nothing scripted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: ProviderCapabilities::CLOSE
                | ProviderCapabilities::CONTEXT_CHANGE
                | ProviderCapabilities::TRACK
                | ProviderCapabilities::EVENTS,
            results: HashMap::new(),
            hooks: Vec::new(),
            init_result: Ok(()),
            init_gate: Mutex::new(None),
            announce_ready: false,
            track_error: None,
            context_change_result: Ok(()),
            status: Mutex::new(None),
            events: EventEmitter::new(),
            resolve_count: AtomicUsize::new(0),
            init_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            context_change_count: AtomicUsize::new(0),
            last_context: Mutex::new(None),
            tracked: Mutex::new(Vec::new()),
        }
    }

    /// Scripts the result of a flag.
    pub fn with_result<T: FlagType>(
        mut self,
        flag_key: impl Into<String>,
        result: Result<ResolutionDetails<T>, EvaluationError>,
    ) -> Self {
        let erased = result.map(|details| details.map_value(FlagType::into_flag_value));
        self.results.insert(flag_key.into(), erased);
        self
    }

    /// Scripts a boolean flag.
    pub fn with_boolean(
        self,
        flag_key: impl Into<String>,
        result: Result<ResolutionDetails<bool>, EvaluationError>,
    ) -> Self {
        self.with_result(flag_key, result)
    }

    /// Scripts a string flag.
    pub fn with_string(
        self,
        flag_key: impl Into<String>,
        result: Result<ResolutionDetails<String>, EvaluationError>,
    ) -> Self {
        self.with_result(flag_key, result)
    }

    /// Scripts a number flag.
    pub fn with_number(
        self,
        flag_key: impl Into<String>,
        result: Result<ResolutionDetails<f64>, EvaluationError>,
    ) -> Self {
        self.with_result(flag_key, result)
    }

    /// Scripts an object flag.
    pub fn with_object(
        self,
        flag_key: impl Into<String>,
        result: Result<ResolutionDetails<Value>, EvaluationError>,
    ) -> Self {
        self.with_result(flag_key, result)
    }

    /// Adds a provider hook.
    pub fn with_hook(mut self, hook: SharedHook) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Advertises initialization, which resolves to `result`.
    pub fn with_initialization(mut self, result: Result<(), EvaluationError>) -> Self {
        self.capabilities |= ProviderCapabilities::INITIALIZE;
        self.init_result = result;
        self
    }

    /// Advertises initialization, which waits until the returned gate opens.
    pub fn with_initialization_gate(mut self) -> (Self, InitGate) {
        let (sender, receiver) = oneshot::channel();
        self.capabilities |= ProviderCapabilities::INITIALIZE;
        self.init_gate = Mutex::new(Some(receiver));
        (self, InitGate { sender })
    }

    /// Emits a ready event from inside a successful `initialize`.
    pub fn announcing_ready(mut self) -> Self {
        self.announce_ready = true;
        self
    }

    /// Makes `track` fail with `message`.
    pub fn failing_track(mut self, message: impl Into<String>) -> Self {
        self.track_error = Some(message.into());
        self
    }

    /// Makes `on_context_change` fail with `error`.
    pub fn failing_context_change(mut self, error: EvaluationError) -> Self {
        self.context_change_result = Err(error);
        self
    }

    /// Replaces the advertised capabilities.
    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Sets the status the provider reports about itself.
    pub fn set_status(&self, status: Option<ProviderStatus>) {
        *lock(&self.status) = status;
    }

    /// Emits an event naming this provider.
    pub fn emit(&self, kind: ProviderEventKind) {
        self.emit_details(kind, EventDetails::for_provider(&self.name));
    }

    /// Emits an event with custom details.
    pub fn emit_details(&self, kind: ProviderEventKind, details: EventDetails) {
        self.events.emit(kind, &details);
    }

    /// Number of resolver calls.
    pub fn resolve_count(&self) -> usize {
        self.resolve_count.load(Ordering::SeqCst)
    }

    /// Number of `initialize` calls.
    pub fn init_count(&self) -> usize {
        self.init_count.load(Ordering::SeqCst)
    }

    /// Number of `on_close` calls.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Number of `on_context_change` calls.
    pub fn context_change_count(&self) -> usize {
        self.context_change_count.load(Ordering::SeqCst)
    }

    /// The context of the last resolver call.
    pub fn last_context(&self) -> Option<EvaluationContext> {
        lock(&self.last_context).clone()
    }

    /// Names of tracked events, in order.
    pub fn tracked(&self) -> Vec<String> {
        lock(&self.tracked).clone()
    }

    fn resolve<T: FlagType>(
        &self,
        flag_key: &str,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<T>, EvaluationError> {
        self.resolve_count.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_context) = Some(context.clone());

        let details = match self.results.get(flag_key) {
            None => return Err(EvaluationError::flag_not_found(flag_key)),
            Some(Err(error)) => return Err(error.clone()),
            Some(Ok(details)) => details.clone(),
        };
        let actual = details.value.value_type();
        let value = T::from_flag_value(details.value.clone()).ok_or_else(|| {
            EvaluationError::type_mismatch(format!("scripted {actual} value, asked for {}", T::TYPE))
        })?;
        Ok(details.map_value(|_| value))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new(self.name.clone())
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn status(&self) -> Option<ProviderStatus> {
        *lock(&self.status)
    }

    fn hooks(&self) -> Vec<SharedHook> {
        self.hooks.clone()
    }

    fn events(&self) -> Option<&EventEmitter> {
        Some(&self.events)
    }

    async fn initialize(&self, _context: &EvaluationContext) -> Result<(), EvaluationError> {
        self.init_count.fetch_add(1, Ordering::SeqCst);
        let gate = lock(&self.init_gate).take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.announce_ready && self.init_result.is_ok() {
            self.emit(ProviderEventKind::Ready);
        }
        self.init_result.clone()
    }

    async fn on_close(&self) -> Result<(), BoxError> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_context_change(
        &self,
        _old_context: &EvaluationContext,
        _new_context: &EvaluationContext,
    ) -> Result<(), EvaluationError> {
        self.context_change_count.fetch_add(1, Ordering::SeqCst);
        self.context_change_result.clone()
    }

    fn track(
        &self,
        event_name: &str,
        _context: &EvaluationContext,
        _details: &TrackingEventDetails,
    ) -> Result<(), BoxError> {
        lock(&self.tracked).push(event_name.to_owned());
        match &self.track_error {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }

    async fn resolve_boolean_evaluation(
        &self,
        flag_key: &str,
        _default_value: bool,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError> {
        self.resolve(flag_key, context)
    }

    async fn resolve_string_evaluation(
        &self,
        flag_key: &str,
        _default_value: String,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        self.resolve(flag_key, context)
    }

    async fn resolve_number_evaluation(
        &self,
        flag_key: &str,
        _default_value: f64,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError> {
        self.resolve(flag_key, context)
    }

    async fn resolve_object_evaluation(
        &self,
        flag_key: &str,
        _default_value: Value,
        context: &EvaluationContext,
    ) -> Result<ResolutionDetails<Value>, EvaluationError> {
        self.resolve(flag_key, context)
    }
}
