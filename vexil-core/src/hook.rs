//! # Lifecycle Hooks
//!
//! Hooks are extension points around one flag evaluation. Each hook may act at
//! four stages:
//!
//! - `before`: runs before resolution, may return a context to merge on top of
//!   the running evaluation context
//! - `after`: runs after a successful resolution
//! - `error`: runs when any earlier stage or the resolution failed
//! - `finally`: runs last, unconditionally
//!
//! Every stage has a no-op default, so a hook implements only what it needs.
//!
//! # Static vs Dynamic Dispatch
//!
//! [`Hook`] uses native `async fn` for zero-cost static dispatch. Hooks are
//! registered at several levels and stored as trait objects; for that, use
//! [`DynHook`], which every `Hook` implements automatically.
//!
//! # Freezing
//!
//! The pipeline merges `before` results into the [`HookContext`] and then freezes
//! it. Later stages only ever receive `&HookContext`, and a frozen context
//! rejects further merges, so `after`, `error` and `finally` all observe the same
//! context.

use crate::{
    context::EvaluationContext,
    details::EvaluationDetails,
    error::{BoxError, EvaluationError},
    metadata::{ClientMetadata, ProviderMetadata},
    value::{FlagValue, FlagValueType, Value},
};
use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;

/// Free-form hints passed to every stage of every hook of one evaluation.
pub type HookHints = BTreeMap<String, Value>;

/// A hook shared between registrations.
pub type SharedHook = Arc<dyn DynHook>;

/// The four hook stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookStage {
    /// Before resolution.
    Before,
    /// After a successful resolution.
    After,
    /// After a failure.
    Error,
    /// Last, unconditionally.
    Finally,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HookStage::Before => "before",
            HookStage::After => "after",
            HookStage::Error => "error",
            HookStage::Finally => "finally",
        })
    }
}

/// Correlation id of one evaluation call.
///
/// Every [`HookContext`] derived from the same call, including the private
/// copies handed to each provider of a multi-provider, carries the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EvaluationId(u64);

impl EvaluationId {
    /// Allocates a fresh id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returned when merging into a frozen [`HookContext`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("hook context for evaluation {0} is frozen")]
pub struct ContextFrozen(pub EvaluationId);

/// Per-evaluation state shared by all hook stages.
#[derive(Debug, Clone)]
pub struct HookContext {
    evaluation_id: EvaluationId,
    flag_key: String,
    flag_type: FlagValueType,
    default_value: FlagValue,
    context: EvaluationContext,
    frozen: bool,
    client_metadata: ClientMetadata,
    provider_metadata: ProviderMetadata,
}

impl HookContext {
    /// Creates an open (not yet frozen) hook context with a fresh evaluation id.
    pub fn new(
        flag_key: impl Into<String>,
        default_value: FlagValue,
        context: EvaluationContext,
        client_metadata: ClientMetadata,
        provider_metadata: ProviderMetadata,
    ) -> Self {
        Self {
            evaluation_id: EvaluationId::next(),
            flag_key: flag_key.into(),
            flag_type: default_value.value_type(),
            default_value,
            context,
            frozen: false,
            client_metadata,
            provider_metadata,
        }
    }

    /// The evaluation this context belongs to.
    pub fn evaluation_id(&self) -> EvaluationId {
        self.evaluation_id
    }

    /// The flag being evaluated.
    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    /// The flag's type.
    pub fn flag_type(&self) -> FlagValueType {
        self.flag_type
    }

    /// The caller's default value.
    pub fn default_value(&self) -> &FlagValue {
        &self.default_value
    }

    /// The merged evaluation context.
    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// The evaluating client.
    pub fn client_metadata(&self) -> &ClientMetadata {
        &self.client_metadata
    }

    /// The provider the evaluation runs against.
    pub fn provider_metadata(&self) -> &ProviderMetadata {
        &self.provider_metadata
    }

    /// Whether the context has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Merges `overlay` on top of the evaluation context.
    pub fn merge_context(&mut self, overlay: &EvaluationContext) -> Result<(), ContextFrozen> {
        if self.frozen {
            return Err(ContextFrozen(self.evaluation_id));
        }
        self.context.merge_from(overlay);
        Ok(())
    }

    /// Freezes the context. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// A private, open copy for evaluating against another provider.
    ///
    /// Keeps the evaluation id, so every copy correlates with the original call.
    pub fn fork(&self, provider_metadata: ProviderMetadata) -> HookContext {
        HookContext {
            evaluation_id: self.evaluation_id,
            flag_key: self.flag_key.clone(),
            flag_type: self.flag_type,
            default_value: self.default_value.clone(),
            context: self.context.clone(),
            frozen: false,
            client_metadata: self.client_metadata.clone(),
            provider_metadata,
        }
    }
}

/// A lifecycle extension around flag evaluations.
///
/// Stages returning `Err` are handled by the pipeline: a failing `before` or
/// `after` sends the evaluation to the error path; failures of `error` and
/// `finally` are logged and otherwise ignored. Return a boxed
/// [`EvaluationError`] to keep a specific error code.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Hook`",
    label = "missing `Hook` implementation",
    note = "Hooks implement any of `before`, `after`, `error` and `finally`."
)]
pub trait Hook: Send + Sync + 'static {
    /// Called before resolution. A returned context is merged on top of the
    /// running evaluation context.
    fn before(
        &self,
        context: &HookContext,
        hints: &HookHints,
    ) -> impl Future<Output = Result<Option<EvaluationContext>, BoxError>> + Send {
        let _ = (context, hints);
        async { Ok(None) }
    }

    /// Called after a successful resolution.
    fn after(
        &self,
        context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
        hints: &HookHints,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        let _ = (context, details, hints);
        async { Ok(()) }
    }

    /// Called when the evaluation failed.
    fn error(
        &self,
        context: &HookContext,
        error: &EvaluationError,
        hints: &HookHints,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        let _ = (context, error, hints);
        async { Ok(()) }
    }

    /// Called last, with whatever details the evaluation produced.
    fn finally(
        &self,
        context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
        hints: &HookHints,
    ) -> impl Future<Output = Result<(), BoxError>> + Send {
        let _ = (context, details, hints);
        async { Ok(()) }
    }
}

/// Boxed future returned by [`DynHook`] stages.
pub type HookFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BoxError>> + Send + 'a>>;

/// Dynamic object-safe version of [`Hook`].
///
/// Use this trait when hooks are stored in collections.
pub trait DynHook: Send + Sync + 'static {
    /// `before` (dynamic dispatch version).
    fn before_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        hints: &'a HookHints,
    ) -> HookFuture<'a, Option<EvaluationContext>>;

    /// `after` (dynamic dispatch version).
    fn after_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        details: &'a EvaluationDetails<FlagValue>,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()>;

    /// `error` (dynamic dispatch version).
    fn error_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        error: &'a EvaluationError,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()>;

    /// `finally` (dynamic dispatch version).
    fn finally_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        details: &'a EvaluationDetails<FlagValue>,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()>;
}

// Blanket implementation: Any type implementing Hook implements DynHook automatically.
impl<T: Hook> DynHook for T {
    fn before_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        hints: &'a HookHints,
    ) -> HookFuture<'a, Option<EvaluationContext>> {
        Box::pin(self.before(context, hints))
    }

    fn after_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        details: &'a EvaluationDetails<FlagValue>,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()> {
        Box::pin(self.after(context, details, hints))
    }

    fn error_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        error: &'a EvaluationError,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()> {
        Box::pin(self.error(context, error, hints))
    }

    fn finally_dyn<'a>(
        &'a self,
        context: &'a HookContext,
        details: &'a EvaluationDetails<FlagValue>,
        hints: &'a HookHints,
    ) -> HookFuture<'a, ()> {
        Box::pin(self.finally(context, details, hints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl Hook for Noop {}

    fn hook_context() -> HookContext {
        HookContext::new(
            "flag",
            FlagValue::Bool(false),
            EvaluationContext::new().with_field("a", 1_i64),
            ClientMetadata::default(),
            ProviderMetadata::new("test"),
        )
    }

    #[test]
    fn test_frozen_context_rejects_merge() {
        let mut ctx = hook_context();
        ctx.merge_context(&EvaluationContext::new().with_field("b", 2_i64))
            .unwrap();
        ctx.freeze();
        ctx.freeze();

        let err = ctx
            .merge_context(&EvaluationContext::new().with_field("c", 3_i64))
            .unwrap_err();

        assert_eq!(err, ContextFrozen(ctx.evaluation_id()));
        assert!(ctx.context().get("b").is_some());
        assert!(ctx.context().get("c").is_none());
    }

    #[test]
    fn test_fork_is_private_and_open() {
        let mut original = hook_context();
        original.freeze();

        let mut fork = original.fork(ProviderMetadata::new("other"));
        fork.merge_context(&EvaluationContext::new().with_field("only-fork", true))
            .unwrap();

        assert_eq!(fork.evaluation_id(), original.evaluation_id());
        assert_eq!(fork.provider_metadata().name, "other");
        assert!(original.context().get("only-fork").is_none());
        assert_eq!(original.flag_type(), FlagValueType::Boolean);
    }

    #[tokio::test]
    async fn test_default_stages_are_noops() {
        let hook: SharedHook = Arc::new(Noop);
        let ctx = hook_context();
        let hints = HookHints::new();
        assert!(hook.before_dyn(&ctx, &hints).await.unwrap().is_none());
        assert!(
            hook.error_dyn(&ctx, &EvaluationError::general("x"), &hints)
                .await
                .is_ok()
        );
    }

    #[test]
    fn test_evaluation_ids_are_unique() {
        assert_ne!(EvaluationId::next(), EvaluationId::next());
    }
}
