//! # Hook Pipeline Executor
//!
//! Runs the four-stage hook protocol around exactly one resolver call:
//!
//! ```text
//! BEFORE -> RESOLVING -> (AFTER | ERROR) -> FINALLY -> DONE
//! ```
//!
//! - `before` stages run in registration order; each may return a context that
//!   is merged on top of the running one. The context is frozen afterwards.
//! - A provider whose status is `NOT_READY` or `FATAL` is never called; the
//!   matching error is synthesized instead.
//! - `after`, `error` and `finally` stages run in reverse registration order.
//! - Failures of `error` and `finally` stages are logged and swallowed.
//! - The resolver receives the frozen hook context and hints through
//!   [`Provider::resolve_in_hook_context`] before the typed resolvers are tried.
//!
//! The pipeline always produces an [`EvaluationDetails`]; it never fails.

use tracing::Instrument;
use vexil_core::{
    EvaluationDetails, EvaluationError, FlagMetadata, FlagType, FlagValue, HookContext, HookHints,
    HookStage, Provider, ProviderStatus, SharedHook,
};

/// A failure on its way to the ERROR stage, with any metadata the provider
/// returned alongside it.
struct Failure {
    error: EvaluationError,
    flag_metadata: FlagMetadata,
}

impl From<EvaluationError> for Failure {
    fn from(error: EvaluationError) -> Self {
        Self {
            error,
            flag_metadata: FlagMetadata::default(),
        }
    }
}

/// Executes hooks around one resolution.
///
/// `hooks` must already be in registration order: global, client, invocation,
/// then provider hooks.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = HookPipeline::new(&hooks, &hints);
/// let details = pipeline
///     .evaluate(provider.as_ref(), status, hook_context, false)
///     .await;
/// ```
#[derive(Clone, Copy)]
pub struct HookPipeline<'a> {
    hooks: &'a [SharedHook],
    hints: &'a HookHints,
}

impl<'a> HookPipeline<'a> {
    /// Creates a pipeline over `hooks`.
    pub fn new(hooks: &'a [SharedHook], hints: &'a HookHints) -> Self {
        Self { hooks, hints }
    }

    /// Runs one evaluation.
    ///
    /// `default_value` must be the typed form of `hook_context.default_value()`.
    /// `status` is the provider's status snapshot taken by the caller.
    pub async fn evaluate<T: FlagType>(
        &self,
        provider: &dyn Provider,
        status: ProviderStatus,
        hook_context: HookContext,
        default_value: T,
    ) -> EvaluationDetails<T> {
        let span = tracing::debug_span!(
            "flag_evaluation",
            flag_key = %hook_context.flag_key(),
            provider = %hook_context.provider_metadata().name,
            evaluation_id = %hook_context.evaluation_id(),
        );
        self.run(provider, status, hook_context, default_value)
            .instrument(span)
            .await
    }

    async fn run<T: FlagType>(
        &self,
        provider: &dyn Provider,
        status: ProviderStatus,
        mut hook_context: HookContext,
        default_value: T,
    ) -> EvaluationDetails<T> {
        let before = self.run_before(&mut hook_context).await;
        hook_context.freeze();

        let outcome = match before {
            Ok(()) => {
                self.resolve(provider, status, &hook_context, default_value.clone())
                    .await
            }
            Err(error) => Err(Failure::from(error)),
        };

        let details = match outcome {
            Ok(details) => details,
            Err(failure) => {
                tracing::debug!(
                    code = %failure.error.code(),
                    error = %failure.error,
                    "flag evaluation failed"
                );
                self.run_error(&hook_context, &failure.error).await;
                EvaluationDetails::from_error(
                    hook_context.flag_key(),
                    default_value,
                    &failure.error,
                    failure.flag_metadata,
                )
            }
        };

        self.run_finally(&hook_context, &details.erase()).await;
        details
    }

    async fn run_before(&self, hook_context: &mut HookContext) -> Result<(), EvaluationError> {
        for hook in self.hooks {
            let overlay = hook.before_dyn(hook_context, self.hints).await?;
            if let Some(overlay) = overlay {
                hook_context
                    .merge_context(&overlay)
                    .map_err(|err| EvaluationError::general(err.to_string()))?;
            }
        }
        Ok(())
    }

    async fn resolve<T: FlagType>(
        &self,
        provider: &dyn Provider,
        status: ProviderStatus,
        hook_context: &HookContext,
        default_value: T,
    ) -> Result<EvaluationDetails<T>, Failure> {
        let resolution = match status {
            ProviderStatus::NotReady => Err(EvaluationError::provider_not_ready()),
            ProviderStatus::Fatal => Err(EvaluationError::provider_fatal()),
            _ => match provider
                .resolve_in_hook_context(hook_context, self.hints)
                .await
            {
                Some(resolution) => resolution.and_then(|r| r.into_typed::<T>()),
                None => {
                    T::resolve(
                        provider,
                        hook_context.flag_key(),
                        default_value,
                        hook_context.context(),
                    )
                    .await
                }
            },
        }?;

        if let Some(error) = resolution.to_error() {
            return Err(Failure {
                error,
                flag_metadata: resolution.flag_metadata,
            });
        }

        let details = EvaluationDetails::from_resolution(hook_context.flag_key(), resolution);
        self.run_after(hook_context, &details.erase()).await?;
        Ok(details)
    }

    async fn run_after(
        &self,
        hook_context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
    ) -> Result<(), EvaluationError> {
        for hook in self.hooks.iter().rev() {
            hook.after_dyn(hook_context, details, self.hints).await?;
        }
        Ok(())
    }

    async fn run_error(&self, hook_context: &HookContext, error: &EvaluationError) {
        for hook in self.hooks.iter().rev() {
            if let Err(err) = hook.error_dyn(hook_context, error, self.hints).await {
                tracing::error!(stage = %HookStage::Error, error = %err, "unhandled error in hook");
            }
        }
    }

    async fn run_finally(&self, hook_context: &HookContext, details: &EvaluationDetails<FlagValue>) {
        for hook in self.hooks.iter().rev() {
            if let Err(err) = hook.finally_dyn(hook_context, details, self.hints).await {
                tracing::error!(stage = %HookStage::Finally, error = %err, "unhandled error in hook");
            }
        }
    }
}
