//! Logging hook for evaluation observation.

use vexil_core::{
    BoxError, EvaluationContext, EvaluationDetails, EvaluationError, FlagValue, Hook, HookContext,
    HookHints,
};

/// A hook that logs every stage of every evaluation.
///
/// Logs at `debug` level, except the error stage, which logs at `error`. The
/// evaluation context is left out unless enabled with
/// [`with_evaluation_context`](LoggingHook::with_evaluation_context).
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook {
    include_evaluation_context: bool,
}

impl LoggingHook {
    /// A hook that leaves the evaluation context out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes the evaluation context in every record.
    pub fn with_evaluation_context(mut self) -> Self {
        self.include_evaluation_context = true;
        self
    }

    fn context_field(&self, context: &HookContext) -> Option<String> {
        self.include_evaluation_context
            .then(|| format!("{:?}", context.context()))
    }
}

impl Hook for LoggingHook {
    async fn before(
        &self,
        context: &HookContext,
        _hints: &HookHints,
    ) -> Result<Option<EvaluationContext>, BoxError> {
        let evaluation_context = self.context_field(context);
        tracing::debug!(
            stage = "before",
            domain = ?context.client_metadata().domain,
            provider = %context.provider_metadata().name,
            flag_key = %context.flag_key(),
            default_value = %context.default_value(),
            evaluation_context = evaluation_context.as_deref(),
            "flag evaluation starting"
        );
        Ok(None)
    }

    async fn after(
        &self,
        context: &HookContext,
        details: &EvaluationDetails<FlagValue>,
        _hints: &HookHints,
    ) -> Result<(), BoxError> {
        let evaluation_context = self.context_field(context);
        tracing::debug!(
            stage = "after",
            domain = ?context.client_metadata().domain,
            provider = %context.provider_metadata().name,
            flag_key = %context.flag_key(),
            default_value = %context.default_value(),
            value = %details.value,
            variant = details.variant.as_deref(),
            reason = %details.reason,
            evaluation_context = evaluation_context.as_deref(),
            "flag evaluated"
        );
        Ok(())
    }

    async fn error(
        &self,
        context: &HookContext,
        error: &EvaluationError,
        _hints: &HookHints,
    ) -> Result<(), BoxError> {
        let evaluation_context = self.context_field(context);
        tracing::error!(
            stage = "error",
            domain = ?context.client_metadata().domain,
            provider = %context.provider_metadata().name,
            flag_key = %context.flag_key(),
            default_value = %context.default_value(),
            error_code = %error.code(),
            error_message = error.message(),
            evaluation_context = evaluation_context.as_deref(),
            "flag evaluation failed"
        );
        Ok(())
    }

    async fn finally(
        &self,
        context: &HookContext,
        _details: &EvaluationDetails<FlagValue>,
        _hints: &HookHints,
    ) -> Result<(), BoxError> {
        tracing::debug!(
            stage = "finally",
            domain = ?context.client_metadata().domain,
            provider = %context.provider_metadata().name,
            flag_key = %context.flag_key(),
            "flag evaluation finished"
        );
        Ok(())
    }
}
