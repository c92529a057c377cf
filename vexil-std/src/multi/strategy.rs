//! # Evaluation Strategies
//!
//! A strategy decides which providers a [`MultiProvider`](super::MultiProvider)
//! asks, in what mode, and how their results reduce to one answer.

use vexil_core::{
    AggregateError, ConfigError, ErrorCode, EvaluationContext, EvaluationDetails, EvaluationError,
    FlagValue, FlagValueType, Provider, ProviderFailure, ProviderStatus,
};

/// How providers are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One at a time in registration order, until the strategy says stop.
    Sequential,
    /// All at once, joined when every provider settled.
    Parallel,
}

/// One provider as seen by a strategy.
pub struct StrategyProviderContext<'a> {
    /// The entry name.
    pub provider_name: &'a str,
    /// The provider.
    pub provider: &'a dyn Provider,
    /// The provider's status snapshot.
    pub status: ProviderStatus,
}

/// The evaluation a strategy is deciding about.
#[derive(Debug, Clone, Copy)]
pub struct StrategyEvaluationContext<'a> {
    /// The flag being evaluated.
    pub flag_key: &'a str,
    /// The flag's type.
    pub flag_type: FlagValueType,
    /// The merged evaluation context.
    pub context: &'a EvaluationContext,
}

/// One provider's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResolution {
    /// The entry name.
    pub provider_name: String,
    /// What the provider's pipeline produced.
    pub details: EvaluationDetails<FlagValue>,
}

impl ProviderResolution {
    /// Whether the provider failed.
    pub fn is_error(&self) -> bool {
        self.details.is_error()
    }

    /// Whether the provider failed with `code`.
    pub fn has_error_code(&self, code: ErrorCode) -> bool {
        self.details.error_code == Some(code)
    }

    /// The failure, if any.
    pub fn error(&self) -> Option<EvaluationError> {
        self.details.to_error()
    }
}

/// The reduced outcome of a multi-provider evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum FinalResult {
    /// One provider's result was chosen.
    Resolved(ProviderResolution),
    /// No usable result.
    Failed(AggregateError),
}

/// Builds the aggregate failure from every error in `resolutions`, in order.
pub fn collect_provider_errors(resolutions: &[ProviderResolution]) -> FinalResult {
    let failures = resolutions
        .iter()
        .filter_map(|resolution| {
            resolution.error().map(|error| ProviderFailure {
                source: resolution.provider_name.clone(),
                error,
            })
        })
        .collect();
    FinalResult::Failed(AggregateError::from_failures(failures))
}

/// A reduction policy over several providers.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an evaluation strategy",
    label = "missing `EvaluationStrategy` implementation",
    note = "Strategies implement `run_mode` and `determine_final_result`."
)]
pub trait EvaluationStrategy: Send + Sync + 'static {
    /// Sequential or parallel.
    fn run_mode(&self) -> RunMode;

    /// Checks the strategy against the final entry names.
    fn validate(&self, provider_names: &[&str]) -> Result<(), ConfigError> {
        let _ = provider_names;
        Ok(())
    }

    /// Whether a provider takes part. By default, providers that are
    /// `NOT_READY` or `FATAL` are skipped.
    fn should_evaluate_this_provider(
        &self,
        provider: &StrategyProviderContext<'_>,
        evaluation: &StrategyEvaluationContext<'_>,
    ) -> bool {
        let _ = evaluation;
        !provider.status.blocks_evaluation()
    }

    /// Sequential mode: whether to continue after `resolution`.
    fn should_evaluate_next_provider(
        &self,
        provider: &StrategyProviderContext<'_>,
        evaluation: &StrategyEvaluationContext<'_>,
        resolution: &ProviderResolution,
    ) -> bool {
        let _ = (provider, evaluation, resolution);
        true
    }

    /// Whether a tracking event goes to a provider. Same eligibility as
    /// evaluation by default.
    fn should_track_with_this_provider(
        &self,
        provider: &StrategyProviderContext<'_>,
        event_name: &str,
        context: &EvaluationContext,
    ) -> bool {
        let _ = (event_name, context);
        !provider.status.blocks_evaluation()
    }

    /// Reduces the collected resolutions, in the order providers were asked.
    /// Never called with an empty slice.
    fn determine_final_result(
        &self,
        evaluation: &StrategyEvaluationContext<'_>,
        resolutions: &[ProviderResolution],
    ) -> FinalResult;
}
