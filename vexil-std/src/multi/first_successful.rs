//! First-successful strategy.

use super::strategy::{
    EvaluationStrategy, FinalResult, ProviderResolution, RunMode, StrategyEvaluationContext,
    StrategyProviderContext, collect_provider_errors,
};

/// Asks providers in order, skipping every provider that fails, and returns
/// the first success. Fails with the aggregate of all errors when none
/// succeeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstSuccessfulStrategy;

impl FirstSuccessfulStrategy {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvaluationStrategy for FirstSuccessfulStrategy {
    fn run_mode(&self) -> RunMode {
        RunMode::Sequential
    }

    fn should_evaluate_next_provider(
        &self,
        _provider: &StrategyProviderContext<'_>,
        _evaluation: &StrategyEvaluationContext<'_>,
        resolution: &ProviderResolution,
    ) -> bool {
        resolution.is_error()
    }

    fn determine_final_result(
        &self,
        _evaluation: &StrategyEvaluationContext<'_>,
        resolutions: &[ProviderResolution],
    ) -> FinalResult {
        match resolutions.iter().find(|r| !r.is_error()) {
            Some(success) => FinalResult::Resolved(success.clone()),
            None => collect_provider_errors(resolutions),
        }
    }
}
