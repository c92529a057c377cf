//! First-match strategy.

use super::strategy::{
    EvaluationStrategy, FinalResult, ProviderResolution, RunMode, StrategyEvaluationContext,
    StrategyProviderContext, collect_provider_errors,
};
use vexil_core::ErrorCode;

/// Asks providers in order and stops at the first result that is not
/// `FLAG_NOT_FOUND`.
///
/// Any other error is final too: a provider that fails outright ends the
/// evaluation, and the result is the aggregate of every failure collected.
/// Use [`FirstSuccessfulStrategy`](super::FirstSuccessfulStrategy) to skip
/// failing providers instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatchStrategy;

impl FirstMatchStrategy {
    /// Creates the strategy.
    pub fn new() -> Self {
        Self
    }
}

impl EvaluationStrategy for FirstMatchStrategy {
    fn run_mode(&self) -> RunMode {
        RunMode::Sequential
    }

    fn should_evaluate_next_provider(
        &self,
        _provider: &StrategyProviderContext<'_>,
        _evaluation: &StrategyEvaluationContext<'_>,
        resolution: &ProviderResolution,
    ) -> bool {
        resolution.has_error_code(ErrorCode::FlagNotFound)
    }

    fn determine_final_result(
        &self,
        _evaluation: &StrategyEvaluationContext<'_>,
        resolutions: &[ProviderResolution],
    ) -> FinalResult {
        match resolutions.last() {
            Some(last) if !last.is_error() => FinalResult::Resolved(last.clone()),
            _ => collect_provider_errors(resolutions),
        }
    }
}
