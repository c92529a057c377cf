//! Comparison strategy.

use super::strategy::{
    EvaluationStrategy, FinalResult, ProviderResolution, RunMode, StrategyEvaluationContext,
    collect_provider_errors,
};
use std::{fmt, sync::Arc};
use vexil_core::{AggregateError, ConfigError, ErrorCode};

/// Called with every resolution when providers disagree.
pub type MismatchHandler = Arc<dyn Fn(&[ProviderResolution]) + Send + Sync>;

/// Asks every provider concurrently and compares their values.
///
/// - any provider failing fails the evaluation with the aggregate error
/// - agreeing values resolve to the first provider's result
/// - on disagreement the mismatch handler is called once and the fallback
///   provider's result wins
#[derive(Clone)]
pub struct ComparisonStrategy {
    fallback_provider: String,
    on_mismatch: Option<MismatchHandler>,
}

impl fmt::Debug for ComparisonStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComparisonStrategy")
            .field("fallback_provider", &self.fallback_provider)
            .field("on_mismatch", &self.on_mismatch.is_some())
            .finish()
    }
}

impl ComparisonStrategy {
    /// Compares against the entry named `fallback_provider`.
    pub fn new(fallback_provider: impl Into<String>) -> Self {
        Self {
            fallback_provider: fallback_provider.into(),
            on_mismatch: None,
        }
    }

    /// Sets the mismatch handler.
    pub fn on_mismatch<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[ProviderResolution]) + Send + Sync + 'static,
    {
        self.on_mismatch = Some(Arc::new(handler));
        self
    }

    /// The fallback entry name.
    pub fn fallback_provider(&self) -> &str {
        &self.fallback_provider
    }
}

impl EvaluationStrategy for ComparisonStrategy {
    fn run_mode(&self) -> RunMode {
        RunMode::Parallel
    }

    fn validate(&self, provider_names: &[&str]) -> Result<(), ConfigError> {
        if provider_names.contains(&self.fallback_provider.as_str()) {
            Ok(())
        } else {
            Err(ConfigError::UnknownFallbackProvider(
                self.fallback_provider.clone(),
            ))
        }
    }

    fn determine_final_result(
        &self,
        _evaluation: &StrategyEvaluationContext<'_>,
        resolutions: &[ProviderResolution],
    ) -> FinalResult {
        if resolutions.iter().any(ProviderResolution::is_error) {
            return collect_provider_errors(resolutions);
        }
        let Some(first) = resolutions.first() else {
            return collect_provider_errors(resolutions);
        };

        if resolutions.iter().all(|r| r.details.value == first.details.value) {
            return FinalResult::Resolved(first.clone());
        }

        let Some(fallback) = resolutions
            .iter()
            .find(|r| r.provider_name == self.fallback_provider)
        else {
            return FinalResult::Failed(AggregateError::new(
                ErrorCode::General,
                format!(
                    "fallback provider '{}' did not produce a result",
                    self.fallback_provider
                ),
            ));
        };

        tracing::debug!(
            fallback = %self.fallback_provider,
            providers = resolutions.len(),
            "providers disagree, using fallback"
        );
        if let Some(on_mismatch) = &self.on_mismatch {
            on_mismatch(resolutions);
        }
        FinalResult::Resolved(fallback.clone())
    }
}
