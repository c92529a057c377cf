//! The provider every scope starts with.

use vexil_core::{
    EvaluationContext, EvaluationError, Provider, ProviderMetadata, Reason, ResolutionDetails,
    Value, async_trait,
};

/// Resolves every flag to the caller's default with reason `DEFAULT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProvider;

impl NoopProvider {
    /// Creates the provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for NoopProvider {
    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata::new("No-op Provider")
    }

    async fn resolve_boolean_evaluation(
        &self,
        _flag_key: &str,
        default_value: bool,
        _context: &EvaluationContext,
    ) -> Result<ResolutionDetails<bool>, EvaluationError> {
        Ok(ResolutionDetails::with_reason(default_value, Reason::Default))
    }

    async fn resolve_string_evaluation(
        &self,
        _flag_key: &str,
        default_value: String,
        _context: &EvaluationContext,
    ) -> Result<ResolutionDetails<String>, EvaluationError> {
        Ok(ResolutionDetails::with_reason(default_value, Reason::Default))
    }

    async fn resolve_number_evaluation(
        &self,
        _flag_key: &str,
        default_value: f64,
        _context: &EvaluationContext,
    ) -> Result<ResolutionDetails<f64>, EvaluationError> {
        Ok(ResolutionDetails::with_reason(default_value, Reason::Default))
    }

    async fn resolve_object_evaluation(
        &self,
        _flag_key: &str,
        default_value: Value,
        _context: &EvaluationContext,
    ) -> Result<ResolutionDetails<Value>, EvaluationError> {
        Ok(ResolutionDetails::with_reason(default_value, Reason::Default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_default() {
        let details = NoopProvider
            .resolve_string_evaluation("any", "fallback".into(), &EvaluationContext::new())
            .await
            .unwrap();
        assert_eq!(details.value, "fallback");
        assert_eq!(details.reason, Some(Reason::Default));
    }
}
