//! Error types for Vexil.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`ErrorCode`] - The canonical error kinds carried by evaluation details
//! - [`EvaluationError`] - A domain error with a code, returned by providers
//! - [`AggregateError`] - Every failure collected from a multi-provider evaluation
//! - [`ConfigError`] - Configuration mistakes detected at build time
//! - [`VexilError`] - Top-level error type for fallible API operations

use std::fmt;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Canonical error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ErrorCode {
    /// The provider has not finished initializing.
    ProviderNotReady,
    /// The provider is in an irrecoverable error state.
    ProviderFatal,
    /// The flag does not exist in the provider.
    FlagNotFound,
    /// The flag configuration could not be parsed.
    ParseError,
    /// The flag value does not have the requested type.
    TypeMismatch,
    /// The provider requires a targeting key and none was supplied.
    TargetingKeyMissing,
    /// The evaluation context is not valid for the provider.
    InvalidContext,
    /// Any other failure.
    General,
}

impl ErrorCode {
    /// The canonical `SCREAMING_SNAKE_CASE` name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::ProviderNotReady => "PROVIDER_NOT_READY",
            ErrorCode::ProviderFatal => "PROVIDER_FATAL",
            ErrorCode::FlagNotFound => "FLAG_NOT_FOUND",
            ErrorCode::ParseError => "PARSE_ERROR",
            ErrorCode::TypeMismatch => "TYPE_MISMATCH",
            ErrorCode::TargetingKeyMissing => "TARGETING_KEY_MISSING",
            ErrorCode::InvalidContext => "INVALID_CONTEXT",
            ErrorCode::General => "GENERAL",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with a canonical code.
///
/// Providers return this from resolvers and `initialize`; hooks may return it
/// (boxed) to keep a specific code instead of `GENERAL`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct EvaluationError {
    code: ErrorCode,
    message: Option<String>,
}

impl EvaluationError {
    /// Creates an error with a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// Creates an error carrying only a code.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// `PROVIDER_NOT_READY`.
    pub fn provider_not_ready() -> Self {
        Self::new(ErrorCode::ProviderNotReady, "provider has not yet initialized")
    }

    /// `PROVIDER_FATAL`.
    pub fn provider_fatal() -> Self {
        Self::new(
            ErrorCode::ProviderFatal,
            "provider is in an irrecoverable error state",
        )
    }

    /// `FLAG_NOT_FOUND` for the given key.
    pub fn flag_not_found(flag_key: &str) -> Self {
        Self::new(ErrorCode::FlagNotFound, format!("flag '{flag_key}' not found"))
    }

    /// `TYPE_MISMATCH`.
    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TypeMismatch, message)
    }

    /// `GENERAL`.
    pub fn general(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::General, message)
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The error message, if any.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Classifies an arbitrary error.
    ///
    /// Domain errors keep their code; everything else becomes `GENERAL` with the
    /// error's display text as message.
    pub fn classify(error: &(dyn std::error::Error + 'static)) -> Self {
        if let Some(domain) = error.downcast_ref::<EvaluationError>() {
            return domain.clone();
        }
        if let Some(aggregate) = error.downcast_ref::<AggregateError>() {
            return EvaluationError::from(aggregate);
        }
        EvaluationError::general(error.to_string())
    }
}

impl From<BoxError> for EvaluationError {
    fn from(err: BoxError) -> Self {
        EvaluationError::classify(err.as_ref())
    }
}

/// One provider's contribution to an [`AggregateError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Name of the provider entry that failed.
    pub source: String,
    /// What went wrong.
    pub error: EvaluationError,
}

/// Every failure collected from one multi-provider evaluation, in the order the
/// providers failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AggregateError {
    code: ErrorCode,
    message: String,
    failures: Vec<ProviderFailure>,
}

impl AggregateError {
    /// Builds the aggregate from collected failures.
    ///
    /// The code is the shared code when all failures agree, `GENERAL` otherwise.
    /// An empty list yields a `GENERAL` error.
    pub fn from_failures(failures: Vec<ProviderFailure>) -> Self {
        let Some(first) = failures.first() else {
            return Self::new(ErrorCode::General, "no provider produced a result");
        };
        let code = if failures.iter().all(|f| f.error.code() == first.error.code()) {
            first.error.code()
        } else {
            ErrorCode::General
        };
        let mut message = format!("provider errors occurred: {}: {}", first.source, first.error);
        if failures.len() > 1 {
            message.push_str(&format!(" (and {} more)", failures.len() - 1));
        }
        Self {
            code,
            message,
            failures,
        }
    }

    /// An aggregate with no provider failures, e.g. when no provider was eligible.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            failures: Vec::new(),
        }
    }

    /// The aggregate code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The summary message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The collected failures, first failure first.
    pub fn failures(&self) -> &[ProviderFailure] {
        &self.failures
    }
}

impl From<&AggregateError> for EvaluationError {
    fn from(err: &AggregateError) -> Self {
        EvaluationError::new(err.code, err.message.clone())
    }
}

impl From<AggregateError> for EvaluationError {
    fn from(err: AggregateError) -> Self {
        EvaluationError::from(&err)
    }
}

/// Configuration mistakes detected when building a component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Two provider entries were given the same explicit name.
    #[error("provider names must be unique: '{0}' is used more than once")]
    DuplicateProviderName(String),

    /// A multi-provider was built without providers.
    #[error("at least one provider entry is required")]
    NoProviders,

    /// The comparison fallback names no registered provider entry.
    #[error("fallback provider '{0}' is not a registered provider entry")]
    UnknownFallbackProvider(String),
}

/// Top-level error type for fallible Vexil operations.
#[derive(Error, Debug)]
pub enum VexilError {
    /// An evaluation-domain failure, e.g. provider initialization.
    #[error("evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    /// A multi-provider failure.
    #[error("aggregate error: {0}")]
    Aggregate(#[from] AggregateError),

    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

impl From<BoxError> for VexilError {
    fn from(err: BoxError) -> Self {
        VexilError::Custom(err)
    }
}
