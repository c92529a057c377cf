//! Resolution and evaluation results.

use crate::{
    error::{ErrorCode, EvaluationError},
    value::{FlagType, FlagValue},
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// Why a value was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Reason {
    /// The value is static (no dynamic evaluation).
    Static,
    /// The value fell back to a default.
    Default,
    /// The value came from a targeting rule match.
    TargetingMatch,
    /// The value came from a pseudorandom split.
    Split,
    /// The value was served from a cache.
    Cached,
    /// The flag is disabled.
    Disabled,
    /// The reason is not known.
    #[default]
    Unknown,
    /// The value may be outdated.
    Stale,
    /// The evaluation failed.
    Error,
    /// A provider-specific reason.
    Other(String),
}

impl Reason {
    /// The canonical name.
    pub fn as_str(&self) -> &str {
        match self {
            Reason::Static => "STATIC",
            Reason::Default => "DEFAULT",
            Reason::TargetingMatch => "TARGETING_MATCH",
            Reason::Split => "SPLIT",
            Reason::Cached => "CACHED",
            Reason::Disabled => "DISABLED",
            Reason::Unknown => "UNKNOWN",
            Reason::Stale => "STALE",
            Reason::Error => "ERROR",
            Reason::Other(other) => other,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flag metadata entry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum MetadataValue {
    /// A boolean entry.
    Bool(bool),
    /// A numeric entry.
    Number(f64),
    /// A string entry.
    String(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_owned())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

/// Arbitrary provider-supplied metadata about a flag.
///
/// Frozen once produced: clones share one immutable map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagMetadata(Arc<BTreeMap<String, MetadataValue>>);

impl FlagMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns new metadata with an extra entry.
    pub fn with(self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        let mut entries = Arc::unwrap_or_clone(self.0);
        entries.insert(key.into(), value.into());
        Self(Arc::new(entries))
    }

    /// Looks up an entry.
    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<MetadataValue>> FromIterator<(K, V)> for FlagMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(Arc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

/// What a provider returns for one flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionDetails<T> {
    /// The resolved value.
    pub value: T,
    /// The variant name, if the provider uses variants.
    pub variant: Option<String>,
    /// Why the value was chosen.
    pub reason: Option<Reason>,
    /// Set when the provider resolved with an error instead of failing outright.
    pub error_code: Option<ErrorCode>,
    /// Message accompanying `error_code`.
    pub error_message: Option<String>,
    /// Flag metadata.
    pub flag_metadata: FlagMetadata,
}

impl<T> ResolutionDetails<T> {
    /// A resolution with only a value.
    pub fn new(value: T) -> Self {
        Self {
            value,
            variant: None,
            reason: None,
            error_code: None,
            error_message: None,
            flag_metadata: FlagMetadata::default(),
        }
    }

    /// A resolution with a value and reason.
    pub fn with_reason(value: T, reason: Reason) -> Self {
        Self {
            reason: Some(reason),
            ..Self::new(value)
        }
    }

    /// Sets the variant.
    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Sets the metadata.
    pub fn metadata(mut self, metadata: FlagMetadata) -> Self {
        self.flag_metadata = metadata;
        self
    }

    /// Marks the resolution as failed while still returning `value`.
    pub fn error(mut self, error: EvaluationError) -> Self {
        self.error_code = Some(error.code());
        self.error_message = error.message().map(str::to_owned);
        self.reason = Some(Reason::Error);
        self
    }

    /// The error carried by this resolution, if any.
    pub fn to_error(&self) -> Option<EvaluationError> {
        self.error_code.map(|code| match &self.error_message {
            Some(message) => EvaluationError::new(code, message.clone()),
            None => EvaluationError::from_code(code),
        })
    }

    /// Maps the value, keeping everything else.
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> ResolutionDetails<U> {
        ResolutionDetails {
            value: f(self.value),
            variant: self.variant,
            reason: self.reason,
            error_code: self.error_code,
            error_message: self.error_message,
            flag_metadata: self.flag_metadata,
        }
    }
}

impl ResolutionDetails<FlagValue> {
    /// Recovers a typed resolution; `TYPE_MISMATCH` when the variant differs.
    pub fn into_typed<T: FlagType>(self) -> Result<ResolutionDetails<T>, EvaluationError> {
        let actual = self.value.value_type();
        let value = T::from_flag_value(self.value).ok_or_else(|| {
            EvaluationError::type_mismatch(format!("expected {} value, got {actual}", T::TYPE))
        })?;
        Ok(ResolutionDetails {
            value,
            variant: self.variant,
            reason: self.reason,
            error_code: self.error_code,
            error_message: self.error_message,
            flag_metadata: self.flag_metadata,
        })
    }
}

/// What an evaluation call returns: the resolution plus the flag key, with a
/// reason always present.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationDetails<T> {
    /// The flag that was evaluated.
    pub flag_key: String,
    /// The value, or the caller's default on failure.
    pub value: T,
    /// The variant name.
    pub variant: Option<String>,
    /// Why the value was chosen; `Error` on failure.
    pub reason: Reason,
    /// Set on failure.
    pub error_code: Option<ErrorCode>,
    /// Message accompanying `error_code`.
    pub error_message: Option<String>,
    /// Flag metadata.
    pub flag_metadata: FlagMetadata,
}

impl<T> EvaluationDetails<T> {
    /// Details of a successful resolution.
    pub fn from_resolution(flag_key: impl Into<String>, resolution: ResolutionDetails<T>) -> Self {
        Self {
            flag_key: flag_key.into(),
            value: resolution.value,
            variant: resolution.variant,
            reason: resolution.reason.unwrap_or_default(),
            error_code: resolution.error_code,
            error_message: resolution.error_message,
            flag_metadata: resolution.flag_metadata,
        }
    }

    /// Details of a failed evaluation: the default value with reason `Error`.
    pub fn from_error(
        flag_key: impl Into<String>,
        default_value: T,
        error: &EvaluationError,
        flag_metadata: FlagMetadata,
    ) -> Self {
        Self {
            flag_key: flag_key.into(),
            value: default_value,
            variant: None,
            reason: Reason::Error,
            error_code: Some(error.code()),
            error_message: error.message().map(str::to_owned),
            flag_metadata,
        }
    }

    /// Whether the evaluation failed.
    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }

    /// Maps the value, keeping everything else.
    pub fn map_value<U>(self, f: impl FnOnce(T) -> U) -> EvaluationDetails<U> {
        EvaluationDetails {
            flag_key: self.flag_key,
            value: f(self.value),
            variant: self.variant,
            reason: self.reason,
            error_code: self.error_code,
            error_message: self.error_message,
            flag_metadata: self.flag_metadata,
        }
    }

    /// The error carried by these details, if any.
    pub fn to_error(&self) -> Option<EvaluationError> {
        self.error_code.map(|code| match &self.error_message {
            Some(message) => EvaluationError::new(code, message.clone()),
            None => EvaluationError::from_code(code),
        })
    }
}

impl<T: FlagType> EvaluationDetails<T> {
    /// Erases the value type, for hooks and strategies.
    pub fn erase(&self) -> EvaluationDetails<FlagValue> {
        self.clone().map_value(FlagType::into_flag_value)
    }
}

impl EvaluationDetails<FlagValue> {
    /// Recovers a typed resolution from erased details.
    pub fn into_resolution<T: FlagType>(self) -> Result<ResolutionDetails<T>, EvaluationError> {
        let actual = self.value.value_type();
        let value = T::from_flag_value(self.value).ok_or_else(|| {
            EvaluationError::type_mismatch(format!("expected {} value, got {actual}", T::TYPE))
        })?;
        Ok(ResolutionDetails {
            value,
            variant: self.variant,
            reason: Some(self.reason),
            error_code: self.error_code,
            error_message: self.error_message,
            flag_metadata: self.flag_metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_defaults_to_unknown() {
        let details = EvaluationDetails::from_resolution("f", ResolutionDetails::new(true));
        assert_eq!(details.reason, Reason::Unknown);
        assert!(!details.is_error());
    }

    #[test]
    fn test_error_details_keep_default_and_metadata() {
        let metadata = FlagMetadata::new().with("owner", "team-a");
        let details = EvaluationDetails::from_error(
            "f",
            "fallback".to_string(),
            &EvaluationError::flag_not_found("f"),
            metadata.clone(),
        );
        assert_eq!(details.value, "fallback");
        assert_eq!(details.reason, Reason::Error);
        assert_eq!(details.error_code, Some(ErrorCode::FlagNotFound));
        assert_eq!(details.flag_metadata, metadata);
    }

    #[test]
    fn test_metadata_is_shared_and_frozen() {
        let metadata = FlagMetadata::new().with("a", true);
        let shared = metadata.clone();
        let extended = metadata.with("b", 1_i64);
        assert!(shared.get("b").is_none());
        assert_eq!(extended.get("a"), Some(&MetadataValue::Bool(true)));
    }

    #[test]
    fn test_into_resolution_type_mismatch() {
        let erased = EvaluationDetails::from_resolution("f", ResolutionDetails::new(true)).erase();
        let err = erased.into_resolution::<String>().unwrap_err();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);
    }
}
