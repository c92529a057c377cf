//! Attribute values and typed flag values.
//!
//! [`Value`] is the open value type used by evaluation contexts, hook hints and
//! object flags. [`FlagValue`] is the type-erased result of a flag evaluation, used
//! wherever a component must handle every flag type uniformly (hooks, the
//! multi-provider strategies). [`FlagType`] ties a concrete Rust type to its
//! resolver method and to its [`FlagValue`] variant.

use crate::{
    context::EvaluationContext, details::ResolutionDetails, error::EvaluationError,
    provider::Provider,
};
use chrono::{DateTime, Utc};
use std::{collections::BTreeMap, fmt, future::Future, pin::Pin};

/// A context attribute, hook hint or object flag value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    String(String),
    /// A point in time.
    DateTime(DateTime<Utc>),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A nested structure.
    Struct(BTreeMap<String, Value>),
}

impl Value {
    /// Returns the boolean if this is a [`Value::Bool`].
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer if this is a [`Value::Int`].
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the number as `f64` for both [`Value::Int`] and [`Value::Float`].
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Returns the string slice if this is a [`Value::String`].
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the fields if this is a [`Value::Struct`].
    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// Returns the items if this is a [`Value::List`].
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s}"),
            Value::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(fields: BTreeMap<String, T>) -> Self {
        Value::Struct(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// The type tag of a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlagValueType {
    /// `bool` flags.
    Boolean,
    /// `String` flags.
    String,
    /// `f64` flags.
    Number,
    /// Structured ([`Value`]) flags.
    Object,
}

impl FlagValueType {
    /// Lowercase name of the type, as used in log fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            FlagValueType::Boolean => "boolean",
            FlagValueType::String => "string",
            FlagValueType::Number => "number",
            FlagValueType::Object => "object",
        }
    }
}

impl fmt::Display for FlagValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A type-erased flag value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FlagValue {
    /// Value of a boolean flag.
    Bool(bool),
    /// Value of a string flag.
    String(String),
    /// Value of a number flag.
    Number(f64),
    /// Value of an object flag.
    Object(Value),
}

impl FlagValue {
    /// The type tag matching this value.
    pub fn value_type(&self) -> FlagValueType {
        match self {
            FlagValue::Bool(_) => FlagValueType::Boolean,
            FlagValue::String(_) => FlagValueType::String,
            FlagValue::Number(_) => FlagValueType::Number,
            FlagValue::Object(_) => FlagValueType::Object,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::Bool(b) => write!(f, "{b}"),
            FlagValue::String(s) => write!(f, "{s}"),
            FlagValue::Number(n) => write!(f, "{n}"),
            FlagValue::Object(v) => write!(f, "{v}"),
        }
    }
}

/// Boxed future returned by [`FlagType::resolve`].
pub type ResolveFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<ResolutionDetails<T>, EvaluationError>> + Send + 'a>>;

/// A Rust type that can be the value of a flag.
///
/// Implemented for `bool`, `String`, `f64` and [`Value`]. The pipeline is generic
/// over this trait: it picks the provider resolver through [`FlagType::resolve`]
/// and erases the value through [`FlagType::into_flag_value`] for hooks.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a flag value type",
    label = "flags resolve to `bool`, `String`, `f64` or `Value`",
    note = "Wrap structured data in `vexil::Value` to evaluate object flags."
)]
pub trait FlagType: Clone + Send + Sync + 'static {
    /// The type tag of this flag type.
    const TYPE: FlagValueType;

    /// Erases the value.
    fn into_flag_value(self) -> FlagValue;

    /// Recovers the value; `None` when the variant does not match.
    fn from_flag_value(value: FlagValue) -> Option<Self>;

    /// Calls the provider resolver for this type.
    fn resolve<'a>(
        provider: &'a dyn Provider,
        flag_key: &'a str,
        default_value: Self,
        context: &'a EvaluationContext,
    ) -> ResolveFuture<'a, Self>;
}

impl FlagType for bool {
    const TYPE: FlagValueType = FlagValueType::Boolean;

    fn into_flag_value(self) -> FlagValue {
        FlagValue::Bool(self)
    }

    fn from_flag_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    fn resolve<'a>(
        provider: &'a dyn Provider,
        flag_key: &'a str,
        default_value: Self,
        context: &'a EvaluationContext,
    ) -> ResolveFuture<'a, Self> {
        provider.resolve_boolean_evaluation(flag_key, default_value, context)
    }
}

impl FlagType for String {
    const TYPE: FlagValueType = FlagValueType::String;

    fn into_flag_value(self) -> FlagValue {
        FlagValue::String(self)
    }

    fn from_flag_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn resolve<'a>(
        provider: &'a dyn Provider,
        flag_key: &'a str,
        default_value: Self,
        context: &'a EvaluationContext,
    ) -> ResolveFuture<'a, Self> {
        provider.resolve_string_evaluation(flag_key, default_value, context)
    }
}

impl FlagType for f64 {
    const TYPE: FlagValueType = FlagValueType::Number;

    fn into_flag_value(self) -> FlagValue {
        FlagValue::Number(self)
    }

    fn from_flag_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Number(n) => Some(n),
            _ => None,
        }
    }

    fn resolve<'a>(
        provider: &'a dyn Provider,
        flag_key: &'a str,
        default_value: Self,
        context: &'a EvaluationContext,
    ) -> ResolveFuture<'a, Self> {
        provider.resolve_number_evaluation(flag_key, default_value, context)
    }
}

impl FlagType for Value {
    const TYPE: FlagValueType = FlagValueType::Object;

    fn into_flag_value(self) -> FlagValue {
        FlagValue::Object(self)
    }

    fn from_flag_value(value: FlagValue) -> Option<Self> {
        match value {
            FlagValue::Object(v) => Some(v),
            _ => None,
        }
    }

    fn resolve<'a>(
        provider: &'a dyn Provider,
        flag_key: &'a str,
        default_value: Self,
        context: &'a EvaluationContext,
    ) -> ResolveFuture<'a, Self> {
        provider.resolve_object_evaluation(flag_key, default_value, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_value_round_trip_rejects_wrong_variant() {
        assert_eq!(bool::from_flag_value(FlagValue::Bool(true)), Some(true));
        assert_eq!(bool::from_flag_value(FlagValue::Number(1.0)), None);
        assert_eq!(
            String::from_flag_value("on".to_string().into_flag_value()),
            Some("on".to_string())
        );
    }

    #[test]
    fn test_value_conversions() {
        let v: Value = vec!["a", "b"].into();
        assert_eq!(v.as_list().map(<[Value]>::len), Some(2));
        assert_eq!(Value::from(3_i32).as_f64(), Some(3.0));
        assert_eq!(Value::from("x").as_str(), Some("x"));
    }

    #[test]
    fn test_value_display_nested() {
        let mut fields = BTreeMap::new();
        fields.insert("a".to_string(), Value::Int(1));
        fields.insert("b".to_string(), Value::List(vec![Value::Bool(true)]));
        assert_eq!(Value::Struct(fields).to_string(), "{a: 1, b: [true]}");
    }
}
