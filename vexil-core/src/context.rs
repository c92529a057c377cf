//! # Evaluation Context
//!
//! The contextual attributes a provider uses for targeting, and the Context
//! Merger that combines the precedence layers of one evaluation into a single map.
//!
//! # Precedence
//!
//! Layers are merged in this order, later layers overwriting identical keys:
//!
//! 1. global context (set on the API object)
//! 2. transaction context (from the transaction propagator)
//! 3. client context
//! 4. invocation context (passed to the evaluation call)
//! 5. contexts returned by `before` hooks, in hook order
//!
//! The merge is shallow: a nested [`Value::Struct`] under the same key is replaced
//! wholesale, never merged field by field.

use crate::value::Value;
use std::collections::BTreeMap;

/// Attribute key reserved for the targeting key when a context is flattened.
pub const TARGETING_KEY: &str = "targetingKey";

/// Contextual attributes for one evaluation.
///
/// A value type: combining contexts always produces a new context and never
/// touches the inputs.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EvaluationContext {
    #[cfg_attr(
        feature = "serde",
        serde(rename = "targetingKey", skip_serializing_if = "Option::is_none", default)
    )]
    targeting_key: Option<String>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    fields: BTreeMap<String, Value>,
}

impl EvaluationContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the targeting key.
    pub fn with_targeting_key(mut self, targeting_key: impl Into<String>) -> Self {
        self.targeting_key = Some(targeting_key.into());
        self
    }

    /// Adds an attribute.
    ///
    /// The key `targetingKey` never becomes an ordinary attribute: strings and
    /// scalars (rendered as text) set the targeting key, so flattened contexts
    /// round-trip, and any other value is ignored.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds an attribute in place. See [`with_field`](Self::with_field).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if key == TARGETING_KEY {
            if let Some(targeting_key) = targeting_key_text(value) {
                self.targeting_key = Some(targeting_key);
            }
        } else {
            self.fields.insert(key, value);
        }
    }

    /// The targeting key, if any.
    pub fn targeting_key(&self) -> Option<&str> {
        self.targeting_key.as_deref()
    }

    /// Looks up an attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// All attributes except the targeting key.
    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Whether the context has neither a targeting key nor attributes.
    pub fn is_empty(&self) -> bool {
        self.targeting_key.is_none() && self.fields.is_empty()
    }

    /// Returns a new context with `overlay` merged on top of `self`.
    pub fn merged(&self, overlay: &EvaluationContext) -> EvaluationContext {
        merge_contexts([self, overlay])
    }

    /// Merges `overlay` into this context in place.
    pub(crate) fn merge_from(&mut self, overlay: &EvaluationContext) {
        if let Some(key) = &overlay.targeting_key {
            self.targeting_key = Some(key.clone());
        }
        for (key, value) in &overlay.fields {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// Flattens the context into one attribute map, the targeting key stored under
    /// [`TARGETING_KEY`].
    pub fn to_attributes(&self) -> BTreeMap<String, Value> {
        let mut attributes = self.fields.clone();
        if let Some(key) = &self.targeting_key {
            attributes.insert(TARGETING_KEY.to_string(), Value::String(key.clone()));
        }
        attributes
    }
}

fn targeting_key_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::DateTime(_) | Value::List(_) | Value::Struct(_) => None,
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for EvaluationContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut context = EvaluationContext::new();
        for (key, value) in iter {
            context.insert(key, value);
        }
        context
    }
}

/// Merges context layers by precedence, later layers winning per key.
///
/// Pure: the inputs are borrowed and left untouched.
pub fn merge_contexts<'a, I>(layers: I) -> EvaluationContext
where
    I: IntoIterator<Item = &'a EvaluationContext>,
{
    let mut merged = EvaluationContext::new();
    for layer in layers {
        merged.merge_from(layer);
    }
    merged
}
