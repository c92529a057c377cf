//! Derive macros for Vexil.

use proc_macro::TokenStream;

mod context;

/// Derives `From<&T>` and `From<T>` for `vexil::EvaluationContext`.
///
/// Every named field becomes an attribute keyed by its name. `Option` fields
/// contribute only when `Some`.
///
/// Field attributes:
/// - `#[context(targeting_key)]`: the field (anything implementing `ToString`)
///   becomes the targeting key
/// - `#[context(rename = "key")]`: use `key` instead of the field name
/// - `#[context(skip)]`: leave the field out
///
/// ```rust,ignore
/// #[derive(IntoContext)]
/// struct User {
///     #[context(targeting_key)]
///     id: String,
///     #[context(rename = "plan")]
///     subscription: String,
///     beta: Option<bool>,
///     #[context(skip)]
///     password_hash: String,
/// }
///
/// let context = EvaluationContext::from(&user);
/// ```
#[proc_macro_derive(IntoContext, attributes(context))]
pub fn derive_into_context(input: TokenStream) -> TokenStream {
    context::derive_into_context_impl(input)
}
