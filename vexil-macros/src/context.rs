//! `#[derive(IntoContext)]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    Data, DeriveInput, Field, Fields, GenericArgument, LitStr, PathArguments, Type,
    parse_macro_input,
};

#[derive(Default)]
struct FieldOptions {
    targeting_key: bool,
    rename: Option<String>,
    skip: bool,
}

impl FieldOptions {
    fn from_field(field: &Field) -> syn::Result<Self> {
        let mut options = FieldOptions::default();
        for attr in field.attrs.iter().filter(|a| a.path().is_ident("context")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("targeting_key") {
                    options.targeting_key = true;
                    Ok(())
                } else if meta.path.is_ident("skip") {
                    options.skip = true;
                    Ok(())
                } else if meta.path.is_ident("rename") {
                    let key: LitStr = meta.value()?.parse()?;
                    options.rename = Some(key.value());
                    Ok(())
                } else {
                    Err(meta.error("expected `targeting_key`, `rename = \"...\"` or `skip`"))
                }
            })?;
        }
        Ok(options)
    }
}

/// The `T` of an `Option<T>` field type.
fn option_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else {
        return None;
    };
    let segment = path.path.segments.last()?;
    if segment.ident != "Option" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    match args.args.first()? {
        GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

fn field_statement(field: &Field) -> syn::Result<Option<TokenStream2>> {
    let options = FieldOptions::from_field(field)?;
    if options.skip {
        return Ok(None);
    }
    let Some(ident) = &field.ident else {
        return Ok(None);
    };
    let optional = option_inner(&field.ty).is_some();

    let statement = if options.targeting_key {
        if optional {
            quote! {
                if let ::std::option::Option::Some(key) = &value.#ident {
                    context.insert(::vexil::TARGETING_KEY, ::std::string::ToString::to_string(key));
                }
            }
        } else {
            quote! {
                context.insert(::vexil::TARGETING_KEY, ::std::string::ToString::to_string(&value.#ident));
            }
        }
    } else {
        let key = options.rename.unwrap_or_else(|| ident.to_string());
        if optional {
            quote! {
                if let ::std::option::Option::Some(field) = &value.#ident {
                    context.insert(#key, ::std::clone::Clone::clone(field));
                }
            }
        } else {
            quote! {
                context.insert(#key, ::std::clone::Clone::clone(&value.#ident));
            }
        }
    };
    Ok(Some(statement))
}

pub fn derive_into_context_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(&input) {
        Ok(expanded) => TokenStream::from(expanded),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    &input.ident,
                    "IntoContext requires a struct with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "IntoContext can only be derived for structs",
            ));
        }
    };

    let statements = fields
        .iter()
        .map(field_statement)
        .collect::<syn::Result<Vec<_>>>()?
        .into_iter()
        .flatten();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::std::convert::From<&#name #ty_generics> for ::vexil::EvaluationContext #where_clause {
            fn from(value: &#name #ty_generics) -> Self {
                let mut context = ::vexil::EvaluationContext::new();
                #(#statements)*
                context
            }
        }

        impl #impl_generics ::std::convert::From<#name #ty_generics> for ::vexil::EvaluationContext #where_clause {
            fn from(value: #name #ty_generics) -> Self {
                ::std::convert::From::from(&value)
            }
        }
    })
}
