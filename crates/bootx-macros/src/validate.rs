//! `#[derive(Validate)]` implementation.
//!
//! Each `#[validate(...)]` rule becomes one call into
//! `bootx_core::validate::rules`, collected by a `Violations` accumulator.
//!
//! Generated paths go through `bootx_core` when the deriving crate depends on
//! it directly and through `bootx::core` otherwise. `#[validate(crate = "..")]`
//! on the struct overrides the lookup.

use proc_macro_crate::{FoundCrate, crate_name};
use proc_macro2::{Ident, Span, TokenStream};
use quote::{ToTokens, quote};
use syn::{
    Attribute, Data, DeriveInput, Expr, Fields, LitInt, LitStr, Member, Path, spanned::Spanned,
};

// ============================================================================
// Attribute structures
// ============================================================================

/// Rules declared on one field.
#[derive(Default)]
struct FieldRules {
    required: bool,
    min: Option<Expr>,
    max: Option<Expr>,
    length_min: Option<usize>,
    length_max: Option<usize>,
    has_length: bool,
    nested: bool,
    custom: Vec<Path>,
}

impl FieldRules {
    fn is_empty(&self) -> bool {
        !self.required
            && self.min.is_none()
            && self.max.is_none()
            && !self.has_length
            && !self.nested
            && self.custom.is_empty()
    }
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_validate(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Validate can only be derived for structs",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Validate cannot be derived for unions",
            ));
        }
    };

    let core = core_path(&input.attrs)?;
    let mut checks = Vec::new();
    for (index, field) in fields.iter().enumerate() {
        let rules = parse_field_rules(&field.attrs)?;
        if rules.is_empty() {
            continue;
        }
        let (member, label) = match &field.ident {
            Some(ident) => (Member::from(ident.clone()), ident.to_string()),
            None => (Member::from(index), index.to_string()),
        };
        checks.push(generate_checks(&core, &member, &label, &rules));
    }

    if matches!(fields, Fields::Unit) || checks.is_empty() {
        return Ok(quote! {
            impl #impl_generics #core::validate::Validate for #name #ty_generics #where_clause {}
        });
    }

    Ok(quote! {
        impl #impl_generics #core::validate::Validate for #name #ty_generics #where_clause {
            fn validate(&self) -> ::core::result::Result<(), #core::error::ValidationError> {
                let mut violations = #core::validate::Violations::new();
                #(#checks)*
                violations.finish()
            }
        }
    })
}

// ============================================================================
// Crate path
// ============================================================================

/// The path generated code uses to reach `bootx_core`.
fn core_path(attrs: &[Attribute]) -> syn::Result<TokenStream> {
    let mut overridden = None;
    for attr in attrs {
        if !attr.path().is_ident("validate") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("crate") {
                let lit = meta.value()?.parse::<LitStr>()?;
                overridden = Some(lit.parse::<Path>()?);
                Ok(())
            } else {
                Err(meta.error("expected `crate = \"...\"` on the struct"))
            }
        })?;
    }
    if let Some(path) = overridden {
        return Ok(path.to_token_stream());
    }

    let path = match crate_name("bootx-core") {
        Ok(FoundCrate::Itself) => quote!(::bootx_core),
        Ok(FoundCrate::Name(name)) => {
            let name = Ident::new(&name, Span::call_site());
            quote!(::#name)
        }
        Err(_) => match crate_name("bootx") {
            Ok(FoundCrate::Name(name)) => {
                let name = Ident::new(&name, Span::call_site());
                quote!(::#name::core)
            }
            _ => quote!(::bootx_core),
        },
    };
    Ok(path)
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_field_rules(attrs: &[Attribute]) -> syn::Result<FieldRules> {
    let mut rules = FieldRules::default();

    for attr in attrs {
        if !attr.path().is_ident("validate") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("required") {
                rules.required = true;
            } else if meta.path.is_ident("nested") {
                rules.nested = true;
            } else if meta.path.is_ident("min") {
                rules.min = Some(meta.value()?.parse::<Expr>()?);
            } else if meta.path.is_ident("max") {
                rules.max = Some(meta.value()?.parse::<Expr>()?);
            } else if meta.path.is_ident("custom") {
                let lit = meta.value()?.parse::<LitStr>()?;
                rules.custom.push(lit.parse::<Path>()?);
            } else if meta.path.is_ident("length") {
                rules.has_length = true;
                meta.parse_nested_meta(|inner| {
                    let bound = inner.value()?.parse::<LitInt>()?.base10_parse::<usize>()?;
                    if inner.path.is_ident("min") {
                        rules.length_min = Some(bound);
                    } else if inner.path.is_ident("max") {
                        rules.length_max = Some(bound);
                    } else {
                        return Err(inner.error("expected `min` or `max`"));
                    }
                    Ok(())
                })?;
            } else {
                return Err(meta.error(format!(
                    "unknown validate rule `{}`",
                    meta.path.to_token_stream()
                )));
            }
            Ok(())
        })?;
    }

    if rules.has_length && rules.length_min.is_none() && rules.length_max.is_none() {
        return Err(syn::Error::new(
            attrs
                .iter()
                .find(|a| a.path().is_ident("validate"))
                .map_or_else(proc_macro2::Span::call_site, |a| a.span()),
            "`length` needs at least one of `min` or `max`",
        ));
    }

    Ok(rules)
}

// ============================================================================
// Code generation
// ============================================================================

fn generate_checks(core: &TokenStream, member: &Member, label: &str, rules: &FieldRules) -> TokenStream {
    let rules_path = quote!(#core::validate::rules);
    let mut out = TokenStream::new();

    if rules.required {
        out.extend(quote! {
            violations.check(#rules_path::required(#label, &self.#member));
        });
    }
    if let Some(min) = &rules.min {
        out.extend(quote! {
            violations.check(#rules_path::min(#label, &self.#member, #min));
        });
    }
    if let Some(max) = &rules.max {
        out.extend(quote! {
            violations.check(#rules_path::max(#label, &self.#member, #max));
        });
    }
    if rules.has_length {
        let min = option_tokens(rules.length_min);
        let max = option_tokens(rules.length_max);
        out.extend(quote! {
            violations.check(#rules_path::length(#label, &self.#member, #min, #max));
        });
    }
    if rules.nested {
        out.extend(quote! {
            violations.nested(#label, #core::validate::Validate::validate(&self.#member));
        });
    }
    for custom in &rules.custom {
        out.extend(quote! {
            violations.check(#rules_path::custom(#label, &self.#member, #custom));
        });
    }
    out
}

fn option_tokens(value: Option<usize>) -> TokenStream {
    match value {
        Some(v) => quote!(::core::option::Option::Some(#v)),
        None => quote!(::core::option::Option::None),
    }
}
