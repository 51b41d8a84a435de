//! Derive macros for meal order commands and events
//!
//! # Available Macros
//!
//! - `#[derive(Event)]` - Implements `mealorder_core::event::Event` with a
//!   versioned type name per variant
//! - `#[derive(Command)]` - Implements `mealorder_core::command::Command` with
//!   the variant name
//!
//! # Example
//!
//! ```ignore
//! use mealorder_macros::{Command, Event};
//!
//! #[derive(Command, Clone, Debug)]
//! enum OrderCommand {
//!     CreateOrder { id: OrderId },
//!     CancelOrder { id: OrderId, who: UserId },
//! }
//!
//! #[derive(Event, Clone, Debug, Serialize, Deserialize)]
//! enum OrderEvent {
//!     OrderCreated { id: OrderId },
//!     #[event(version = 2)]
//!     OrderCanceled { id: OrderId, who: UserId },
//! }
//!
//! assert_eq!(OrderEvent::OrderCreated { id }.event_type(), "OrderCreated.v1");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Attribute, Data, DataEnum, DeriveInput, Fields, LitInt, Variant, parse_macro_input};

/// Derive macro for event enums
///
/// Each variant becomes `"{Variant}.v{N}"` where `N` defaults to 1 and can be
/// raised with `#[event(version = N)]` when a variant's payload changes shape.
///
/// # Errors
///
/// Produces a compile error when applied to anything but an enum, or when a
/// `#[event(...)]` attribute is malformed.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let data_enum = match enum_data(&input, "Event") {
        Ok(data) => data,
        Err(err) => return err.to_compile_error().into(),
    };

    let mut arms = Vec::with_capacity(data_enum.variants.len());
    for variant in &data_enum.variants {
        let version = match event_version(&variant.attrs) {
            Ok(version) => version,
            Err(err) => return err.to_compile_error().into(),
        };
        let type_name = format!("{}.v{version}", variant.ident);
        let pattern = variant_pattern(variant);
        arms.push(quote! { #pattern => #type_name, });
    }

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::mealorder_core::event::Event for #name #ty_generics #where_clause {
            fn event_type(&self) -> &'static str {
                match self {
                    #(#arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for command enums
///
/// `command_name()` returns the variant name, used in tracing spans and as
/// the `command` label on repository metrics.
///
/// # Errors
///
/// Produces a compile error when applied to anything but an enum.
#[proc_macro_derive(Command)]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    let data_enum = match enum_data(&input, "Command") {
        Ok(data) => data,
        Err(err) => return err.to_compile_error().into(),
    };

    let arms = data_enum.variants.iter().map(|variant| {
        let command_name = variant.ident.to_string();
        let pattern = variant_pattern(variant);
        quote! { #pattern => #command_name, }
    });

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let expanded = quote! {
        impl #impl_generics ::mealorder_core::command::Command for #name #ty_generics #where_clause {
            fn command_name(&self) -> &'static str {
                match self {
                    #(#arms)*
                }
            }
        }
    };

    TokenStream::from(expanded)
}

fn enum_data<'a>(input: &'a DeriveInput, derive: &str) -> syn::Result<&'a DataEnum> {
    match &input.data {
        Data::Enum(data) => Ok(data),
        _ => Err(syn::Error::new_spanned(
            &input.ident,
            format!("#[derive({derive})] can only be used on enums"),
        )),
    }
}

/// Match pattern that ignores the variant's fields
fn variant_pattern(variant: &Variant) -> TokenStream2 {
    let ident = &variant.ident;
    match &variant.fields {
        Fields::Named(_) => quote! { Self::#ident { .. } },
        Fields::Unnamed(_) => quote! { Self::#ident(..) },
        Fields::Unit => quote! { Self::#ident },
    }
}

/// Reads `#[event(version = N)]`, defaulting to 1
fn event_version(attrs: &[Attribute]) -> syn::Result<u32> {
    let mut version = 1;
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("event")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("version") {
                let lit: LitInt = meta.value()?.parse()?;
                version = lit.base10_parse()?;
                if version == 0 {
                    return Err(meta.error("event versions start at 1"));
                }
                Ok(())
            } else {
                Err(meta.error("unsupported event attribute, expected `version = N`"))
            }
        })?;
    }
    Ok(version)
}
