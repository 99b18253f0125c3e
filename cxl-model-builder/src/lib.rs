// Copyright (c) 2026 Graphcore Ltd. All rights reserved.

//! Derive macros shared by the CXL components and models.
//!
//! All of them expect the struct to have an `entity: Rc<Entity>` field.

extern crate proc_macro;

use quote::quote;
use syn::{self, DeriveInput, parse_macro_input};

/// Create a std::fmt::Display implementation for a struct with an Entity.
#[proc_macro_derive(EntityDisplay)]
pub fn entity_display(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let DeriveInput {
        ident, generics, ..
    } = &input;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let output = quote! {
        impl #impl_generics std::fmt::Display for #ident #ty_generics #where_clause {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.entity, f)
            }
        }
    };
    output.into()
}

/// Implement `cxl_track::entity::GetEntity` for a struct with an Entity.
#[proc_macro_derive(EntityGet)]
pub fn entity_get(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let DeriveInput {
        ident, generics, ..
    } = &input;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let output = quote! {
        impl #impl_generics cxl_track::entity::GetEntity for #ident #ty_generics #where_clause {
            fn entity(&self) -> &std::rc::Rc<cxl_track::entity::Entity> {
                &self.entity
            }
        }
    };
    output.into()
}

/// Create a default (empty) implementation of Runnable.
///
/// Used by passive components that only react to calls from others.
#[proc_macro_derive(Runnable)]
pub fn runnable(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let DeriveInput {
        ident, generics, ..
    } = &input;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let output = quote! {
        #[async_trait::async_trait(?Send)]
        impl #impl_generics cxl_engine::traits::Runnable for #ident #ty_generics #where_clause {}
    };
    output.into()
}
