//! Procedural macros for bootx.
//!
//! This crate provides:
//!
//! - `#[derive(Validate)]` - Generates a `bootx_core::Validate` implementation
//!   from `#[validate(...)]` field attributes
//!
//! ```rust,ignore
//! use bootx::prelude::*;
//!
//! #[derive(Deserialize, Validate)]
//! pub struct CreateUser {
//!     #[validate(required, length(max = 32))]
//!     pub name: String,
//!     #[validate(min = 18)]
//!     pub age: u32,
//! }
//! ```

mod validate;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `bootx_core::Validate` for a struct.
///
/// # Field attributes
///
/// | Rule | Applies to | Violation |
/// |---|---|---|
/// | `required` | `String`, `Option<_>`, `Vec<_>` | `is required` |
/// | `min = <expr>` | ordered values | `must be at least <min>` |
/// | `max = <expr>` | ordered values | `must be at most <max>` |
/// | `length(min = N, max = N)` | `String`, `Vec<_>`, `Option` of those | `length must be ...` |
/// | `nested` | any `Validate` type | the inner violations, prefixed with the field |
/// | `custom = "path"` | `fn(&T) -> Result<(), impl Display>` | the returned message |
///
/// Several rules may be combined in one attribute; every failing rule is
/// reported, in field order.
///
/// # Container attributes
///
/// `#[validate(crate = "path")]` sets the path to `bootx_core` used by the
/// generated code. By default it is found from the deriving crate's
/// dependencies: `bootx-core` directly, else `bootx::core`.
#[proc_macro_derive(Validate, attributes(validate))]
pub fn derive_validate(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match validate::derive_validate(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
