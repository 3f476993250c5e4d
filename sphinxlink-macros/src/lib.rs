use proc_macro::TokenStream;
use syn::DeriveInput;

mod from_row;

/// Derive `FromRow`.
///
/// Named fields are looked up by column name, or by `#[sql(rename = "column")]`. Tuple
/// fields are taken in column order.
#[proc_macro_derive(FromRow, attributes(sql))]
pub fn from_row(input: TokenStream) -> TokenStream {
    match from_row::from_row(syn::parse_macro_input!(input as DeriveInput)) {
        Ok(ok) => ok,
        Err(err) => err.into_compile_error().into(),
    }
}
