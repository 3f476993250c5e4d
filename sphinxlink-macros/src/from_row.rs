use proc_macro::TokenStream;
use quote::quote;
use syn::{token::{Brace, Paren}, *};

macro_rules! error {
    ($($tt:tt)*) => {
        return Err(syn::Error::new(proc_macro::Span::call_site().into(), format!($($tt)*)))
    };
}

pub fn from_row(input: DeriveInput) -> Result<TokenStream> {
    let DeriveInput { attrs: _, vis: _, ident, mut generics, data } = input;
    let Data::Struct(data) = data else {
        error!("only struct are currently supported")
    };

    let mut head = quote! {};
    let mut output = quote! {};

    match data.fields {
        Fields::Unnamed(FieldsUnnamed { unnamed, .. }) => {
            head = quote! { let mut iter = row.into_iter(); };
            let body = (0..unnamed.len())
                .map(|_|quote! { iter.try_next()?.decode()?, });
            Paren::default().surround(&mut output, |e|e.extend(body));
        },
        Fields::Named(FieldsNamed { named, .. }) => {
            let body = named
                .iter()
                .map(|field| {
                    let id = field.ident.as_ref().unwrap();
                    let name = column_name(field)?.unwrap_or_else(|| id.to_string());
                    Ok(quote! { #id: row.try_get(#name)?, })
                })
                .collect::<Result<Vec<_>>>()?;
            Brace::default().surround(&mut output, |e|e.extend(body));
        }
        Fields::Unit => {}
    };

    for ty in generics.type_params_mut() {
        ty.bounds.push(syn::parse_quote!(::sphinxlink::Decode));
    }

    let (g1, g2, g3) = generics.split_for_impl();

    Ok(quote! {
        #[automatically_derived]
        impl #g1 ::sphinxlink::FromRow for #ident #g2 #g3 {
            #[allow(unused_variables, unused_mut)]
            fn from_row(row: ::sphinxlink::Row) -> Result<Self, ::sphinxlink::DecodeError> {
                #head
                Ok(Self #output)
            }
        }
    }.into())
}

/// `#[sql(rename = "column")]`
fn column_name(field: &Field) -> Result<Option<String>> {
    let Some(attr) = field.attrs.iter().find(|attr| attr.path().is_ident("sql")) else {
        return Ok(None);
    };

    let mut name = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("rename") {
            name = Some(meta.value()?.parse::<LitStr>()?.value());
            Ok(())
        } else {
            Err(meta.error("possible value are: `rename = \"column\"`"))
        }
    })?;
    Ok(name)
}
