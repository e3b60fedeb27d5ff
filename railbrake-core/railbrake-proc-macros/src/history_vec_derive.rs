use crate::imports::*;
use crate::utilities::TokenStreamIterator;

pub(crate) fn history_vec_derive(input: TokenStream) -> TokenStream {
    let item_struct = syn::parse_macro_input!(input as syn::ItemStruct);
    let original_name = &item_struct.ident;
    let original_name_str: String = original_name.to_string();
    let new_name = Ident::new(
        &format!("{}HistoryVec", original_name.to_token_stream()),
        original_name.span(),
    );
    let new_name_str: String = new_name.to_string();
    let fields = match item_struct.fields {
        syn::Fields::Named(named) => named.named,
        _ => abort_call_site!("`HistoryVec` can only be derived for structs with named fields"),
    };
    if fields.is_empty() {
        abort_call_site!("`HistoryVec` requires at least one field");
    }
    let field_names = fields
        .iter()
        .filter_map(|f| f.ident.as_ref())
        .collect::<Vec<_>>();
    let first_field = &field_names[0];
    let vec_fields = fields
        .iter()
        .filter_map(|f| {
            let ident = f.ident.as_ref()?;
            let ty = &f.ty;
            let attrs = &f.attrs;
            Some(quote! {
                #(#attrs)*
                pub #ident: Vec<#ty>,
            })
        })
        .concat();
    let vec_new = field_names
        .iter()
        .map(|ident| {
            quote! {
                #ident: Vec::new(),
            }
        })
        .concat();

    let struct_doc = format!(" Stores history of {original_name_str}");
    let push_doc = format!(" Pushes fields of {original_name_str} to {new_name_str}");
    let pop_doc = format!(" Remove and return last element as {original_name_str}");
    let state_vec_doc = format!(" Return history as vec of {original_name_str}");

    let mut generated = TokenStream2::new();
    generated.append_all(quote! {
        #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
        #[doc = #struct_doc]
        pub struct #new_name {
            #vec_fields
        }

        impl Init for #new_name { }
        impl SerdeAPI for #new_name { }

        impl #new_name {
            /// Creates new empty vec container
            pub fn new() -> #new_name {
                #new_name {
                    #vec_new
                }
            }

            #[doc = #push_doc]
            pub fn push(&mut self, state: #original_name) {
                #(self.#field_names.push(state.#field_names.clone());)*
            }

            /// clear all history vecs
            pub fn clear(&mut self) {
                #(self.#field_names.clear();)*
            }

            #[doc = #pop_doc]
            pub fn pop(&mut self) -> Option<#original_name> {
                if self.is_empty() {
                    return None;
                }
                #(
                    let #field_names = self.#field_names.pop()?;
                )*
                Some(#original_name { #(#field_names),* })
            }

            /// Returns len of contained vectors
            pub fn len(&self) -> usize {
                self.#first_field.len()
            }

            /// Returns True if contained vecs are empty
            pub fn is_empty(&self) -> bool {
                self.#first_field.is_empty()
            }

            #[doc = #state_vec_doc]
            pub fn state_vec(&self) -> Vec<#original_name> {
                (0..self.len())
                    .map(|i| #original_name {
                        #(#field_names: self.#field_names[i].clone(),)*
                    })
                    .collect()
            }
        }

        impl Default for #new_name {
            fn default() -> #new_name {
                #new_name::new()
            }
        }
    });
    generated.into()
}
