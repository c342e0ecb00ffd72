mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Runs an `async fn main` as a Kindle task on the main thread.
///
/// The main thread blocks until the body completed; the body may move
/// itself onto a thread pool in the meantime.
///
/// ```rust,ignore
/// #[kindle::main]
/// async fn main() {
///     let pool = kindle::ThreadPool::builder().build().unwrap();
///     pool.schedule().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return utils::compile_error("#[kindle::main] takes no arguments");
    }

    match utils::wrap_async_body(item) {
        Some(tokens) => tokens.into_iter().collect(),
        None => utils::compile_error("#[kindle::main] expects a function with a body"),
    }
}

/// Runs an `async fn` test body as a Kindle task.
///
/// ```rust,ignore
/// #[kindle::test]
/// async fn opens() {
///     let checkpoint = TaskCheckpoint::new(true);
///     checkpoint.checkpoint_gate().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let Some(tokens) = utils::wrap_async_body(item) else {
        return utils::compile_error("#[kindle::test] expects a function with a body");
    };

    let test_attr: TokenStream = "#[test]".parse().unwrap_or_default();
    let mut result: Vec<TokenTree> = test_attr.into_iter().collect();
    result.extend(tokens);

    result.into_iter().collect()
}
