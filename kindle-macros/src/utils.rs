use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Rewrites an `async fn` so that its body runs as a Kindle task.
///
/// The `async` keyword is removed and the body block is replaced by a call
/// blocking the current thread until the body, wrapped in a
/// `::kindle::Task`, completed. The value of the body is returned.
///
/// Returns `None` if no body block was found.
pub(crate) fn wrap_async_body(item: TokenStream) -> Option<Vec<TokenTree>> {
    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    if let Some(pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    {
        tokens.remove(pos);
    }

    let pos = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))?;

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let new_block = format!(
        "{{
            ::kindle::task::wait_for(::kindle::Task::new(async move {{ {} }}))
        }}",
        block
    );

    let stream = match new_block.parse::<TokenStream>() {
        Ok(stream) => stream,
        Err(err) => compile_error(&format!("kindle macro error: {err}")),
    };

    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream));
    Some(tokens)
}

/// Builds a `compile_error!` invocation carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
