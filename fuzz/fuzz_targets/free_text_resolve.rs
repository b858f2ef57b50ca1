#![no_main]

use std::sync::{Arc, OnceLock};

use herald_commands::{
    tokenize_free_text, CommandContext, CommandDescriptor, CommandRegistry, FreeTextHandler,
    FreeTextSpec, RouteTable,
};
use libfuzzer_sys::fuzz_target;

struct Inert;

#[async_trait::async_trait]
impl FreeTextHandler for Inert {
    async fn handle_text(&self, _ctx: &CommandContext, _args: &[String]) -> anyhow::Result<()> {
        Ok(())
    }
}

fn routes() -> &'static RouteTable {
    static ROUTES: OnceLock<RouteTable> = OnceLock::new();
    ROUTES.get_or_init(|| {
        let handler: Arc<dyn FreeTextHandler> = Arc::new(Inert);
        CommandRegistry::new()
            .with(
                CommandDescriptor::new("eco/give")
                    .with_free_text(FreeTextSpec::positional().with_alias("pay"))
                    .on_free_text(handler.clone()),
            )
            .with(
                CommandDescriptor::new("eco/balance")
                    .with_free_text(FreeTextSpec::flat().with_alias("bal"))
                    .on_free_text(handler.clone()),
            )
            .with(
                CommandDescriptor::new("ping")
                    .with_free_text(FreeTextSpec::flat())
                    .on_free_text(handler),
            )
            .build()
            .table
    })
}

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let Some(tokens) = tokenize_free_text(&raw, "!") else {
        return;
    };
    assert!(!tokens.is_empty());
    assert!(tokens.iter().all(|token| !token.is_empty()));
    if let Some(matched) = routes().resolve_free_text(&tokens) {
        assert!(matched.residual.len() < tokens.len());
        let route = matched
            .command
            .free_text
            .as_ref()
            .expect("matched command has a free-text route");
        let consumed = tokens.len() - matched.residual.len();
        assert_eq!(consumed, route.prefix.len() + 1);
        assert!(route.matches(&tokens[consumed - 1]));
    }
});
