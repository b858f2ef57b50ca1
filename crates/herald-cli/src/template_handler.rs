use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use herald_commands::{
    CommandContext, CommandManifestEntry, FreeTextHandler, ManifestHandlerFactory, ReplyPayload,
    StructuredHandler,
};

const FAIL_DIRECTIVE: &str = "!fail";

/// Replies with a fixed template.
///
/// Placeholders: `{user}`, `{location}`, `{args}`, and `{option:<name>}`.
/// A template of exactly `!fail` makes the handler return an error.
#[derive(Debug, Clone)]
pub(crate) struct TemplateReplyHandler {
    template: String,
}

impl TemplateReplyHandler {
    pub(crate) fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub(crate) fn render(&self, ctx: &CommandContext, args: &[String]) -> Result<String> {
        if self.template.trim() == FAIL_DIRECTIVE {
            bail!("template handler for '{}' is configured to fail", ctx.location);
        }
        let template = if self.template.trim().is_empty() {
            "`{location}` ran."
        } else {
            self.template.as_str()
        };

        let mut rendered = template
            .replace("{user}", &format!("<@{}>", ctx.caller.user_id))
            .replace("{location}", &ctx.location)
            .replace("{args}", &args.join(" "));
        let mut cursor = 0;
        while let Some(offset) = rendered[cursor..].find("{option:") {
            let start = cursor + offset;
            let Some(length) = rendered[start..].find('}') else {
                break;
            };
            let name = &rendered[start + "{option:".len()..start + length];
            let value = ctx
                .option(name)
                .map(|value| value.render())
                .unwrap_or_default();
            rendered.replace_range(start..=start + length, &value);
            cursor = start + value.len();
        }
        Ok(rendered)
    }
}

#[async_trait]
impl StructuredHandler for TemplateReplyHandler {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        let content = self.render(ctx, &[])?;
        ctx.reply(&ReplyPayload::text(content)).await
    }
}

#[async_trait]
impl FreeTextHandler for TemplateReplyHandler {
    async fn handle_text(&self, ctx: &CommandContext, args: &[String]) -> Result<()> {
        let content = self.render(ctx, args)?;
        ctx.reply(&ReplyPayload::text(content)).await
    }
}

/// Binds every manifest entry to a [`TemplateReplyHandler`] built from its `reply` field.
pub(crate) struct TemplateHandlerFactory;

impl ManifestHandlerFactory for TemplateHandlerFactory {
    fn structured_handler(&self, entry: &CommandManifestEntry) -> Arc<dyn StructuredHandler> {
        Arc::new(TemplateReplyHandler::new(entry.reply.clone()))
    }

    fn free_text_handler(&self, entry: &CommandManifestEntry) -> Arc<dyn FreeTextHandler> {
        Arc::new(TemplateReplyHandler::new(entry.reply.clone()))
    }
}
