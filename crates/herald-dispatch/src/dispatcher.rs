use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use arc_swap::ArcSwap;
use futures_util::FutureExt;
use herald_access::{AccessDecision, AuthorizationGate, DenyReason};
use herald_commands::{
    tokenize_free_text, CommandContext, FreeTextHandler, LoadedCommand, ReplyPayload,
    ReplySender, RouteTable, StructuredHandler,
};

use crate::{DispatchOutcome, DispatcherConfig, StructuredInvocation, TextInvocation};

/// The handler a resolved invocation will run, behind one invoke contract.
pub enum HandlerBinding<'a> {
    Structured(&'a Arc<dyn StructuredHandler>),
    FreeText {
        handler: &'a Arc<dyn FreeTextHandler>,
        residual: &'a [String],
    },
}

impl HandlerBinding<'_> {
    pub async fn invoke(self, ctx: &CommandContext) -> Result<()> {
        match self {
            Self::Structured(handler) => handler.handle(ctx).await,
            Self::FreeText { handler, residual } => handler.handle_text(ctx, residual).await,
        }
    }

    pub fn surface(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::FreeText { .. } => "free_text",
        }
    }
}

/// Routes invocations through resolution, authorization, and handler execution.
///
/// Each invocation produces at most one user-visible reply from the dispatcher:
/// either the denial notice or the failure notice, never both.
#[derive(Clone)]
pub struct Dispatcher {
    routes: Arc<ArcSwap<RouteTable>>,
    gate: AuthorizationGate,
    replies: Arc<dyn ReplySender>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        routes: Arc<RouteTable>,
        gate: AuthorizationGate,
        replies: Arc<dyn ReplySender>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            routes: Arc::new(ArcSwap::new(routes)),
            gate,
            replies,
            config,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn routes(&self) -> Arc<RouteTable> {
        self.routes.load_full()
    }

    /// Swaps in a freshly built table. In-flight invocations keep the table they resolved against.
    pub fn replace_routes(&self, routes: Arc<RouteTable>) {
        self.routes.store(routes);
    }

    #[tracing::instrument(
        name = "herald.dispatch.structured",
        skip_all,
        fields(path = %invocation.path, user_id = %invocation.caller.user_id)
    )]
    pub async fn dispatch_structured(&self, invocation: StructuredInvocation) -> DispatchOutcome {
        let routes = self.routes.load_full();
        let Some(command) = routes.resolve_structured(&invocation.path) else {
            tracing::debug!("no structured command matches");
            return DispatchOutcome::Unresolved;
        };
        let Some(handler) = command.descriptor.structured_handler.as_ref() else {
            return DispatchOutcome::Unresolved;
        };
        if !command.allows_scope(invocation.caller.guild_id()) {
            tracing::debug!(location = %command.location(), "restricted command invoked out of scope");
            return DispatchOutcome::OutOfScope;
        }

        let target = invocation.reply_target();
        let ctx = CommandContext::new(
            command.location(),
            invocation.caller,
            target,
            Arc::clone(&self.replies),
        )
        .with_path(invocation.path)
        .with_options(invocation.options);
        self.authorize_and_run(command, ctx, HandlerBinding::Structured(handler))
            .await
    }

    #[tracing::instrument(
        name = "herald.dispatch.text",
        skip_all,
        fields(message_id = %invocation.message_id, user_id = %invocation.caller.user_id)
    )]
    pub async fn dispatch_text(&self, invocation: TextInvocation) -> DispatchOutcome {
        let Some(tokens) = tokenize_free_text(&invocation.content, &self.config.text_prefix)
        else {
            return DispatchOutcome::Ignored;
        };
        let routes = self.routes.load_full();
        let Some(matched) = routes.resolve_free_text(&tokens) else {
            tracing::debug!(trigger = %tokens[0], "no free-text command matches");
            return DispatchOutcome::Unresolved;
        };
        let command = matched.command;
        let Some(handler) = command.descriptor.free_text_handler.as_ref() else {
            return DispatchOutcome::Unresolved;
        };
        if !command.allows_scope(invocation.caller.guild_id()) {
            tracing::debug!(location = %command.location(), "restricted command invoked out of scope");
            return DispatchOutcome::OutOfScope;
        }

        let target = invocation.reply_target();
        let mut ctx = CommandContext::new(
            command.location(),
            invocation.caller,
            target,
            Arc::clone(&self.replies),
        );
        ctx.path = command.path.clone();
        let binding = HandlerBinding::FreeText {
            handler,
            residual: &matched.residual,
        };
        self.authorize_and_run(command, ctx, binding).await
    }

    async fn authorize_and_run(
        &self,
        command: &LoadedCommand,
        ctx: CommandContext,
        binding: HandlerBinding<'_>,
    ) -> DispatchOutcome {
        if let AccessDecision::Deny(reason) =
            self.gate.evaluate(&command.descriptor.access, &ctx.caller).await
        {
            tracing::debug!(
                location = %command.location(),
                reason_code = reason.reason_code(),
                "invocation denied"
            );
            self.send_once(&ctx, &denial_reply(reason), "denial").await;
            return DispatchOutcome::Denied(reason);
        }

        let surface = binding.surface();
        let result = AssertUnwindSafe(binding.invoke(&ctx)).catch_unwind().await;
        let failure = match result {
            Ok(Ok(())) => {
                tracing::debug!(location = %command.location(), surface, "handler completed");
                return DispatchOutcome::Completed;
            }
            Ok(Err(error)) => format!("{error:#}"),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };

        let replied = ctx.has_replied();
        tracing::error!(
            location = %command.location(),
            path = %ctx.path.as_ref().map(ToString::to_string).unwrap_or_default(),
            surface,
            user_id = %ctx.caller.user_id,
            guild_id = ctx.caller.guild_id().unwrap_or(""),
            channel_id = %ctx.caller.channel_id,
            replied,
            error = %failure,
            "command handler failed"
        );
        // The handler's own reply is the single reply for this invocation.
        if !replied {
            self.send_once(&ctx, &self.config.failure_reply, "failure")
                .await;
        }
        DispatchOutcome::Failed
    }

    async fn send_once(&self, ctx: &CommandContext, payload: &ReplyPayload, kind: &str) {
        if let Err(error) = ctx.reply(payload).await {
            tracing::warn!(
                location = %ctx.location,
                kind,
                error = %format!("{error:#}"),
                "failed to deliver reply"
            );
        }
    }
}

fn denial_reply(reason: DenyReason) -> ReplyPayload {
    ReplyPayload::error(reason.title(), reason.user_message())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
