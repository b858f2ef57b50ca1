use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use herald_access::{
    AccessPolicy, AccessRule, AuthorizationGate, CallerContext, DenyReason, PermissionSet,
    RuleCombinator, StaticModuleStates, UserRule,
};
use herald_commands::{
    CommandContext, CommandDescriptor, CommandPath, CommandRegistrar, CommandRegistry, CommandSynchronizer,
    FileSyncCache, FreeTextHandler, FreeTextSpec, ReplyPayload, ReplySender, ReplyTarget,
    RouteTable, StructuredHandler, SyncScope, SyncScopeOutcome,
};
use herald_dispatch::{
    DispatchOutcome, Dispatcher, DispatcherConfig, StructuredInvocation, TextInvocation,
};

#[derive(Default)]
struct RecordingReplies {
    sent: Mutex<Vec<ReplyPayload>>,
}

impl RecordingReplies {
    fn titles(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("replies lock")
            .iter()
            .map(|payload| payload.title.clone().unwrap_or_default())
            .collect()
    }
}

#[async_trait]
impl ReplySender for RecordingReplies {
    async fn send_reply(&self, _target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        self.sent.lock().expect("replies lock").push(payload.clone());
        Ok(())
    }

    async fn edit_reply(&self, target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        self.send_reply(target, payload).await
    }
}

#[derive(Default)]
struct RecordingHandler {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl StructuredHandler for RecordingHandler {
    async fn handle(&self, ctx: &CommandContext) -> Result<()> {
        self.calls
            .lock()
            .expect("handler lock")
            .push((ctx.location.clone(), Vec::new()));
        ctx.reply(&ReplyPayload::text("done").with_title("ok")).await
    }
}

#[async_trait]
impl FreeTextHandler for RecordingHandler {
    async fn handle_text(&self, ctx: &CommandContext, args: &[String]) -> Result<()> {
        self.calls
            .lock()
            .expect("handler lock")
            .push((ctx.location.clone(), args.to_vec()));
        if args.first().map(String::as_str) == Some("explode") {
            bail!("handler exploded");
        }
        ctx.reply(&ReplyPayload::text("done").with_title("ok")).await
    }
}

#[derive(Default)]
struct RecordingRegistrar {
    writes: Mutex<Vec<(String, String)>>,
}

impl RecordingRegistrar {
    fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.writes.lock().expect("registrar lock"))
    }
}

#[async_trait]
impl CommandRegistrar for RecordingRegistrar {
    async fn overwrite_commands(&self, scope: &SyncScope, payload: &str) -> Result<()> {
        self.writes
            .lock()
            .expect("registrar lock")
            .push((scope.cache_key(), payload.to_string()));
        Ok(())
    }
}

fn economy_policy() -> AccessPolicy {
    AccessPolicy::unrestricted().with_rule(AccessRule::modules(["economy"], RuleCombinator::Every))
}

fn build_routes(handler: &Arc<RecordingHandler>, include_moderation: bool) -> RouteTable {
    let mut registry = CommandRegistry::new()
        .with(
            CommandDescriptor::new("(economy)/eco/give")
                .describe("Give coins to a member")
                .with_access(economy_policy())
                .with_free_text(FreeTextSpec::positional().with_alias("pay"))
                .on_structured(handler.clone())
                .on_free_text(handler.clone()),
        )
        .with(
            CommandDescriptor::new("fun/meme")
                .describe("Post a meme")
                .with_rule(AccessRule::nsfw_only())
                .with_free_text(FreeTextSpec::flat())
                .on_free_text(handler.clone()),
        );
    if include_moderation {
        registry.register(
            CommandDescriptor::new("mod/ban")
                .describe("Ban a member")
                .restrict_to("g1")
                .with_rule(AccessRule::User(UserRule {
                    required_permissions: Some(PermissionSet::BAN_MEMBERS),
                    ..UserRule::default()
                }))
                .on_structured(handler.clone()),
        );
    }
    let load = registry.build();
    assert!(load.errors.is_empty(), "unexpected load errors: {:?}", load.errors);
    load.table
}

fn caller() -> CallerContext {
    CallerContext::new("u1", "c1")
        .in_guild("g1", "owner")
        .with_channel_nsfw(false)
}

#[tokio::test]
async fn integration_text_and_structured_invocations_flow_through_gate_and_handlers() {
    let handler = Arc::new(RecordingHandler::default());
    let replies = Arc::new(RecordingReplies::default());
    let states = StaticModuleStates::new().with_module("g1", "economy", true);
    let dispatcher = Dispatcher::new(
        Arc::new(build_routes(&handler, true)),
        AuthorizationGate::new(Arc::new(states)),
        replies.clone(),
        DispatcherConfig::default(),
    );

    let paid = dispatcher
        .dispatch_text(TextInvocation::new("m1", "!eco pay @u 5", caller()))
        .await;
    assert_eq!(paid, DispatchOutcome::Completed);

    let meme = dispatcher
        .dispatch_text(TextInvocation::new("m2", "!meme", caller()))
        .await;
    assert_eq!(meme, DispatchOutcome::Denied(DenyReason::ChannelConstraint));

    let ban_denied = dispatcher
        .dispatch_structured(StructuredInvocation::new(
            "i1",
            "tok",
            CommandPath::subcommand("mod", "ban"),
            caller(),
        ))
        .await;
    assert_eq!(
        ban_denied,
        DispatchOutcome::Denied(DenyReason::MissingPermissions)
    );

    let ban_allowed = dispatcher
        .dispatch_structured(StructuredInvocation::new(
            "i2",
            "tok",
            CommandPath::subcommand("mod", "ban"),
            caller().with_permissions(PermissionSet::BAN_MEMBERS),
        ))
        .await;
    assert_eq!(ban_allowed, DispatchOutcome::Completed);

    let exploded = dispatcher
        .dispatch_text(TextInvocation::new("m3", "!eco give explode", caller()))
        .await;
    assert_eq!(exploded, DispatchOutcome::Failed);

    let calls = handler.calls.lock().expect("handler lock").clone();
    assert_eq!(
        calls,
        vec![
            (
                "(economy)/eco/give".to_string(),
                vec!["@u".to_string(), "5".to_string()]
            ),
            ("mod/ban".to_string(), Vec::new()),
            ("(economy)/eco/give".to_string(), vec!["explode".to_string()]),
        ]
    );
    assert_eq!(
        replies.titles(),
        vec![
            "ok".to_string(),
            "Authorization refused".to_string(),
            "Authorization refused".to_string(),
            "ok".to_string(),
            "Error".to_string(),
        ]
    );
}

#[tokio::test]
async fn integration_sync_writes_changes_once_and_clears_removed_scopes() {
    let temp = tempfile::tempdir().expect("tempdir");
    let handler = Arc::new(RecordingHandler::default());
    let registrar = Arc::new(RecordingRegistrar::default());
    let cache = Arc::new(FileSyncCache::load_in(temp.path()).expect("load cache"));
    let synchronizer = CommandSynchronizer::new(registrar.clone(), cache.clone());

    let full = build_routes(&handler, true);
    let first = synchronizer.reconcile(&full).await.expect("first pass");
    assert_eq!(first.outcome("*"), Some(&SyncScopeOutcome::Written));
    assert_eq!(first.outcome("g1"), Some(&SyncScopeOutcome::Written));
    let mut writes = registrar.take();
    writes.sort();
    assert_eq!(writes.len(), 2);
    assert!(writes[0].1.contains("\"name\":\"eco\""));
    assert!(writes[1].1.contains("\"name\":\"mod\""));

    let second = synchronizer.reconcile(&full).await.expect("second pass");
    assert_eq!(second.remote_writes(), 0);
    assert!(registrar.take().is_empty());

    let reloaded = FileSyncCache::load_in(temp.path()).expect("reload cache");
    assert!(reloaded.entry("g1").expect("entry").is_some());

    let trimmed = build_routes(&handler, false);
    let third = synchronizer.reconcile(&trimmed).await.expect("third pass");
    assert_eq!(third.outcome("g1"), Some(&SyncScopeOutcome::Cleared));
    assert_eq!(third.outcome("*"), Some(&SyncScopeOutcome::Unchanged));
    assert_eq!(
        registrar.take(),
        vec![("g1".to_string(), "[]".to_string())]
    );
    assert!(cache.entry("g1").expect("entry").is_none());
}

#[tokio::test]
async fn regression_replaced_routes_take_effect_for_next_invocation() {
    let handler = Arc::new(RecordingHandler::default());
    let replies = Arc::new(RecordingReplies::default());
    let dispatcher = Dispatcher::new(
        Arc::new(build_routes(&handler, true)),
        AuthorizationGate::new(Arc::new(StaticModuleStates::new())),
        replies.clone(),
        DispatcherConfig::default(),
    );
    let invocation = || {
        StructuredInvocation::new(
            "i1",
            "tok",
            CommandPath::subcommand("mod", "ban"),
            caller().with_permissions(PermissionSet::ADMINISTRATOR),
        )
    };
    assert_eq!(
        dispatcher.dispatch_structured(invocation()).await,
        DispatchOutcome::Completed
    );

    dispatcher.replace_routes(Arc::new(build_routes(&handler, false)));
    assert_eq!(
        dispatcher.dispatch_structured(invocation()).await,
        DispatchOutcome::Unresolved
    );
    assert_eq!(replies.titles(), vec!["ok".to_string()]);
}
