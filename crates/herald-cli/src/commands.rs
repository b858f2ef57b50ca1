use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use herald_access::{
    load_module_state_file, AuthorizationGate, CallerContext, PermissionSet, StaticModuleStates,
    MODULE_STATE_FILE_NAME,
};
use herald_commands::{
    build_scope_schemas, load_command_manifest, tokenize_free_text, CommandPath,
    CommandSynchronizer, FileSyncCache, RegistryLoad, ReplyPayload, ReplySender, ReplyTarget,
    RouteTable,
};
use herald_discord::{DiscordApiClient, DiscordApiConfig, DiscordCommandRegistrar};
use herald_dispatch::{DispatchOutcome, Dispatcher, DispatcherConfig, TextInvocation};
use serde_json::{json, Value};

use crate::cli_args::{Cli, CliCommand};
use crate::template_handler::TemplateHandlerFactory;

pub(crate) fn load_routes(manifest_path: &Path) -> Result<RegistryLoad> {
    let manifest = load_command_manifest(manifest_path)?;
    Ok(manifest.to_registry(&TemplateHandlerFactory).build())
}

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let load = load_routes(&cli.manifest)?;
    match cli.command {
        CliCommand::Routes { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&render_routes_json(&load))?);
            } else {
                print!("{}", render_routes_text(&load));
            }
        }
        CliCommand::Resolve {
            text,
            structured,
            prefix,
            guild,
        } => {
            println!(
                "{}",
                render_resolution(&load.table, &text, structured, &prefix, guild.as_deref())
            );
        }
        CliCommand::Dispatch {
            text,
            user,
            channel,
            guild,
            guild_owner,
            permissions,
            developer,
            nsfw,
            prefix,
        } => {
            let mut caller = CallerContext::new(user, channel)
                .with_permissions(PermissionSet::from_names(&permissions)?)
                .with_channel_nsfw(nsfw);
            if let Some(guild) = guild {
                caller = caller.in_guild(guild, guild_owner.unwrap_or_default());
            }
            if developer {
                caller = caller.as_developer();
            }
            let outcome = run_dispatch(load.table, &cli.state_dir, &prefix, &text, caller).await?;
            match outcome {
                DispatchOutcome::Denied(reason) => {
                    println!("outcome: denied ({})", reason.reason_code());
                }
                other => println!("outcome: {}", other.as_str()),
            }
        }
        CliCommand::Sync {
            application_id,
            bot_token,
            api_base,
            request_timeout_ms,
            retry_max_attempts,
            retry_base_delay_ms,
            dry_run,
        } => {
            if dry_run {
                println!("{}", serde_json::to_string_pretty(&render_scope_schemas(&load.table))?);
                return Ok(());
            }
            let (Some(application_id), Some(bot_token)) = (application_id, bot_token) else {
                bail!(
                    "sync requires --application-id and --bot-token (or HERALD_DISCORD_APPLICATION_ID and HERALD_DISCORD_BOT_TOKEN)"
                );
            };
            let mut config = DiscordApiConfig::new(application_id, bot_token).with_api_base(api_base);
            config.request_timeout_ms = request_timeout_ms;
            config.retry_max_attempts = retry_max_attempts;
            config.retry_base_delay_ms = retry_base_delay_ms;
            let client = DiscordApiClient::new(config)?;
            let cache = FileSyncCache::load_in(&cli.state_dir)?;
            let synchronizer = CommandSynchronizer::new(
                Arc::new(DiscordCommandRegistrar::new(client)),
                Arc::new(cache),
            );
            let report = synchronizer.reconcile(&load.table).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.failures() > 0 {
                bail!("{} scope(s) failed to sync", report.failures());
            }
        }
    }
    Ok(())
}

pub(crate) fn render_routes_text(load: &RegistryLoad) -> String {
    let mut output = String::new();
    for command in load.table.commands() {
        let mut surfaces = Vec::new();
        if let Some(path) = &command.path {
            surfaces.push(format!("/{path}"));
        }
        if let Some(route) = &command.free_text {
            surfaces.push(format!("text[{}] {}", route.style.as_str(), route.render()));
        }
        let scopes = if command.descriptor.restricted_scopes.is_empty() {
            "global".to_string()
        } else {
            command.descriptor.restricted_scopes.join(",")
        };
        output.push_str(&format!(
            "{} -> {} (scopes: {scopes})\n",
            command.location(),
            surfaces.join(", ")
        ));
    }
    for error in &load.errors {
        output.push_str(&format!("rejected: {error}\n"));
    }
    output
}

pub(crate) fn render_routes_json(load: &RegistryLoad) -> Value {
    let commands = load
        .table
        .commands()
        .iter()
        .map(|command| {
            json!({
                "location": command.location(),
                "structured_path": command.path.as_ref().map(ToString::to_string),
                "free_text": command.free_text.as_ref().map(|route| json!({
                    "style": route.style.as_str(),
                    "prefix": route.prefix,
                    "name": route.name,
                    "aliases": route.aliases,
                })),
                "restricted_scopes": command.descriptor.restricted_scopes,
                "access_rules": command.descriptor.access.rules().len(),
            })
        })
        .collect::<Vec<_>>();
    let errors = load
        .errors
        .iter()
        .map(|error| {
            json!({
                "kind": error.kind(),
                "location": error.location(),
                "message": error.to_string(),
            })
        })
        .collect::<Vec<_>>();
    json!({ "commands": commands, "errors": errors })
}

pub(crate) fn render_resolution(
    table: &RouteTable,
    text: &str,
    structured: bool,
    prefix: &str,
    guild: Option<&str>,
) -> String {
    if structured {
        let segments = text
            .split_whitespace()
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();
        let Some(path) = CommandPath::from_segments(&segments) else {
            return format!("invalid structured path '{text}'");
        };
        return match table.resolve_structured(&path) {
            Some(command) if !command.allows_scope(guild) => {
                format!("/{path} -> {} (out of scope)", command.location())
            }
            Some(command) => format!("/{path} -> {}", command.location()),
            None => format!("/{path} -> no match"),
        };
    }

    let Some(tokens) = tokenize_free_text(text, prefix) else {
        return format!("ignored: text does not start with prefix '{prefix}'");
    };
    match table.resolve_free_text(&tokens) {
        Some(matched) if !matched.command.allows_scope(guild) => {
            format!("{} (out of scope)", matched.command.location())
        }
        Some(matched) => format!(
            "{} args={:?}",
            matched.command.location(),
            matched.residual
        ),
        None => "no match".to_string(),
    }
}

pub(crate) fn render_scope_schemas(table: &RouteTable) -> Value {
    let scopes = build_scope_schemas(table)
        .into_iter()
        .map(|(scope, commands)| (scope.cache_key(), json!(commands)))
        .collect::<BTreeMap<_, _>>();
    json!(scopes)
}

/// Prints replies instead of delivering them.
struct StdoutReplySender;

#[async_trait]
impl ReplySender for StdoutReplySender {
    async fn send_reply(&self, _target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        println!("{}", render_reply_line("reply", payload));
        Ok(())
    }

    async fn edit_reply(&self, _target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        println!("{}", render_reply_line("edit", payload));
        Ok(())
    }
}

fn render_reply_line(kind: &str, payload: &ReplyPayload) -> String {
    match payload.title.as_deref() {
        Some(title) => format!("[{kind}] {title}: {}", payload.content),
        None => format!("[{kind}] {}", payload.content),
    }
}

async fn run_dispatch(
    table: RouteTable,
    state_dir: &Path,
    prefix: &str,
    text: &str,
    caller: CallerContext,
) -> Result<DispatchOutcome> {
    let module_state_path = state_dir.join(MODULE_STATE_FILE_NAME);
    let module_states = load_module_state_file(&module_state_path).with_context(|| {
        format!(
            "failed to load module state from {}",
            module_state_path.display()
        )
    })?;
    let dispatcher = Dispatcher::new(
        Arc::new(table),
        AuthorizationGate::new(Arc::new(StaticModuleStates::from_file(module_states))),
        Arc::new(StdoutReplySender),
        DispatcherConfig::default().with_text_prefix(prefix),
    );
    Ok(dispatcher
        .dispatch_text(TextInvocation::new("local-message", text, caller))
        .await)
}
