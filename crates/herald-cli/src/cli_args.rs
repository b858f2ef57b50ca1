use std::path::PathBuf;

use clap::{Parser, Subcommand};
use herald_discord::DEFAULT_DISCORD_API_BASE;
use herald_dispatch::DEFAULT_TEXT_PREFIX;

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "herald",
    about = "Command routing, schema sync, and access gating for chat bots",
    version
)]
pub(crate) struct Cli {
    #[arg(
        long,
        env = "HERALD_MANIFEST",
        default_value = "commands.json",
        help = "Command manifest (JSON) declaring every command the bot exposes"
    )]
    pub(crate) manifest: PathBuf,

    #[arg(
        long = "state-dir",
        env = "HERALD_STATE_DIR",
        default_value = ".herald",
        help = "Directory holding the sync cache and module-state file"
    )]
    pub(crate) state_dir: PathBuf,

    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub(crate) enum CliCommand {
    /// List loaded routes and any descriptors that failed to load.
    Routes {
        #[arg(long, help = "Emit the route listing as JSON")]
        json: bool,
    },
    /// Show which command a free-text line or structured path resolves to.
    Resolve {
        #[arg(help = "Prefixed text such as '!eco give @user 10', or a path with --structured")]
        text: String,
        #[arg(long, help = "Treat TEXT as a space-separated structured path")]
        structured: bool,
        #[arg(
            long,
            env = "HERALD_TEXT_PREFIX",
            default_value = DEFAULT_TEXT_PREFIX,
            help = "Free-text prefix"
        )]
        prefix: String,
        #[arg(long, help = "Scope id the invocation comes from")]
        guild: Option<String>,
    },
    /// Run a free-text invocation through the full pipeline, printing replies to stdout.
    Dispatch {
        #[arg(help = "Message content, including the prefix")]
        text: String,
        #[arg(long, default_value = "local-user")]
        user: String,
        #[arg(long, default_value = "local-channel")]
        channel: String,
        #[arg(long)]
        guild: Option<String>,
        #[arg(long = "guild-owner")]
        guild_owner: Option<String>,
        #[arg(
            long,
            value_delimiter = ',',
            help = "Caller permission names, e.g. manage_guild,ban_members"
        )]
        permissions: Vec<String>,
        #[arg(long, help = "Treat the caller as a bot developer")]
        developer: bool,
        #[arg(long, help = "Mark the channel as NSFW")]
        nsfw: bool,
        #[arg(
            long,
            env = "HERALD_TEXT_PREFIX",
            default_value = DEFAULT_TEXT_PREFIX,
            help = "Free-text prefix"
        )]
        prefix: String,
    },
    /// Reconcile remote command registrations with the manifest.
    Sync {
        #[arg(long = "application-id", env = "HERALD_DISCORD_APPLICATION_ID")]
        application_id: Option<String>,
        #[arg(long = "bot-token", env = "HERALD_DISCORD_BOT_TOKEN", hide_env_values = true)]
        bot_token: Option<String>,
        #[arg(
            long = "api-base",
            env = "HERALD_DISCORD_API_BASE",
            default_value = DEFAULT_DISCORD_API_BASE
        )]
        api_base: String,
        #[arg(long = "request-timeout-ms", default_value_t = 10_000)]
        request_timeout_ms: u64,
        #[arg(long = "retry-max-attempts", default_value_t = 4, value_parser = parse_positive_usize)]
        retry_max_attempts: usize,
        #[arg(long = "retry-base-delay-ms", default_value_t = 500)]
        retry_base_delay_ms: u64,
        #[arg(long = "dry-run", help = "Print per-scope schemas without contacting the API")]
        dry_run: bool,
    },
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, CliCommand};

    #[test]
    fn unit_cli_parses_resolve_with_defaults() {
        let cli = Cli::try_parse_from(["herald", "resolve", "!eco give @u 1"]).expect("parse");
        match cli.command {
            CliCommand::Resolve {
                text,
                structured,
                guild,
                ..
            } => {
                assert_eq!(text, "!eco give @u 1");
                assert!(!structured);
                assert_eq!(guild, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unit_cli_splits_permission_list() {
        let cli = Cli::try_parse_from([
            "herald",
            "--manifest",
            "m.json",
            "dispatch",
            "!ban x",
            "--guild",
            "g1",
            "--permissions",
            "ban_members,kick_members",
        ])
        .expect("parse");
        assert_eq!(cli.manifest.to_string_lossy(), "m.json");
        match cli.command {
            CliCommand::Dispatch { permissions, .. } => {
                assert_eq!(permissions, vec!["ban_members", "kick_members"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn regression_cli_rejects_zero_retry_attempts() {
        let error = Cli::try_parse_from(["herald", "sync", "--retry-max-attempts", "0"])
            .expect_err("zero attempts should be rejected");
        assert!(error.to_string().contains("greater than 0"));
    }
}
