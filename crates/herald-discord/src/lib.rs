//! Discord REST adapters for Herald: command registration and reply delivery.

mod discord_api_client;
mod discord_registrar;
mod discord_replies;
mod retry_helpers;

pub use discord_api_client::{DiscordApiClient, DiscordApiConfig, DEFAULT_DISCORD_API_BASE};
pub use discord_registrar::DiscordCommandRegistrar;
pub use discord_replies::{render_reply_body, DiscordReplySender, EPHEMERAL_MESSAGE_FLAG};
