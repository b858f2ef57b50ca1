use anyhow::Result;
use async_trait::async_trait;
use herald_commands::{CommandRegistrar, SyncScope};

use crate::retry_helpers::RetryPolicy;
use crate::DiscordApiClient;

/// Registers schema sets through Discord's bulk-overwrite endpoints.
#[derive(Clone)]
pub struct DiscordCommandRegistrar {
    client: DiscordApiClient,
}

impl DiscordCommandRegistrar {
    pub fn new(client: DiscordApiClient) -> Self {
        Self { client }
    }

    fn commands_path(&self, scope: &SyncScope) -> String {
        let application_id = self.client.application_id();
        match scope {
            SyncScope::Global => format!("applications/{application_id}/commands"),
            SyncScope::Target(guild_id) => {
                format!("applications/{application_id}/guilds/{guild_id}/commands")
            }
        }
    }
}

#[async_trait]
impl CommandRegistrar for DiscordCommandRegistrar {
    async fn overwrite_commands(&self, scope: &SyncScope, payload: &str) -> Result<()> {
        let path = self.commands_path(scope);
        let operation = format!("bulk overwrite ({scope})");
        self.client
            .send_with_retry(&operation, RetryPolicy::Idempotent, || {
                self.client.authed(reqwest::Method::PUT, &path, payload)
            })
            .await?;
        Ok(())
    }
}
