use anyhow::Result;
use async_trait::async_trait;
use herald_commands::{ReplyPayload, ReplySender, ReplyTarget, ReplyTone};
use serde_json::{json, Value};

use crate::retry_helpers::RetryPolicy;
use crate::DiscordApiClient;

/// Message flag that limits visibility to the invoking user.
pub const EPHEMERAL_MESSAGE_FLAG: u64 = 1 << 6;
const CHANNEL_MESSAGE_WITH_SOURCE: u8 = 4;

fn tone_color(tone: ReplyTone) -> u32 {
    match tone {
        ReplyTone::Neutral => 0x5865F2,
        ReplyTone::Success => 0x57F287,
        ReplyTone::Error => 0xED4245,
    }
}

/// Renders a reply as a single-embed message body.
pub fn render_reply_body(payload: &ReplyPayload) -> Value {
    let mut embed = json!({
        "description": payload.content,
        "color": tone_color(payload.tone),
    });
    if let Some(title) = payload.title.as_deref().filter(|title| !title.trim().is_empty()) {
        embed["title"] = Value::String(title.to_string());
    }
    json!({
        "embeds": [embed],
        "allowed_mentions": { "parse": [] },
    })
}

/// Delivers replies to interactions and text messages over the REST API.
#[derive(Clone)]
pub struct DiscordReplySender {
    client: DiscordApiClient,
}

impl DiscordReplySender {
    pub fn new(client: DiscordApiClient) -> Self {
        Self { client }
    }

    async fn reply_to_message(
        &self,
        channel_id: &str,
        message_id: &str,
        payload: &ReplyPayload,
    ) -> Result<()> {
        let mut body = render_reply_body(payload);
        body["message_reference"] = json!({
            "message_id": message_id,
            "fail_if_not_exists": false,
        });
        let body = body.to_string();
        let path = format!("channels/{channel_id}/messages");
        self.client
            .send_with_retry("create message", RetryPolicy::NonIdempotent, || {
                self.client.authed(reqwest::Method::POST, &path, &body)
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReplySender for DiscordReplySender {
    async fn send_reply(&self, target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        match target {
            ReplyTarget::Interaction {
                interaction_id,
                token,
                ..
            } => {
                let mut data = render_reply_body(payload);
                if payload.ephemeral {
                    data["flags"] = json!(EPHEMERAL_MESSAGE_FLAG);
                }
                let body = json!({
                    "type": CHANNEL_MESSAGE_WITH_SOURCE,
                    "data": data,
                })
                .to_string();
                let path = format!("interactions/{interaction_id}/{token}/callback");
                self.client
                    .send_with_retry("interaction callback", RetryPolicy::NonIdempotent, || {
                        self.client.token_scoped(reqwest::Method::POST, &path, &body)
                    })
                    .await?;
                Ok(())
            }
            ReplyTarget::Message {
                channel_id,
                message_id,
            } => self.reply_to_message(channel_id, message_id, payload).await,
        }
    }

    async fn edit_reply(&self, target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
        match target {
            ReplyTarget::Interaction { token, .. } => {
                let body = render_reply_body(payload).to_string();
                let path = format!(
                    "webhooks/{}/{token}/messages/@original",
                    self.client.application_id()
                );
                self.client
                    .send_with_retry("edit original response", RetryPolicy::Idempotent, || {
                        self.client.token_scoped(reqwest::Method::PATCH, &path, &body)
                    })
                    .await?;
                Ok(())
            }
            // A text invocation has no acknowledgement to edit.
            ReplyTarget::Message {
                channel_id,
                message_id,
            } => self.reply_to_message(channel_id, message_id, payload).await,
        }
    }
}
