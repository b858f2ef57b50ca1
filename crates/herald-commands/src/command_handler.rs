use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use herald_access::CallerContext;
use serde::{Deserialize, Serialize};

use crate::CommandPath;

/// A typed option value supplied with a structured invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    User(String),
    Channel(String),
    Role(String),
    Mentionable(String),
    Attachment(String),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value)
            | Self::User(value)
            | Self::Channel(value)
            | Self::Role(value)
            | Self::Mentionable(value)
            | Self::Attachment(value) => Some(value.as_str()),
            Self::Integer(_) | Self::Number(_) | Self::Boolean(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    /// Renders the value the way it would appear in free text.
    pub fn render(&self) -> String {
        match self {
            Self::Integer(value) => value.to_string(),
            Self::Number(value) => value.to_string(),
            Self::Boolean(value) => value.to_string(),
            Self::User(id) | Self::Mentionable(id) => format!("<@{id}>"),
            Self::Channel(id) => format!("<#{id}>"),
            Self::Role(id) => format!("<@&{id}>"),
            Self::String(value) | Self::Attachment(value) => value.clone(),
        }
    }
}

/// Where a reply for an invocation goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyTarget {
    Interaction {
        interaction_id: String,
        token: String,
        /// An acknowledgement has already been sent; replies edit it.
        #[serde(default)]
        deferred: bool,
    },
    Message {
        channel_id: String,
        message_id: String,
    },
}

impl ReplyTarget {
    pub fn interaction(interaction_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self::Interaction {
            interaction_id: interaction_id.into(),
            token: token.into(),
            deferred: false,
        }
    }

    pub fn message(channel_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self::Message {
            channel_id: channel_id.into(),
            message_id: message_id.into(),
        }
    }

    pub fn deferred(self) -> Self {
        match self {
            Self::Interaction {
                interaction_id,
                token,
                ..
            } => Self::Interaction {
                interaction_id,
                token,
                deferred: true,
            },
            message => message,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Interaction { deferred: true, .. })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyTone {
    #[default]
    Neutral,
    Success,
    Error,
}

/// Content of a reply, independent of transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyPayload {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tone: ReplyTone,
    /// Visible only to the caller where the transport supports it.
    #[serde(default)]
    pub ephemeral: bool,
}

impl ReplyPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn error(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: content.into(),
            tone: ReplyTone::Error,
            ephemeral: true,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tone(mut self, tone: ReplyTone) -> Self {
        self.tone = tone;
        self
    }
}

/// Transport that delivers replies back to the caller.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, target: &ReplyTarget, payload: &ReplyPayload) -> Result<()>;
    async fn edit_reply(&self, target: &ReplyTarget, payload: &ReplyPayload) -> Result<()>;
}

/// Everything a handler sees about one invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub location: String,
    pub path: Option<CommandPath>,
    pub caller: CallerContext,
    pub options: BTreeMap<String, OptionValue>,
    pub target: ReplyTarget,
    replies: Arc<dyn ReplySender>,
    replied: Arc<AtomicBool>,
}

impl CommandContext {
    pub fn new(
        location: impl Into<String>,
        caller: CallerContext,
        target: ReplyTarget,
        replies: Arc<dyn ReplySender>,
    ) -> Self {
        Self {
            location: location.into(),
            path: None,
            caller,
            options: BTreeMap::new(),
            target,
            replies,
            replied: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_path(mut self, path: CommandPath) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_options(mut self, options: BTreeMap<String, OptionValue>) -> Self {
        self.options = options;
        self
    }

    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// Replies to the invocation.
    ///
    /// Edits instead of sending when the invocation was deferred or this
    /// context has already delivered a reply. Clones share the replied state.
    pub async fn reply(&self, payload: &ReplyPayload) -> Result<()> {
        if self.target.is_deferred() || self.has_replied() {
            self.replies.edit_reply(&self.target, payload).await?;
        } else {
            self.replies.send_reply(&self.target, payload).await?;
        }
        self.replied.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether a reply has been delivered for this invocation.
    pub fn has_replied(&self) -> bool {
        self.replied.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CommandContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandContext")
            .field("location", &self.location)
            .field("path", &self.path)
            .field("caller", &self.caller)
            .field("options", &self.options)
            .field("target", &self.target)
            .field("replied", &self.has_replied())
            .finish()
    }
}

/// Handles invocations arriving as a structured command address.
#[async_trait]
pub trait StructuredHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> Result<()>;
}

/// Handles invocations arriving as prefixed free text. `args` holds the tokens after the trigger.
#[async_trait]
pub trait FreeTextHandler: Send + Sync {
    async fn handle_text(&self, ctx: &CommandContext, args: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use herald_access::CallerContext;

    use super::{CommandContext, OptionValue, ReplyPayload, ReplySender, ReplyTarget};

    #[derive(Default)]
    struct RecordingReplies {
        calls: Mutex<Vec<(&'static str, String)>>,
    }

    #[async_trait]
    impl ReplySender for RecordingReplies {
        async fn send_reply(&self, _target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
            self.calls
                .lock()
                .expect("replies lock")
                .push(("send", payload.content.clone()));
            Ok(())
        }

        async fn edit_reply(&self, _target: &ReplyTarget, payload: &ReplyPayload) -> Result<()> {
            self.calls
                .lock()
                .expect("replies lock")
                .push(("edit", payload.content.clone()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn regression_second_reply_edits_instead_of_sending() {
        let replies = Arc::new(RecordingReplies::default());
        let ctx = CommandContext::new(
            "ping",
            CallerContext::new("u1", "c1"),
            ReplyTarget::interaction("i1", "tok"),
            replies.clone(),
        );
        assert!(!ctx.has_replied());
        let shared = ctx.clone();
        ctx.reply(&ReplyPayload::text("working"))
            .await
            .expect("first reply");
        assert!(shared.has_replied());
        shared
            .reply(&ReplyPayload::text("done"))
            .await
            .expect("second reply");
        assert_eq!(
            *replies.calls.lock().expect("replies lock"),
            vec![("send", "working".to_string()), ("edit", "done".to_string())]
        );
    }

    #[tokio::test]
    async fn functional_context_reply_edits_deferred_interactions() {
        let replies = Arc::new(RecordingReplies::default());
        let caller = CallerContext::new("u1", "c1");

        let fresh = CommandContext::new(
            "ping",
            caller.clone(),
            ReplyTarget::interaction("i1", "tok"),
            replies.clone(),
        );
        fresh
            .reply(&ReplyPayload::text("first"))
            .await
            .expect("send reply");

        let deferred = CommandContext::new(
            "ping",
            caller,
            ReplyTarget::interaction("i2", "tok").deferred(),
            replies.clone(),
        );
        deferred
            .reply(&ReplyPayload::text("second"))
            .await
            .expect("edit reply");

        let calls = replies.calls.lock().expect("replies lock").clone();
        assert_eq!(
            calls,
            vec![("send", "first".to_string()), ("edit", "second".to_string())]
        );
    }

    #[test]
    fn unit_message_targets_are_never_deferred() {
        let target = ReplyTarget::message("c1", "m1").deferred();
        assert!(!target.is_deferred());
    }

    #[test]
    fn unit_option_values_render_mentions() {
        assert_eq!(OptionValue::User("42".to_string()).render(), "<@42>");
        assert_eq!(OptionValue::Channel("7".to_string()).render(), "<#7>");
        assert_eq!(OptionValue::Integer(100).as_f64(), Some(100.0));
        assert_eq!(OptionValue::Boolean(true).as_str(), None);
    }
}
