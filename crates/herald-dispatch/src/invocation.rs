use std::collections::BTreeMap;

use herald_access::{CallerContext, DenyReason};
use herald_commands::{CommandPath, OptionValue, ReplyTarget};
use serde::{Deserialize, Serialize};

/// A structured command invocation as delivered by the platform gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredInvocation {
    pub interaction_id: String,
    pub token: String,
    pub path: CommandPath,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
    pub caller: CallerContext,
    /// Set when the gateway already acknowledged the interaction.
    #[serde(default)]
    pub deferred: bool,
}

impl StructuredInvocation {
    pub fn new(
        interaction_id: impl Into<String>,
        token: impl Into<String>,
        path: CommandPath,
        caller: CallerContext,
    ) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            token: token.into(),
            path,
            options: BTreeMap::new(),
            caller,
            deferred: false,
        }
    }

    pub fn with_option(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.options.insert(name.into(), value);
        self
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    pub fn reply_target(&self) -> ReplyTarget {
        let target = ReplyTarget::interaction(self.interaction_id.clone(), self.token.clone());
        if self.deferred {
            target.deferred()
        } else {
            target
        }
    }
}

/// A plain text message that may carry a free-text invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInvocation {
    pub message_id: String,
    pub content: String,
    pub caller: CallerContext,
}

impl TextInvocation {
    pub fn new(
        message_id: impl Into<String>,
        content: impl Into<String>,
        caller: CallerContext,
    ) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
            caller,
        }
    }

    pub fn reply_target(&self) -> ReplyTarget {
        ReplyTarget::message(self.caller.channel_id.clone(), self.message_id.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Text without the configured prefix.
    Ignored,
    /// No command matches the address.
    Unresolved,
    /// Restricted command invoked outside its target scopes.
    OutOfScope,
    Denied(DenyReason),
    Completed,
    /// Handler returned an error or panicked; the failure reply was sent.
    Failed,
}

impl DispatchOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ignored => "ignored",
            Self::Unresolved => "unresolved",
            Self::OutOfScope => "out_of_scope",
            Self::Denied(_) => "denied",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn handler_ran(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use herald_access::CallerContext;
    use herald_commands::{CommandPath, ReplyTarget};

    use super::{DispatchOutcome, StructuredInvocation, TextInvocation};

    #[test]
    fn unit_reply_targets_follow_invocation_surface() {
        let caller = CallerContext::new("u1", "c1");
        let structured =
            StructuredInvocation::new("i1", "tok", CommandPath::root("ping"), caller.clone())
                .deferred();
        assert!(structured.reply_target().is_deferred());

        let text = TextInvocation::new("m1", "!ping", caller);
        assert_eq!(text.reply_target(), ReplyTarget::message("c1", "m1"));
    }

    #[test]
    fn unit_outcome_labels_are_stable() {
        assert_eq!(DispatchOutcome::OutOfScope.as_str(), "out_of_scope");
        assert!(DispatchOutcome::Failed.handler_ran());
        assert!(!DispatchOutcome::Unresolved.handler_ran());
    }
}
