use herald_commands::ReplyPayload;

pub const DEFAULT_TEXT_PREFIX: &str = "!";
pub const TEXT_PREFIX_ENV: &str = "HERALD_TEXT_PREFIX";
pub const FAILURE_REPLY_TITLE: &str = "Error";
pub const FAILURE_REPLY_MESSAGE: &str =
    "An error occurred while running this command. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Prefix that marks a text message as a free-text invocation.
    pub text_prefix: String,
    /// Reply sent when a handler returns an error or panics.
    pub failure_reply: ReplyPayload,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            text_prefix: DEFAULT_TEXT_PREFIX.to_string(),
            failure_reply: ReplyPayload::error(FAILURE_REPLY_TITLE, FAILURE_REPLY_MESSAGE),
        }
    }
}

impl DispatcherConfig {
    /// Defaults, with the text prefix taken from `HERALD_TEXT_PREFIX` when set and non-blank.
    pub fn from_env() -> Self {
        let prefix = std::env::var(TEXT_PREFIX_ENV).ok();
        Self::default().with_text_prefix_override(prefix.as_deref())
    }

    pub fn with_text_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.text_prefix = prefix.into();
        self
    }

    pub fn with_failure_reply(mut self, payload: ReplyPayload) -> Self {
        self.failure_reply = payload;
        self
    }

    fn with_text_prefix_override(self, prefix: Option<&str>) -> Self {
        match prefix.map(str::trim).filter(|prefix| !prefix.is_empty()) {
            Some(prefix) => self.with_text_prefix(prefix),
            None => self,
        }
    }
}
