use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use herald_access::{AccessPolicy, AccessRule};
use serde::{Deserialize, Serialize};

use crate::{FreeTextHandler, StructuredHandler};

/// Locale tag to localized text. Ordered so serialized schemas are stable.
pub type LocalizationMap = BTreeMap<String, String>;

/// Argument kinds a structured command option can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
    Attachment,
}

impl CommandOptionKind {
    /// Numeric option type used by the remote platform's command schema.
    pub fn api_type(self) -> u8 {
        match self {
            Self::String => 3,
            Self::Integer => 4,
            Self::Boolean => 5,
            Self::User => 6,
            Self::Channel => 7,
            Self::Role => 8,
            Self::Mentionable => 9,
            Self::Number => 10,
            Self::Attachment => 11,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::User => "user",
            Self::Channel => "channel",
            Self::Role => "role",
            Self::Mentionable => "mentionable",
            Self::Number => "number",
            Self::Attachment => "attachment",
        }
    }

    pub fn supports_choices(self) -> bool {
        matches!(self, Self::String | Self::Integer | Self::Number)
    }

    pub fn supports_value_range(self) -> bool {
        matches!(self, Self::Integer | Self::Number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionChoiceValue {
    Integer(i64),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub name_localizations: LocalizationMap,
    pub value: OptionChoiceValue,
}

impl OptionChoice {
    pub fn new(name: impl Into<String>, value: OptionChoiceValue) -> Self {
        Self {
            name: name.into(),
            name_localizations: LocalizationMap::new(),
            value,
        }
    }
}

/// One typed argument of a structured command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(default)]
    pub name_localizations: LocalizationMap,
    pub description: String,
    #[serde(default)]
    pub description_localizations: LocalizationMap,
    pub kind: CommandOptionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub choices: Vec<OptionChoice>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub min_length: Option<u16>,
    #[serde(default)]
    pub max_length: Option<u16>,
}

impl CommandOption {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        kind: CommandOptionKind,
    ) -> Self {
        Self {
            name: name.into(),
            name_localizations: LocalizationMap::new(),
            description: description.into(),
            description_localizations: LocalizationMap::new(),
            kind,
            required: false,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_choice(mut self, choice: OptionChoice) -> Self {
        self.choices.push(choice);
        self
    }

    pub fn with_value_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_value = min;
        self.max_value = max;
        self
    }

    pub fn with_length_range(mut self, min: Option<u16>, max: Option<u16>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    pub fn localized_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    pub fn localized_description(
        mut self,
        locale: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.description_localizations
            .insert(locale.into(), description.into());
        self
    }
}

/// How a free-text capability is addressed in a prefixed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeTextStyle {
    /// `<prefix><name> args...`
    #[default]
    Flat,
    /// `<prefix><parent segments...> <name> args...`
    PositionalPrefix,
}

impl FreeTextStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::PositionalPrefix => "positional_prefix",
        }
    }
}

/// Free-text addressing for a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FreeTextSpec {
    #[serde(default)]
    pub style: FreeTextStyle,
    /// Overrides the trailing location segment as the primary trigger.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl FreeTextSpec {
    pub fn flat() -> Self {
        Self::default()
    }

    pub fn positional() -> Self {
        Self {
            style: FreeTextStyle::PositionalPrefix,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// A declared command: addressing, schema metadata, access policy, and handlers.
#[derive(Clone)]
pub struct CommandDescriptor {
    pub location: String,
    pub name_localizations: LocalizationMap,
    pub description: String,
    pub description_localizations: LocalizationMap,
    pub options: Vec<CommandOption>,
    pub access: AccessPolicy,
    pub free_text: FreeTextSpec,
    /// Target scope ids this command is limited to. Empty means unrestricted.
    pub restricted_scopes: Vec<String>,
    pub structured_handler: Option<Arc<dyn StructuredHandler>>,
    pub free_text_handler: Option<Arc<dyn FreeTextHandler>>,
}

impl CommandDescriptor {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name_localizations: LocalizationMap::new(),
            description: String::new(),
            description_localizations: LocalizationMap::new(),
            options: Vec::new(),
            access: AccessPolicy::unrestricted(),
            free_text: FreeTextSpec::default(),
            restricted_scopes: Vec::new(),
            structured_handler: None,
            free_text_handler: None,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn localized_name(mut self, locale: impl Into<String>, name: impl Into<String>) -> Self {
        self.name_localizations.insert(locale.into(), name.into());
        self
    }

    pub fn localized_description(
        mut self,
        locale: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.description_localizations
            .insert(locale.into(), description.into());
        self
    }

    pub fn with_option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn with_access(mut self, access: AccessPolicy) -> Self {
        self.access = access;
        self
    }

    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.access = self.access.with_rule(rule);
        self
    }

    pub fn with_free_text(mut self, spec: FreeTextSpec) -> Self {
        self.free_text = spec;
        self
    }

    pub fn restrict_to(mut self, scope_id: impl Into<String>) -> Self {
        self.restricted_scopes.push(scope_id.into());
        self
    }

    pub fn on_structured(mut self, handler: Arc<dyn StructuredHandler>) -> Self {
        self.structured_handler = Some(handler);
        self
    }

    pub fn on_free_text(mut self, handler: Arc<dyn FreeTextHandler>) -> Self {
        self.free_text_handler = Some(handler);
        self
    }

    pub fn is_restricted(&self) -> bool {
        !self.restricted_scopes.is_empty()
    }

    /// Whether an invocation from `scope_id` may reach this command.
    pub fn allows_scope(&self, scope_id: Option<&str>) -> bool {
        if !self.is_restricted() {
            return true;
        }
        scope_id.map(str::trim).is_some_and(|scope_id| {
            self.restricted_scopes
                .iter()
                .any(|restricted| restricted == scope_id)
        })
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("location", &self.location)
            .field("description", &self.description)
            .field("options", &self.options.len())
            .field("access", &self.access)
            .field("free_text", &self.free_text)
            .field("restricted_scopes", &self.restricted_scopes)
            .field("structured_handler", &self.structured_handler.is_some())
            .field("free_text_handler", &self.free_text_handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandDescriptor, CommandOption, CommandOptionKind, FreeTextSpec, FreeTextStyle};

    #[test]
    fn unit_option_kinds_map_to_platform_types() {
        assert_eq!(CommandOptionKind::String.api_type(), 3);
        assert_eq!(CommandOptionKind::User.api_type(), 6);
        assert_eq!(CommandOptionKind::Attachment.api_type(), 11);
        assert!(CommandOptionKind::Number.supports_choices());
        assert!(!CommandOptionKind::Boolean.supports_choices());
    }

    #[test]
    fn unit_restricted_descriptor_only_allows_listed_scopes() {
        let open = CommandDescriptor::new("ping");
        assert!(open.allows_scope(None));
        assert!(open.allows_scope(Some("g1")));

        let restricted = CommandDescriptor::new("admin/reload").restrict_to("g1");
        assert!(restricted.allows_scope(Some("g1")));
        assert!(!restricted.allows_scope(Some("g2")));
        assert!(!restricted.allows_scope(None));
    }

    #[test]
    fn functional_free_text_spec_parses_with_defaults() {
        let spec: FreeTextSpec =
            serde_json::from_str(r#"{"aliases":["give"]}"#).expect("parse free-text spec");
        assert_eq!(spec.style, FreeTextStyle::Flat);
        assert_eq!(spec.name, None);
        assert_eq!(spec.aliases, vec!["give".to_string()]);

        let option: CommandOption = serde_json::from_str(
            r#"{"name":"amount","description":"How much","kind":"integer","required":true}"#,
        )
        .expect("parse option");
        assert!(option.required);
        assert_eq!(option.kind, CommandOptionKind::Integer);
        assert!(option.choices.is_empty());
    }
}
