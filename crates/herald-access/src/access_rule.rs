//! Declarative access rules attached to command descriptors.
//!
//! A descriptor carries an [`AccessPolicy`]: an ordered list of tagged
//! [`AccessRule`] values. Rules of different categories AND together; a
//! missing category imposes no constraint.

use serde::{Deserialize, Serialize};

use crate::access_context::PermissionSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Combines several boolean checks into one.
pub enum RuleCombinator {
    Some,
    #[default]
    Every,
}

impl RuleCombinator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Some => "some",
            Self::Every => "every",
        }
    }

    /// Folds `results`; an empty input imposes no constraint and passes.
    pub fn combine<I>(self, results: I) -> bool
    where
        I: IntoIterator<Item = bool>,
    {
        let mut seen = false;
        let mut any = false;
        let mut all = true;
        for result in results {
            seen = true;
            any |= result;
            all &= result;
        }
        if !seen {
            return true;
        }
        match self {
            Self::Some => any,
            Self::Every => all,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// One feature module that must be enabled, plus the settings fields that must be on.
pub struct ModuleRequirement {
    pub module: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ModuleRequirement {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRule {
    #[serde(default)]
    pub modules: Vec<ModuleRequirement>,
    #[serde(default)]
    pub mode: RuleCombinator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRule {
    #[serde(default)]
    pub nsfw_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRule {
    #[serde(default)]
    pub developer_only: bool,
    #[serde(default)]
    pub staff_only: bool,
    #[serde(default)]
    pub beta_only: bool,
    #[serde(default)]
    pub guild_owner_only: bool,
    #[serde(default)]
    pub required_permissions: Option<PermissionSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// Enumerates supported `AccessRule` categories.
pub enum AccessRule {
    Module(ModuleRule),
    Channel(ChannelRule),
    User(UserRule),
}

impl AccessRule {
    pub fn modules<I, S>(modules: I, mode: RuleCombinator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Module(ModuleRule {
            modules: modules.into_iter().map(ModuleRequirement::new).collect(),
            mode,
        })
    }

    pub fn nsfw_only() -> Self {
        Self::Channel(ChannelRule { nsfw_only: true })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Module(_) => "module",
            Self::Channel(_) => "channel",
            Self::User(_) => "user",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
/// All access rules of one descriptor. Immutable once the descriptor is loaded.
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: AccessRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn module_rules(&self) -> impl Iterator<Item = &ModuleRule> {
        self.rules.iter().filter_map(|rule| match rule {
            AccessRule::Module(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn channel_rules(&self) -> impl Iterator<Item = &ChannelRule> {
        self.rules.iter().filter_map(|rule| match rule {
            AccessRule::Channel(rule) => Some(rule),
            _ => None,
        })
    }

    pub fn user_rules(&self) -> impl Iterator<Item = &UserRule> {
        self.rules.iter().filter_map(|rule| match rule {
            AccessRule::User(rule) => Some(rule),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessPolicy, AccessRule, ModuleRequirement, RuleCombinator};
    use crate::access_context::PermissionSet;

    #[test]
    fn unit_rule_combinator_folds_some_and_every() {
        assert!(RuleCombinator::Some.combine([false, true]));
        assert!(!RuleCombinator::Some.combine([false, false]));
        assert!(RuleCombinator::Every.combine([true, true]));
        assert!(!RuleCombinator::Every.combine([true, false]));
    }

    #[test]
    fn regression_rule_combinator_empty_input_passes_for_both_modes() {
        assert!(RuleCombinator::Some.combine(std::iter::empty()));
        assert!(RuleCombinator::Every.combine(std::iter::empty()));
    }

    #[test]
    fn functional_access_policy_parses_tagged_rules() {
        let policy: AccessPolicy = serde_json::from_str(
            r#"[
  { "kind": "module", "modules": [{ "module": "eco", "fields": ["shop_enabled"] }], "mode": "some" },
  { "kind": "channel", "nsfw_only": true },
  { "kind": "user", "required_permissions": ["ban_members"] }
]"#,
        )
        .expect("parse policy");
        assert_eq!(policy.rules().len(), 3);
        let module = policy.module_rules().next().expect("module rule");
        assert_eq!(module.mode, RuleCombinator::Some);
        assert_eq!(
            module.modules,
            vec![ModuleRequirement::new("eco").with_field("shop_enabled")]
        );
        assert!(policy.channel_rules().next().expect("channel").nsfw_only);
        assert_eq!(
            policy.user_rules().next().expect("user").required_permissions,
            Some(PermissionSet::BAN_MEMBERS)
        );
    }

    #[test]
    fn unit_access_rule_module_defaults_to_every() {
        let policy: AccessPolicy =
            serde_json::from_str(r#"[{ "kind": "module", "modules": [{ "module": "eco" }] }]"#)
                .expect("parse");
        assert_eq!(
            policy.rules()[0],
            AccessRule::modules(["eco"], RuleCombinator::Every)
        );
    }
}
