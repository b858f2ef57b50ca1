//! Fail-closed authorization gate evaluated before any command handler runs.
//!
//! Rule categories are evaluated in a fixed order regardless of declaration
//! order: module gating, then channel constraints, then user constraints.
//! The first failing rule decides the surfaced reason.

use std::sync::Arc;

use serde::Serialize;

use crate::access_context::{CallerContext, UserFlags};
use crate::access_rule::{AccessPolicy, ChannelRule, ModuleRule, UserRule};
use crate::module_state::ModuleStateSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `DenyReason` values.
pub enum DenyReason {
    OutsideGuild,
    ModuleDisabled,
    OptionDisabled,
    ModuleStateUnavailable,
    ChannelConstraint,
    DeveloperOnly,
    StaffOnly,
    BetaOnly,
    NotTargetOwner,
    MissingPermissions,
}

impl DenyReason {
    pub fn reason_code(self) -> &'static str {
        match self {
            Self::OutsideGuild => "deny_outside_guild",
            Self::ModuleDisabled => "deny_module_disabled",
            Self::OptionDisabled => "deny_option_disabled",
            Self::ModuleStateUnavailable => "deny_module_state_unavailable",
            Self::ChannelConstraint => "deny_channel_constraint",
            Self::DeveloperOnly => "deny_developer_only",
            Self::StaffOnly => "deny_staff_only",
            Self::BetaOnly => "deny_beta_only",
            Self::NotTargetOwner => "deny_not_target_owner",
            Self::MissingPermissions => "deny_missing_permissions",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::ModuleDisabled | Self::ModuleStateUnavailable => "Module disabled",
            Self::OptionDisabled => "Module option disabled",
            _ => "Authorization refused",
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::OutsideGuild => "This command can only be used inside a server.",
            Self::ModuleDisabled => {
                "One or more required modules have been disabled by the server manager."
            }
            Self::OptionDisabled => {
                "One or more options of a required module have been disabled by the server manager."
            }
            Self::ModuleStateUnavailable => {
                "The module settings for this server could not be checked. Try again later."
            }
            Self::ChannelConstraint => "This command can only be used in NSFW channels.",
            Self::DeveloperOnly => "This command is only available to the bot developers.",
            Self::StaffOnly => "This command is only available to the bot staff.",
            Self::BetaOnly => "This command is only available to beta testers.",
            Self::NotTargetOwner => "You are not the owner of this server.",
            Self::MissingPermissions => "You do not have the required permissions.",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
/// Enumerates supported `AccessDecision` values.
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny(_) => "deny",
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    modules: Arc<dyn ModuleStateSource>,
}

impl AuthorizationGate {
    pub fn new(modules: Arc<dyn ModuleStateSource>) -> Self {
        Self { modules }
    }

    pub async fn evaluate(&self, policy: &AccessPolicy, caller: &CallerContext) -> AccessDecision {
        for rule in policy.module_rules() {
            if let Some(reason) = self.check_module_rule(rule, caller).await {
                return AccessDecision::Deny(reason);
            }
        }
        for rule in policy.channel_rules() {
            if let Some(reason) = check_channel_rule(rule, caller) {
                return AccessDecision::Deny(reason);
            }
        }
        for rule in policy.user_rules() {
            if let Some(reason) = check_user_rule(rule, caller) {
                return AccessDecision::Deny(reason);
            }
        }
        AccessDecision::Allow
    }

    async fn check_module_rule(
        &self,
        rule: &ModuleRule,
        caller: &CallerContext,
    ) -> Option<DenyReason> {
        if rule.modules.is_empty() {
            return None;
        }
        let Some(guild_id) = caller.guild_id() else {
            return Some(DenyReason::OutsideGuild);
        };

        let mut enabled = Vec::with_capacity(rule.modules.len());
        for requirement in &rule.modules {
            match self
                .modules
                .module_enabled(guild_id, requirement.module.as_str())
                .await
            {
                Ok(value) => enabled.push(value),
                Err(error) => {
                    tracing::warn!(
                        guild_id = guild_id,
                        module = requirement.module.as_str(),
                        error = %error,
                        "module state lookup failed"
                    );
                    return Some(DenyReason::ModuleStateUnavailable);
                }
            }
        }
        if !rule.mode.combine(enabled.iter().copied()) {
            return Some(DenyReason::ModuleDisabled);
        }

        let mut fields_satisfied = Vec::new();
        for (requirement, is_enabled) in rule.modules.iter().zip(enabled) {
            if !is_enabled {
                continue;
            }
            let mut field_states = Vec::with_capacity(requirement.fields.len());
            for field in &requirement.fields {
                match self
                    .modules
                    .module_field_enabled(guild_id, requirement.module.as_str(), field.as_str())
                    .await
                {
                    Ok(value) => field_states.push(value),
                    Err(error) => {
                        tracing::warn!(
                            guild_id = guild_id,
                            module = requirement.module.as_str(),
                            field = field.as_str(),
                            error = %error,
                            "module field lookup failed"
                        );
                        return Some(DenyReason::ModuleStateUnavailable);
                    }
                }
            }
            fields_satisfied.push(rule.mode.combine(field_states));
        }
        if !rule.mode.combine(fields_satisfied) {
            return Some(DenyReason::OptionDisabled);
        }
        None
    }
}

fn check_channel_rule(rule: &ChannelRule, caller: &CallerContext) -> Option<DenyReason> {
    if rule.nsfw_only && caller.channel_nsfw != Some(true) {
        return Some(DenyReason::ChannelConstraint);
    }
    None
}

fn check_user_rule(rule: &UserRule, caller: &CallerContext) -> Option<DenyReason> {
    if caller.is_developer {
        return None;
    }
    if rule.developer_only {
        return Some(DenyReason::DeveloperOnly);
    }
    if rule.staff_only && !caller.has_profile_flag(UserFlags::STAFF) {
        return Some(DenyReason::StaffOnly);
    }
    if rule.beta_only && !caller.has_profile_flag(UserFlags::BETA) {
        return Some(DenyReason::BetaOnly);
    }
    if rule.guild_owner_only {
        if caller.guild_id().is_none() {
            return Some(DenyReason::OutsideGuild);
        }
        if !caller.owns_guild() {
            return Some(DenyReason::NotTargetOwner);
        }
    }
    if let Some(required) = rule.required_permissions.filter(|value| !value.is_empty()) {
        if caller.guild_id().is_none() {
            return Some(DenyReason::OutsideGuild);
        }
        if !caller.permissions.contains(required) {
            return Some(DenyReason::MissingPermissions);
        }
    }
    None
}
