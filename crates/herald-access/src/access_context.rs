use std::fmt;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

const PERMISSION_NAMES: &[(&str, u64)] = &[
    ("create_instant_invite", PermissionSet::CREATE_INSTANT_INVITE.0),
    ("kick_members", PermissionSet::KICK_MEMBERS.0),
    ("ban_members", PermissionSet::BAN_MEMBERS.0),
    ("administrator", PermissionSet::ADMINISTRATOR.0),
    ("manage_channels", PermissionSet::MANAGE_CHANNELS.0),
    ("manage_guild", PermissionSet::MANAGE_GUILD.0),
    ("manage_messages", PermissionSet::MANAGE_MESSAGES.0),
    ("mention_everyone", PermissionSet::MENTION_EVERYONE.0),
    ("manage_nicknames", PermissionSet::MANAGE_NICKNAMES.0),
    ("manage_roles", PermissionSet::MANAGE_ROLES.0),
    ("manage_webhooks", PermissionSet::MANAGE_WEBHOOKS.0),
    ("moderate_members", PermissionSet::MODERATE_MEMBERS.0),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
/// Coarse platform permission bits held by a guild member.
pub struct PermissionSet(u64);

impl PermissionSet {
    pub const NONE: Self = Self(0);
    pub const CREATE_INSTANT_INVITE: Self = Self(1 << 0);
    pub const KICK_MEMBERS: Self = Self(1 << 1);
    pub const BAN_MEMBERS: Self = Self(1 << 2);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const MANAGE_GUILD: Self = Self(1 << 5);
    pub const MANAGE_MESSAGES: Self = Self(1 << 13);
    pub const MENTION_EVERYONE: Self = Self(1 << 17);
    pub const MANAGE_NICKNAMES: Self = Self(1 << 27);
    pub const MANAGE_ROLES: Self = Self(1 << 28);
    pub const MANAGE_WEBHOOKS: Self = Self(1 << 29);
    pub const MODERATE_MEMBERS: Self = Self(1 << 40);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true when every bit in `required` is held. Administrators hold everything.
    pub fn contains(self, required: Self) -> bool {
        if self.0 & Self::ADMINISTRATOR.0 != 0 {
            return true;
        }
        self.0 & required.0 == required.0
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut bits = 0_u64;
        for name in names {
            let normalized = name.as_ref().trim().to_ascii_lowercase();
            let Some((_, bit)) = PERMISSION_NAMES
                .iter()
                .find(|(candidate, _)| *candidate == normalized)
            else {
                bail!("unknown permission name '{}'", name.as_ref());
            };
            bits |= bit;
        }
        Ok(Self(bits))
    }

    pub fn names(self) -> Vec<String> {
        PERMISSION_NAMES
            .iter()
            .filter(|(_, bit)| self.0 & bit != 0)
            .map(|(name, _)| (*name).to_string())
            .collect()
    }
}

impl TryFrom<Vec<String>> for PermissionSet {
    type Error = anyhow::Error;

    fn try_from(value: Vec<String>) -> Result<Self> {
        Self::from_names(value)
    }
}

impl From<PermissionSet> for Vec<String> {
    fn from(value: PermissionSet) -> Self {
        value.names()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.names().join("|"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
/// Bot-side profile flags stored for a user.
pub struct UserFlags(u64);

impl UserFlags {
    pub const STAFF: Self = Self(1 << 0);
    pub const BETA: Self = Self(1 << 1);
    pub const PARTNER: Self = Self(1 << 2);

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn has(self, flag: Self) -> bool {
        flag.0 != 0 && self.0 & flag.0 == flag.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Identity snapshot of the caller, resolved by the gateway before routing.
pub struct CallerContext {
    pub user_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub guild_owner_id: Option<String>,
    pub channel_id: String,
    /// `None` when the channel is not a text channel that carries the flag.
    #[serde(default)]
    pub channel_nsfw: Option<bool>,
    #[serde(default)]
    pub permissions: PermissionSet,
    #[serde(default)]
    pub is_developer: bool,
    /// `None` when the caller has no stored profile.
    #[serde(default)]
    pub profile_flags: Option<UserFlags>,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            guild_id: None,
            guild_owner_id: None,
            channel_id: channel_id.into(),
            channel_nsfw: None,
            permissions: PermissionSet::NONE,
            is_developer: false,
            profile_flags: None,
        }
    }

    pub fn in_guild(mut self, guild_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        self.guild_id = Some(guild_id.into());
        self.guild_owner_id = Some(owner_id.into());
        self
    }

    pub fn with_permissions(mut self, permissions: PermissionSet) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_profile_flags(mut self, flags: UserFlags) -> Self {
        self.profile_flags = Some(flags);
        self
    }

    pub fn as_developer(mut self) -> Self {
        self.is_developer = true;
        self
    }

    pub fn with_channel_nsfw(mut self, nsfw: bool) -> Self {
        self.channel_nsfw = Some(nsfw);
        self
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.guild_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn owns_guild(&self) -> bool {
        match self.guild_owner_id.as_deref() {
            Some(owner) => !owner.trim().is_empty() && owner.trim() == self.user_id.trim(),
            None => false,
        }
    }

    pub fn has_profile_flag(&self, flag: UserFlags) -> bool {
        self.profile_flags.map(|flags| flags.has(flag)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::{CallerContext, PermissionSet, UserFlags};

    #[test]
    fn unit_permission_set_contains_requires_every_bit() {
        let held = PermissionSet::BAN_MEMBERS.union(PermissionSet::KICK_MEMBERS);
        assert!(held.contains(PermissionSet::BAN_MEMBERS));
        assert!(!held.contains(PermissionSet::BAN_MEMBERS.union(PermissionSet::MANAGE_GUILD)));
        assert!(held.contains(PermissionSet::NONE));
    }

    #[test]
    fn unit_permission_set_administrator_holds_everything() {
        assert!(PermissionSet::ADMINISTRATOR.contains(PermissionSet::MANAGE_ROLES));
    }

    #[test]
    fn functional_permission_set_serde_uses_names() {
        let parsed: PermissionSet =
            serde_json::from_str(r#"["ban_members", "MANAGE_GUILD"]"#).expect("parse names");
        assert_eq!(
            parsed,
            PermissionSet::BAN_MEMBERS.union(PermissionSet::MANAGE_GUILD)
        );
        let encoded = serde_json::to_string(&parsed).expect("encode");
        assert_eq!(encoded, r#"["ban_members","manage_guild"]"#);
    }

    #[test]
    fn regression_permission_set_rejects_unknown_name() {
        let error = serde_json::from_str::<PermissionSet>(r#"["fly"]"#).expect_err("unknown");
        assert!(error.to_string().contains("unknown permission name 'fly'"));
    }

    #[test]
    fn unit_caller_context_owner_and_flags() {
        let caller = CallerContext::new("u1", "c1")
            .in_guild("g1", "u1")
            .with_profile_flags(UserFlags::BETA);
        assert!(caller.owns_guild());
        assert!(caller.has_profile_flag(UserFlags::BETA));
        assert!(!caller.has_profile_flag(UserFlags::STAFF));
        assert_eq!(caller.guild_id(), Some("g1"));

        let stranger = CallerContext::new("u2", "c1").in_guild("g1", "u1");
        assert!(!stranger.owns_guild());
        assert!(!stranger.has_profile_flag(UserFlags::STAFF));
    }
}
