use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    declaration_segments, is_valid_command_name, is_valid_free_text_token, CommandDescriptor,
    FreeTextStyle, LoadError, GLOBAL_SCOPE_KEY,
};

pub const MAX_COMMAND_DEPTH: usize = 3;
pub const MAX_COMMAND_OPTIONS: usize = 25;

/// Structured address of a command: `command`, `command sub`, or `command group sub`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandPath {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcommand: Option<String>,
}

impl CommandPath {
    pub fn root(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            group: None,
            subcommand: None,
        }
    }

    pub fn subcommand(command: impl Into<String>, subcommand: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            group: None,
            subcommand: Some(subcommand.into()),
        }
    }

    pub fn grouped(
        command: impl Into<String>,
        group: impl Into<String>,
        subcommand: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            group: Some(group.into()),
            subcommand: Some(subcommand.into()),
        }
    }

    pub fn from_segments(segments: &[String]) -> Option<Self> {
        match segments {
            [command] => Some(Self::root(command.as_str())),
            [command, subcommand] => Some(Self::subcommand(command.as_str(), subcommand.as_str())),
            [command, group, subcommand] => Some(Self::grouped(
                command.as_str(),
                group.as_str(),
                subcommand.as_str(),
            )),
            _ => None,
        }
    }

    pub fn depth(&self) -> usize {
        1 + usize::from(self.group.is_some()) + usize::from(self.subcommand.is_some())
    }
}

impl fmt::Display for CommandPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        if let Some(group) = &self.group {
            write!(f, " {group}")?;
        }
        if let Some(subcommand) = &self.subcommand {
            write!(f, " {subcommand}")?;
        }
        Ok(())
    }
}

/// Resolved free-text addressing for a loaded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeTextRoute {
    pub style: FreeTextStyle,
    /// Tokens that must precede the trigger. Always empty for flat commands.
    pub prefix: Vec<String>,
    pub name: String,
    pub aliases: Vec<String>,
}

impl FreeTextRoute {
    pub fn triggers(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    pub fn matches(&self, token: &str) -> bool {
        self.triggers().any(|trigger| trigger == token)
    }

    /// Human-readable form such as `eco give|pay`.
    pub fn render(&self) -> String {
        let triggers = self.triggers().collect::<Vec<_>>().join("|");
        if self.prefix.is_empty() {
            triggers
        } else {
            format!("{} {triggers}", self.prefix.join(" "))
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedCommand {
    /// Position in registration order.
    pub index: usize,
    pub descriptor: Arc<CommandDescriptor>,
    pub segments: Vec<String>,
    pub path: Option<CommandPath>,
    pub free_text: Option<FreeTextRoute>,
}

impl LoadedCommand {
    pub fn location(&self) -> &str {
        &self.descriptor.location
    }

    pub fn allows_scope(&self, scope_id: Option<&str>) -> bool {
        self.descriptor.allows_scope(scope_id)
    }
}

/// Structured routes under one top-level command name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandRoutes {
    pub root: Option<usize>,
    pub subcommands: BTreeMap<String, usize>,
    pub groups: BTreeMap<String, BTreeMap<String, usize>>,
}

impl CommandRoutes {
    pub fn is_container(&self) -> bool {
        !self.subcommands.is_empty() || !self.groups.is_empty()
    }

    fn first_in_group(&self, group: &str) -> Option<usize> {
        self.groups
            .get(group)
            .and_then(|subcommands| subcommands.values().next().copied())
    }

    fn first_child(&self) -> Option<usize> {
        self.subcommands
            .values()
            .next()
            .copied()
            .or_else(|| self.groups.values().flat_map(|group| group.values()).next().copied())
    }
}

type FreeTextKey = (Vec<String>, String);

/// Immutable routing index built from one registration pass.
#[derive(Debug, Default)]
pub struct RouteTable {
    commands: Vec<LoadedCommand>,
    structured: BTreeMap<String, CommandRoutes>,
    free_text: BTreeMap<FreeTextKey, usize>,
}

impl RouteTable {
    pub fn commands(&self) -> &[LoadedCommand] {
        &self.commands
    }

    pub fn get(&self, index: usize) -> Option<&LoadedCommand> {
        self.commands.get(index)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn structured_routes(&self) -> &BTreeMap<String, CommandRoutes> {
        &self.structured
    }

    pub fn structured_commands(&self) -> impl Iterator<Item = &LoadedCommand> {
        self.commands.iter().filter(|command| command.path.is_some())
    }

    pub fn free_text_commands(&self) -> impl Iterator<Item = &LoadedCommand> {
        self.commands
            .iter()
            .filter(|command| command.free_text.is_some())
    }

    fn location_of(&self, index: usize) -> String {
        self.commands
            .get(index)
            .map(|command| command.location().to_string())
            .unwrap_or_default()
    }

    fn admit(&mut self, mut descriptor: CommandDescriptor) -> Result<usize, LoadError> {
        let location = descriptor.location.clone();
        if descriptor.structured_handler.is_none() && descriptor.free_text_handler.is_none() {
            return Err(LoadError::MissingHandlers { location });
        }
        descriptor.restricted_scopes = normalize_scopes(&descriptor)?;

        let segments = declaration_segments(&location)?;
        if segments.len() > MAX_COMMAND_DEPTH {
            return Err(LoadError::InvalidDepth {
                location,
                depth: segments.len(),
            });
        }

        let path = if descriptor.structured_handler.is_some() {
            if let Some(name) = segments.iter().find(|name| !is_valid_command_name(name)) {
                return Err(LoadError::InvalidName {
                    location,
                    name: name.clone(),
                });
            }
            validate_options(&descriptor)?;
            let path = CommandPath::from_segments(&segments).ok_or_else(|| {
                LoadError::InvalidDepth {
                    location: location.clone(),
                    depth: segments.len(),
                }
            })?;
            self.check_structured(&location, &path)?;
            Some(path)
        } else {
            None
        };

        let free_text = if descriptor.free_text_handler.is_some() {
            let route = free_text_route(&descriptor, &segments)?;
            self.check_free_text(&location, &route)?;
            Some(route)
        } else {
            None
        };

        let index = self.commands.len();
        if let Some(path) = &path {
            self.insert_structured(path, index);
        }
        if let Some(route) = &free_text {
            for trigger in route.triggers() {
                self.free_text
                    .insert((route.prefix.clone(), trigger.to_string()), index);
            }
        }
        self.commands.push(LoadedCommand {
            index,
            descriptor: Arc::new(descriptor),
            segments,
            path,
            free_text,
        });
        Ok(index)
    }

    fn check_structured(&self, location: &str, path: &CommandPath) -> Result<(), LoadError> {
        let Some(routes) = self.structured.get(&path.command) else {
            return Ok(());
        };
        let collision = |existing: usize| LoadError::PathCollision {
            location: location.to_string(),
            path: path.to_string(),
            existing: self.location_of(existing),
        };
        let conflict = |existing: usize, reason: &str| LoadError::PathConflict {
            location: location.to_string(),
            path: path.to_string(),
            existing: self.location_of(existing),
            reason: reason.to_string(),
        };

        match (&path.group, &path.subcommand) {
            (None, None) => {
                if let Some(existing) = routes.root {
                    return Err(collision(existing));
                }
                if let Some(existing) = routes.first_child() {
                    return Err(conflict(
                        existing,
                        "name is already a container of subcommands",
                    ));
                }
            }
            (None, Some(subcommand)) => {
                if let Some(existing) = routes.root {
                    return Err(conflict(existing, "parent is already a leaf command"));
                }
                if let Some(existing) = routes.subcommands.get(subcommand) {
                    return Err(collision(*existing));
                }
                if let Some(existing) = routes.first_in_group(subcommand) {
                    return Err(conflict(existing, "subcommand name matches a sibling group"));
                }
            }
            (Some(group), Some(subcommand)) => {
                if let Some(existing) = routes.root {
                    return Err(conflict(existing, "parent is already a leaf command"));
                }
                if let Some(existing) = routes.subcommands.get(group) {
                    return Err(conflict(*existing, "group name matches a sibling subcommand"));
                }
                if let Some(existing) = routes
                    .groups
                    .get(group)
                    .and_then(|subcommands| subcommands.get(subcommand))
                {
                    return Err(collision(*existing));
                }
            }
            (Some(_), None) => {}
        }
        Ok(())
    }

    fn check_free_text(&self, location: &str, route: &FreeTextRoute) -> Result<(), LoadError> {
        for trigger in route.triggers() {
            let key = (route.prefix.clone(), trigger.to_string());
            if let Some(existing) = self.free_text.get(&key) {
                let rendered = if route.prefix.is_empty() {
                    trigger.to_string()
                } else {
                    format!("{} {trigger}", route.prefix.join(" "))
                };
                return Err(LoadError::FreeTextCollision {
                    location: location.to_string(),
                    trigger: rendered,
                    existing: self.location_of(*existing),
                });
            }
        }
        Ok(())
    }

    fn insert_structured(&mut self, path: &CommandPath, index: usize) {
        let routes = self.structured.entry(path.command.clone()).or_default();
        match (&path.group, &path.subcommand) {
            (None, None) => routes.root = Some(index),
            (None, Some(subcommand)) => {
                routes.subcommands.insert(subcommand.clone(), index);
            }
            (Some(group), Some(subcommand)) => {
                routes
                    .groups
                    .entry(group.clone())
                    .or_default()
                    .insert(subcommand.clone(), index);
            }
            (Some(_), None) => {}
        }
    }
}

/// Trims and dedupes restricted scope ids. Blank ids and the global cache key are rejected.
fn normalize_scopes(descriptor: &CommandDescriptor) -> Result<Vec<String>, LoadError> {
    let mut scopes = Vec::new();
    for scope in &descriptor.restricted_scopes {
        let trimmed = scope.trim();
        if trimmed.is_empty() || trimmed == GLOBAL_SCOPE_KEY {
            return Err(LoadError::InvalidScope {
                location: descriptor.location.clone(),
                scope: scope.clone(),
            });
        }
        if !scopes.iter().any(|existing| existing == trimmed) {
            scopes.push(trimmed.to_string());
        }
    }
    Ok(scopes)
}

fn free_text_route(
    descriptor: &CommandDescriptor,
    segments: &[String],
) -> Result<FreeTextRoute, LoadError> {
    let spec = &descriptor.free_text;
    let (parents, last) = match segments.split_last() {
        Some((last, parents)) => (parents, last),
        None => {
            return Err(LoadError::InvalidLocation {
                location: descriptor.location.clone(),
                reason: "location has no routable segments".to_string(),
            })
        }
    };
    let name = spec.name.clone().unwrap_or_else(|| last.clone());
    let prefix = match spec.style {
        FreeTextStyle::Flat => Vec::new(),
        FreeTextStyle::PositionalPrefix => parents.to_vec(),
    };

    let mut seen = BTreeSet::from([name.clone()]);
    let mut aliases = Vec::new();
    for alias in &spec.aliases {
        if seen.insert(alias.clone()) {
            aliases.push(alias.clone());
        }
    }

    let route = FreeTextRoute {
        style: spec.style,
        prefix,
        name,
        aliases,
    };
    if let Some(bad) = route
        .prefix
        .iter()
        .map(String::as_str)
        .chain(route.triggers())
        .find(|token| !is_valid_free_text_token(token))
    {
        return Err(LoadError::InvalidName {
            location: descriptor.location.clone(),
            name: bad.to_string(),
        });
    }
    Ok(route)
}

fn validate_options(descriptor: &CommandDescriptor) -> Result<(), LoadError> {
    let invalid = |option: &str, reason: &str| LoadError::InvalidOption {
        location: descriptor.location.clone(),
        option: option.to_string(),
        reason: reason.to_string(),
    };
    if descriptor.options.len() > MAX_COMMAND_OPTIONS {
        return Err(invalid(
            "*",
            &format!("at most {MAX_COMMAND_OPTIONS} options are allowed"),
        ));
    }

    let mut names = BTreeSet::new();
    for option in &descriptor.options {
        if !is_valid_command_name(&option.name) {
            return Err(invalid(&option.name, "name is not a valid command name"));
        }
        if !names.insert(option.name.as_str()) {
            return Err(invalid(&option.name, "name is declared twice"));
        }
        if !option.choices.is_empty() && !option.kind.supports_choices() {
            return Err(invalid(
                &option.name,
                &format!("{} options cannot declare choices", option.kind.as_str()),
            ));
        }
        if (option.min_value.is_some() || option.max_value.is_some())
            && !option.kind.supports_value_range()
        {
            return Err(invalid(
                &option.name,
                &format!("{} options cannot declare a value range", option.kind.as_str()),
            ));
        }
        if let (Some(min), Some(max)) = (option.min_value, option.max_value) {
            if min > max {
                return Err(invalid(&option.name, "min_value exceeds max_value"));
            }
        }
        if let (Some(min), Some(max)) = (option.min_length, option.max_length) {
            if min > max {
                return Err(invalid(&option.name, "min_length exceeds max_length"));
            }
        }
    }
    Ok(())
}

/// Result of one registration pass: the routes that loaded and the descriptors that did not.
#[derive(Debug, Default)]
pub struct RegistryLoad {
    pub table: RouteTable,
    pub errors: Vec<LoadError>,
}

/// Collects descriptors and builds a [`RouteTable`] from them in registration order.
///
/// Later descriptors lose every collision; the earlier registration keeps the route.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    declared: Vec<CommandDescriptor>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: CommandDescriptor) -> &mut Self {
        self.declared.push(descriptor);
        self
    }

    pub fn with(mut self, descriptor: CommandDescriptor) -> Self {
        self.declared.push(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.declared.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }

    #[tracing::instrument(name = "herald.registry.build", skip_all, fields(declared = self.declared.len()))]
    pub fn build(self) -> RegistryLoad {
        let mut table = RouteTable::default();
        let mut errors = Vec::new();
        for descriptor in self.declared {
            let location = descriptor.location.clone();
            match table.admit(descriptor) {
                Ok(index) => {
                    tracing::debug!(location = %location, index, "registered command");
                }
                Err(error) => {
                    tracing::warn!(
                        location = %error.location(),
                        kind = error.kind(),
                        error = %error,
                        "skipping command that failed to load"
                    );
                    errors.push(error);
                }
            }
        }
        tracing::debug!(
            loaded = table.len(),
            rejected = errors.len(),
            "route table built"
        );
        RegistryLoad { table, errors }
    }
}
