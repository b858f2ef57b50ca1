use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::{
    CommandDescriptor, CommandOption, LoadedCommand, LocalizationMap, OptionChoice, RouteTable,
};

pub const CHAT_INPUT_COMMAND_TYPE: u8 = 1;
pub const SUBCOMMAND_OPTION_TYPE: u8 = 1;
pub const SUBCOMMAND_GROUP_OPTION_TYPE: u8 = 2;

/// Cache key used for the global scope.
pub const GLOBAL_SCOPE_KEY: &str = "*";

/// Where a schema set is registered remotely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SyncScope {
    Global,
    Target(String),
}

impl SyncScope {
    pub fn cache_key(&self) -> String {
        match self {
            Self::Global => GLOBAL_SCOPE_KEY.to_string(),
            Self::Target(id) => id.clone(),
        }
    }

    pub fn from_cache_key(key: &str) -> Self {
        if key == GLOBAL_SCOPE_KEY {
            Self::Global
        } else {
            Self::Target(key.to_string())
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Target(id) => write!(f, "target:{id}"),
        }
    }
}

/// Top-level entry of a remote schema set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandSchema {
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub name_localizations: LocalizationMap,
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub description_localizations: LocalizationMap,
    #[serde(rename = "type")]
    pub command_type: u8,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
}

/// Option, subcommand, or subcommand group inside a [`CommandSchema`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSchema {
    #[serde(rename = "type")]
    pub option_type: u8,
    pub name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub name_localizations: LocalizationMap,
    pub description: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub description_localizations: LocalizationMap,
    #[serde(skip_serializing_if = "is_false")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<OptionSchema>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl OptionSchema {
    fn container(option_type: u8, name: &str) -> Self {
        Self {
            option_type,
            name: name.to_string(),
            name_localizations: LocalizationMap::new(),
            description: name.to_string(),
            description_localizations: LocalizationMap::new(),
            required: false,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
            min_length: None,
            max_length: None,
            options: Vec::new(),
        }
    }

    fn subcommand(descriptor: &CommandDescriptor, name: &str) -> Self {
        Self {
            name_localizations: descriptor.name_localizations.clone(),
            description: description_or_name(descriptor, name),
            description_localizations: descriptor.description_localizations.clone(),
            options: descriptor.options.iter().map(Self::argument).collect(),
            ..Self::container(SUBCOMMAND_OPTION_TYPE, name)
        }
    }

    fn argument(option: &CommandOption) -> Self {
        Self {
            option_type: option.kind.api_type(),
            name: option.name.clone(),
            name_localizations: option.name_localizations.clone(),
            description: option.description.clone(),
            description_localizations: option.description_localizations.clone(),
            required: option.required,
            choices: option.choices.clone(),
            min_value: option.min_value,
            max_value: option.max_value,
            min_length: option.min_length,
            max_length: option.max_length,
            options: Vec::new(),
        }
    }
}

impl CommandSchema {
    fn container(name: &str) -> Self {
        Self {
            name: name.to_string(),
            name_localizations: LocalizationMap::new(),
            description: name.to_string(),
            description_localizations: LocalizationMap::new(),
            command_type: CHAT_INPUT_COMMAND_TYPE,
            options: Vec::new(),
        }
    }

    fn leaf(descriptor: &CommandDescriptor, name: &str) -> Self {
        Self {
            name_localizations: descriptor.name_localizations.clone(),
            description: description_or_name(descriptor, name),
            description_localizations: descriptor.description_localizations.clone(),
            options: descriptor.options.iter().map(OptionSchema::argument).collect(),
            ..Self::container(name)
        }
    }
}

fn description_or_name(descriptor: &CommandDescriptor, name: &str) -> String {
    let description = descriptor.description.trim();
    if description.is_empty() {
        name.to_string()
    } else {
        description.to_string()
    }
}

/// Required entries first, then by name. Applied recursively.
pub fn sort_option_schemas(options: &mut [OptionSchema]) {
    for option in options.iter_mut() {
        sort_option_schemas(&mut option.options);
    }
    options.sort_by(|left, right| {
        right
            .required
            .cmp(&left.required)
            .then_with(|| left.name.cmp(&right.name))
    });
}

fn scopes_for(command: &LoadedCommand) -> Vec<SyncScope> {
    if command.descriptor.restricted_scopes.is_empty() {
        return vec![SyncScope::Global];
    }
    command
        .descriptor
        .restricted_scopes
        .iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(|id| SyncScope::Target(id.to_string()))
        .collect()
}

fn place(tree: &mut BTreeMap<String, CommandSchema>, command: &LoadedCommand) {
    let Some(path) = &command.path else {
        return;
    };
    let descriptor = command.descriptor.as_ref();
    match (&path.group, &path.subcommand) {
        (None, None) => {
            tree.insert(path.command.clone(), CommandSchema::leaf(descriptor, &path.command));
        }
        (None, Some(subcommand)) => {
            let parent = tree
                .entry(path.command.clone())
                .or_insert_with(|| CommandSchema::container(&path.command));
            parent
                .options
                .push(OptionSchema::subcommand(descriptor, subcommand));
        }
        (Some(group), Some(subcommand)) => {
            let parent = tree
                .entry(path.command.clone())
                .or_insert_with(|| CommandSchema::container(&path.command));
            let position = match parent.options.iter().position(|option| {
                option.option_type == SUBCOMMAND_GROUP_OPTION_TYPE && option.name == *group
            }) {
                Some(position) => position,
                None => {
                    parent.options.push(OptionSchema::container(
                        SUBCOMMAND_GROUP_OPTION_TYPE,
                        group,
                    ));
                    parent.options.len() - 1
                }
            };
            parent.options[position]
                .options
                .push(OptionSchema::subcommand(descriptor, subcommand));
        }
        (Some(_), None) => {}
    }
}

/// Builds the schema set for every scope the table targets.
///
/// The global scope is always present, even when empty. A target scope is
/// present only when at least one structured command is restricted to it.
pub fn build_scope_schemas(table: &RouteTable) -> BTreeMap<SyncScope, Vec<CommandSchema>> {
    let mut trees = BTreeMap::from([(SyncScope::Global, BTreeMap::new())]);
    for command in table.structured_commands() {
        for scope in scopes_for(command) {
            place(trees.entry(scope).or_default(), command);
        }
    }

    trees
        .into_iter()
        .map(|(scope, tree)| {
            let mut commands = tree.into_values().collect::<Vec<_>>();
            for command in &mut commands {
                sort_option_schemas(&mut command.options);
            }
            (scope, commands)
        })
        .collect()
}

/// Serializes a schema set into the exact bytes compared against the sync cache.
pub fn serialize_scope_schema(commands: &[CommandSchema]) -> Result<String> {
    serde_json::to_string(commands).context("failed to serialize command schema set")
}

#[cfg(test)]
mod tests {
    use super::{
        build_scope_schemas, serialize_scope_schema, sort_option_schemas, SyncScope,
        SUBCOMMAND_GROUP_OPTION_TYPE, SUBCOMMAND_OPTION_TYPE,
    };
    use crate::command_registry::tests::structured;
    use crate::{CommandDescriptor, CommandOption, CommandOptionKind, CommandRegistry};

    fn pay() -> CommandDescriptor {
        structured("eco/pay")
            .describe("Send coins to another member")
            .localized_description("fr", "Envoyer des pièces")
            .with_option(CommandOption::new(
                "note",
                "Optional memo",
                CommandOptionKind::String,
            ))
            .with_option(
                CommandOption::new("member", "Who receives", CommandOptionKind::User).required(),
            )
            .with_option(
                CommandOption::new("amount", "How much", CommandOptionKind::Integer).required(),
            )
    }

    #[test]
    fn unit_scope_cache_keys_round_trip() {
        assert_eq!(SyncScope::Global.cache_key(), "*");
        assert_eq!(SyncScope::from_cache_key("*"), SyncScope::Global);
        assert_eq!(
            SyncScope::from_cache_key("g1"),
            SyncScope::Target("g1".to_string())
        );
        assert_eq!(SyncScope::Target("g1".to_string()).to_string(), "target:g1");
    }

    #[test]
    fn functional_schema_nests_subcommands_and_groups_under_synthesized_parents() {
        let load = CommandRegistry::new()
            .with(pay())
            .with(structured("eco/bank/deposit").describe("Deposit coins"))
            .with(structured("ping").describe("Latency check"))
            .build();
        let scopes = build_scope_schemas(&load.table);
        let global = &scopes[&SyncScope::Global];

        let names = global
            .iter()
            .map(|command| command.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["eco", "ping"]);

        let eco = &global[0];
        assert_eq!(eco.description, "eco");
        assert_eq!(eco.options.len(), 2);
        let bank = &eco.options[0];
        assert_eq!(bank.name, "bank");
        assert_eq!(bank.option_type, SUBCOMMAND_GROUP_OPTION_TYPE);
        assert_eq!(bank.description, "bank");
        assert_eq!(bank.options[0].name, "deposit");
        assert_eq!(bank.options[0].option_type, SUBCOMMAND_OPTION_TYPE);

        let pay = &eco.options[1];
        assert_eq!(pay.name, "pay");
        let arguments = pay
            .options
            .iter()
            .map(|option| (option.name.as_str(), option.required))
            .collect::<Vec<_>>();
        assert_eq!(
            arguments,
            vec![("amount", true), ("member", true), ("note", false)]
        );
    }

    #[test]
    fn functional_restricted_commands_only_appear_in_their_target_scopes() {
        let load = CommandRegistry::new()
            .with(structured("ping"))
            .with(structured("admin/reload").restrict_to("g1").restrict_to("g2"))
            .with(structured("admin/audit").restrict_to("g1"))
            .build();
        let scopes = build_scope_schemas(&load.table);

        assert_eq!(scopes.len(), 3);
        assert_eq!(scopes[&SyncScope::Global].len(), 1);
        let g1 = &scopes[&SyncScope::Target("g1".to_string())];
        assert_eq!(g1[0].name, "admin");
        assert_eq!(g1[0].options.len(), 2);
        let g2 = &scopes[&SyncScope::Target("g2".to_string())];
        assert_eq!(g2[0].options.len(), 1);
        assert_eq!(g2[0].options[0].name, "reload");
    }

    #[test]
    fn unit_empty_table_still_produces_global_scope() {
        let scopes = build_scope_schemas(&CommandRegistry::new().build().table);
        assert_eq!(scopes.len(), 1);
        let payload = serialize_scope_schema(&scopes[&SyncScope::Global]).expect("serialize");
        assert_eq!(payload, "[]");
    }

    #[test]
    fn regression_schema_bytes_do_not_depend_on_registration_order() {
        let forward = CommandRegistry::new()
            .with(structured("ping"))
            .with(pay())
            .with(structured("eco/bank/deposit"))
            .with(structured("eco/bank/withdraw"))
            .build();
        let reversed = CommandRegistry::new()
            .with(structured("eco/bank/withdraw"))
            .with(structured("eco/bank/deposit"))
            .with(pay())
            .with(structured("ping"))
            .build();

        let forward_bytes =
            serialize_scope_schema(&build_scope_schemas(&forward.table)[&SyncScope::Global])
                .expect("serialize forward");
        let reversed_bytes =
            serialize_scope_schema(&build_scope_schemas(&reversed.table)[&SyncScope::Global])
                .expect("serialize reversed");
        assert_eq!(forward_bytes, reversed_bytes);

        let again = serialize_scope_schema(&build_scope_schemas(&forward.table)[&SyncScope::Global])
            .expect("serialize again");
        assert_eq!(forward_bytes, again);
    }

    #[test]
    fn unit_serialized_schema_uses_platform_field_names() {
        let load = CommandRegistry::new().with(pay()).build();
        let scopes = build_scope_schemas(&load.table);
        let value = serde_json::to_value(&scopes[&SyncScope::Global]).expect("to value");
        let pay = &value[0]["options"][0];
        assert_eq!(value[0]["type"], 1);
        assert_eq!(pay["type"], 1);
        assert_eq!(pay["description_localizations"]["fr"], "Envoyer des pièces");
        assert_eq!(pay["options"][0]["type"], 4);
        assert_eq!(pay["options"][0]["required"], true);
        assert!(pay["options"][2].get("required").is_none());
    }

    #[test]
    fn unit_sort_orders_required_before_optional_then_by_name() {
        let load = CommandRegistry::new().with(pay()).build();
        let mut options = build_scope_schemas(&load.table)[&SyncScope::Global][0].options[0]
            .options
            .clone();
        options.reverse();
        sort_option_schemas(&mut options);
        let names = options
            .iter()
            .map(|option| option.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["amount", "member", "note"]);
    }
}
