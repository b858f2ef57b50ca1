use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const MODULE_STATE_SCHEMA_VERSION: u32 = 1;
pub const MODULE_STATE_FILE_NAME: &str = "module-state.json";

fn module_state_schema_version() -> u32 {
    MODULE_STATE_SCHEMA_VERSION
}

#[async_trait]
/// Resolves whether a guild has a feature module, or one of its settings fields, switched on.
pub trait ModuleStateSource: Send + Sync {
    async fn module_enabled(&self, guild_id: &str, module: &str) -> Result<bool>;

    async fn module_field_enabled(&self, guild_id: &str, module: &str, field: &str)
        -> Result<bool>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleState {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildModuleStates {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// On-disk snapshot of per-guild module switches.
pub struct ModuleStateFile {
    #[serde(default = "module_state_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub guilds: BTreeMap<String, GuildModuleStates>,
}

impl Default for ModuleStateFile {
    fn default() -> Self {
        Self {
            schema_version: MODULE_STATE_SCHEMA_VERSION,
            guilds: BTreeMap::new(),
        }
    }
}

pub fn parse_module_state_file(raw: &str) -> Result<ModuleStateFile> {
    let parsed =
        serde_json::from_str::<ModuleStateFile>(raw).context("failed to parse module state")?;
    if parsed.schema_version != MODULE_STATE_SCHEMA_VERSION {
        bail!(
            "unsupported module state schema_version {} (expected {})",
            parsed.schema_version,
            MODULE_STATE_SCHEMA_VERSION
        );
    }
    for guild_id in parsed.guilds.keys() {
        if guild_id.trim().is_empty() {
            bail!("module state guild id must not be empty");
        }
    }
    Ok(parsed)
}

pub fn load_module_state_file(path: &Path) -> Result<ModuleStateFile> {
    if !path.exists() {
        return Ok(ModuleStateFile::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read module state {}", path.display()))?;
    parse_module_state_file(&raw)
        .with_context(|| format!("invalid module state {}", path.display()))
}

#[derive(Debug, Clone, Default)]
/// In-memory module switches. Unknown guilds, modules and fields read as disabled.
pub struct StaticModuleStates {
    guilds: BTreeMap<String, GuildModuleStates>,
}

impl StaticModuleStates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(file: ModuleStateFile) -> Self {
        Self {
            guilds: file.guilds,
        }
    }

    pub fn with_module(mut self, guild_id: &str, module: &str, enabled: bool) -> Self {
        self.module_entry(guild_id, module).enabled = enabled;
        self
    }

    pub fn with_field(mut self, guild_id: &str, module: &str, field: &str, enabled: bool) -> Self {
        self.module_entry(guild_id, module)
            .fields
            .insert(field.to_string(), enabled);
        self
    }

    fn module_entry(&mut self, guild_id: &str, module: &str) -> &mut ModuleState {
        self.guilds
            .entry(guild_id.to_string())
            .or_default()
            .modules
            .entry(module.to_string())
            .or_default()
    }

    fn lookup(&self, guild_id: &str, module: &str) -> Option<&ModuleState> {
        self.guilds.get(guild_id)?.modules.get(module)
    }
}

#[async_trait]
impl ModuleStateSource for StaticModuleStates {
    async fn module_enabled(&self, guild_id: &str, module: &str) -> Result<bool> {
        Ok(self
            .lookup(guild_id, module)
            .map(|state| state.enabled)
            .unwrap_or(false))
    }

    async fn module_field_enabled(
        &self,
        guild_id: &str,
        module: &str,
        field: &str,
    ) -> Result<bool> {
        Ok(self
            .lookup(guild_id, module)
            .and_then(|state| state.fields.get(field).copied())
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{
        load_module_state_file, parse_module_state_file, ModuleStateSource, StaticModuleStates,
    };

    #[tokio::test]
    async fn functional_static_module_states_reads_file_switches() {
        let file = parse_module_state_file(
            r#"{
  "schema_version": 1,
  "guilds": {
    "g1": { "modules": { "eco": { "enabled": true, "fields": { "shop_enabled": false } } } }
  }
}"#,
        )
        .expect("parse module state");
        let states = StaticModuleStates::from_file(file);
        assert!(states.module_enabled("g1", "eco").await.expect("eco"));
        assert!(!states
            .module_field_enabled("g1", "eco", "shop_enabled")
            .await
            .expect("field"));
        assert!(!states.module_enabled("g1", "level").await.expect("level"));
        assert!(!states.module_enabled("g2", "eco").await.expect("other guild"));
    }

    #[test]
    fn regression_module_state_rejects_unsupported_schema() {
        let error = parse_module_state_file(r#"{ "schema_version": 7 }"#).expect_err("schema");
        assert!(error
            .to_string()
            .contains("unsupported module state schema_version 7"));
    }

    #[test]
    fn integration_load_module_state_missing_file_defaults_to_empty() {
        let temp = tempdir().expect("tempdir");
        let loaded = load_module_state_file(&temp.path().join("module-state.json"))
            .expect("load missing file");
        assert!(loaded.guilds.is_empty());
    }
}
