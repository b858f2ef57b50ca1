use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use herald_access::AccessPolicy;
use serde::{Deserialize, Serialize};

use crate::{
    CommandDescriptor, CommandOption, CommandRegistry, FreeTextHandler, FreeTextSpec,
    LocalizationMap, StructuredHandler,
};

pub const COMMAND_MANIFEST_SCHEMA_VERSION: u32 = 1;

fn default_true() -> bool {
    true
}

/// One command declared in a manifest file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandManifestEntry {
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub name_localizations: LocalizationMap,
    #[serde(default)]
    pub description_localizations: LocalizationMap,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub access: AccessPolicy,
    /// Present when the command also answers prefixed free text.
    #[serde(default)]
    pub free_text: Option<FreeTextSpec>,
    #[serde(default)]
    pub restricted_scopes: Vec<String>,
    /// Whether the command is exposed as a structured command.
    #[serde(default = "default_true")]
    pub structured: bool,
    /// Reply template handed to the handler factory.
    #[serde(default)]
    pub reply: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub commands: Vec<CommandManifestEntry>,
}

/// Supplies handlers for manifest entries.
pub trait ManifestHandlerFactory {
    fn structured_handler(&self, entry: &CommandManifestEntry) -> Arc<dyn StructuredHandler>;
    fn free_text_handler(&self, entry: &CommandManifestEntry) -> Arc<dyn FreeTextHandler>;
}

pub fn parse_command_manifest(raw: &str) -> Result<CommandManifest> {
    let manifest = serde_json::from_str::<CommandManifest>(raw)
        .context("failed to parse command manifest")?;
    if manifest.schema_version != COMMAND_MANIFEST_SCHEMA_VERSION {
        bail!(
            "unsupported command manifest schema_version {} (expected {})",
            manifest.schema_version,
            COMMAND_MANIFEST_SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

pub fn load_command_manifest(path: &Path) -> Result<CommandManifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read command manifest {}", path.display()))?;
    parse_command_manifest(&raw)
        .with_context(|| format!("invalid command manifest {}", path.display()))
}

impl CommandManifestEntry {
    /// Builds a descriptor. Entries with neither surface enabled yield a
    /// handler-less descriptor that the registry rejects.
    pub fn to_descriptor(&self, factory: &dyn ManifestHandlerFactory) -> CommandDescriptor {
        let mut descriptor = CommandDescriptor::new(self.location.clone())
            .describe(self.description.clone())
            .with_access(self.access.clone());
        descriptor.name_localizations = self.name_localizations.clone();
        descriptor.description_localizations = self.description_localizations.clone();
        descriptor.options = self.options.clone();
        descriptor.restricted_scopes = self.restricted_scopes.clone();
        if self.structured {
            descriptor = descriptor.on_structured(factory.structured_handler(self));
        }
        if let Some(spec) = &self.free_text {
            descriptor = descriptor
                .with_free_text(spec.clone())
                .on_free_text(factory.free_text_handler(self));
        }
        descriptor
    }
}

impl CommandManifest {
    pub fn to_registry(&self, factory: &dyn ManifestHandlerFactory) -> CommandRegistry {
        let mut registry = CommandRegistry::new();
        for entry in &self.commands {
            registry.register(entry.to_descriptor(factory));
        }
        registry
    }
}
