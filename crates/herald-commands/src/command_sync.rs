use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::future::join_all;
use herald_core::{current_unix_timestamp_ms, write_text_atomic};
use serde::{Deserialize, Serialize};

use crate::{build_scope_schemas, serialize_scope_schema, RouteTable, SyncScope};

pub const SYNC_CACHE_SCHEMA_VERSION: u32 = 1;
pub const SYNC_CACHE_FILE_NAME: &str = "command-sync-cache.json";
/// Payload written to a scope that no longer has any commands.
pub const CLEARED_SCHEMA_PAYLOAD: &str = "[]";

/// Last-applied serialized schema per scope key.
pub trait SyncCacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, payload: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// Remote command-registration API. Each call replaces the whole schema set of a scope.
#[async_trait]
pub trait CommandRegistrar: Send + Sync {
    async fn overwrite_commands(&self, scope: &SyncScope, payload: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemorySyncCache {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemorySyncCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?
            .clone())
    }
}

impl SyncCacheStore for InMemorySyncCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, payload: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        Ok(entries.keys().cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCacheEntry {
    pub payload: String,
    pub updated_unix_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SyncCacheFile {
    schema_version: u32,
    #[serde(default)]
    entries: BTreeMap<String, SyncCacheEntry>,
}

impl Default for SyncCacheFile {
    fn default() -> Self {
        Self {
            schema_version: SYNC_CACHE_SCHEMA_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

/// JSON-file sync cache. Every mutation is persisted with an atomic rename.
#[derive(Debug)]
pub struct FileSyncCache {
    path: PathBuf,
    state: Mutex<SyncCacheFile>,
}

impl FileSyncCache {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read sync cache {}", path.display()))?;
            serde_json::from_str::<SyncCacheFile>(&raw)
                .with_context(|| format!("failed to parse sync cache {}", path.display()))?
        } else {
            SyncCacheFile::default()
        };
        if state.schema_version != SYNC_CACHE_SCHEMA_VERSION {
            bail!(
                "unsupported sync cache schema_version {} (expected {})",
                state.schema_version,
                SYNC_CACHE_SCHEMA_VERSION
            );
        }
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn load_in(state_dir: &Path) -> Result<Self> {
        Self::load(state_dir.join(SYNC_CACHE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry(&self, key: &str) -> Result<Option<SyncCacheEntry>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        Ok(state.entries.get(key).cloned())
    }

    fn save(&self, state: &SyncCacheFile) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(state).context("failed to serialize sync cache")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write sync cache {}", self.path.display()))
    }
}

impl SyncCacheStore for FileSyncCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entry(key)?.map(|entry| entry.payload))
    }

    fn set(&self, key: &str, payload: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        let mut next = state.clone();
        next.entries.insert(
            key.to_string(),
            SyncCacheEntry {
                payload: payload.to_string(),
                updated_unix_ms: current_unix_timestamp_ms(),
            },
        );
        self.save(&next)?;
        *state = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        if !state.entries.contains_key(key) {
            return Ok(());
        }
        let mut next = state.clone();
        next.entries.remove(key);
        self.save(&next)?;
        *state = next;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("sync cache mutex is poisoned"))?;
        Ok(state.entries.keys().cloned().collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncScopeOutcome {
    /// Cached payload already matched; no remote call.
    Unchanged,
    Written,
    /// Scope had no commands left and was emptied remotely.
    Cleared,
    Failed { error: String },
}

impl SyncScopeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Written => "written",
            Self::Cleared => "cleared",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-scope results of one reconciliation pass, keyed by cache key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub outcomes: BTreeMap<String, SyncScopeOutcome>,
}

impl SyncReport {
    pub fn outcome(&self, key: &str) -> Option<&SyncScopeOutcome> {
        self.outcomes.get(key)
    }

    /// Remote calls that were attempted, successful or not.
    pub fn remote_writes(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| !matches!(outcome, SyncScopeOutcome::Unchanged))
            .count()
    }

    pub fn failures(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| matches!(outcome, SyncScopeOutcome::Failed { .. }))
            .count()
    }
}

struct PendingWrite {
    scope: SyncScope,
    payload: String,
    clears: bool,
}

/// Reconciles a route table's schemas with the remote registration API.
#[derive(Clone)]
pub struct CommandSynchronizer {
    registrar: Arc<dyn CommandRegistrar>,
    cache: Arc<dyn SyncCacheStore>,
}

impl CommandSynchronizer {
    pub fn new(registrar: Arc<dyn CommandRegistrar>, cache: Arc<dyn SyncCacheStore>) -> Self {
        Self { registrar, cache }
    }

    /// Writes every scope whose serialized schema differs from the cache and
    /// clears every cached scope the table no longer produces.
    ///
    /// A failed scope is reported and left uncached so the next pass retries it.
    /// Only an unreadable cache key listing aborts the pass.
    #[tracing::instrument(name = "herald.sync.reconcile", skip_all, fields(commands = table.len()))]
    pub async fn reconcile(&self, table: &RouteTable) -> Result<SyncReport> {
        let schemas = build_scope_schemas(table);
        let mut report = SyncReport::default();
        let mut pending = Vec::new();

        for (scope, commands) in &schemas {
            let key = scope.cache_key();
            let payload = match serialize_scope_schema(commands) {
                Ok(payload) => payload,
                Err(error) => {
                    tracing::warn!(scope = %scope, error = %error, "skipping unserializable scope");
                    report.outcomes.insert(
                        key,
                        SyncScopeOutcome::Failed {
                            error: format!("{error:#}"),
                        },
                    );
                    continue;
                }
            };
            let cached = match self.cache.get(&key) {
                Ok(cached) => cached,
                Err(error) => {
                    tracing::warn!(scope = %scope, error = %error, "sync cache read failed; rewriting scope");
                    None
                }
            };
            if cached.as_deref() == Some(payload.as_str()) {
                tracing::debug!(scope = %scope, "scope schema unchanged");
                report.outcomes.insert(key, SyncScopeOutcome::Unchanged);
                continue;
            }
            pending.push(PendingWrite {
                scope: scope.clone(),
                payload,
                clears: false,
            });
        }

        let produced = schemas
            .keys()
            .map(SyncScope::cache_key)
            .collect::<BTreeSet<_>>();
        let cached_keys = self
            .cache
            .keys()
            .context("failed to list sync cache scopes")?;
        for key in cached_keys {
            if produced.contains(&key) {
                continue;
            }
            pending.push(PendingWrite {
                scope: SyncScope::from_cache_key(&key),
                payload: CLEARED_SCHEMA_PAYLOAD.to_string(),
                clears: true,
            });
        }

        let results = join_all(pending.into_iter().map(|write| self.apply(write))).await;
        report.outcomes.extend(results);
        tracing::debug!(
            scopes = report.outcomes.len(),
            remote_writes = report.remote_writes(),
            failures = report.failures(),
            "command sync pass complete"
        );
        Ok(report)
    }

    async fn apply(&self, write: PendingWrite) -> (String, SyncScopeOutcome) {
        let key = write.scope.cache_key();
        if let Err(error) = self
            .registrar
            .overwrite_commands(&write.scope, &write.payload)
            .await
        {
            tracing::warn!(
                scope = %write.scope,
                error = %format!("{error:#}"),
                "remote command write failed; scope stays unsynced"
            );
            return (
                key,
                SyncScopeOutcome::Failed {
                    error: format!("{error:#}"),
                },
            );
        }

        let cache_update = if write.clears {
            self.cache.remove(&key)
        } else {
            self.cache.set(&key, &write.payload)
        };
        if let Err(error) = cache_update {
            tracing::warn!(
                scope = %write.scope,
                error = %format!("{error:#}"),
                "remote command write applied but sync cache update failed"
            );
        }

        if write.clears {
            tracing::debug!(scope = %write.scope, "cleared stale scope");
            (key, SyncScopeOutcome::Cleared)
        } else {
            tracing::debug!(scope = %write.scope, bytes = write.payload.len(), "wrote scope schema");
            (key, SyncScopeOutcome::Written)
        }
    }
}
