//! Per-session function cache.
//!
//! Each application owns one [`FunctionCache`] per [`CacheKind`]. Entries are
//! keyed by `(session, assistant)` and hold every target declared for that
//! pair while building its configuration. Entries leave the cache through
//! explicit removal at end of call, age-based purging, or a full clear.
//!
//! All operations go through `DashMap`'s per-shard locking, so a purge sweep
//! can run while live requests add and read entries. Guards are never handed
//! out: reads return a cheap clone of the entry.

use crate::definition::ToolDefinition;
use crate::details::FunctionDetails;
use crate::error::CacheError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use voxhook_types::{CacheKey, CacheKind, SessionId};

/// The targets registered for one `(session, assistant)` pair.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    key: CacheKey,
    created: Instant,
    functions: HashMap<String, Arc<FunctionDetails>>,
}

impl FunctionInfo {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            created: Instant::now(),
            functions: HashMap::new(),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Time elapsed since the entry was created.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<FunctionDetails>> {
        self.functions.get(name).cloned()
    }

    /// Sorted names of the registered targets.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn snapshot(&self) -> EntrySnapshot {
        let mut functions: Vec<FunctionSnapshot> = self
            .functions
            .values()
            .map(|details| FunctionSnapshot {
                name: details.name().to_string(),
                target: details.qualified_name(),
                description: details.description().to_string(),
                params: details
                    .params()
                    .iter()
                    .map(|p| ParamSnapshot {
                        name: p.name.clone(),
                        kind: p.kind.as_str(),
                    })
                    .collect(),
                fire_and_forget: details.is_fire_and_forget(),
            })
            .collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name));

        EntrySnapshot {
            session_id: self.key.session_id.to_string(),
            assistant_id: self.key.assistant_id.to_string(),
            age_seconds: self.age().as_secs(),
            functions,
        }
    }
}

/// Diagnostic view of a whole cache. Names and ages only, never arguments.
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshot {
    pub kind: CacheKind,
    #[serde(rename = "entryCount")]
    pub entry_count: usize,
    #[serde(rename = "lastPurge")]
    pub last_purge: Option<DateTime<Utc>>,
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntrySnapshot {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "assistantId")]
    pub assistant_id: String,
    #[serde(rename = "ageSeconds")]
    pub age_seconds: u64,
    pub functions: Vec<FunctionSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionSnapshot {
    pub name: String,
    pub target: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub params: Vec<ParamSnapshot>,
    #[serde(rename = "fireAndForget")]
    pub fire_and_forget: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSnapshot {
    pub name: String,
    pub kind: &'static str,
}

/// Concurrent map from [`CacheKey`] to [`FunctionInfo`].
#[derive(Debug)]
pub struct FunctionCache {
    kind: CacheKind,
    entries: DashMap<CacheKey, FunctionInfo>,
    last_purge: Mutex<Option<DateTime<Utc>>>,
}

impl FunctionCache {
    pub fn new(kind: CacheKind) -> Self {
        Self {
            kind,
            entries: DashMap::new(),
            last_purge: Mutex::new(None),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Registers `definition` under `key`, creating the entry if needed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::AlreadyDeclared`] if a target with the same name
    /// is already registered for `key`. The existing target is kept.
    pub fn add(&self, key: CacheKey, definition: ToolDefinition) -> Result<(), CacheError> {
        let name = definition.name().to_string();
        let mut info = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| FunctionInfo::new(key.clone()));

        if info.functions.contains_key(&name) {
            return Err(CacheError::AlreadyDeclared {
                kind: self.kind,
                key,
                name,
            });
        }

        tracing::debug!(kind = %self.kind, %key, name = %name, "registered function");
        info.functions
            .insert(name, Arc::new(FunctionDetails::from(definition)));
        Ok(())
    }

    /// Returns the entry for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NotFound`] when the key was never registered or
    /// has already been removed or purged.
    pub fn get(&self, key: &CacheKey) -> Result<FunctionInfo, CacheError> {
        self.entries
            .get(key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CacheError::NotFound {
                kind: self.kind,
                key: key.clone(),
            })
    }

    /// Looks up a single target.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if the key is absent,
    /// [`CacheError::FunctionNotFound`] if the entry has no such name.
    pub fn function(&self, key: &CacheKey, name: &str) -> Result<Arc<FunctionDetails>, CacheError> {
        self.get(key)?
            .get(name)
            .ok_or_else(|| CacheError::FunctionNotFound {
                kind: self.kind,
                key: key.clone(),
                name: name.to_string(),
            })
    }

    /// Removes the entry for `key`, running `on_removed` if one existed.
    ///
    /// Absence is expected (end-of-call cleanup is idempotent) and is not an
    /// error.
    pub fn remove<F>(&self, key: &CacheKey, on_removed: F) -> Option<FunctionInfo>
    where
        F: FnOnce(&FunctionInfo),
    {
        match self.entries.remove(key) {
            Some((_, info)) => {
                on_removed(&info);
                Some(info)
            }
            None => {
                tracing::debug!(kind = %self.kind, %key, "cache entry already absent");
                None
            }
        }
    }

    /// Removes every entry belonging to `session`. Returns how many were removed.
    pub fn remove_session<F>(&self, session: &SessionId, mut on_removed: F) -> usize
    where
        F: FnMut(&FunctionInfo),
    {
        // Collect first so no shard guard is held while removing.
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|entry| entry.key().session_id == *session)
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for key in keys {
            if let Some((_, info)) = self.entries.remove(&key) {
                on_removed(&info);
                removed += 1;
            }
        }
        if removed == 0 {
            tracing::debug!(kind = %self.kind, session = %session, "no cache entries for session");
        }
        removed
    }

    /// Removes entries older than `max_age`. Returns the number removed.
    pub fn purge(&self, max_age: Duration) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, info| {
            let keep = info.age() <= max_age;
            if !keep {
                tracing::debug!(kind = %self.kind, %key, age_secs = info.age().as_secs(), "purging cache entry");
                removed += 1;
            }
            keep
        });
        *self.lock_last_purge() = Some(Utc::now());
        removed
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn last_purge(&self) -> Option<DateTime<Utc>> {
        *self.lock_last_purge()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let mut entries: Vec<EntrySnapshot> = self
            .entries
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect();
        entries.sort_by(|a, b| {
            (&a.session_id, &a.assistant_id).cmp(&(&b.session_id, &b.assistant_id))
        });

        CacheSnapshot {
            kind: self.kind,
            entry_count: entries.len(),
            last_purge: self.last_purge(),
            entries,
        }
    }

    /// JSON form of [`snapshot`](Self::snapshot).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_else(|e| {
            tracing::error!("failed to serialize cache snapshot: {}", e);
            serde_json::Value::Null
        })
    }

    fn lock_last_purge(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        match self.last_purge.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!("cache purge timestamp lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}
