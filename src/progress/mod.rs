//! Learner progress.
//!
//! Progress is one serialized blob (the browser keeps it under the
//! `aif_progress` local-storage key) holding a map of module path to
//! [`ModuleProgress`]. Every mutation is read-modify-write of the whole blob.

mod backend;
mod migrate;

#[cfg(test)]
mod tests;

pub use backend::{JsonFileBackend, MemoryBackend, ProgressBackend};
pub use migrate::{Migrator, TopicMap, LATEST_SCHEMA_VERSION};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Course that owned every module before courses were introduced.
pub const DEFAULT_COURSE: &str = "ai-fluency";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionState {
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// Fields a caller may set on an interaction; `None` leaves the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionUpdate {
    pub user_input: Option<String>,
    pub ai_feedback: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgress {
    pub module_path: String,
    pub level_id: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub interactions: BTreeMap<String, InteractionState>,
}

impl ModuleProgress {
    fn new(module_path: &str, level_id: &str) -> Self {
        Self {
            module_path: module_path.to_string(),
            level_id: level_id.to_string(),
            ..Self::default()
        }
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// The whole progress blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressData {
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub migrated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub migrated_topics: bool,
}

impl ProgressData {
    /// Empty progress at the latest schema; nothing in it needs migrating.
    pub fn fresh() -> Self {
        Self {
            schema_version: LATEST_SCHEMA_VERSION,
            migrated: true,
            migrated_topics: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress<'a> {
    pub level_id: &'a str,
    pub total_modules: usize,
    pub completed_modules: usize,
    pub percentage: u32,
}

#[derive(Debug)]
pub enum ProgressError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl std::fmt::Display for ProgressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProgressError::Io(e) => write!(f, "IO error: {}", e),
            ProgressError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ProgressError {}

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Progress loaded from a backend, written back on every change.
pub struct ProgressStore<B: ProgressBackend> {
    backend: B,
    data: ProgressData,
}

impl<B: ProgressBackend> ProgressStore<B> {
    /// Open with the built-in migrations only (no topic renames).
    pub fn open(backend: B) -> Result<Self, ProgressError> {
        Self::open_with(backend, &Migrator::default())
    }

    /// Load, migrate, and persist if any migration step ran.
    ///
    /// A blob that fails to parse is treated as empty progress and left on
    /// disk untouched until the next change is recorded.
    pub fn open_with(backend: B, migrator: &Migrator) -> Result<Self, ProgressError> {
        let (mut store, migrated) = Self::load(backend, migrator)?;
        if migrated {
            store.persist()?;
        }
        Ok(store)
    }

    /// Load and migrate in memory without ever writing to the backend.
    pub fn open_read_only(backend: B) -> Result<Self, ProgressError> {
        Ok(Self::load(backend, &Migrator::default())?.0)
    }

    /// Returns the store and whether a readable blob was migrated.
    fn load(mut backend: B, migrator: &Migrator) -> Result<(Self, bool), ProgressError> {
        let Some(raw) = backend.load()? else {
            return Ok((
                Self {
                    backend,
                    data: ProgressData::fresh(),
                },
                false,
            ));
        };

        let mut data = match serde_json::from_str::<ProgressData>(&raw) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable progress");
                return Ok((
                    Self {
                        backend,
                        data: ProgressData::fresh(),
                    },
                    false,
                ));
            }
        };

        let applied = migrator.migrate(&mut data);
        if !applied.is_empty() {
            tracing::info!(steps = ?applied, "Migrated progress");
        }
        Ok((Self { backend, data }, !applied.is_empty()))
    }

    fn persist(&mut self) -> Result<(), ProgressError> {
        let raw = serde_json::to_string(&self.data).map_err(ProgressError::Serialize)?;
        self.backend.save(&raw)
    }

    fn entry(&mut self, module_path: &str, level_id: &str) -> &mut ModuleProgress {
        self.data
            .modules
            .entry(module_path.to_string())
            .or_insert_with(|| ModuleProgress::new(module_path, level_id))
    }

    pub fn module_progress(&self, module_path: &str) -> Option<&ModuleProgress> {
        self.data.modules.get(module_path)
    }

    pub fn interaction(&self, module_path: &str, key: &str) -> Option<&InteractionState> {
        self.module_progress(module_path)?.interactions.get(key)
    }

    /// Record an answered interaction; always marks it completed.
    pub fn mark_interaction(
        &mut self,
        module_path: &str,
        level_id: &str,
        key: &str,
        update: InteractionUpdate,
    ) -> Result<(), ProgressError> {
        let state = self
            .entry(module_path, level_id)
            .interactions
            .entry(key.to_string())
            .or_default();

        if let Some(input) = update.user_input {
            state.user_input = Some(input);
        }
        if let Some(feedback) = update.ai_feedback {
            state.ai_feedback = Some(feedback);
        }
        state.completed = true;
        state.completed_at = Some(now_iso());

        self.persist()
    }

    pub fn mark_module_complete(&mut self, module_path: &str, level_id: &str) -> Result<(), ProgressError> {
        let module = self.entry(module_path, level_id);
        module.completed = true;
        module.completed_at = Some(now_iso());
        self.persist()
    }

    pub fn is_module_complete(&self, module_path: &str) -> bool {
        self.module_progress(module_path).is_some_and(|m| m.completed)
    }

    pub fn completed_interaction_count(&self, module_path: &str) -> usize {
        self.module_progress(module_path)
            .map(|m| m.interactions.values().filter(|i| i.completed).count())
            .unwrap_or(0)
    }

    pub fn level_completion_count(&self, level_id: &str) -> usize {
        self.data
            .modules
            .values()
            .filter(|m| m.level_id == level_id && m.completed)
            .count()
    }

    /// Completion of a level with `total_modules` modules, rounded to a whole percent.
    pub fn level_progress<'a>(&self, level_id: &'a str, total_modules: usize) -> LevelProgress<'a> {
        let completed_modules = self.level_completion_count(level_id);
        let percentage = if total_modules == 0 {
            0
        } else {
            ((completed_modules as f64 / total_modules as f64) * 100.0).round() as u32
        };
        LevelProgress {
            level_id,
            total_modules,
            completed_modules,
            percentage,
        }
    }

    pub fn all(&self) -> &ProgressData {
        &self.data
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}
