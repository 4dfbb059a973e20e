//! Versioned progress migrations.
//!
//! Blobs written before versioning carry boolean flags instead of a
//! `schemaVersion`: `migrated` means version 1 ran, `migratedTopics` means
//! version 2 ran. The flags are kept in step with the version so older
//! readers skip the same steps.
//!
//! Version 2 needs a rename map. A migrator without one stops at version 1,
//! leaving the topic split for a later pass that has the map.

use super::{ModuleProgress, ProgressData, DEFAULT_COURSE};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Old module path to new module path, as written by the CFA restructure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct TopicMap(BTreeMap<String, String>);

impl TopicMap {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn get(&self, path: &str) -> Option<&str> {
        self.0.get(path).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for TopicMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Migrator {
    topics: TopicMap,
}

impl Migrator {
    pub fn new(topics: TopicMap) -> Self {
        Self { topics }
    }

    /// Run every step newer than the blob's version; returns the versions applied.
    pub fn migrate(&self, data: &mut ProgressData) -> Vec<u32> {
        let mut version = effective_version(data);
        let mut applied = Vec::new();

        if version < 1 {
            namespace_legacy_paths(data);
            version = 1;
            applied.push(1);
        }
        if version < 2 && !self.topics.is_empty() {
            split_topics(data, &self.topics);
            version = 2;
            applied.push(2);
        }

        let stamped = data.schema_version == version
            && data.migrated == (version >= 1)
            && data.migrated_topics == (version >= 2);
        data.schema_version = version;
        data.migrated = version >= 1;
        data.migrated_topics = version >= 2;
        if applied.is_empty() && !stamped {
            // flags were inconsistent with the version; rewrite them
            applied.push(version);
        }
        applied
    }
}

fn effective_version(data: &ProgressData) -> u32 {
    let legacy = if data.migrated_topics {
        2
    } else if data.migrated {
        1
    } else {
        0
    };
    data.schema_version.max(legacy)
}

/// Move `modules[old]` to `new_path`, unless a record already sits there.
fn rename(data: &mut ProgressData, old: &str, new_path: &str, retag: impl FnOnce(&mut ModuleProgress)) {
    let Some(mut record) = data.modules.remove(old) else {
        return;
    };
    if data.modules.contains_key(new_path) {
        return;
    }
    record.module_path = new_path.to_string();
    retag(&mut record);
    data.modules.insert(new_path.to_string(), record);
}

/// v1: `level/slug` keys predate courses and belong to the default course.
fn namespace_legacy_paths(data: &mut ProgressData) {
    let legacy: Vec<String> = data
        .modules
        .keys()
        .filter(|k| k.split('/').count() == 2)
        .cloned()
        .collect();

    for old in legacy {
        let new_path = format!("{}/{}", DEFAULT_COURSE, old);
        rename(data, &old, &new_path, |_| {});
    }
}

/// v2: single-level CFA paths moved to per-topic levels.
fn split_topics(data: &mut ProgressData, topics: &TopicMap) {
    let moved: Vec<(String, String)> = data
        .modules
        .keys()
        .filter_map(|k| topics.get(k).map(|new| (k.clone(), new.to_string())))
        .collect();

    for (old, new_path) in moved {
        let level = new_path.split('/').nth(1).map(str::to_string);
        rename(data, &old, &new_path, |record| {
            if let Some(level) = level {
                record.level_id = level;
            }
        });
    }
}
