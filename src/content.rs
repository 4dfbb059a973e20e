//! Curriculum content served from a JSON tree.
//!
//! Layout under the content root:
//! - `courses.json` - list of courses
//! - `{course}/curriculum.json` - levels and module metadata
//! - `{course}/{level}/{slug}.json` - one module
//! - `{course}/{slug}.json` - root pages (getting started, glossary)
//! - `{course}/competencies.json`, `{course}/resources.json` - optional

use crate::error::FluencyError;
use moka::future::Cache;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

const DEFAULT_LEVEL_COLOR: &str = "#6b7280";

static SEGMENT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseInfo {
    pub id: String,
    pub title: String,
    pub description: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMeta {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub level: String,
    pub slug: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub is_checkpoint: bool,
    #[serde(default)]
    pub is_index: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_practice_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_exam_bank: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfa_topic: Option<String>,
    #[serde(default, rename = "cfaLOS", skip_serializing_if = "Option::is_none")]
    pub cfa_los: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelInfo {
    pub level: u32,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub module_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_label: Option<String>,
}

impl LevelInfo {
    /// Directory name for this level: `foundations` for 0, else `level-N`.
    pub fn slug(&self) -> String {
        level_slug(self.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurriculumData {
    pub levels: Vec<LevelInfo>,
    pub modules: BTreeMap<String, Vec<ModuleMeta>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeProblem {
    pub id: String,
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfa_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_outcome: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Basic,
    Intermediate,
    Advanced,
}

/// One renderable block of a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    Markdown { content: String },
    PredictPrompt { prompt: String },
    ExplainBack { prompt: String },
    TryItYourself { title: String, solution: String },
    CalibrationCheck { question: String, answer: String },
    ReflectPrompt { questions: Vec<String> },
    ConnectPrompt { prompt: String },
    KeyTakeaway { content: String },
    PracticeSet {
        title: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vignette: Option<String>,
        problems: Vec<PracticeProblem>,
    },
    ProviderContent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        providers: BTreeMap<String, String>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleContent {
    pub meta: ModuleMeta,
    pub blocks: Vec<ContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competency {
    pub id: String,
    pub name: String,
    pub definition: String,
    pub professional_application: String,
    pub icon: String,
    pub levels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub author: String,
    pub description: String,
    pub levels: Vec<u32>,
    pub tags: Vec<String>,
}

/// Neighbours of a module in navigation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Adjacent {
    pub prev: Option<ModuleMeta>,
    pub next: Option<ModuleMeta>,
}

/// Directory name for a numeric level.
pub fn level_slug(level: u32) -> String {
    if level == 0 {
        "foundations".to_string()
    } else {
        format!("level-{}", level)
    }
}

fn level_number(slug: &str) -> Option<u32> {
    if slug == "foundations" {
        return Some(0);
    }
    slug.strip_prefix("level-")?.parse().ok()
}

/// Whether a path segment is safe to join onto the content root.
pub fn is_valid_segment(segment: &str) -> bool {
    SEGMENT_REGEX.is_match(segment)
}

fn check_segment(segment: &str) -> Result<(), FluencyError> {
    if is_valid_segment(segment) {
        Ok(())
    } else {
        Err(FluencyError::InvalidRequest(format!("invalid path segment '{}'", segment)))
    }
}

/// Read-only access to the content tree, with curricula cached.
#[derive(Clone)]
pub struct ContentLibrary {
    root: PathBuf,
    curricula: Cache<String, Arc<CurriculumData>>,
}

impl ContentLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_cache_ttl(root, Duration::from_secs(300))
    }

    pub fn with_cache_ttl(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            root: root.into(),
            curricula: Cache::builder().time_to_live(ttl).max_capacity(64).build(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, FluencyError> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FluencyError::NotFound(what.to_string()))
            }
            Err(e) => return Err(FluencyError::ContentError(format!("{}: {}", path.display(), e))),
        };
        serde_json::from_str(&raw)
            .map_err(|e| FluencyError::ContentError(format!("{}: {}", path.display(), e)))
    }

    async fn read_optional<T: DeserializeOwned + Default>(path: &Path, what: &str) -> Result<T, FluencyError> {
        match Self::read_json(path, what).await {
            Err(FluencyError::NotFound(_)) => Ok(T::default()),
            other => other,
        }
    }

    pub async fn courses(&self) -> Result<Vec<CourseInfo>, FluencyError> {
        Self::read_json(&self.root.join("courses.json"), "Course list").await
    }

    pub async fn curriculum(&self, course: &str) -> Result<Arc<CurriculumData>, FluencyError> {
        check_segment(course)?;
        let path = self.root.join(course).join("curriculum.json");
        self.curricula
            .try_get_with(course.to_string(), async move {
                Self::read_json::<CurriculumData>(&path, "Curriculum")
                    .await
                    .map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Module at `{course}/{level}/{slug}.json`; `None` if absent.
    pub async fn module(&self, course: &str, level: &str, slug: &str) -> Result<Option<ModuleContent>, FluencyError> {
        for segment in [course, level, slug] {
            check_segment(segment)?;
        }
        let path = self.root.join(course).join(level).join(format!("{}.json", slug));
        Self::found(Self::read_json(&path, "Module").await)
    }

    /// Resolve a slug path: one part is a root page, two are `level/slug`.
    pub async fn module_by_slug_path(&self, course: &str, parts: &[&str]) -> Result<Option<ModuleContent>, FluencyError> {
        match parts {
            [page] => {
                check_segment(course)?;
                check_segment(page)?;
                let path = self.root.join(course).join(format!("{}.json", page));
                Self::found(Self::read_json(&path, "Page").await)
            }
            [level, slug] => self.module(course, level, slug).await,
            _ => Ok(None),
        }
    }

    fn found<T>(result: Result<T, FluencyError>) -> Result<Option<T>, FluencyError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(FluencyError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Every module path across all courses, as slug-path parts.
    ///
    /// Courses without a curriculum are skipped.
    pub async fn all_module_paths(&self) -> Result<Vec<Vec<String>>, FluencyError> {
        let mut paths = Vec::new();
        for course in self.courses().await? {
            let curriculum = match self.curriculum(&course.id).await {
                Ok(c) => c,
                Err(FluencyError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for (level, modules) in &curriculum.modules {
                for module in modules {
                    if level == "root" {
                        paths.push(vec![course.id.clone(), module.slug.clone()]);
                    } else {
                        paths.push(vec![course.id.clone(), level.clone(), module.slug.clone()]);
                    }
                }
            }
        }
        Ok(paths)
    }

    /// Previous and next modules in curriculum order, skipping index pages.
    pub async fn adjacent_modules(&self, course: &str, level: &str, slug: &str) -> Result<Adjacent, FluencyError> {
        let curriculum = self.curriculum(course).await?;
        Ok(adjacent_in(&curriculum, level, slug))
    }

    pub async fn level_modules(&self, course: &str, level: &str) -> Result<Vec<ModuleMeta>, FluencyError> {
        let curriculum = self.curriculum(course).await?;
        Ok(curriculum.modules.get(level).cloned().unwrap_or_default())
    }

    pub async fn level_title(&self, course: &str, level: &str) -> Result<String, FluencyError> {
        let curriculum = self.curriculum(course).await?;
        Ok(find_level(&curriculum, level)
            .map(|l| l.title.clone())
            .unwrap_or_else(|| level.to_string()))
    }

    pub async fn level_color(&self, course: &str, level: &str) -> Result<String, FluencyError> {
        let curriculum = self.curriculum(course).await?;
        Ok(find_level(&curriculum, level)
            .map(|l| l.color.clone())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_LEVEL_COLOR.to_string()))
    }

    pub async fn competencies(&self, course: &str) -> Result<Vec<Competency>, FluencyError> {
        check_segment(course)?;
        Self::read_optional(&self.root.join(course).join("competencies.json"), "Competencies").await
    }

    pub async fn resources(&self, course: &str) -> Result<Vec<Resource>, FluencyError> {
        check_segment(course)?;
        Self::read_optional(&self.root.join(course).join("resources.json"), "Resources").await
    }

    /// Drop cached curricula (after content is redeployed).
    pub fn invalidate(&self) {
        self.curricula.invalidate_all();
    }
}

fn find_level<'a>(curriculum: &'a CurriculumData, level: &str) -> Option<&'a LevelInfo> {
    let number = level_number(level)?;
    curriculum.levels.iter().find(|l| l.level == number)
}

fn adjacent_in(curriculum: &CurriculumData, level: &str, slug: &str) -> Adjacent {
    let ordered: Vec<&ModuleMeta> = curriculum
        .levels
        .iter()
        .filter_map(|l| curriculum.modules.get(&l.slug()))
        .flat_map(|mods| mods.iter().filter(|m| !m.is_index))
        .collect();

    let Some(index) = ordered.iter().position(|m| m.level == level && m.slug == slug) else {
        return Adjacent::default();
    };

    Adjacent {
        prev: index.checked_sub(1).map(|i| ordered[i].clone()),
        next: ordered.get(index + 1).map(|m| (*m).clone()),
    }
}
