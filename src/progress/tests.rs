use super::*;
use pretty_assertions::assert_eq;

const MODULE: &str = "ai-fluency/foundations/tokens";
const LEVEL: &str = "foundations";

fn fresh() -> ProgressStore<MemoryBackend> {
    ProgressStore::open(MemoryBackend::new()).unwrap()
}

fn input(text: &str) -> InteractionUpdate {
    InteractionUpdate {
        user_input: Some(text.to_string()),
        ai_feedback: None,
    }
}

#[test]
fn empty_store_has_no_progress() {
    let store = fresh();
    assert!(store.module_progress(MODULE).is_none());
    assert!(store.interaction(MODULE, "explain-0").is_none());
    assert!(!store.is_module_complete(MODULE));
    assert_eq!(store.completed_interaction_count(MODULE), 0);
}

#[test]
fn mark_interaction_creates_module_record() {
    let mut store = fresh();
    store.mark_interaction(MODULE, LEVEL, "explain-0", input("tokens are pieces")).unwrap();

    let module = store.module_progress(MODULE).unwrap();
    assert_eq!(module.module_path, MODULE);
    assert_eq!(module.level_id, LEVEL);
    assert!(!module.completed);

    let interaction = store.interaction(MODULE, "explain-0").unwrap();
    assert!(interaction.completed);
    assert_eq!(interaction.user_input.as_deref(), Some("tokens are pieces"));
    assert!(interaction.completed_at.is_some());
}

#[test]
fn mark_interaction_merges_fields() {
    let mut store = fresh();
    store.mark_interaction(MODULE, LEVEL, "explain-0", input("first")).unwrap();
    store
        .mark_interaction(
            MODULE,
            LEVEL,
            "explain-0",
            InteractionUpdate {
                user_input: None,
                ai_feedback: Some("nice".to_string()),
            },
        )
        .unwrap();

    let interaction = store.interaction(MODULE, "explain-0").unwrap();
    assert_eq!(interaction.user_input.as_deref(), Some("first"));
    assert_eq!(interaction.ai_feedback.as_deref(), Some("nice"));
}

#[test]
fn repeated_mark_interaction_keeps_one_completed_entry() {
    let mut store = fresh();
    for _ in 0..3 {
        store.mark_interaction(MODULE, LEVEL, "predict-1", input("guess")).unwrap();
    }
    assert_eq!(store.completed_interaction_count(MODULE), 1);
    assert_eq!(store.module_progress(MODULE).unwrap().interactions.len(), 1);
}

#[test]
fn module_completion_is_sticky() {
    let mut store = fresh();
    store.mark_module_complete(MODULE, LEVEL).unwrap();
    store.mark_interaction(MODULE, LEVEL, "explain-0", input("later")).unwrap();

    assert!(store.is_module_complete(MODULE));
    assert!(store.module_progress(MODULE).unwrap().completed_at.is_some());
}

#[test]
fn level_counts_and_percentage() {
    let mut store = fresh();
    store.mark_module_complete("ai-fluency/level-1/a", "level-1").unwrap();
    store.mark_module_complete("ai-fluency/level-1/b", "level-1").unwrap();
    store.mark_interaction("ai-fluency/level-1/c", "level-1", "x", input("y")).unwrap();
    store.mark_module_complete(MODULE, LEVEL).unwrap();

    assert_eq!(store.level_completion_count("level-1"), 2);

    let progress = store.level_progress("level-1", 3);
    assert_eq!(progress.completed_modules, 2);
    assert_eq!(progress.total_modules, 3);
    assert_eq!(progress.percentage, 67);

    assert_eq!(store.level_progress("level-9", 0).percentage, 0);
}

#[test]
fn every_change_is_persisted() {
    let mut store = fresh();
    store.mark_interaction(MODULE, LEVEL, "explain-0", input("a")).unwrap();
    store.mark_module_complete(MODULE, LEVEL).unwrap();

    let backend = store.into_backend();
    let reopened = ProgressStore::open(MemoryBackend::with_blob(backend.blob().unwrap())).unwrap();
    assert!(reopened.is_module_complete(MODULE));
    assert_eq!(reopened.completed_interaction_count(MODULE), 1);
}

#[test]
fn blob_uses_camel_case_fields() {
    let mut store = fresh();
    store.mark_interaction(MODULE, LEVEL, "explain-0", input("a")).unwrap();

    let blob = store.into_backend().blob().unwrap().to_string();
    assert!(blob.contains("\"modulePath\""));
    assert!(blob.contains("\"levelId\""));
    assert!(blob.contains("\"userInput\""));
    assert!(blob.contains("\"completedAt\""));
    assert!(blob.contains("\"schemaVersion\":2"));
}

#[test]
fn corrupt_blob_opens_empty_without_saving() {
    let store = ProgressStore::open(MemoryBackend::with_blob("{not json")).unwrap();
    assert!(store.all().modules.is_empty());

    let backend = store.into_backend();
    assert_eq!(backend.saves(), 0);
    assert_eq!(backend.blob(), Some("{not json"));
}

#[test]
fn mismatched_file_is_left_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");
    let original = r#"{"modules":{"a/b/c":{"modulePath":1}}}"#;
    std::fs::write(&path, original).unwrap();

    let store = ProgressStore::open(JsonFileBackend::new(&path)).unwrap();
    assert!(store.all().modules.is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

    ProgressStore::open_read_only(JsonFileBackend::new(&path)).unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn read_only_open_migrates_in_memory_only() {
    let legacy = r#"{"modules":{"foundations/tokens":{"modulePath":"foundations/tokens","levelId":"foundations","completed":true,"interactions":{}}}}"#;

    let store = ProgressStore::open_read_only(MemoryBackend::with_blob(legacy)).unwrap();
    assert!(store.is_module_complete(MODULE));

    let backend = store.into_backend();
    assert_eq!(backend.saves(), 0);
    assert_eq!(backend.blob(), Some(legacy));
}

#[test]
fn plain_open_leaves_topic_split_for_later() {
    let legacy = r#"{"migrated":true,"modules":{"cfa-1/level-1/tv":{"modulePath":"cfa-1/level-1/tv","levelId":"level-1","completed":true,"interactions":{}}}}"#;

    let store = ProgressStore::open(MemoryBackend::with_blob(legacy)).unwrap();
    assert_eq!(store.all().schema_version, 1);
    assert!(!store.all().migrated_topics);
    let blob = store.into_backend().blob().unwrap().to_string();

    let migrator = Migrator::new(TopicMap::from_json(r#"{"cfa-1/level-1/tv":"cfa-1/level-2/tv"}"#).unwrap());
    let store = ProgressStore::open_with(MemoryBackend::with_blob(blob), &migrator).unwrap();

    let keys: Vec<&str> = store.all().modules.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["cfa-1/level-2/tv"]);
    assert_eq!(store.module_progress("cfa-1/level-2/tv").unwrap().level_id, "level-2");
    assert_eq!(store.all().schema_version, LATEST_SCHEMA_VERSION);
    assert_eq!(store.into_backend().saves(), 1);
}

#[test]
fn open_migrates_and_saves_legacy_blob() {
    let legacy = r#"{"modules":{"foundations/tokens":{"modulePath":"foundations/tokens","levelId":"foundations","completed":true,"interactions":{}}}}"#;

    let store = ProgressStore::open(MemoryBackend::with_blob(legacy)).unwrap();
    assert!(store.is_module_complete(MODULE));
    assert_eq!(store.all().schema_version, 1);

    let backend = store.into_backend();
    assert_eq!(backend.saves(), 1);
    assert!(backend.blob().unwrap().contains(MODULE));
}

#[test]
fn current_blob_is_not_rewritten_on_open() {
    let current = r#"{"modules":{},"schemaVersion":2,"migrated":true,"migratedTopics":true}"#;
    let store = ProgressStore::open(MemoryBackend::with_blob(current)).unwrap();
    assert_eq!(store.into_backend().saves(), 0);
}

#[test]
fn reopening_twice_yields_same_keys() {
    let legacy = r#"{"modules":{
        "foundations/tokens":{"modulePath":"foundations/tokens","levelId":"foundations","completed":true,"interactions":{}},
        "cfa-1/level-1/time-value":{"modulePath":"cfa-1/level-1/time-value","levelId":"level-1","completed":false,"interactions":{}}
    }}"#;
    let migrator = Migrator::new(
        TopicMap::from_json(r#"{"cfa-1/level-1/time-value":"cfa-1/level-2/time-value"}"#).unwrap(),
    );

    let first = ProgressStore::open_with(MemoryBackend::with_blob(legacy), &migrator).unwrap();
    let keys_first: Vec<String> = first.all().modules.keys().cloned().collect();
    let blob = first.into_backend().blob().unwrap().to_string();

    let second = ProgressStore::open_with(MemoryBackend::with_blob(blob), &migrator).unwrap();
    let keys_second: Vec<String> = second.all().modules.keys().cloned().collect();

    assert_eq!(keys_first, keys_second);
    assert_eq!(
        keys_first,
        vec!["ai-fluency/foundations/tokens".to_string(), "cfa-1/level-2/time-value".to_string()]
    );
    assert_eq!(second.into_backend().saves(), 0);
}

#[test]
fn file_backend_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.json");

    let mut store = ProgressStore::open(JsonFileBackend::new(&path)).unwrap();
    store.mark_module_complete(MODULE, LEVEL).unwrap();

    let reopened = ProgressStore::open(JsonFileBackend::new(&path)).unwrap();
    assert!(reopened.is_module_complete(MODULE));
}
