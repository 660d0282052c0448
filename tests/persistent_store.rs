//! File-backed stores: durability across reopen, corruption recovery and
//! single-process ownership.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use dossier::clock::ManualClock;
use dossier::storage::{open_store, CollectionStore, RecordStore, StorageError};
use dossier::{CanonicalCollection, Config, ContentBundle, Entry, EntryCollection, SourceInfo, StageStatus, Workspace};

fn config_for(dir: &Path) -> Config {
    let mut config = Config::default();
    config.storage.data_dir = dir.to_path_buf();
    config.storage.sync_on_write = false;
    config
}

fn open(dir: &Path) -> Workspace {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()));
    Workspace::open_with_clock(&config_for(dir), clock).unwrap()
}

fn bundle() -> ContentBundle {
    ContentBundle {
        projects: vec![Entry::new().with("title", "Compiler").with("description", "A toy compiler")],
        patents: vec![Entry::new().with("title", "Widget")],
        ..ContentBundle::default()
    }
}

#[test]
fn test_records_survive_reopen() {
    let dir = tempdir().unwrap();
    let id = {
        let ws = open(dir.path());
        let id = ws.staging().propose(bundle(), SourceInfo::from_files(["a.json"])).unwrap();
        ws.staging().approve(&id).unwrap();
        id
    };

    assert!(dir.path().join("staging").join(format!("{id}.json")).exists());
    assert!(dir.path().join("knowledge_base").join("projects.json").exists());

    let ws = open(dir.path());
    let record = ws.staging().get(&id).unwrap().unwrap();
    assert_eq!(record.status, StageStatus::Approved);
    let kb = ws.merger().snapshot().unwrap();
    assert_eq!(kb.projects.len(), 1);
    assert_eq!(kb.patents[0].text("description"), Some(""));
}

#[test]
fn test_second_process_is_locked_out() {
    let dir = tempdir().unwrap();
    let _ws = open(dir.path());
    let err = open_store(dir.path(), None).err().unwrap();
    assert!(matches!(err, StorageError::Locked(_)));
}

#[test]
fn test_corrupt_collection_is_quarantined_and_rebuilt() {
    let dir = tempdir().unwrap();
    let kb = dir.path().join("knowledge_base");
    fs::create_dir_all(&kb).unwrap();
    fs::write(kb.join("projects.json"), b"{\"projects\": [ truncated").unwrap();
    fs::write(
        kb.join("patents.json"),
        serde_json::to_vec(&serde_json::json!({"patents": [{"title": "Flux capacitor", "description": "", "year": null}]})).unwrap(),
    )
    .unwrap();

    let ws = open(dir.path());
    let summary = ws.merger().merge(&bundle(), None);
    assert!(summary.is_complete());
    assert_eq!(summary.projects_added, 1);
    assert_eq!(summary.patents_added, 1);

    let snapshot = ws.merger().snapshot().unwrap();
    assert_eq!(snapshot.projects.len(), 1);
    assert_eq!(snapshot.patents.len(), 2);

    let quarantined: Vec<_> = fs::read_dir(&kb)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("projects.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(
        fs::read(kb.join(&quarantined[0])).unwrap(),
        b"{\"projects\": [ truncated".to_vec()
    );
}

#[test]
fn test_stale_temp_files_swept_on_open() {
    let dir = tempdir().unwrap();
    let staging = dir.path().join("staging");
    fs::create_dir_all(&staging).unwrap();
    let stale = staging.join("0123456789ab.json.tmp.00000000-0000-0000-0000-000000000000");
    fs::write(&stale, b"{").unwrap();

    let stores = open_store(dir.path(), None).unwrap();
    assert!(!stale.exists());
    assert!(stores.records.list().unwrap().is_empty());
}

#[test]
fn test_collection_files_are_plain_json() {
    let dir = tempdir().unwrap();
    let stores = open_store(dir.path(), None).unwrap();
    stores
        .collections
        .store_entries(EntryCollection::Certifications, &[Entry::new().with("name", "CKA")])
        .unwrap();

    let path = stores.collections.path_of(CanonicalCollection::Certifications);
    let doc: serde_json::Value = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
    assert_eq!(doc, serde_json::json!({"certifications": [{"name": "CKA"}]}));
}

#[test]
fn test_unreadable_record_does_not_hide_others() {
    let dir = tempdir().unwrap();
    let id = {
        let ws = open(dir.path());
        ws.staging().propose(bundle(), SourceInfo::default()).unwrap()
    };
    fs::write(dir.path().join("staging").join("ffffffffffff.json"), b"not json").unwrap();

    let ws = open(dir.path());
    let rows = ws.staging().list(None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
}
