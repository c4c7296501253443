use licensedb_core::{Backend, Database, Document, Filter, LicenseService, StoreConfig, SystemService};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

const WRITERS: usize = 16;

fn count(db: &Database, collection: &str) -> usize {
    db.collection(collection).count(&Filter::new()).unwrap()
}

#[test]
fn concurrent_creates_through_one_handle_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&StoreConfig::json(dir.path())).unwrap());

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                db.collection("licenses")
                    .create(Document::new().with("seq", json!(n)))
                    .unwrap()
                    .id()
                    .unwrap()
            })
        })
        .collect();
    let ids: HashSet<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(ids.len(), WRITERS);
    assert_eq!(count(&db, "licenses"), WRITERS);
}

#[test]
fn concurrent_creates_through_separate_handles_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().to_path_buf();

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let path = path.clone();
            thread::spawn(move || {
                let db = Database::open(&StoreConfig::json(path)).unwrap();
                db.collection("systems")
                    .create(Document::new().with("seq", json!(n)))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let db = Database::open(&StoreConfig::json(&path)).unwrap();
    assert_eq!(count(&db, "systems"), WRITERS);
    let seqs = db.collection("systems").distinct("seq", &Filter::new()).unwrap();
    assert_eq!(seqs.len(), WRITERS);
}

#[test]
fn concurrent_creates_on_sqlite_are_all_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&StoreConfig::sqlite(dir.path())).unwrap());

    let handles: Vec<_> = (0..WRITERS)
        .map(|n| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                db.collection("vendors")
                    .create(Document::new().with("seq", json!(n)))
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(count(&db, "vendors"), WRITERS);
}

#[test]
fn concurrent_cross_collection_writes_keep_symmetry() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(Database::open(&StoreConfig::json(dir.path())).unwrap());
    let system_id = SystemService::new(db.as_ref())
        .create_system(Document::new().with("name", json!("shared")))
        .unwrap()
        .id()
        .unwrap();

    let handles: Vec<_> = (0..WRITERS / 2)
        .map(|n| {
            let db = Arc::clone(&db);
            let system_id = system_id.clone();
            thread::spawn(move || {
                LicenseService::new(db.as_ref())
                    .create_license(
                        Document::new()
                            .with("licenseType", json!(format!("type-{n}")))
                            .with("assignedSystems", json!([system_id.as_str()])),
                    )
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let system = db.collection("systems").find_by_id(&system_id).unwrap().unwrap();
    let requirements = system.get("licenseRequirements").and_then(|v| v.as_array()).unwrap();
    assert_eq!(requirements.len(), WRITERS / 2);
    assert!(licensedb_core::RelationshipService::new(db.as_ref())
        .check()
        .unwrap()
        .is_empty());
}
