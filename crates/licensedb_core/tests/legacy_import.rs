use licensedb_core::store::legacy::import_legacy_combined;
use licensedb_core::{
    Backend, Database, Document, Filter, RecordId, RelationshipService, StoreConfig, StoreError,
};
use serde_json::json;
use std::fs;

fn legacy_fixture(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("legacy.json");
    let content = json!({
        "licenses": [
            {"id": "l1", "name": "Office", "assignedSystems": ["s1"],
             "createdAt": "2023-05-01T00:00:00.000Z", "updatedAt": "2023-06-01T00:00:00.000Z"}
        ],
        "systems": {"documents": [
            {"id": "s1", "licenseRequirements": [{"licenseType": "Office", "quantity": 1, "licenseId": "l1"}]},
            {"id": "s2"}
        ]},
        "users": [],
        "vendors": [{"name": "Microsoft"}]
    });
    fs::write(&path, serde_json::to_string_pretty(&content).unwrap()).unwrap();
    path
}

#[test]
fn import_copies_every_collection_and_keeps_timestamps() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(&StoreConfig::json(data.path().join("store"))).unwrap();
    let path = legacy_fixture(&data);

    let report = import_legacy_combined(&path, &db).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.total_imported(), 4);

    let l1 = db
        .collection("licenses")
        .find_by_id(&RecordId::from("l1"))
        .unwrap()
        .unwrap();
    assert_eq!(l1.created_at(), Some("2023-05-01T00:00:00.000Z"));
    assert_eq!(l1.updated_at(), Some("2023-06-01T00:00:00.000Z"));

    let vendors = db.collection("vendors").find(&Filter::new()).unwrap();
    assert!(vendors[0].id().is_some());
    assert!(vendors[0].created_at().is_some());

    assert!(RelationshipService::new(&db).check().unwrap().is_empty());
}

#[test]
fn import_skips_collections_that_already_hold_documents() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(&StoreConfig::sqlite(data.path())).unwrap();
    db.collection("licenses")
        .create(Document::new().with("name", json!("existing")))
        .unwrap();
    let path = legacy_fixture(&data);

    let report = import_legacy_combined(&path, &db).unwrap();
    assert_eq!(report.skipped, vec!["licenses".to_string()]);
    assert_eq!(db.collection("licenses").count(&Filter::new()).unwrap(), 1);
    assert_eq!(db.collection("systems").count(&Filter::new()).unwrap(), 2);
}

#[test]
fn import_repairs_asymmetric_licenses_and_systems() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(&StoreConfig::json(data.path().join("store"))).unwrap();
    let path = data.path().join("legacy.json");
    let content = json!({
        "licenses": [{"id": "l1", "licenseType": "Office", "assignedSystems": ["s1"]}],
        "systems": [{"id": "s1"}, {"id": "s2", "licenseRequirements": [{"licenseType": "CAD", "quantity": 1, "licenseId": "l9"}]}]
    });
    fs::write(&path, content.to_string()).unwrap();

    let report = import_legacy_combined(&path, &db).unwrap();
    let repair = report.repair.unwrap();
    assert_eq!(repair.outcome.requirements_added, 1);
    assert_eq!(repair.outcome.dangling_dropped, 1);
    assert!(RelationshipService::new(&db).check().unwrap().is_empty());
}

#[test]
fn import_without_relationship_collections_skips_repair() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(&StoreConfig::json(data.path())).unwrap();
    let path = data.path().join("legacy.json");
    fs::write(&path, r#"{"vendors": [{"name": "Adobe"}]}"#).unwrap();

    let report = import_legacy_combined(&path, &db).unwrap();
    assert_eq!(report.total_imported(), 1);
    assert_eq!(report.repair, None);
    assert!(!data.path().join("licenses.json").exists());
}

#[test]
fn malformed_legacy_file_imports_nothing() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(&StoreConfig::json(data.path())).unwrap();
    let path = data.path().join("legacy.json");
    fs::write(&path, r#"{"licenses": [{"id": "l1"}], "systems": "oops"}"#).unwrap();

    let err = import_legacy_combined(&path, &db).unwrap_err();
    assert!(matches!(err, StoreError::Corruption { .. }));
    assert_eq!(db.collection("licenses").count(&Filter::new()).unwrap(), 0);
}
