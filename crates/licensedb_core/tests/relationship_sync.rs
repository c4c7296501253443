use licensedb_core::model::relation::LICENSE_REQUIREMENTS;
use licensedb_core::{
    Backend, Database, Document, Filter, LicenseService, Modifiers, RecordId, RelationshipService,
    ServiceError, StoreConfig, SystemService,
};
use serde_json::{json, Map, Value};

fn doc(value: Value) -> Document {
    Document::try_from(value).unwrap()
}

fn patch(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

fn open(dir: &tempfile::TempDir, sqlite: bool) -> Database {
    let config = if sqlite {
        StoreConfig::sqlite(dir.path())
    } else {
        StoreConfig::json(dir.path())
    };
    Database::open(&config).unwrap()
}

fn requirements_for(db: &Database, system: &RecordId, license: &RecordId) -> usize {
    let system = db.collection("systems").find_by_id(system).unwrap().unwrap();
    system
        .get(LICENSE_REQUIREMENTS)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter(|entry| entry.get("licenseId").is_some_and(|id| license.matches(id)))
                .count()
        })
        .unwrap_or(0)
}

fn assign_then_unassign(db: &Database) {
    let systems = SystemService::new(db);
    let s1 = systems.create_system(doc(json!({"name": "S1"}))).unwrap().id().unwrap();
    let s2 = systems.create_system(doc(json!({"name": "S2"}))).unwrap().id().unwrap();

    let licenses = LicenseService::new(db);
    let l1 = licenses
        .create_license(doc(json!({
            "name": "Office",
            "assignedSystems": [s1.as_str(), s2.as_str()]
        })))
        .unwrap();
    let l1_id = l1.id().unwrap();

    assert_eq!(requirements_for(db, &s1, &l1_id), 1);
    assert_eq!(requirements_for(db, &s2, &l1_id), 1);

    licenses
        .update_license(&l1_id, patch(json!({"assignedSystems": [s1.as_str()]})))
        .unwrap()
        .unwrap();
    assert_eq!(requirements_for(db, &s1, &l1_id), 1);
    assert_eq!(requirements_for(db, &s2, &l1_id), 0);

    assert!(RelationshipService::new(db).check().unwrap().is_empty());
}

#[test]
fn license_assignment_scenario_on_json_backend() {
    let dir = tempfile::tempdir().unwrap();
    assign_then_unassign(&open(&dir, false));
}

#[test]
fn license_assignment_scenario_on_sqlite_backend() {
    let dir = tempfile::tempdir().unwrap();
    assign_then_unassign(&open(&dir, true));
}

#[test]
fn repeated_saves_do_not_duplicate_requirements() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir, false);
    let s1 = SystemService::new(&db)
        .create_system(doc(json!({"name": "S1"})))
        .unwrap()
        .id()
        .unwrap();
    let licenses = LicenseService::new(&db);
    let l1 = licenses
        .create_license(doc(json!({"licenseType": "CAD", "assignedSystems": [s1.as_str()]})))
        .unwrap()
        .id()
        .unwrap();

    for _ in 0..3 {
        licenses
            .update_license(&l1, patch(json!({"assignedSystems": [s1.as_str(), s1.as_str()]})))
            .unwrap();
    }

    assert_eq!(requirements_for(&db, &s1, &l1), 1);
    assert_eq!(licenses.used_seats(&l1).unwrap(), 1);
}

#[test]
fn editing_system_requirements_updates_licenses() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir, false);
    let licenses = LicenseService::new(&db);
    let l1 = licenses
        .create_license(doc(json!({"licenseType": "Office"})))
        .unwrap()
        .id()
        .unwrap();
    let l2 = licenses
        .create_license(doc(json!({"licenseType": "CAD"})))
        .unwrap()
        .id()
        .unwrap();

    let systems = SystemService::new(&db);
    let s1 = systems
        .create_system(doc(json!({
            "name": "S1",
            "licenseRequirements": [{"licenseType": "Office", "quantity": 1, "licenseId": l1.as_str()}]
        })))
        .unwrap()
        .id()
        .unwrap();

    let covering = systems.licenses_for_system(&s1).unwrap();
    assert_eq!(covering.len(), 1);
    assert_eq!(covering[0].id(), Some(l1.clone()));

    systems
        .update_system(
            &s1,
            patch(json!({"licenseRequirements": [
                {"licenseType": "CAD", "quantity": 2, "licenseId": l2.as_str()}
            ]})),
        )
        .unwrap()
        .unwrap();

    assert_eq!(licenses.used_seats(&l1).unwrap(), 0);
    assert_eq!(licenses.used_seats(&l2).unwrap(), 1);
    assert!(RelationshipService::new(&db).check().unwrap().is_empty());
}

#[test]
fn deletes_clear_the_other_side() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir, false);
    let systems = SystemService::new(&db);
    let s1 = systems.create_system(doc(json!({"name": "S1"}))).unwrap().id().unwrap();
    let s2 = systems.create_system(doc(json!({"name": "S2"}))).unwrap().id().unwrap();
    let licenses = LicenseService::new(&db);
    let l1 = licenses
        .create_license(doc(json!({"name": "Office", "assignedSystems": [s1.as_str(), s2.as_str()]})))
        .unwrap()
        .id()
        .unwrap();

    assert!(systems.delete_system(&s2).unwrap());
    assert_eq!(licenses.used_seats(&l1).unwrap(), 1);

    assert!(licenses.delete_license(&l1).unwrap());
    assert_eq!(requirements_for(&db, &s1, &l1), 0);
    assert!(!licenses.delete_license(&l1).unwrap());

    assert!(matches!(
        licenses.used_seats(&l1).unwrap_err(),
        ServiceError::NotFound(id) if id == l1
    ));
}

#[test]
fn bulk_license_updates_are_synchronized() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir, true);
    let s1 = SystemService::new(&db)
        .create_system(doc(json!({"name": "S1"})))
        .unwrap()
        .id()
        .unwrap();
    let licenses = LicenseService::new(&db);
    licenses
        .create_license(doc(json!({"vendor": "Adobe", "assignedSystems": []})))
        .unwrap();
    licenses
        .create_license(doc(json!({"vendor": "Adobe", "assignedSystems": []})))
        .unwrap();

    let adobe = Filter::new().eq("vendor", json!("Adobe"));
    let assign = Modifiers::new().append("assignedSystems", s1.to_value());
    assert_eq!(licenses.update_licenses(&adobe, &assign).unwrap(), 2);

    let covering = SystemService::new(&db).licenses_for_system(&s1).unwrap();
    assert_eq!(covering.len(), 2);
    assert!(RelationshipService::new(&db).check().unwrap().is_empty());

    assert_eq!(licenses.delete_licenses(&adobe).unwrap(), 2);
    let system = db.collection("systems").find_by_id(&s1).unwrap().unwrap();
    assert_eq!(system.get(LICENSE_REQUIREMENTS), Some(&json!([])));
}

#[test]
fn repair_restores_symmetry_after_out_of_band_writes() {
    let dir = tempfile::tempdir().unwrap();
    let db = open(&dir, false);
    db.transact(&["licenses", "systems"], |workspace| {
        let (licenses, systems) = workspace.pair_mut("licenses", "systems")?;
        systems.insert_many(vec![doc(json!({"id": "s1"})), doc(json!({"id": "s2"}))])?;
        licenses.create(doc(json!({"id": "l1", "name": "Office", "assignedSystems": ["s1", "s2"]})))?;
        Ok(())
    })
    .unwrap();

    let relationships = RelationshipService::new(&db);
    assert_eq!(relationships.check().unwrap().len(), 2);

    let report = relationships.repair().unwrap();
    assert_eq!(report.outcome.requirements_added, 2);
    assert!(relationships.check().unwrap().is_empty());
    assert!(relationships.repair().unwrap().outcome.is_noop());
}

fn collection_writes_keep_symmetry(db: &Database) {
    let licenses = db.collection("licenses");
    let systems = db.collection("systems");
    systems
        .insert_many(vec![doc(json!({"id": "s1"})), doc(json!({"id": "s2"}))])
        .unwrap();
    let created = licenses
        .create(doc(json!({"id": "l1", "licenseType": "Office", "assignedSystems": ["s1", "ghost"]})))
        .unwrap();
    assert_eq!(created.get("assignedSystems"), Some(&json!(["s1"])));

    let relationships = RelationshipService::new(db);
    let l1 = RecordId::from("l1");
    let s1 = RecordId::from("s1");
    let s2 = RecordId::from("s2");
    assert_eq!(requirements_for(db, &s1, &l1), 1);
    assert!(relationships.check().unwrap().is_empty());

    licenses
        .update(&l1, patch(json!({"assignedSystems": []})))
        .unwrap()
        .unwrap();
    assert_eq!(requirements_for(db, &s1, &l1), 0);
    assert!(relationships.check().unwrap().is_empty());

    systems
        .update(&s2, patch(json!({"licenseRequirements": [{"licenseType": "Office", "quantity": 1, "licenseId": "l1"}]})))
        .unwrap()
        .unwrap();
    let license = licenses.find_by_id(&l1).unwrap().unwrap();
    assert_eq!(license.get("assignedSystems"), Some(&json!(["s2"])));
    assert!(relationships.check().unwrap().is_empty());

    assert_eq!(systems.delete_many(&Filter::new().eq("id", json!("s2"))).unwrap(), 1);
    let license = licenses.find_by_id(&l1).unwrap().unwrap();
    assert_eq!(license.get("assignedSystems"), Some(&json!([])));

    licenses
        .update_many(&Filter::new(), &Modifiers::new().append("assignedSystems", json!("s1")))
        .unwrap();
    assert_eq!(requirements_for(db, &s1, &l1), 1);
    assert!(licenses.delete(&l1).unwrap());
    assert_eq!(requirements_for(db, &s1, &l1), 0);
    assert!(relationships.check().unwrap().is_empty());
}

#[test]
fn collection_writes_keep_symmetry_on_json() {
    let dir = tempfile::tempdir().unwrap();
    collection_writes_keep_symmetry(&open(&dir, false));
}

#[test]
fn collection_writes_keep_symmetry_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    collection_writes_keep_symmetry(&open(&dir, true));
}
