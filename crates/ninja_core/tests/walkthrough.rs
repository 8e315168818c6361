mod common;

use common::TestStore;
use ninja_core::db::procedures::define_procedure;
use ninja_core::service::walkthrough::DEFAULT_CLAN_ID;
use ninja_core::{EquipmentType, NinjaContext, NinjaWalkthrough};
use std::rc::Rc;

fn prepared() -> (TestStore, NinjaWalkthrough) {
    let store = TestStore::new();
    let walkthrough = NinjaWalkthrough::new(&store.path);
    let clan = walkthrough.insert_clan("Vermont Clan").unwrap();
    assert_eq!(clan.borrow().id, DEFAULT_CLAN_ID);
    (store, walkthrough)
}

#[test]
fn insert_steps_file_ninjas_under_the_default_clan() {
    let (_store, walkthrough) = prepared();

    let john = walkthrough.insert_ninja().unwrap();
    assert_eq!(john.borrow().name, "JohnDoeSan");
    assert_ne!(john.borrow().id, 0);

    let pair = walkthrough.insert_multiple_ninjas().unwrap();
    assert_eq!(pair.len(), 2);

    let queries = walkthrough.simple_ninja_queries().unwrap();
    let names: Vec<String> = queries
        .all
        .iter()
        .map(|ninja| ninja.borrow().name.clone())
        .collect();
    assert_eq!(names, vec!["JohnDoeSan", "Leonardo", "Raphael"]);
    assert!(queries
        .all
        .iter()
        .all(|ninja| ninja.borrow().clan_id == Some(DEFAULT_CLAN_ID)));
    assert!(queries.peter_san.is_none());
}

#[test]
fn insert_without_clan_fails_with_constraint_violation() {
    let store = TestStore::new();
    let walkthrough = NinjaWalkthrough::new(&store.path);

    let err = walkthrough.insert_ninja().unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
}

#[test]
fn update_steps_toggle_oniwaban_service() {
    let (store, walkthrough) = prepared();
    assert!(walkthrough.query_and_update_ninja().unwrap().is_none());
    walkthrough.insert_ninja().unwrap();

    let updated = walkthrough.query_and_update_ninja().unwrap().unwrap();
    assert!(updated.borrow().served_in_oniwaban);

    let disconnected = walkthrough
        .query_and_update_ninja_disconnected()
        .unwrap()
        .unwrap();
    assert!(!disconnected.borrow().served_in_oniwaban);

    let mut ctx = store.session();
    let stored = ctx.ninjas().first_or_default().unwrap().unwrap();
    assert!(!stored.borrow().served_in_oniwaban);
}

#[test]
fn find_step_reports_a_single_round_trip() {
    let (_store, walkthrough) = prepared();
    let john = walkthrough.insert_ninja().unwrap();
    let key = john.borrow().id;

    let found = walkthrough.retrieve_data_with_find(key).unwrap();
    assert!(Rc::ptr_eq(
        found.first.as_ref().unwrap(),
        found.second.as_ref().unwrap()
    ));
    assert_eq!(found.round_trips, 1);

    let missing = walkthrough.retrieve_data_with_find(key + 100).unwrap();
    assert!(missing.first.is_none() && missing.second.is_none());
}

#[test]
fn stored_procedure_step_runs_the_defined_body() {
    let (store, walkthrough) = prepared();
    walkthrough.insert_ninja().unwrap();
    walkthrough.insert_multiple_ninjas().unwrap();

    let err = walkthrough.retrieve_data_with_stored_proc().unwrap_err();
    assert!(err.to_string().contains("GetOldNinjas"));

    let ctx = NinjaContext::open(&store.path).unwrap();
    define_procedure(
        ctx.connection(),
        "GetOldNinjas",
        "SELECT id, name, served_in_oniwaban, date_of_birth, clan_id
         FROM ninjas WHERE date_of_birth < '1970-01-01'",
    )
    .unwrap();
    drop(ctx);

    let old = walkthrough.retrieve_data_with_stored_proc().unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].borrow().name, "JohnDoeSan");
}

#[test]
fn delete_steps_remove_the_first_ninja_each_time() {
    let (store, walkthrough) = prepared();
    walkthrough.insert_multiple_ninjas().unwrap();

    let leonardo = walkthrough.delete_ninja().unwrap().unwrap();
    assert_eq!(leonardo.borrow().name, "Leonardo");
    let raphael = walkthrough.delete_ninja_disconnected().unwrap().unwrap();
    assert_eq!(raphael.borrow().name, "Raphael");

    assert!(walkthrough.delete_ninja().unwrap().is_none());
    assert!(walkthrough.delete_ninja_disconnected().unwrap().is_none());
    let mut ctx = store.session();
    assert!(ctx.ninjas().to_list().unwrap().is_empty());
}

#[test]
fn graph_step_finds_the_ninja_inserted_with_equipment() {
    let (_store, walkthrough) = prepared();
    assert!(walkthrough.simple_ninja_graph_query().unwrap().is_none());

    let inserted = walkthrough.insert_ninja_with_equipment().unwrap();
    let parent_id = inserted.borrow().id;

    let loaded = walkthrough.simple_ninja_graph_query().unwrap().unwrap();
    let loaded = loaded.borrow();
    assert_eq!(loaded.id, parent_id);
    let kinds: Vec<(String, EquipmentType)> = loaded
        .equipment_owned
        .iter()
        .map(|item| {
            let item = item.borrow();
            (item.name.clone(), item.kind)
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("Muscles".to_string(), EquipmentType::Tool),
            ("Spunk".to_string(), EquipmentType::Weapon),
        ]
    );
}
