mod common;

use common::{ymd, TestStore};
use ninja_core::db::procedures::define_procedure;
use ninja_core::{Ninja, PersistenceError};
use std::rc::Rc;

const OLD_NINJAS_BODY: &str = "SELECT id, name, served_in_oniwaban, date_of_birth, clan_id
     FROM ninjas
     WHERE date_of_birth < '1980-01-01'
     ORDER BY id";

fn seed_generations(store: &TestStore, clan_id: i64) {
    let mut ctx = store.session();
    for (name, born) in [
        ("JohnDoeSan", ymd(1960, 1, 1)),
        ("Leonardo", ymd(1984, 1, 1)),
    ] {
        let mut ninja = Ninja::new(name, born);
        ninja.clan_id = Some(clan_id);
        ctx.ninjas().add(ninja);
    }
    ctx.save_changes().unwrap();
    define_procedure(ctx.connection(), "GetOldNinjas", OLD_NINJAS_BODY).unwrap();
}

#[test]
fn procedure_rows_map_to_tracked_ninjas() {
    let (store, clan_id) = TestStore::with_clan();
    seed_generations(&store, clan_id);

    let mut ctx = store.session();
    let old = ctx.ninjas().exec_procedure("GetOldNinjas").unwrap();
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].borrow().name, "JohnDoeSan");
    assert_eq!(ctx.round_trips(), 2);

    let key = old[0].borrow().id;
    let found = ctx.ninjas().find(key).unwrap().unwrap();
    assert!(Rc::ptr_eq(&found, &old[0]));
    assert_eq!(ctx.round_trips(), 2);
}

#[test]
fn undefined_procedure_is_reported() {
    let store = TestStore::new();
    let mut ctx = store.session();

    let err = ctx.ninjas().exec_procedure("GetOldNinjas").unwrap_err();
    assert!(matches!(err, PersistenceError::ProcedureNotFound(name) if name == "GetOldNinjas"));
}

#[test]
fn procedure_with_broken_body_surfaces_the_store_error() {
    let store = TestStore::new();
    let mut ctx = store.session();
    define_procedure(ctx.connection(), "Broken", "SELECT * FROM samurai").unwrap();

    let err = ctx.ninjas().exec_procedure("Broken").unwrap_err();
    assert!(matches!(err, PersistenceError::Db(_)), "unexpected error: {err}");
}
