mod common;

use common::{ymd, TestStore};
use ninja_core::{Filter, Ninja};
use std::rc::Rc;

fn seed(store: &TestStore, clan_id: i64) -> i64 {
    let mut ctx = store.session();
    let mut ninja = Ninja::new("Michelangelo", ymd(1986, 1, 1));
    ninja.clan_id = Some(clan_id);
    let ninja = ctx.ninjas().add(ninja);
    ctx.save_changes().unwrap();
    let key = ninja.borrow().id;
    key
}

#[test]
fn second_find_is_served_from_the_session() {
    let (store, clan_id) = TestStore::with_clan();
    let key = seed(&store, clan_id);

    let mut ctx = store.session();
    let first = ctx.ninjas().find(key).unwrap().unwrap();
    assert_eq!(ctx.round_trips(), 1);
    let second = ctx.ninjas().find(key).unwrap().unwrap();

    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(ctx.round_trips(), 1);
}

#[test]
fn find_of_a_missing_key_returns_none() {
    let store = TestStore::new();
    let mut ctx = store.session();
    assert!(ctx.ninjas().find(4).unwrap().is_none());
    assert_eq!(ctx.round_trips(), 1);
}

#[test]
fn queries_resolve_rows_to_tracked_instances() {
    let (store, clan_id) = TestStore::with_clan();
    let key = seed(&store, clan_id);

    let mut ctx = store.session();
    let found = ctx.ninjas().find(key).unwrap().unwrap();
    found.borrow_mut().name = "Mikey".to_string();

    let listed = ctx.ninjas().to_list().unwrap();
    assert!(Rc::ptr_eq(&listed[0], &found));
    assert_eq!(listed[0].borrow().name, "Mikey");

    let by_name = ctx
        .ninjas()
        .filter(Filter::eq("name", "Michelangelo".to_string()))
        .first_or_default()
        .unwrap()
        .unwrap();
    assert!(Rc::ptr_eq(&by_name, &found));
}

#[test]
fn sessions_do_not_share_instances() {
    let (store, clan_id) = TestStore::with_clan();
    let key = seed(&store, clan_id);

    let mut first = store.session();
    let mut second = store.session();
    let a = first.ninjas().find(key).unwrap().unwrap();
    let b = second.ninjas().find(key).unwrap().unwrap();

    assert!(!Rc::ptr_eq(&a, &b));
    assert_ne!(first.session_id(), second.session_id());
}
