mod common;

use common::{ymd, TestStore};
use ninja_core::{
    shared, Clan, EntityState, Filter, Ninja, NinjaContext, PersistenceError, ValidationError,
};

fn member(name: &str, clan_id: i64) -> Ninja {
    let mut ninja = Ninja::new(name, ymd(1960, 1, 1));
    ninja.clan_id = Some(clan_id);
    ninja
}

#[test]
fn inserted_ninja_is_found_equal_in_a_fresh_session() {
    let (store, clan_id) = TestStore::with_clan();

    let mut ctx = store.session();
    let ninja = ctx.ninjas().add(member("JohnDoeSan", clan_id));
    assert_eq!(ctx.entry(&ninja).state(), EntityState::Added);
    assert_eq!(ctx.save_changes().unwrap(), 1);
    assert_eq!(ctx.entry(&ninja).state(), EntityState::Unchanged);
    let inserted = ninja.borrow().clone();
    drop(ctx);

    assert_ne!(inserted.id, 0);
    let mut fresh = store.session();
    let loaded = fresh.ninjas().find(inserted.id).unwrap().unwrap();
    assert_eq!(*loaded.borrow(), inserted);
}

#[test]
fn add_range_inserts_every_entity_in_one_flush() {
    let (store, clan_id) = TestStore::with_clan();

    let mut ctx = store.session();
    let added = ctx
        .ninjas()
        .add_range([member("Leonardo", clan_id), member("Raphael", clan_id)]);
    assert_eq!(ctx.save_changes().unwrap(), 2);

    let ids: Vec<i64> = added.iter().map(|ninja| ninja.borrow().id).collect();
    assert!(ids[0] < ids[1]);

    let mut fresh = store.session();
    let names: Vec<String> = fresh
        .ninjas()
        .to_list()
        .unwrap()
        .iter()
        .map(|ninja| ninja.borrow().name.clone())
        .collect();
    assert_eq!(names, vec!["Leonardo", "Raphael"]);
}

#[test]
fn nothing_reaches_the_store_before_save_changes() {
    let (store, clan_id) = TestStore::with_clan();

    let mut ctx = store.session();
    ctx.ninjas().add(member("Unsaved", clan_id));
    assert!(ctx.has_changes());
    assert_eq!(ctx.round_trips(), 0);

    let mut other = store.session();
    assert!(other.ninjas().to_list().unwrap().is_empty());
}

#[test]
fn save_without_changes_writes_nothing() {
    let mut ctx = NinjaContext::open_in_memory().unwrap();
    assert!(!ctx.has_changes());
    assert_eq!(ctx.save_changes().unwrap(), 0);
    assert_eq!(ctx.round_trips(), 0);
}

#[test]
fn first_or_default_on_no_match_returns_none() {
    let (store, clan_id) = TestStore::with_clan();
    let mut ctx = store.session();
    assert!(ctx.ninjas().first_or_default().unwrap().is_none());

    ctx.ninjas().add(member("JohnDoeSan", clan_id));
    ctx.save_changes().unwrap();

    let peter = ctx
        .ninjas()
        .filter(Filter::eq("name", "PeterSan".to_string()))
        .first_or_default()
        .unwrap();
    assert!(peter.is_none());
}

#[test]
fn filters_match_exact_values_and_prefixes() {
    let (store, clan_id) = TestStore::with_clan();
    let mut ctx = store.session();
    ctx.ninjas().add_range([
        member("Kacy Catanzaro", clan_id),
        member("Kacy_Two", clan_id),
        member("Leonardo", clan_id),
    ]);
    ctx.save_changes().unwrap();

    let mut fresh = store.session();
    let kacys = fresh
        .ninjas()
        .filter(Filter::starts_with("name", "Kacy"))
        .to_list()
        .unwrap();
    assert_eq!(kacys.len(), 2);

    let underscore = fresh
        .ninjas()
        .filter(Filter::starts_with("name", "Kacy_"))
        .to_list()
        .unwrap();
    assert_eq!(underscore.len(), 1);
    assert_eq!(underscore[0].borrow().name, "Kacy_Two");

    let in_clan = fresh
        .ninjas()
        .filter(Filter::eq("clan_id", clan_id))
        .filter(Filter::eq("name", "Leonardo".to_string()))
        .to_list()
        .unwrap();
    assert_eq!(in_clan.len(), 1);
}

#[test]
fn filter_on_unmapped_column_is_rejected() {
    let mut ctx = NinjaContext::open_in_memory().unwrap();
    let err = ctx
        .ninjas()
        .filter(Filter::eq("rank", 1_i64))
        .to_list()
        .unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::UnknownColumn {
            table: "ninjas",
            column: "rank"
        }
    ));
    assert_eq!(ctx.round_trips(), 0);
}

#[test]
fn bad_clan_reference_fails_and_rolls_back_keys() {
    let store = TestStore::new();
    let mut ctx = store.session();
    let clan = ctx.clans().add(Clan::new("Fresh Clan"));
    let ninja = ctx.ninjas().add(member("Nobody", 999));

    let err = ctx.save_changes().unwrap_err();
    assert!(err.is_constraint_violation(), "unexpected error: {err}");
    assert_eq!(clan.borrow().id, 0);
    assert_eq!(ninja.borrow().id, 0);
    assert_eq!(ctx.entry(&ninja).state(), EntityState::Added);

    let mut fresh = store.session();
    assert!(fresh.clans().to_list().unwrap().is_empty());
    assert!(fresh.ninjas().to_list().unwrap().is_empty());
}

#[test]
fn blank_name_is_rejected_before_any_write() {
    let mut ctx = NinjaContext::open_in_memory().unwrap();
    ctx.clans().add(Clan::new("   "));

    let err = ctx.save_changes().unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::Validation(ValidationError::BlankName { table: "clans" })
    ));
    assert_eq!(ctx.round_trips(), 0);
}

#[test]
fn unreachable_store_is_a_connectivity_error() {
    let err = NinjaContext::open("/nonexistent/dojo/ninja.sqlite3")
        .err()
        .unwrap();
    assert!(err.is_connectivity(), "unexpected error: {err}");
}

#[test]
fn removing_an_untracked_entity_is_rejected() {
    let mut ctx = NinjaContext::open_in_memory().unwrap();
    let stranger = shared(member("Stranger", 1));

    let err = ctx.ninjas().remove(&stranger).unwrap_err();
    assert!(matches!(err, PersistenceError::NotTracked { table: "ninjas" }));
}

#[test]
fn removing_an_added_entity_cancels_the_insert() {
    let mut ctx = NinjaContext::open_in_memory().unwrap();
    let clan = ctx.clans().add(Clan::new("Short Lived"));
    ctx.clans().remove(&clan).unwrap();

    assert_eq!(ctx.entry(&clan).state(), EntityState::Detached);
    assert_eq!(ctx.save_changes().unwrap(), 0);
}

#[test]
fn attaching_a_second_instance_for_a_tracked_key_conflicts() {
    let (store, clan_id) = TestStore::with_clan();
    let mut ctx = store.session();
    ctx.clans().find(clan_id).unwrap().unwrap();

    let mut copy = Clan::new("Vermont Clan");
    copy.id = clan_id;
    let err = ctx.clans().attach(&shared(copy)).unwrap_err();
    assert!(matches!(
        err,
        PersistenceError::IdentityConflict { table: "clans", key } if key == clan_id
    ));
}

#[test]
fn local_lists_tracked_entities_except_deleted() {
    let (store, clan_id) = TestStore::with_clan();
    let mut ctx = store.session();
    let loaded = ctx.clans().find(clan_id).unwrap().unwrap();
    let added = ctx.clans().add(Clan::new("Second Clan"));
    assert_eq!(ctx.clans().local().len(), 2);

    ctx.clans().remove(&loaded).unwrap();
    let local = ctx.clans().local();
    assert_eq!(local.len(), 1);
    assert!(std::rc::Rc::ptr_eq(&local[0], &added));
    assert!(ctx.clans().find(clan_id).unwrap().is_none());
}
