use chrono::NaiveDate;
use ninja_core::{Clan, Equipment, EquipmentType, Ninja, ValidationError};
use serde_json::json;
use std::rc::Rc;

fn kacy() -> Ninja {
    Ninja::new(
        "Kacy Catanzaro",
        NaiveDate::from_ymd_opt(1990, 1, 14).unwrap(),
    )
}

#[test]
fn new_ninja_is_transient_and_unaffiliated() {
    let ninja = kacy();
    assert_eq!(ninja.id, 0);
    assert!(!ninja.served_in_oniwaban);
    assert_eq!(ninja.clan_id, None);
    assert!(ninja.equipment_owned.is_empty());
}

#[test]
fn own_returns_the_handle_stored_in_the_collection() {
    let mut ninja = kacy();
    let muscles = ninja.own(Equipment::new("Muscles", EquipmentType::Tool));

    assert_eq!(ninja.equipment_owned.len(), 1);
    assert!(Rc::ptr_eq(&ninja.equipment_owned[0], &muscles));
    assert_eq!(muscles.borrow().ninja_id, 0);
}

#[test]
fn ninja_serializes_with_storage_names() {
    let mut ninja = kacy();
    ninja.id = 7;
    ninja.clan_id = Some(1);
    ninja.own(Equipment::new("Spunk", EquipmentType::Weapon));

    let value = serde_json::to_value(&ninja).unwrap();
    assert_eq!(
        value,
        json!({
            "id": 7,
            "name": "Kacy Catanzaro",
            "served_in_oniwaban": false,
            "date_of_birth": "1990-01-14",
            "clan_id": 1,
            "equipment_owned": [
                { "id": 0, "name": "Spunk", "type": "weapon", "ninja_id": 0 }
            ]
        })
    );
}

#[test]
fn ninja_without_equipment_field_deserializes() {
    let ninja: Ninja = serde_json::from_value(json!({
        "id": 3,
        "name": "Leonardo",
        "served_in_oniwaban": true,
        "date_of_birth": "1984-01-01",
        "clan_id": null
    }))
    .unwrap();

    assert_eq!(ninja.name, "Leonardo");
    assert!(ninja.served_in_oniwaban);
    assert!(ninja.equipment_owned.is_empty());
}

#[test]
fn blank_names_fail_validation() {
    let ninja = Ninja::new("  ", NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
    assert_eq!(
        ninja.validate(),
        Err(ValidationError::BlankName { table: "ninjas" })
    );
    assert_eq!(
        Clan::new("").validate(),
        Err(ValidationError::BlankName { table: "clans" })
    );
}

#[test]
fn equipment_without_owner_fails_validation() {
    let mut item = Equipment::new("Muscles", EquipmentType::Tool);
    assert!(matches!(
        item.validate(),
        Err(ValidationError::OrphanEquipment { .. })
    ));

    item.ninja_id = 4;
    assert!(item.validate().is_ok());
}
