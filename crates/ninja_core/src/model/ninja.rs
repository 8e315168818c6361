//! Ninja record and its owned equipment collection.
//!
//! # Invariants
//! - `clan_id`, when set, must reference an existing clan; the store
//!   enforces it at flush time.
//! - `equipment_owned` is the in-memory side of the one-to-many relation.
//!   It is not part of the ninja's own column snapshot.

use super::equipment::Equipment;
use super::{require_name, shared, EntityKey, Shared, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ninja {
    pub id: EntityKey,
    pub name: String,
    /// Whether this ninja served in the Oniwaban elite unit.
    pub served_in_oniwaban: bool,
    pub date_of_birth: NaiveDate,
    pub clan_id: Option<EntityKey>,
    /// Loaded only when a query eagerly includes it.
    #[serde(default)]
    pub equipment_owned: Vec<Shared<Equipment>>,
}

impl Ninja {
    /// Creates a transient ninja (id `0`, no clan, not Oniwaban, no equipment).
    pub fn new(name: impl Into<String>, date_of_birth: NaiveDate) -> Self {
        Self {
            id: 0,
            name: name.into(),
            served_in_oniwaban: false,
            date_of_birth,
            clan_id: None,
            equipment_owned: Vec::new(),
        }
    }

    /// Appends equipment to this ninja's collection and returns its handle.
    ///
    /// No session call is needed: flush registers the new item through the
    /// tracked ninja.
    pub fn own(&mut self, item: Equipment) -> Shared<Equipment> {
        let handle = shared(item);
        self.equipment_owned.push(handle.clone());
        handle
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name("ninjas", &self.name)
    }
}
