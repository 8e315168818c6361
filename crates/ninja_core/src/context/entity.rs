//! Table mapping for every entity a session can track.
//!
//! # Invariants
//! - The key column is always `id` and is never listed in `COLUMNS`.
//! - `column_values` yields values in `COLUMNS` order; snapshots and updates
//!   rely on that order.

use super::error::{PersistenceError, PersistenceResult};
use super::tracker::{ChangeTracker, Tracker};
use crate::model::clan::Clan;
use crate::model::equipment::{Equipment, EquipmentType};
use crate::model::ninja::Ninja;
use crate::model::{EntityKey, ValidationError};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::Row;
use std::fmt::Debug;

pub(crate) const KEY_COLUMN: &str = "id";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Row mapping and tracker routing for one entity type.
pub trait Entity: Debug + Sized + 'static {
    const TABLE: &'static str;
    /// Non-key columns, in `column_values` order.
    const COLUMNS: &'static [&'static str];

    fn key(&self) -> EntityKey;
    fn set_key(&mut self, key: EntityKey);
    fn column_values(&self) -> Vec<Value>;
    /// Decodes one row; `prefix` is prepended to every column alias.
    fn from_row(row: &Row<'_>, prefix: &str) -> PersistenceResult<Self>;
    fn validate(&self) -> Result<(), ValidationError>;

    fn tracker(tracker: &ChangeTracker) -> &Tracker<Self>;
    fn tracker_mut(tracker: &mut ChangeTracker) -> &mut Tracker<Self>;

    /// Whether `column` is the key or one of the mapped columns.
    fn maps_column(column: &str) -> bool {
        column == KEY_COLUMN || Self::COLUMNS.contains(&column)
    }

    /// `id, col_a, col_b` for plain selects.
    fn select_list() -> String {
        std::iter::once(KEY_COLUMN)
            .chain(Self::COLUMNS.iter().copied())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl Entity for Ninja {
    const TABLE: &'static str = "ninjas";
    const COLUMNS: &'static [&'static str] =
        &["name", "served_in_oniwaban", "date_of_birth", "clan_id"];

    fn key(&self) -> EntityKey {
        self.id
    }

    fn set_key(&mut self, key: EntityKey) {
        self.id = key;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Integer(bool_to_int(self.served_in_oniwaban)),
            Value::Text(self.date_of_birth.format(DATE_FORMAT).to_string()),
            self.clan_id.map_or(Value::Null, Value::Integer),
        ]
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> PersistenceResult<Self> {
        let column = |name: &str| format!("{prefix}{name}");

        let served_in_oniwaban = match row.get::<_, i64>(column("served_in_oniwaban").as_str())? {
            0 => false,
            1 => true,
            other => {
                return Err(PersistenceError::InvalidData(format!(
                    "invalid served_in_oniwaban value `{other}` in ninjas"
                )));
            }
        };
        let date_text: String = row.get(column("date_of_birth").as_str())?;
        let date_of_birth = NaiveDate::parse_from_str(&date_text, DATE_FORMAT).map_err(|_| {
            PersistenceError::InvalidData(format!(
                "invalid date_of_birth value `{date_text}` in ninjas"
            ))
        })?;

        Ok(Self {
            id: row.get(column(KEY_COLUMN).as_str())?,
            name: row.get(column("name").as_str())?,
            served_in_oniwaban,
            date_of_birth,
            clan_id: row.get(column("clan_id").as_str())?,
            equipment_owned: Vec::new(),
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Ninja::validate(self)
    }

    fn tracker(tracker: &ChangeTracker) -> &Tracker<Self> {
        &tracker.ninjas
    }

    fn tracker_mut(tracker: &mut ChangeTracker) -> &mut Tracker<Self> {
        &mut tracker.ninjas
    }
}

impl Entity for Clan {
    const TABLE: &'static str = "clans";
    const COLUMNS: &'static [&'static str] = &["clan_name"];

    fn key(&self) -> EntityKey {
        self.id
    }

    fn set_key(&mut self, key: EntityKey) {
        self.id = key;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![Value::Text(self.clan_name.clone())]
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> PersistenceResult<Self> {
        Ok(Self {
            id: row.get(format!("{prefix}{KEY_COLUMN}").as_str())?,
            clan_name: row.get(format!("{prefix}clan_name").as_str())?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Clan::validate(self)
    }

    fn tracker(tracker: &ChangeTracker) -> &Tracker<Self> {
        &tracker.clans
    }

    fn tracker_mut(tracker: &mut ChangeTracker) -> &mut Tracker<Self> {
        &mut tracker.clans
    }
}

impl Entity for Equipment {
    const TABLE: &'static str = "equipment";
    const COLUMNS: &'static [&'static str] = &["name", "type", "ninja_id"];

    fn key(&self) -> EntityKey {
        self.id
    }

    fn set_key(&mut self, key: EntityKey) {
        self.id = key;
    }

    fn column_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.clone()),
            Value::Text(self.kind.as_str().to_string()),
            Value::Integer(self.ninja_id),
        ]
    }

    fn from_row(row: &Row<'_>, prefix: &str) -> PersistenceResult<Self> {
        let type_text: String = row.get(format!("{prefix}type").as_str())?;
        let kind = EquipmentType::parse(&type_text).ok_or_else(|| {
            PersistenceError::InvalidData(format!("invalid equipment type `{type_text}`"))
        })?;

        Ok(Self {
            id: row.get(format!("{prefix}{KEY_COLUMN}").as_str())?,
            name: row.get(format!("{prefix}name").as_str())?,
            kind,
            ninja_id: row.get(format!("{prefix}ninja_id").as_str())?,
        })
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Equipment::validate(self)
    }

    fn tracker(tracker: &ChangeTracker) -> &Tracker<Self> {
        &tracker.equipment
    }

    fn tracker_mut(tracker: &mut ChangeTracker) -> &mut Tracker<Self> {
        &mut tracker.equipment
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
