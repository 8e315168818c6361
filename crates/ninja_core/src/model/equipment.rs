//! Equipment owned by a ninja.
//!
//! # Invariants
//! - Equipment belongs to exactly one ninja at a time (`ninja_id`).
//! - `ninja_id` may be `0` only while the owner itself is still transient;
//!   the session fills it in during flush.

use super::{require_name, EntityKey, ValidationError};
use serde::{Deserialize, Serialize};

/// Category tag for equipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    Tool,
    Weapon,
}

impl EquipmentType {
    /// Stable storage/wire token.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::Weapon => "weapon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "tool" => Some(Self::Tool),
            "weapon" => Some(Self::Weapon),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: EntityKey,
    pub name: String,
    /// Serialized as `type` to match the storage column.
    #[serde(rename = "type")]
    pub kind: EquipmentType,
    pub ninja_id: EntityKey,
}

impl Equipment {
    /// Creates transient equipment without an owner.
    ///
    /// Push it into a tracked ninja's `equipment_owned` and the session will
    /// insert it and assign `ninja_id` on the next flush.
    pub fn new(name: impl Into<String>, kind: EquipmentType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            kind,
            ninja_id: 0,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name("equipment", &self.name)?;
        if self.ninja_id == 0 {
            return Err(ValidationError::OrphanEquipment {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}
