//! Clan record.

use super::{require_name, EntityKey, ValidationError};
use serde::{Deserialize, Serialize};

/// A clan referenced by zero or more ninjas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clan {
    pub id: EntityKey,
    pub clan_name: String,
}

impl Clan {
    /// Creates a transient clan (id `0`).
    pub fn new(clan_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            clan_name: clan_name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_name("clans", &self.clan_name)
    }
}
