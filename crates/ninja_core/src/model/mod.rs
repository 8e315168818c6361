//! Domain model for ninjas, clans and their equipment.
//!
//! # Responsibility
//! - Define the plain in-memory records handed to a session.
//! - Provide write-path validation shared by every session.
//!
//! # Invariants
//! - Key `0` means "not yet persisted"; the store assigns real keys on flush.
//! - Entities are shared as `Shared<T>` so a session and its caller observe
//!   the same instance.

use std::cell::RefCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

pub mod clan;
pub mod equipment;
pub mod ninja;

/// Integer identity assigned by the store.
pub type EntityKey = i64;

/// Single live instance of an entity, shared between a session and its caller.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a freshly constructed entity into a shareable handle.
pub fn shared<T>(entity: T) -> Shared<T> {
    Rc::new(RefCell::new(entity))
}

/// Write-path validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required name column is empty or whitespace only.
    BlankName { table: &'static str },
    /// Equipment reached a write without an owning ninja.
    OrphanEquipment { name: String },
    /// One equipment handle sits in more than one ninja's collection.
    EquipmentOwnedTwice { name: String },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { table } => write!(f, "{table}: name must not be blank"),
            Self::OrphanEquipment { name } => {
                write!(f, "equipment `{name}` has no owning ninja")
            }
            Self::EquipmentOwnedTwice { name } => {
                write!(f, "equipment `{name}` is owned by more than one ninja")
            }
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_name(table: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::BlankName { table });
    }
    Ok(())
}
