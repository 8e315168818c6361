//! Per-session change tracker and identity map.
//!
//! # Responsibility
//! - Remember every entity a session loaded or was handed, with its state.
//! - Keep one live instance per persisted key (identity map).
//! - Detect modifications by diffing current column values against the
//!   snapshot taken when the entity became `Unchanged`.
//!
//! # Invariants
//! - An instance appears at most once in `entries`.
//! - `identity` only holds keys `!= 0`; every value is also in `entries`.
//! - Entities without a snapshot (explicitly set to `Modified`) update every
//!   column on flush.

use super::entity::Entity;
use super::error::{PersistenceError, PersistenceResult};
use crate::model::clan::Clan;
use crate::model::equipment::Equipment;
use crate::model::ninja::Ninja;
use crate::model::{EntityKey, Shared};
use rusqlite::types::Value;
use std::collections::HashMap;
use std::rc::Rc;

/// Lifecycle state of an entity relative to one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not known to the session.
    Detached,
    /// Loaded or attached; matches its snapshot.
    Unchanged,
    /// Will be inserted on flush.
    Added,
    /// Will be deleted on flush.
    Deleted,
    /// Will be updated on flush.
    Modified,
}

/// Which columns a pending update writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChangedColumns {
    All,
    Only(Vec<usize>),
}

#[derive(Debug)]
pub(crate) struct TrackedEntry<T> {
    pub(crate) entity: Shared<T>,
    pub(crate) state: EntityState,
    original: Option<Vec<Value>>,
    pub(crate) changed: ChangedColumns,
}

/// Entries for one entity type.
#[derive(Debug)]
pub struct Tracker<T> {
    entries: Vec<TrackedEntry<T>>,
    identity: HashMap<EntityKey, Shared<T>>,
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            identity: HashMap::new(),
        }
    }
}

/// All trackers owned by one session.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    pub(crate) ninjas: Tracker<Ninja>,
    pub(crate) clans: Tracker<Clan>,
    pub(crate) equipment: Tracker<Equipment>,
}

impl ChangeTracker {
    /// Runs snapshot diffing over every tracked entity.
    pub(crate) fn detect_changes(&mut self) {
        self.ninjas.detect_changes();
        self.clans.detect_changes();
        self.equipment.detect_changes();
    }

    /// Marks every written entry as persisted after a successful commit.
    ///
    /// Deleted equipment also leaves the collection of every tracked ninja
    /// that still holds it.
    pub(crate) fn accept_changes(&mut self) {
        let deleted: Vec<Shared<Equipment>> = self
            .equipment
            .pending(EntityState::Deleted)
            .into_iter()
            .map(|(item, _)| item)
            .collect();
        if !deleted.is_empty() {
            for entry in &self.ninjas.entries {
                entry
                    .entity
                    .borrow_mut()
                    .equipment_owned
                    .retain(|owned| !deleted.iter().any(|gone| Rc::ptr_eq(gone, owned)));
            }
        }

        self.ninjas.accept_changes();
        self.clans.accept_changes();
        self.equipment.accept_changes();
    }

    /// Equipment handles held by ninjas that are not scheduled for deletion,
    /// in collection order.
    pub(crate) fn owned_equipment(&self) -> Vec<Shared<Equipment>> {
        self.ninjas
            .entries
            .iter()
            .filter(|entry| entry.state != EntityState::Deleted)
            .flat_map(|entry| entry.entity.borrow().equipment_owned.clone())
            .collect()
    }

    /// Starts tracking equipment reachable through tracked ninjas.
    ///
    /// Transient items (key `0`) become `Added`; persisted ones become
    /// `Unchanged`. A persisted item whose key is already taken by another
    /// instance stays untracked.
    pub(crate) fn discover_owned_equipment(&mut self) {
        for item in self.owned_equipment() {
            if self.equipment.contains(&item) {
                continue;
            }
            if item.borrow().id == 0 {
                self.equipment.track_added(&item);
            } else {
                self.equipment.adopt(&item);
            }
        }
    }
}

impl<T: Entity> Tracker<T> {
    pub(crate) fn entries(&self) -> &[TrackedEntry<T>] {
        &self.entries
    }

    pub(crate) fn contains(&self, entity: &Shared<T>) -> bool {
        self.position(entity).is_some()
    }

    pub(crate) fn state_of(&self, entity: &Shared<T>) -> EntityState {
        self.position(entity)
            .map_or(EntityState::Detached, |index| self.entries[index].state)
    }

    /// Identity-map lookup. Never touches the store.
    pub(crate) fn lookup(&self, key: EntityKey) -> Option<Shared<T>> {
        self.identity.get(&key).cloned()
    }

    /// Tracked entities that are not scheduled for deletion.
    pub(crate) fn local(&self) -> Vec<Shared<T>> {
        self.entries
            .iter()
            .filter(|entry| entry.state != EntityState::Deleted)
            .map(|entry| Rc::clone(&entry.entity))
            .collect()
    }

    /// Resolves a freshly read entity against the identity map.
    ///
    /// An already tracked instance wins over the row just read.
    pub(crate) fn materialize(&mut self, loaded: T) -> Shared<T> {
        if let Some(existing) = self.lookup(loaded.key()) {
            return existing;
        }

        let key = loaded.key();
        let original = Some(loaded.column_values());
        let entity = crate::model::shared(loaded);
        self.entries.push(TrackedEntry {
            entity: Rc::clone(&entity),
            state: EntityState::Unchanged,
            original,
            changed: ChangedColumns::All,
        });
        self.identity.insert(key, Rc::clone(&entity));
        entity
    }

    /// Starts tracking `entity` in `state`, or moves it to `state` when it is
    /// already tracked.
    pub(crate) fn set_state(
        &mut self,
        entity: &Shared<T>,
        state: EntityState,
    ) -> PersistenceResult<()> {
        let Some(index) = self.position(entity) else {
            return self.track(entity, state);
        };

        match state {
            EntityState::Detached => {
                self.detach(index);
            }
            EntityState::Deleted if self.entries[index].state == EntityState::Added => {
                self.detach(index);
            }
            EntityState::Unchanged => {
                let entry = &mut self.entries[index];
                entry.original = Some(entry.entity.borrow().column_values());
                entry.state = EntityState::Unchanged;
            }
            EntityState::Modified => {
                let entry = &mut self.entries[index];
                entry.state = EntityState::Modified;
                entry.changed = ChangedColumns::All;
            }
            EntityState::Added => {
                self.forget_identity(index);
                let entry = &mut self.entries[index];
                entry.state = EntityState::Added;
                entry.original = None;
                entry.changed = ChangedColumns::All;
            }
            EntityState::Deleted => {
                self.entries[index].state = EntityState::Deleted;
            }
        }
        Ok(())
    }

    /// Schedules an insert. Added entities never enter the identity map
    /// before they have a key.
    pub(crate) fn track_added(&mut self, entity: &Shared<T>) {
        if let Some(index) = self.position(entity) {
            self.entries[index].state = EntityState::Added;
            return;
        }
        self.entries.push(TrackedEntry {
            entity: Rc::clone(entity),
            state: EntityState::Added,
            original: None,
            changed: ChangedColumns::All,
        });
    }

    /// Schedules deletion; a pending insert is simply forgotten.
    pub(crate) fn remove(&mut self, entity: &Shared<T>) -> PersistenceResult<()> {
        if !self.contains(entity) {
            return Err(PersistenceError::NotTracked { table: T::TABLE });
        }
        self.set_state(entity, EntityState::Deleted)
    }

    /// Refreshes the state of a single entity from its snapshot.
    pub(crate) fn detect_changes_for(&mut self, entity: &Shared<T>) {
        if let Some(index) = self.position(entity) {
            detect_entry(&mut self.entries[index]);
        }
    }

    pub(crate) fn detect_changes(&mut self) {
        for entry in &mut self.entries {
            detect_entry(entry);
        }
    }

    /// Pending writes in `state`, in tracking order.
    pub(crate) fn pending(&self, state: EntityState) -> Vec<(Shared<T>, ChangedColumns)> {
        self.entries
            .iter()
            .filter(|entry| entry.state == state)
            .map(|entry| (Rc::clone(&entry.entity), entry.changed.clone()))
            .collect()
    }

    pub(crate) fn count_pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| {
                matches!(
                    entry.state,
                    EntityState::Added | EntityState::Modified | EntityState::Deleted
                )
            })
            .count()
    }

    /// Marks every written entry as persisted after a successful commit.
    pub(crate) fn accept_changes(&mut self) {
        let identity = &mut self.identity;
        self.entries.retain_mut(|entry| match entry.state {
            EntityState::Deleted => {
                let key = entry.entity.borrow().key();
                identity.remove(&key);
                false
            }
            EntityState::Added | EntityState::Modified => {
                let current = entry.entity.borrow();
                identity.insert(current.key(), Rc::clone(&entry.entity));
                entry.original = Some(current.column_values());
                drop(current);
                entry.state = EntityState::Unchanged;
                entry.changed = ChangedColumns::All;
                true
            }
            EntityState::Unchanged | EntityState::Detached => true,
        });
    }

    fn track(&mut self, entity: &Shared<T>, state: EntityState) -> PersistenceResult<()> {
        if state == EntityState::Detached {
            return Ok(());
        }

        let (key, values) = {
            let current = entity.borrow();
            (current.key(), current.column_values())
        };
        let registers_identity = key != 0 && state != EntityState::Added;
        if registers_identity {
            if let Some(existing) = self.identity.get(&key) {
                if !Rc::ptr_eq(existing, entity) {
                    return Err(PersistenceError::IdentityConflict {
                        table: T::TABLE,
                        key,
                    });
                }
            }
        }

        let original = match state {
            EntityState::Unchanged => Some(values),
            _ => None,
        };
        self.entries.push(TrackedEntry {
            entity: Rc::clone(entity),
            state,
            original,
            changed: ChangedColumns::All,
        });
        if registers_identity {
            self.identity.insert(key, Rc::clone(entity));
        }
        Ok(())
    }

    /// Tracks a persisted entity as `Unchanged` unless another instance
    /// holds its key. Returns whether the entity is tracked afterwards.
    pub(crate) fn adopt(&mut self, entity: &Shared<T>) -> bool {
        self.contains(entity) || self.track(entity, EntityState::Unchanged).is_ok()
    }

    fn detach(&mut self, index: usize) {
        self.forget_identity(index);
        self.entries.remove(index);
    }

    fn forget_identity(&mut self, index: usize) {
        let entity = &self.entries[index].entity;
        let key = entity.borrow().key();
        if self
            .identity
            .get(&key)
            .is_some_and(|existing| Rc::ptr_eq(existing, entity))
        {
            self.identity.remove(&key);
        }
    }

    fn position(&self, entity: &Shared<T>) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| Rc::ptr_eq(&entry.entity, entity))
    }
}

fn detect_entry<T: Entity>(entry: &mut TrackedEntry<T>) {
    let diffable = match (&entry.state, &entry.changed) {
        (EntityState::Unchanged, _) => true,
        (EntityState::Modified, ChangedColumns::Only(_)) => true,
        _ => false,
    };
    let Some(original) = entry.original.as_ref().filter(|_| diffable) else {
        return;
    };

    let current = entry.entity.borrow().column_values();
    let changed: Vec<usize> = current
        .iter()
        .zip(original)
        .enumerate()
        .filter(|(_, (now, before))| now != before)
        .map(|(index, _)| index)
        .collect();

    if changed.is_empty() {
        entry.state = EntityState::Unchanged;
        entry.changed = ChangedColumns::All;
    } else {
        entry.state = EntityState::Modified;
        entry.changed = ChangedColumns::Only(changed);
    }
}
