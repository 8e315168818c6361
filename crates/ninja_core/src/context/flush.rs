//! `save_changes`: change detection, relationship fix-up and batched writes.
//!
//! # Invariants
//! - Every write of one flush runs inside one SQLite transaction.
//! - Parents are inserted before children; children are deleted before
//!   parents.
//! - On failure the transaction rolls back and in-memory keys / foreign keys
//!   assigned during the attempt are restored.

use super::entity::{Entity, KEY_COLUMN};
use super::error::{PersistenceError, PersistenceResult};
use super::tracker::{ChangeTracker, ChangedColumns, EntityState, Tracker};
use super::{Executor, NinjaContext};
use crate::model::equipment::Equipment;
use crate::model::ninja::Ninja;
use crate::model::{Shared, ValidationError};
use log::{error, info};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::rc::Rc;
use std::time::Instant;

/// Undo log for in-memory side effects of a failed flush.
#[derive(Default)]
struct Rollback {
    actions: Vec<Box<dyn FnOnce()>>,
}

impl Rollback {
    fn record(&mut self, action: impl FnOnce() + 'static) {
        self.actions.push(Box::new(action));
    }

    fn run(self) {
        for action in self.actions.into_iter().rev() {
            action();
        }
    }
}

#[derive(Debug, Default)]
struct WriteCounts {
    inserted: usize,
    updated: usize,
    deleted: usize,
}

impl WriteCounts {
    fn total(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

pub(super) fn save_changes(ctx: &mut NinjaContext) -> PersistenceResult<usize> {
    let started_at = Instant::now();
    let NinjaContext {
        session_id,
        conn,
        tracker,
        round_trips,
        ..
    } = ctx;
    let session_id = *session_id;

    register_owned_equipment(tracker)?;
    fix_up_equipment_keys(tracker, None);
    tracker.detect_changes();

    let pending = tracker.ninjas.count_pending()
        + tracker.clans.count_pending()
        + tracker.equipment.count_pending();
    if pending == 0 {
        info!("event=save_changes module=context status=ok session={session_id} written=0");
        return Ok(0);
    }

    let mut rollback = Rollback::default();
    let outcome = (|| -> PersistenceResult<WriteCounts> {
        let tx = conn.transaction()?;
        let counts = {
            let mut exec = Executor::new(&tx, session_id, round_trips);
            write_pending(&mut exec, tracker, &mut rollback)?
        };
        tx.commit()?;
        Ok(counts)
    })();

    match outcome {
        Ok(counts) => {
            tracker.accept_changes();
            info!(
                "event=save_changes module=context status=ok session={session_id} inserted={} updated={} deleted={} duration_ms={}",
                counts.inserted,
                counts.updated,
                counts.deleted,
                started_at.elapsed().as_millis()
            );
            Ok(counts.total())
        }
        Err(err) => {
            rollback.run();
            error!(
                "event=save_changes module=context status=error session={session_id} duration_ms={} error={err}",
                started_at.elapsed().as_millis()
            );
            Err(err)
        }
    }
}

/// Tracks equipment reachable through tracked ninjas.
///
/// Items pushed into `equipment_owned` need no explicit `add` call; items
/// that already carry a key are taken as `Unchanged`.
fn register_owned_equipment(tracker: &mut ChangeTracker) -> PersistenceResult<()> {
    let owned = tracker.owned_equipment();
    for (index, item) in owned.iter().enumerate() {
        if owned[..index].iter().any(|known| Rc::ptr_eq(known, item)) {
            return Err(ValidationError::EquipmentOwnedTwice {
                name: item.borrow().name.clone(),
            }
            .into());
        }
    }

    tracker.discover_owned_equipment();
    if let Some(stranger) = owned.iter().find(|item| !tracker.equipment.contains(item)) {
        return Err(PersistenceError::IdentityConflict {
            table: Equipment::TABLE,
            key: stranger.borrow().id,
        });
    }
    Ok(())
}

/// Copies each persisted ninja's key into the equipment it owns.
fn fix_up_equipment_keys(tracker: &ChangeTracker, mut rollback: Option<&mut Rollback>) {
    for ninja in live_entries(&tracker.ninjas) {
        let ninja = ninja.borrow();
        if ninja.id == 0 {
            continue;
        }
        for item in &ninja.equipment_owned {
            let previous = item.borrow().ninja_id;
            if previous == ninja.id {
                continue;
            }
            item.borrow_mut().ninja_id = ninja.id;
            if let Some(rollback) = rollback.as_deref_mut() {
                let item = Rc::clone(item);
                rollback.record(move || item.borrow_mut().ninja_id = previous);
            }
        }
    }
}

fn live_entries(tracker: &Tracker<Ninja>) -> Vec<Shared<Ninja>> {
    tracker
        .entries()
        .iter()
        .filter(|entry| entry.state != EntityState::Deleted)
        .map(|entry| Rc::clone(&entry.entity))
        .collect()
}

fn write_pending(
    exec: &mut Executor<'_>,
    tracker: &mut ChangeTracker,
    rollback: &mut Rollback,
) -> PersistenceResult<WriteCounts> {
    let mut counts = WriteCounts::default();

    counts.inserted += insert_pending(exec, &tracker.clans, rollback)?;
    counts.inserted += insert_pending(exec, &tracker.ninjas, rollback)?;
    fix_up_equipment_keys(tracker, Some(&mut *rollback));
    tracker.equipment.detect_changes();
    counts.inserted += insert_pending(exec, &tracker.equipment, rollback)?;

    counts.updated += update_pending(exec, &tracker.clans)?;
    counts.updated += update_pending(exec, &tracker.ninjas)?;
    counts.updated += update_pending(exec, &tracker.equipment)?;

    counts.deleted += delete_pending(exec, &tracker.equipment)?;
    counts.deleted += delete_pending(exec, &tracker.ninjas)?;
    counts.deleted += delete_pending(exec, &tracker.clans)?;

    Ok(counts)
}

fn insert_pending<T: Entity>(
    exec: &mut Executor<'_>,
    tracker: &Tracker<T>,
    rollback: &mut Rollback,
) -> PersistenceResult<usize> {
    let pending = tracker.pending(EntityState::Added);
    if pending.is_empty() {
        return Ok(0);
    }

    let placeholders = (1..=T::COLUMNS.len())
        .map(|index| format!("?{index}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({placeholders})",
        T::TABLE,
        T::COLUMNS.join(", ")
    );

    for (entity, _) in &pending {
        let values = {
            let current = entity.borrow();
            current.validate()?;
            current.column_values()
        };
        exec.execute(&sql, params_from_iter(values))?;

        let previous = entity.borrow().key();
        entity.borrow_mut().set_key(exec.last_insert_rowid());
        let entity = Rc::clone(entity);
        rollback.record(move || entity.borrow_mut().set_key(previous));
    }
    Ok(pending.len())
}

fn update_pending<T: Entity>(
    exec: &mut Executor<'_>,
    tracker: &Tracker<T>,
) -> PersistenceResult<usize> {
    let pending = tracker.pending(EntityState::Modified);

    for (entity, changed) in &pending {
        let (key, values) = {
            let current = entity.borrow();
            current.validate()?;
            (current.key(), current.column_values())
        };

        let columns: Vec<usize> = match changed {
            ChangedColumns::All => (0..T::COLUMNS.len()).collect(),
            ChangedColumns::Only(columns) => columns.clone(),
        };
        let assignments = columns
            .iter()
            .enumerate()
            .map(|(position, column)| format!("{} = ?{}", T::COLUMNS[*column], position + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {assignments} WHERE {KEY_COLUMN} = ?{}",
            T::TABLE,
            columns.len() + 1
        );

        let mut params: Vec<Value> = columns
            .iter()
            .map(|column| values[*column].clone())
            .collect();
        params.push(Value::Integer(key));

        let affected = exec.execute(&sql, params_from_iter(params))?;
        if affected == 0 {
            return Err(PersistenceError::StaleEntity {
                table: T::TABLE,
                key,
            });
        }
    }
    Ok(pending.len())
}

fn delete_pending<T: Entity>(
    exec: &mut Executor<'_>,
    tracker: &Tracker<T>,
) -> PersistenceResult<usize> {
    let pending = tracker.pending(EntityState::Deleted);
    let sql = format!("DELETE FROM {} WHERE {KEY_COLUMN} = ?1", T::TABLE);

    for (entity, _) in &pending {
        let key = entity.borrow().key();
        let affected = exec.execute(&sql, [key])?;
        if affected == 0 {
            return Err(PersistenceError::StaleEntity {
                table: T::TABLE,
                key,
            });
        }
    }
    Ok(pending.len())
}

#[cfg(test)]
mod tests {
    use super::Rollback;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn rollback_runs_actions_in_reverse_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut rollback = Rollback::default();
        for step in 1..=3 {
            let log = Rc::clone(&log);
            rollback.record(move || log.borrow_mut().push(step));
        }

        rollback.run();
        assert_eq!(*log.borrow(), vec![3, 2, 1]);
    }
}
