//! Named entity collections exposed by a session.

use super::entity::{Entity, KEY_COLUMN};
use super::error::{PersistenceError, PersistenceResult};
use super::query::{Filter, GraphQuery, NinjaRelation, Query};
use super::tracker::EntityState;
use super::NinjaContext;
use crate::db::procedures::{procedure_body, SELECT_BODY_SQL};
use crate::model::ninja::Ninja;
use crate::model::{shared, EntityKey, Shared};
use log::info;
use std::marker::PhantomData;
use std::time::Instant;

/// One entity collection inside a session (`ninjas`, `clans`, `equipment`).
pub struct DbSet<'c, T: Entity> {
    ctx: &'c mut NinjaContext,
    marker: PhantomData<T>,
}

impl<'c, T: Entity> DbSet<'c, T> {
    pub(crate) fn new(ctx: &'c mut NinjaContext) -> Self {
        Self {
            ctx,
            marker: PhantomData,
        }
    }

    /// Schedules a new entity for insertion and returns its handle.
    pub fn add(&mut self, entity: T) -> Shared<T> {
        let handle = shared(entity);
        T::tracker_mut(&mut self.ctx.tracker).track_added(&handle);
        handle
    }

    pub fn add_range(&mut self, entities: impl IntoIterator<Item = T>) -> Vec<Shared<T>> {
        entities.into_iter().map(|entity| self.add(entity)).collect()
    }

    /// Starts tracking an entity loaded elsewhere as `Unchanged`.
    ///
    /// Already tracked entities keep their state.
    ///
    /// # Errors
    /// - `IdentityConflict` when another instance with the same key is tracked.
    pub fn attach(&mut self, entity: &Shared<T>) -> PersistenceResult<()> {
        let tracker = T::tracker_mut(&mut self.ctx.tracker);
        if tracker.contains(entity) {
            return Ok(());
        }
        tracker.set_state(entity, EntityState::Unchanged)
    }

    /// Schedules deletion of a tracked entity.
    ///
    /// # Errors
    /// - `NotTracked` when the session does not know the entity; use
    ///   `entry(..).set_state(EntityState::Deleted)` for disconnected ones.
    pub fn remove(&mut self, entity: &Shared<T>) -> PersistenceResult<()> {
        T::tracker_mut(&mut self.ctx.tracker).remove(entity)
    }

    /// Finds by key, serving tracked instances without touching the store.
    ///
    /// Returns `None` when no row exists or the tracked instance is scheduled
    /// for deletion.
    pub fn find(&mut self, key: EntityKey) -> PersistenceResult<Option<Shared<T>>> {
        {
            let tracker = T::tracker(&self.ctx.tracker);
            if let Some(tracked) = tracker.lookup(key) {
                if tracker.state_of(&tracked) == EntityState::Deleted {
                    return Ok(None);
                }
                return Ok(Some(tracked));
            }
        }

        let sql = format!(
            "SELECT {} FROM {} WHERE {KEY_COLUMN} = ?1",
            T::select_list(),
            T::TABLE
        );
        let (mut exec, tracker) = self.ctx.parts();
        let rows = exec.query(&sql, [key], |row| T::from_row(row, ""))?;
        let tracker = T::tracker_mut(tracker);
        Ok(rows.into_iter().next().map(|row| tracker.materialize(row)))
    }

    /// Every row of the table.
    pub fn to_list(&mut self) -> PersistenceResult<Vec<Shared<T>>> {
        Query::new(&mut *self.ctx).to_list()
    }

    /// Lowest-key row, or `None` for an empty table.
    pub fn first_or_default(&mut self) -> PersistenceResult<Option<Shared<T>>> {
        Query::new(&mut *self.ctx).first_or_default()
    }

    /// Starts a filtered query.
    pub fn filter(self, filter: Filter) -> Query<'c, T> {
        Query::new(self.ctx).filter(filter)
    }

    /// Tracked entities of this type that are not scheduled for deletion.
    pub fn local(&self) -> Vec<Shared<T>> {
        T::tracker(&self.ctx.tracker).local()
    }

    /// Executes a named stored procedure whose rows are shaped like `T`.
    ///
    /// Results are tracked like any other query result.
    ///
    /// # Errors
    /// - `ProcedureNotFound` when no procedure is stored under `name`.
    pub fn exec_procedure(&mut self, name: &str) -> PersistenceResult<Vec<Shared<T>>> {
        let started_at = Instant::now();
        let session_id = self.ctx.session_id;
        let (mut exec, tracker) = self.ctx.parts();

        let body = exec
            .round_trip(SELECT_BODY_SQL, |conn| procedure_body(conn, name))?
            .ok_or_else(|| PersistenceError::ProcedureNotFound(name.to_string()))?;
        let rows = exec.query(&body, [], |row| T::from_row(row, ""))?;

        let tracker = T::tracker_mut(tracker);
        let entities: Vec<Shared<T>> = rows
            .into_iter()
            .map(|row| tracker.materialize(row))
            .collect();
        info!(
            "event=procedure_exec module=context status=ok session={session_id} name={name} rows={} duration_ms={}",
            entities.len(),
            started_at.elapsed().as_millis()
        );
        Ok(entities)
    }
}

impl<'c> DbSet<'c, Ninja> {
    /// Eagerly loads `relation` together with the ninjas.
    pub fn include(self, relation: NinjaRelation) -> GraphQuery<'c> {
        Query::new(self.ctx).include(relation)
    }
}
