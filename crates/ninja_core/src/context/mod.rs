//! Unit-of-work sessions over the ninja store.
//!
//! # Responsibility
//! - Own one SQLite connection for the lifetime of a session.
//! - Track loaded/added entities and translate their net changes into
//!   storage mutations on `save_changes`.
//! - Route every statement through one executor that logs it and counts
//!   round trips.
//!
//! # Invariants
//! - One session, one connection; dropping the session closes it.
//! - Nothing reaches the store before `save_changes`, except reads.
//! - `save_changes` is all-or-nothing.

use crate::db::{open_db, open_db_in_memory};
use crate::model::clan::Clan;
use crate::model::equipment::Equipment;
use crate::model::ninja::Ninja;
use crate::model::Shared;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{Connection, Params, Row};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

pub mod entity;
mod error;
mod flush;
mod query;
mod set;
mod tracker;

pub use entity::Entity;
pub use error::{PersistenceError, PersistenceResult};
pub use query::{Filter, GraphQuery, NinjaRelation, Query};
pub use set::DbSet;
pub use tracker::EntityState;

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// One unit of work against the ninja store.
pub struct NinjaContext {
    session_id: Uuid,
    conn: Connection,
    tracker: tracker::ChangeTracker,
    round_trips: u64,
    opened_at: Instant,
}

impl NinjaContext {
    /// Opens (and migrates) the database file at `path` for a new session.
    ///
    /// # Errors
    /// - `PersistenceError::Connectivity` when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let conn = open_db(path)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a session over a private in-memory store.
    pub fn open_in_memory() -> PersistenceResult<Self> {
        let conn = open_db_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    /// Adopts an already bootstrapped connection.
    pub fn from_connection(conn: Connection) -> Self {
        let session_id = Uuid::new_v4();
        info!("event=session_open module=context status=ok session={session_id}");
        Self {
            session_id,
            conn,
            tracker: tracker::ChangeTracker::default(),
            round_trips: 0,
            opened_at: Instant::now(),
        }
    }

    pub fn ninjas(&mut self) -> DbSet<'_, Ninja> {
        self.set()
    }

    pub fn clans(&mut self) -> DbSet<'_, Clan> {
        self.set()
    }

    pub fn equipment(&mut self) -> DbSet<'_, Equipment> {
        self.set()
    }

    pub fn set<T: Entity>(&mut self) -> DbSet<'_, T> {
        DbSet::new(self)
    }

    /// State inspection and override for one entity.
    pub fn entry<T: Entity>(&mut self, entity: &Shared<T>) -> Entry<'_, T> {
        Entry {
            ctx: self,
            entity: entity.clone(),
        }
    }

    /// Whether a flush would write anything.
    pub fn has_changes(&mut self) -> bool {
        self.tracker.discover_owned_equipment();
        self.tracker.detect_changes();
        self.tracker.ninjas.count_pending()
            + self.tracker.clans.count_pending()
            + self.tracker.equipment.count_pending()
            > 0
    }

    /// Writes every pending insert, update and delete in one transaction.
    ///
    /// Returns the number of entities written.
    ///
    /// # Errors
    /// - `ConstraintViolation` / `Connectivity` from the store.
    /// - `Validation` before the offending statement is sent.
    /// - `StaleEntity` when an update or delete matched no row.
    ///
    /// On error nothing is committed and generated keys are rolled back.
    pub fn save_changes(&mut self) -> PersistenceResult<usize> {
        flush::save_changes(self)
    }

    /// Statements sent to the store by this session so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Raw connection, for setup that sits outside the unit of work.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn parts(&mut self) -> (Executor<'_>, &mut tracker::ChangeTracker) {
        (
            Executor::new(&self.conn, self.session_id, &mut self.round_trips),
            &mut self.tracker,
        )
    }
}

impl Drop for NinjaContext {
    fn drop(&mut self) {
        info!(
            "event=session_close module=context status=ok session={} round_trips={} duration_ms={}",
            self.session_id,
            self.round_trips,
            self.opened_at.elapsed().as_millis()
        );
    }
}

/// Handle returned by [`NinjaContext::entry`].
pub struct Entry<'c, T: Entity> {
    ctx: &'c mut NinjaContext,
    entity: Shared<T>,
}

impl<T: Entity> Entry<'_, T> {
    /// Current state, after picking up owned equipment and diffing the
    /// entity against its snapshot.
    pub fn state(&mut self) -> EntityState {
        self.ctx.tracker.discover_owned_equipment();
        let tracker = T::tracker_mut(&mut self.ctx.tracker);
        tracker.detect_changes_for(&self.entity);
        tracker.state_of(&self.entity)
    }

    /// Overrides the state, attaching the entity if the session never saw it.
    ///
    /// `Modified` without a snapshot writes every column on flush.
    ///
    /// # Errors
    /// - `IdentityConflict` when another instance with the same key is tracked.
    pub fn set_state(&mut self, state: EntityState) -> PersistenceResult<()> {
        debug!(
            "event=entry_state module=context session={} table={} key={} state={state:?}",
            self.ctx.session_id,
            T::TABLE,
            self.entity.borrow().key()
        );
        T::tracker_mut(&mut self.ctx.tracker).set_state(&self.entity, state)
    }

    pub fn entity(&self) -> &Shared<T> {
        &self.entity
    }
}

/// Statement gateway: logs each statement and counts the round trip.
pub(crate) struct Executor<'s> {
    conn: &'s Connection,
    session_id: Uuid,
    round_trips: &'s mut u64,
}

impl<'s> Executor<'s> {
    pub(crate) fn new(conn: &'s Connection, session_id: Uuid, round_trips: &'s mut u64) -> Self {
        Self {
            conn,
            session_id,
            round_trips,
        }
    }

    /// Issues one round trip. `sql` is what gets logged.
    pub(crate) fn round_trip<R, E>(
        &mut self,
        sql: &str,
        call: impl FnOnce(&Connection) -> Result<R, E>,
    ) -> PersistenceResult<R>
    where
        PersistenceError: From<E>,
    {
        *self.round_trips += 1;
        debug!(
            "event=sql module=context session={} trip={} sql={}",
            self.session_id,
            self.round_trips,
            compact_sql(sql)
        );
        call(self.conn).map_err(PersistenceError::from)
    }

    pub(crate) fn execute(&mut self, sql: &str, params: impl Params) -> PersistenceResult<usize> {
        self.round_trip(sql, |conn| conn.execute(sql, params))
    }

    pub(crate) fn query<T>(
        &mut self,
        sql: &str,
        params: impl Params,
        mut map: impl FnMut(&Row<'_>) -> PersistenceResult<T>,
    ) -> PersistenceResult<Vec<T>> {
        self.round_trip(sql, |conn| -> PersistenceResult<Vec<T>> {
            let mut stmt = conn.prepare(sql)?;
            let mut rows = stmt.query(params)?;
            let mut mapped = Vec::new();
            while let Some(row) = rows.next()? {
                mapped.push(map(row)?);
            }
            Ok(mapped)
        })
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }
}

fn compact_sql(sql: &str) -> String {
    WHITESPACE_RE.replace_all(sql.trim(), " ").into_owned()
}
